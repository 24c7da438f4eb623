use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::snapshot::ContextSnapshot;

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a context variable. Two variables with the same name are
/// still distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(u64);

impl VariableId {
    fn next() -> Self {
        Self(NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A typed key into the ambient context.
///
/// Clones share the identity of the original, so a clone reads and binds the
/// same slot.
#[derive(Clone)]
pub struct ContextVariable<T> {
    id: VariableId,
    name: &'static str,
    default: Option<T>,
}

impl<T: 'static> ContextVariable<T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            id: VariableId::next(),
            name,
            default: None,
        }
    }

    /// A variable that reads as `default` wherever it is unbound.
    #[must_use]
    pub fn with_default(name: &'static str, default: T) -> Self {
        Self {
            id: VariableId::next(),
            name,
            default: Some(default),
        }
    }

    #[must_use]
    pub fn id(&self) -> VariableId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&T> {
        self.default.as_ref()
    }

    /// Run `f` with this variable bound to `value`.
    ///
    /// The binding is visible to everything `f` calls synchronously, and to
    /// any snapshot captured inside `f`. The previous context is restored
    /// afterwards.
    pub fn run<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        ContextSnapshot::capture()
            .with_binding(self, value)
            .enter(f)
    }
}

impl<T: Clone + 'static> ContextVariable<T> {
    /// Current value in the ambient context, or the default when unbound.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        ContextSnapshot::capture().get(self)
    }
}

impl<T> fmt::Debug for ContextVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextVariable")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
