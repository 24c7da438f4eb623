//! Immutable context snapshots and the per-thread ambient slot.
//!
//! The ambient context is a single [`ContextSnapshot`] per thread. Installing
//! a snapshot goes through [`AmbientGuard`], which restores the previous one
//! on drop, so every install is paired with a restore even when the callee
//! panics.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::variable::{ContextVariable, VariableId};

thread_local! {
    static AMBIENT: RefCell<ContextSnapshot> = RefCell::new(ContextSnapshot::empty());
}

#[derive(Clone)]
struct Binding {
    name: &'static str,
    value: Rc<dyn Any>,
}

/// An immutable mapping from context variable identity to value.
///
/// Cloning is O(1); deriving a snapshot with a new binding copies the map
/// (context maps are small and bindings are rare compared to captures).
#[derive(Clone, Default)]
pub struct ContextSnapshot {
    entries: Rc<HashMap<VariableId, Binding>>,
}

impl ContextSnapshot {
    /// A snapshot with no bindings.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the ambient context of the current thread.
    #[must_use]
    pub fn capture() -> Self {
        AMBIENT.with(|slot| slot.borrow().clone())
    }

    /// Run `f` with this snapshot installed as the ambient context.
    ///
    /// The previously active context is restored when `f` returns or unwinds.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = AmbientGuard::install(self.clone());
        f()
    }

    /// Read `var` as bound in this snapshot, falling back to its default.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self, var: &ContextVariable<T>) -> Option<T> {
        self.entries
            .get(&var.id())
            .and_then(|binding| binding.value.downcast_ref::<T>())
            .cloned()
            .or_else(|| var.default_value().cloned())
    }

    /// Whether `var` has an explicit binding (defaults do not count).
    #[must_use]
    pub fn contains<T: 'static>(&self, var: &ContextVariable<T>) -> bool {
        self.entries.contains_key(&var.id())
    }

    /// Derive a new snapshot with `var` bound to `value`. `self` is unchanged.
    #[must_use]
    pub fn with_binding<T: 'static>(&self, var: &ContextVariable<T>, value: T) -> Self {
        let mut entries = HashMap::clone(&self.entries);
        entries.insert(
            var.id(),
            Binding {
                name: var.name(),
                value: Rc::new(value),
            },
        );
        Self {
            entries: Rc::new(entries),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|b| b.name).collect();
        names.sort_unstable();
        f.debug_struct("ContextSnapshot")
            .field("bindings", &names)
            .finish()
    }
}

/// RAII install of an ambient snapshot.
///
/// Holding the guard is the proof that the previous context will be put back.
#[must_use = "dropping the guard immediately restores the previous context"]
pub struct AmbientGuard {
    previous: Option<ContextSnapshot>,
}

impl AmbientGuard {
    /// Make `snapshot` the ambient context until the guard drops.
    pub fn install(snapshot: ContextSnapshot) -> Self {
        let previous = AMBIENT.with(|slot| slot.replace(snapshot));
        tracing::trace!(bindings = previous.len(), "ambient context installed");
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // The thread-local may already be gone during thread teardown.
            let _ = AMBIENT.try_with(|slot| slot.replace(previous));
        }
    }
}
