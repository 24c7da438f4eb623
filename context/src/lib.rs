//! Ambient context variables.
//!
//! A [`ContextVariable`] is a typed key; its value lives in the ambient
//! context of the current thread. A [`ContextSnapshot`] captures the whole
//! ambient context by value so it can be reinstalled later, possibly after
//! the code that bound the variables has long returned.
//!
//! # Architecture
//!
//! ```text
//! thread-local ambient slot: ContextSnapshot
//! ├── ContextVariable::run(value, f)   derive + install around f
//! ├── ContextVariable::get()           read from the slot
//! ├── ContextSnapshot::capture()       clone the slot (O(1))
//! └── ContextSnapshot::enter(f)        install + restore via AmbientGuard
//! ```

mod snapshot;
mod variable;

pub use snapshot::{AmbientGuard, ContextSnapshot};
pub use variable::{ContextVariable, VariableId};
