//! Opaque per-target execution state.

use std::any::Any;

/// Target-supplied state threaded through `compute` and `finalize`.
///
/// The compiler core never inspects the payload; targets downcast to their
/// own state type (device streams, handles, scratch pools).
#[derive(Default)]
pub struct Context {
    state: Option<Box<dyn Any + Send>>,
}

impl Context {
    pub fn new<T: Any + Send>(state: T) -> Self {
        Context {
            state: Some(Box::new(state)),
        }
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.state.as_ref()?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.state.as_mut()?.downcast_mut::<T>()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("empty", &self.state.is_none())
            .finish()
    }
}
