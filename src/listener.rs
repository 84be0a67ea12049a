//! Release listener: a callback invoked whenever an entry is destroyed.
//!
//! # Example
//! ```
//! use objreg::listener::ReleaseCause;
//! use objreg::{Managed, PolicySet, RegisterBuilder};
//! use std::sync::{Arc, Mutex};
//!
//! let log: Arc<Mutex<Vec<(String, ReleaseCause)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let register = RegisterBuilder::new()
//!     .release_listener(move |handle: &str, _kind, cause| {
//!         log2.lock().unwrap().push((handle.to_string(), cause));
//!     })
//!     .build();
//!
//! let id = register.register_object(Managed::new(1u8), None, PolicySet::Manual);
//! register.remove_object::<Managed<u8>>(&id);
//! assert_eq!(log.lock().unwrap()[0], (id, ReleaseCause::Explicit));
//! ```

// ---------------------------------------------------------------------------
// ReleaseCause
// ---------------------------------------------------------------------------

/// The reason an entry was destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseCause {
    /// Removed via [`Register::remove_object`], either on the spot (manual
    /// policy) or by the sweep once the grace delay passed.
    ///
    /// [`Register::remove_object`]: crate::Register::remove_object
    Explicit,
    /// Swept because one of its release policies triggered.
    Expired,
    /// Removed by [`Register::remove_all_objects_with_tag`] or because the
    /// register shut down.
    ///
    /// [`Register::remove_all_objects_with_tag`]: crate::Register::remove_all_objects_with_tag
    Bulk,
}

// ---------------------------------------------------------------------------
// ReleaseListener trait
// ---------------------------------------------------------------------------

/// A callback invoked each time an entry is destroyed.
///
/// It runs after the payload was disposed, **while the register lock is
/// held**.  Do not call any register method from inside the listener; the
/// lock is not reentrant and the call would deadlock.
pub trait ReleaseListener: Send + Sync + 'static {
    fn on_release(&self, handle: &str, kind: &'static str, cause: ReleaseCause);
}

/// A [`ReleaseListener`] backed by a closure.
///
/// Created via [`RegisterBuilder::release_listener`](crate::RegisterBuilder::release_listener).
pub struct FnListener<F>(pub F);

impl<F> ReleaseListener for FnListener<F>
where
    F: Fn(&str, &'static str, ReleaseCause) + Send + Sync + 'static,
{
    fn on_release(&self, handle: &str, kind: &'static str, cause: ReleaseCause) {
        (self.0)(handle, kind, cause)
    }
}
