//! Payloads stored in the register.
//!
//! Anything registered must implement [`ManagedObject`].  The register keeps
//! the object behind an `Arc`, hands out clones on lookup, and calls
//! [`ManagedObject::dispose`] exactly once when the entry is destroyed.
//! Because clones may still be alive during the grace delay after an
//! explicit remove, `dispose` takes `&self`; payloads holding secrets keep
//! them behind interior mutability so they can be wiped in place.

use std::any::Any;
use std::fmt;
use std::ops::Deref;

use parking_lot::Mutex;
use zeroize::{Zeroize, Zeroizing};

/// Capability every registered payload provides.
///
/// `dispose` runs while the register lock is held, so it must be fast and
/// must not call back into the register.  It cannot fail.
pub trait ManagedObject: Any + Send + Sync {
    /// Scrubs or releases whatever the payload owns.  Default: nothing.
    fn dispose(&self) {}

    /// Short kind label shown by the debug dump.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// ---------------------------------------------------------------------------
// Managed<T>
// ---------------------------------------------------------------------------

/// Wraps a plain value that needs no cleanup (an SDK handle, a number, a
/// configuration blob).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Managed<T>(T);

impl<T> Managed<T> {
    pub fn new(value: T) -> Self {
        Managed(value)
    }

    pub fn get(&self) -> &T {
        &self.0
    }
}

impl<T> Deref for Managed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Send + Sync + 'static> ManagedObject for Managed<T> {
    fn kind(&self) -> &'static str {
        let full = std::any::type_name::<T>();
        // `alloc::vec::Vec<u8>` -> `Vec<u8>`
        let head = full.split('<').next().unwrap_or(full);
        match head.rfind("::") {
            Some(idx) => &full[idx + 2..],
            None => full,
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBytes
// ---------------------------------------------------------------------------

/// Secret byte material (key bytes, pre-authorized biometry keys) that is
/// zeroed when the entry is destroyed.
pub struct SecretBytes {
    bytes: Mutex<Zeroizing<Vec<u8>>>,
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        SecretBytes {
            bytes: Mutex::new(Zeroizing::new(bytes)),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    /// Runs `f` over the bytes without copying them out.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.bytes.lock())
    }

    /// Returns a copy that wipes itself on drop.
    pub fn to_zeroizing(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.bytes.lock().to_vec())
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// `true` for empty material, which includes material already disposed.
    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }
}

impl ManagedObject for SecretBytes {
    fn dispose(&self) {
        self.bytes.lock().zeroize();
    }

    fn kind(&self) -> &'static str {
        "SecretBytes"
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_bytes_are_wiped_on_dispose() {
        let secret = SecretBytes::from_slice(b"SECURE-DATA");
        assert_eq!(secret.len(), 11);
        secret.dispose();
        assert!(secret.is_empty());
        secret.with_bytes(|b| assert!(b.is_empty()));
    }

    #[test]
    fn debug_output_hides_contents() {
        let secret = SecretBytes::from_slice(b"hunter2");
        let out = format!("{secret:?}");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("len: 7"));
    }

    #[test]
    fn managed_kind_is_short_type_name() {
        assert_eq!(Managed::new(42i32).kind(), "i32");
        assert_eq!(Managed::new(vec![1u8]).kind(), "Vec<u8>");
    }

    #[test]
    fn managed_derefs_to_value() {
        let m = Managed::new(String::from("instance"));
        assert_eq!(m.len(), 8);
        assert_eq!(m.get(), "instance");
    }
}
