//! Pre-authorized biometry keys.
//!
//! After a successful biometric prompt the unlocked key bytes are parked in
//! the register for a short while, so the follow-up signing call doesn't
//! have to prompt again.  Keys are tagged with the instance that owns them.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::BiometryError;
use crate::object::SecretBytes;
use crate::policy::{PolicySet, ReleasePolicy};
use crate::register::{is_valid_object_id, Register};

/// Lifetime of a pre-authorized biometry key.
pub const BIOMETRY_KEY_KEEP_ALIVE: Duration = Duration::from_millis(10_000);

/// Stores unlocked biometry keys in a [`Register`].
#[derive(Clone)]
pub struct BiometryKeyStore {
    register: Register,
}

impl BiometryKeyStore {
    pub fn new(register: Register) -> Self {
        BiometryKeyStore { register }
    }

    /// Parks `key` in the register and returns its handle.
    ///
    /// A reusable key stays valid for [`BIOMETRY_KEY_KEEP_ALIVE`] after its
    /// last access.  A single-use key can be used once, and expires
    /// [`BIOMETRY_KEY_KEEP_ALIVE`] after creation regardless of access.
    pub fn store(&self, instance_id: &str, key: Vec<u8>, reusable: bool) -> Result<String, BiometryError> {
        if !is_valid_object_id(instance_id) {
            return Err(BiometryError::InvalidInstance);
        }
        if key.is_empty() {
            return Err(BiometryError::EmptyKey);
        }
        let policies = if reusable {
            PolicySet::new([ReleasePolicy::KeepAlive(BIOMETRY_KEY_KEEP_ALIVE)])
        } else {
            PolicySet::new([
                ReleasePolicy::after_use(1),
                ReleasePolicy::Expire(BIOMETRY_KEY_KEEP_ALIVE),
            ])
        };
        let id = self
            .register
            .register_object(SecretBytes::new(key), Some(instance_id), policies);
        debug!(handle = %id, instance_id, reusable, "biometry key stored");
        Ok(id)
    }

    /// Resolves the key and counts the access as a use.
    pub fn use_key(&self, id: &str) -> Result<Arc<SecretBytes>, BiometryError> {
        self.register
            .use_object::<SecretBytes>(id)
            .ok_or(BiometryError::InvalidObject)
    }

    /// Releases the key.  Unknown handles are ignored.
    pub fn release(&self, id: &str) {
        self.register.remove_object::<SecretBytes>(id);
    }

    /// Destroys every key parked for `instance_id`.
    pub fn release_instance(&self, instance_id: &str) {
        self.register.remove_all_objects_with_tag(Some(instance_id));
    }
}
