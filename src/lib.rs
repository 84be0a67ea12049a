mod biometry;
mod builder;
mod clock;
mod error;
mod metrics;
mod object;
mod password;
mod policy;
mod register;
mod store;
pub mod debug;
pub mod listener;

pub use biometry::{BiometryKeyStore, BIOMETRY_KEY_KEEP_ALIVE};
pub use builder::{RegisterBuilder, RegisterConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BiometryError, DebugCommandError, PasswordError, PolicyParseError};
pub use metrics::stats::Metrics;
pub use object::{Managed, ManagedObject, SecretBytes};
pub use password::{Password, PasswordStore, PASSWORD_KEEP_ALIVE};
pub use policy::{PolicySet, ReleasePolicy};
pub use register::{
    effective_cleanup_period, is_valid_object_id, Register, CLEANUP_PERIOD_DEFAULT, CLEANUP_PERIOD_MAX,
    CLEANUP_PERIOD_MIN, CLEANUP_REMOVE_DELAY,
};
