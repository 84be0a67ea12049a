use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::clock::{Clock, SystemClock};
use crate::listener::{FnListener, ReleaseCause, ReleaseListener};
use crate::register::{effective_cleanup_period, Register, CLEANUP_PERIOD_DEFAULT};

/// Deserializable register configuration.
///
/// ```
/// use objreg::RegisterConfig;
///
/// let cfg: RegisterConfig = serde_json::from_str(r#"{ "cleanup_period_ms": 500 }"#).unwrap();
/// assert_eq!(cfg.cleanup_period_ms, 500);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    /// Background sweep period in milliseconds.  Out-of-range values fall
    /// back to the default.
    pub cleanup_period_ms: u64,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        RegisterConfig {
            cleanup_period_ms: CLEANUP_PERIOD_DEFAULT.as_millis() as u64,
        }
    }
}

/// Builder for configuring and constructing a [`Register`].
///
/// # Example
/// ```
/// use objreg::RegisterBuilder;
/// use std::time::Duration;
///
/// let register = RegisterBuilder::new()
///     .cleanup_period_ms(500)
///     .build();
/// assert_eq!(register.cleanup_period(), Duration::from_millis(500));
/// ```
pub struct RegisterBuilder {
    cleanup_period: Duration,
    clock: Arc<dyn Clock>,
    listener: Option<Box<dyn ReleaseListener>>,
}

impl RegisterBuilder {
    pub fn new() -> Self {
        RegisterBuilder {
            cleanup_period: CLEANUP_PERIOD_DEFAULT,
            clock: Arc::new(SystemClock::new()),
            listener: None,
        }
    }

    /// Starts from a deserialized [`RegisterConfig`].
    pub fn from_config(config: &RegisterConfig) -> Self {
        Self::new().cleanup_period_ms(config.cleanup_period_ms)
    }

    /// Set the background sweep period (clamped like
    /// [`Register::set_cleanup_period`]; default: 10 s).
    pub fn cleanup_period_ms(mut self, period_ms: u64) -> Self {
        self.cleanup_period = effective_cleanup_period(period_ms);
        self
    }

    /// Use a custom time source for policy evaluation.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Register a release listener closure.
    ///
    /// The closure is called **synchronously while the register lock is
    /// held**, each time an entry is destroyed.  Do **not** call register
    /// methods from within the closure.
    pub fn release_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &'static str, ReleaseCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register a release listener via the [`ReleaseListener`] trait.
    pub fn release_listener_impl<L: ReleaseListener>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }

    pub fn build(self) -> Register {
        Register::from_parts(self.cleanup_period, self.clock, self.listener)
    }
}

impl Default for RegisterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
