//! Debug-build inspection and command surface.
//!
//! Lets a test harness list what the register holds and drive it with
//! plain-data commands.  In release builds [`Register::debug_dump`] returns
//! nothing and [`Register::debug_command`] answers
//! [`DebugResult::Disabled`].
//!
//! ```
//! use objreg::debug::{DebugCommand, DebugObjectType, DebugResult};
//! use objreg::Register;
//!
//! let register = Register::new();
//! let created = register.debug_command(DebugCommand::Create {
//!     object_type: DebugObjectType::Number,
//!     tag: Some("demo".to_string()),
//!     policies: vec!["afterUse 1".to_string()],
//! });
//! if let Ok(DebugResult::Handle(id)) = created {
//!     let dump = register.debug_dump(Some("demo"));
//!     assert_eq!(dump[0].id, id);
//!     assert_eq!(dump[0].policies, vec!["AFTER_USE(0/1)".to_string()]);
//! }
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DebugCommandError;
use crate::register::Register;

#[cfg(debug_assertions)]
use crate::object::{Managed, ManagedObject, SecretBytes};
#[cfg(debug_assertions)]
use crate::password::Password;
#[cfg(debug_assertions)]
use crate::policy::{PolicySet, ReleasePolicy};

/// One row of [`Register::debug_dump`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DebugEntry {
    pub id: String,
    pub kind: &'static str,
    /// Policy summaries such as `MANUAL` or `AFTER_USE(1/2)`.
    pub policies: Vec<String>,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub create_time_ms: u64,
    /// Present only when a `KeepAlive` policy is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_use_time_ms: Option<u64>,
    /// Present only when an `AfterUse` policy is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u32>,
}

/// Payload kinds the command surface can create.
///
/// Each kind is its own Rust type, and lookups are typed.  `data` and
/// `secure-data` are both byte strings, but a `data` handle does not resolve
/// as `secure-data` or the other way round: `Data` is `Managed<Vec<u8>>`
/// and `SecureData` is [`SecretBytes`](crate::SecretBytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum DebugObjectType {
    /// Plain bytes `TEST-DATA`.
    #[serde(rename = "data")]
    Data,
    /// Zeroizing bytes `SECURE-DATA`.
    #[serde(rename = "secure-data")]
    SecureData,
    /// The number 42.
    #[serde(rename = "number")]
    Number,
    /// An empty password.
    #[serde(rename = "password")]
    Password,
}

impl FromStr for DebugObjectType {
    type Err = DebugCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(DebugObjectType::Data),
            "secure-data" => Ok(DebugObjectType::SecureData),
            "number" => Ok(DebugObjectType::Number),
            "password" => Ok(DebugObjectType::Password),
            _ => Err(DebugCommandError::WrongParameter("objectType")),
        }
    }
}

/// A command for [`Register::debug_command`].
///
/// Deserializes from `{"command": "create", ...}` style objects.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum DebugCommand {
    /// Registers a test object; answers [`DebugResult::Handle`].
    Create {
        object_type: DebugObjectType,
        #[serde(default)]
        tag: Option<String>,
        /// Policies in textual form, e.g. `"keepAlive 1000"`.
        policies: Vec<String>,
    },
    /// Answers [`DebugResult::Bool`] telling whether the object resolved.
    Release { id: String, object_type: DebugObjectType },
    Use { id: String, object_type: DebugObjectType },
    Find { id: String, object_type: DebugObjectType },
    Touch { id: String, object_type: DebugObjectType },
    ReleaseAll {
        #[serde(default)]
        tag: Option<String>,
    },
    SetPeriod { period_ms: u64 },
}

/// Outcome of a [`DebugCommand`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DebugResult {
    Handle(String),
    Bool(bool),
    Done,
    /// Release build: the command surface is compiled out.
    Disabled,
}

#[cfg(debug_assertions)]
#[derive(Clone, Copy)]
enum DebugAccess {
    Release,
    Use,
    Find,
    Touch,
}

impl Register {
    /// Lists every entry, or only the ones tagged `tag`.  Empty in release
    /// builds.
    pub fn debug_dump(&self, tag: Option<&str>) -> Vec<DebugEntry> {
        #[cfg(debug_assertions)]
        {
            let state = self.inner.state.lock();
            let now = self.inner.clock.now_ms();
            let mut rows: Vec<DebugEntry> = state
                .entries
                .iter()
                .filter(|(_, entry)| tag.map_or(true, |t| entry.has_tag(t)))
                .map(|(id, entry)| DebugEntry {
                    id: id.clone(),
                    kind: entry.kind(),
                    policies: entry.policies.summary(entry.usage_count),
                    is_valid: entry.is_valid(now),
                    tag: entry.tag.clone(),
                    create_time_ms: entry.create_time,
                    last_use_time_ms: entry
                        .policies
                        .has_keep_alive()
                        .then_some(entry.last_use_time),
                    usage_count: entry.policies.has_after_use().then_some(entry.usage_count),
                })
                .collect();
            rows.sort_by(|a, b| a.create_time_ms.cmp(&b.create_time_ms).then_with(|| a.id.cmp(&b.id)));
            rows
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = tag;
            Vec::new()
        }
    }

    /// Executes a debug command.  Answers [`DebugResult::Disabled`] in
    /// release builds.
    pub fn debug_command(&self, command: DebugCommand) -> Result<DebugResult, DebugCommandError> {
        #[cfg(debug_assertions)]
        {
            self.run_debug_command(command)
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = command;
            Ok(DebugResult::Disabled)
        }
    }

    #[cfg(debug_assertions)]
    fn run_debug_command(&self, command: DebugCommand) -> Result<DebugResult, DebugCommandError> {
        tracing::debug!(?command, "debug command");
        match command {
            DebugCommand::Create {
                object_type,
                tag,
                policies,
            } => {
                if policies.is_empty() {
                    return Err(DebugCommandError::WrongParameter("policies"));
                }
                let policies = policies
                    .iter()
                    .map(|p| p.parse::<ReleasePolicy>())
                    .collect::<Result<Vec<_>, _>>()?;
                let policies = PolicySet::new(policies);
                let tag = tag.as_deref();
                let id = match object_type {
                    DebugObjectType::Data => {
                        self.register_object(Managed::new(b"TEST-DATA".to_vec()), tag, policies)
                    }
                    DebugObjectType::SecureData => {
                        self.register_object(SecretBytes::from_slice(b"SECURE-DATA"), tag, policies)
                    }
                    DebugObjectType::Number => self.register_object(Managed::new(42i32), tag, policies),
                    DebugObjectType::Password => self.register_object(Password::new(), tag, policies),
                };
                Ok(DebugResult::Handle(id))
            }
            DebugCommand::Release { id, object_type } => {
                Ok(DebugResult::Bool(self.debug_access(&id, object_type, DebugAccess::Release)))
            }
            DebugCommand::Use { id, object_type } => {
                Ok(DebugResult::Bool(self.debug_access(&id, object_type, DebugAccess::Use)))
            }
            DebugCommand::Find { id, object_type } => {
                Ok(DebugResult::Bool(self.debug_access(&id, object_type, DebugAccess::Find)))
            }
            DebugCommand::Touch { id, object_type } => {
                Ok(DebugResult::Bool(self.debug_access(&id, object_type, DebugAccess::Touch)))
            }
            DebugCommand::ReleaseAll { tag } => {
                self.remove_all_objects_with_tag(tag.as_deref());
                Ok(DebugResult::Done)
            }
            DebugCommand::SetPeriod { period_ms } => {
                self.set_cleanup_period(period_ms);
                Ok(DebugResult::Done)
            }
        }
    }

    #[cfg(debug_assertions)]
    fn debug_access(&self, id: &str, object_type: DebugObjectType, access: DebugAccess) -> bool {
        match object_type {
            DebugObjectType::Data => self.debug_access_as::<Managed<Vec<u8>>>(id, access),
            DebugObjectType::SecureData => self.debug_access_as::<SecretBytes>(id, access),
            DebugObjectType::Number => self.debug_access_as::<Managed<i32>>(id, access),
            DebugObjectType::Password => self.debug_access_as::<Password>(id, access),
        }
    }

    #[cfg(debug_assertions)]
    fn debug_access_as<T: ManagedObject>(&self, id: &str, access: DebugAccess) -> bool {
        match access {
            DebugAccess::Release => self.remove_object::<T>(id).is_some(),
            DebugAccess::Use => self.use_object::<T>(id).is_some(),
            DebugAccess::Find => self.find_object::<T>(id).is_some(),
            DebugAccess::Touch => self.touch_object::<T>(id).is_some(),
        }
    }
}
