//! Release policies: declarative rules describing when a registered object
//! may be reclaimed.
//!
//! A policy set is either **manual** (only an explicit remove destroys the
//! entry) or a list of **timed** policies, any one of which invalidates the
//! entry once it triggers:
//!
//! | Policy          | Triggers when                          |
//! |-----------------|----------------------------------------|
//! | `AfterUse(n)`   | `usage_count >= n`                     |
//! | `KeepAlive(d)`  | `now - last_use_time >= d`             |
//! | `Expire(d)`     | `now - create_time >= d`               |
//!
//! # Textual form
//! ```
//! use objreg::ReleasePolicy;
//! use std::time::Duration;
//!
//! let p: ReleasePolicy = "keepAlive 200".parse().unwrap();
//! assert_eq!(p, ReleasePolicy::KeepAlive(Duration::from_millis(200)));
//! assert_eq!(p.to_string(), "keepAlive 200");
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PolicyParseError;

// ---------------------------------------------------------------------------
// ReleasePolicy
// ---------------------------------------------------------------------------

/// A single rule describing when an entry becomes invalid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleasePolicy {
    /// Only an explicit remove destroys the entry.  Cannot be combined with
    /// other policies; a list containing it collapses to [`PolicySet::Manual`].
    Manual,
    /// Invalid once the entry has been *used* `n` times.  Touches don't count.
    /// A count of 0 is raised to 1 when the policy joins a [`PolicySet`].
    AfterUse(u32),
    /// Invalid after the given time of inactivity (no use or touch).
    KeepAlive(Duration),
    /// Invalid the given time after registration, regardless of activity.
    Expire(Duration),
}

impl ReleasePolicy {
    /// An `AfterUse` policy.  `count` is at least 1.
    pub fn after_use(count: u32) -> Self {
        ReleasePolicy::AfterUse(count.max(1))
    }

    pub fn keep_alive_ms(ms: u64) -> Self {
        ReleasePolicy::KeepAlive(Duration::from_millis(ms))
    }

    pub fn expire_ms(ms: u64) -> Self {
        ReleasePolicy::Expire(Duration::from_millis(ms))
    }

    /// Returns `true` if this policy invalidates an entry in the given state.
    ///
    /// All timestamps are milliseconds on the register's monotonic clock.
    #[inline]
    pub(crate) fn is_triggered(&self, now: u64, created: u64, last_use: u64, usage_count: u32) -> bool {
        match *self {
            ReleasePolicy::Manual => false,
            ReleasePolicy::AfterUse(count) => usage_count >= count,
            ReleasePolicy::KeepAlive(d) => now.saturating_sub(last_use) >= millis(d),
            ReleasePolicy::Expire(d) => now.saturating_sub(created) >= millis(d),
        }
    }
}

#[inline]
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Display for ReleasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ReleasePolicy::Manual => f.write_str("manual"),
            ReleasePolicy::AfterUse(n) => write!(f, "afterUse {n}"),
            ReleasePolicy::KeepAlive(d) => write!(f, "keepAlive {}", millis(d)),
            ReleasePolicy::Expire(d) => write!(f, "expire {}", millis(d)),
        }
    }
}

impl FromStr for ReleasePolicy {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let keyword = parts.next().ok_or(PolicyParseError::Empty)?;
        let param = parts.next();
        if parts.next().is_some() {
            return Err(PolicyParseError::TrailingInput(s.to_string()));
        }

        let number = |param: Option<&str>| -> Result<u64, PolicyParseError> {
            let raw = param.ok_or_else(|| PolicyParseError::MissingParameter(keyword.to_string()))?;
            raw.parse::<u64>()
                .map_err(|_| PolicyParseError::InvalidParameter(raw.to_string()))
        };

        match keyword {
            "manual" => match param {
                None => Ok(ReleasePolicy::Manual),
                Some(_) => Err(PolicyParseError::TrailingInput(s.to_string())),
            },
            "afterUse" => {
                let n = number(param)?;
                match u32::try_from(n) {
                    Ok(0) | Err(_) => Err(PolicyParseError::InvalidParameter(n.to_string())),
                    Ok(n) => Ok(ReleasePolicy::AfterUse(n)),
                }
            }
            "keepAlive" => Ok(ReleasePolicy::keep_alive_ms(number(param)?)),
            "expire" => Ok(ReleasePolicy::expire_ms(number(param)?)),
            other => Err(PolicyParseError::UnknownPolicy(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicySet
// ---------------------------------------------------------------------------

/// The normalized set of policies attached to one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicySet {
    /// Owner-managed: never destroyed by the sweep, removed immediately on
    /// an explicit remove.
    Manual,
    /// Zero or more of `AfterUse`, `KeepAlive`, `Expire`.  Never contains
    /// `Manual`.
    Timed(Vec<ReleasePolicy>),
}

impl PolicySet {
    /// Normalizes a policy list.  `Manual` anywhere in the list wins, and
    /// `AfterUse(0)` becomes `AfterUse(1)`.
    pub fn new<I>(policies: I) -> Self
    where
        I: IntoIterator<Item = ReleasePolicy>,
    {
        let policies: Vec<ReleasePolicy> = policies
            .into_iter()
            .map(|p| match p {
                ReleasePolicy::AfterUse(n) => ReleasePolicy::after_use(n),
                other => other,
            })
            .collect();
        if policies.contains(&ReleasePolicy::Manual) {
            PolicySet::Manual
        } else {
            PolicySet::Timed(policies)
        }
    }

    pub fn manual() -> Self {
        PolicySet::Manual
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, PolicySet::Manual)
    }

    /// Returns `true` if any timed policy has triggered.
    pub(crate) fn any_triggered(&self, now: u64, created: u64, last_use: u64, usage_count: u32) -> bool {
        match self {
            PolicySet::Manual => false,
            PolicySet::Timed(list) => list
                .iter()
                .any(|p| p.is_triggered(now, created, last_use, usage_count)),
        }
    }

    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    pub(crate) fn has_after_use(&self) -> bool {
        self.timed()
            .iter()
            .any(|p| matches!(p, ReleasePolicy::AfterUse(_)))
    }

    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    pub(crate) fn has_keep_alive(&self) -> bool {
        self.timed()
            .iter()
            .any(|p| matches!(p, ReleasePolicy::KeepAlive(_)))
    }

    fn timed(&self) -> &[ReleasePolicy] {
        match self {
            PolicySet::Manual => &[],
            PolicySet::Timed(list) => list,
        }
    }

    /// Human-readable summary used by the debug dump, e.g. `AFTER_USE(1/2)`.
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    pub(crate) fn summary(&self, usage_count: u32) -> Vec<String> {
        match self {
            PolicySet::Manual => vec!["MANUAL".to_string()],
            PolicySet::Timed(list) => list
                .iter()
                .filter_map(|p| match *p {
                    ReleasePolicy::Manual => None,
                    ReleasePolicy::AfterUse(n) => Some(format!("AFTER_USE({usage_count}/{n})")),
                    ReleasePolicy::KeepAlive(d) => Some(format!("KEEP_ALIVE({})", millis(d))),
                    ReleasePolicy::Expire(d) => Some(format!("EXPIRE({})", millis(d))),
                })
                .collect(),
        }
    }
}

impl From<Vec<ReleasePolicy>> for PolicySet {
    fn from(policies: Vec<ReleasePolicy>) -> Self {
        PolicySet::new(policies)
    }
}

impl From<ReleasePolicy> for PolicySet {
    fn from(policy: ReleasePolicy) -> Self {
        PolicySet::new([policy])
    }
}

impl<const N: usize> From<[ReleasePolicy; N]> for PolicySet {
    fn from(policies: [ReleasePolicy; N]) -> Self {
        PolicySet::new(policies)
    }
}

impl FromStr for PolicySet {
    type Err = PolicyParseError;

    /// Parses a comma-separated list, e.g. `"afterUse 1, keepAlive 300000"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let policies = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ReleasePolicy>, _>>()?;
        Ok(PolicySet::new(policies))
    }
}
