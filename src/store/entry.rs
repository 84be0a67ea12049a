use std::any::Any;
use std::sync::Arc;

use crate::object::ManagedObject;
use crate::policy::PolicySet;

// ---------------------------------------------------------------------------
// ManagedEntry
// ---------------------------------------------------------------------------

/// One registered object plus its lifecycle bookkeeping.
///
/// The payload is held twice behind the same allocation: once as `dyn Any`
/// for typed lookups and once as `dyn ManagedObject` for disposal.
pub(crate) struct ManagedEntry {
    object: Arc<dyn Any + Send + Sync>,
    managed: Arc<dyn ManagedObject>,
    pub(crate) tag: Option<String>,
    pub(crate) policies: PolicySet,
    pub(crate) create_time: u64,
    pub(crate) last_use_time: u64,
    /// Set once by an explicit remove, never cleared.
    pub(crate) removed_time: Option<u64>,
    pub(crate) usage_count: u32,
}

impl ManagedEntry {
    pub(crate) fn new<T: ManagedObject>(
        object: Arc<T>,
        tag: Option<String>,
        policies: PolicySet,
        now: u64,
    ) -> Self {
        ManagedEntry {
            object: Arc::clone(&object) as Arc<dyn Any + Send + Sync>,
            managed: object,
            tag,
            policies,
            create_time: now,
            last_use_time: now,
            removed_time: None,
            usage_count: 0,
        }
    }

    /// Returns the payload if it is a `T`.
    #[inline]
    pub(crate) fn downcast<T: ManagedObject>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).downcast::<T>().ok()
    }

    #[inline]
    pub(crate) fn is<T: ManagedObject>(&self) -> bool {
        (*self.object).is::<T>()
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.managed.kind()
    }

    pub(crate) fn has_tag(&self, tag: &str) -> bool {
        self.tag.as_deref() == Some(tag)
    }

    // -----------------------------------------------------------------------
    // Access bookkeeping
    // -----------------------------------------------------------------------

    /// A consuming access: counts toward `AfterUse` and refreshes `KeepAlive`.
    pub(crate) fn set_used(&mut self, now: u64) {
        self.last_use_time = self.last_use_time.max(now);
        self.usage_count = self.usage_count.saturating_add(1);
    }

    /// A non-consuming access: refreshes `KeepAlive` only.
    pub(crate) fn touch(&mut self, now: u64) {
        self.last_use_time = self.last_use_time.max(now);
    }

    /// Marks the entry removed.  Returns `true` if it may be destroyed right
    /// away (manual policy); otherwise the sweep destroys it after the grace
    /// delay.
    pub(crate) fn set_removed(&mut self, now: u64) -> bool {
        if self.removed_time.is_none() {
            self.removed_time = Some(now);
        }
        self.policies.is_manual()
    }

    // -----------------------------------------------------------------------
    // Validity
    // -----------------------------------------------------------------------

    /// Valid iff not removed and no timed policy has triggered.
    pub(crate) fn is_valid(&self, now: u64) -> bool {
        self.removed_time.is_none()
            && !self
                .policies
                .any_triggered(now, self.create_time, self.last_use_time, self.usage_count)
    }

    /// `true` if the sweep may destroy this entry now.
    ///
    /// Manual entries are never swept while they're still registered: an
    /// explicit remove destroys them on the spot.
    pub(crate) fn is_ready_for_remove(&self, now: u64, remove_delay_ms: u64) -> bool {
        if self.is_valid(now) {
            return false;
        }
        match self.removed_time {
            None => !self.policies.is_manual(),
            Some(removed) => now.saturating_sub(removed) >= remove_delay_ms,
        }
    }

    /// Runs the payload's cleanup.  Called exactly once, right before the
    /// entry is dropped from the map.
    pub(crate) fn dispose(&self) {
        self.managed.dispose();
    }
}
