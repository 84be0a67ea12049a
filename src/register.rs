use std::convert::Infallible;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::builder::RegisterBuilder;
use crate::clock::Clock;
use crate::listener::{ReleaseCause, ReleaseListener};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::object::ManagedObject;
use crate::policy::PolicySet;
use crate::store::entry::ManagedEntry;
use crate::store::EntryMap;

// ---------------------------------------------------------------------------
// Cleanup timing
// ---------------------------------------------------------------------------

/// Sweep period used when none is configured or the configured one is out
/// of range.
pub const CLEANUP_PERIOD_DEFAULT: Duration = Duration::from_millis(10_000);
/// Shortest accepted sweep period.
pub const CLEANUP_PERIOD_MIN: Duration = Duration::from_millis(100);
/// Longest accepted sweep period.
pub const CLEANUP_PERIOD_MAX: Duration = Duration::from_millis(60_000);
/// How long an explicitly removed, policy-managed entry stays in memory
/// before the sweep may destroy it.
pub const CLEANUP_REMOVE_DELAY: Duration = Duration::from_millis(1_000);

/// Maps a requested sweep period in milliseconds to the effective one.
///
/// Values inside `[CLEANUP_PERIOD_MIN, CLEANUP_PERIOD_MAX]` are kept; any
/// other value, including 0, falls back to [`CLEANUP_PERIOD_DEFAULT`].
pub fn effective_cleanup_period(period_ms: u64) -> Duration {
    let requested = Duration::from_millis(period_ms);
    if (CLEANUP_PERIOD_MIN..=CLEANUP_PERIOD_MAX).contains(&requested) {
        requested
    } else {
        CLEANUP_PERIOD_DEFAULT
    }
}

/// Returns `true` if `id` may be used as a handle.
pub fn is_valid_object_id(id: &str) -> bool {
    !id.is_empty()
}

// ---------------------------------------------------------------------------
// Register interior
// ---------------------------------------------------------------------------

/// Everything guarded by the register mutex.
pub(crate) struct State {
    pub(crate) entries: EntryMap,
    pub(crate) cleanup_period: Duration,
    /// Deadline of the next background sweep.  `None` while the map is
    /// empty: the sweeper is parked until the next registration.
    pub(crate) next_sweep: Option<Instant>,
    pub(crate) shutdown: bool,
}

/// Shared interior of a [`Register`].
pub(crate) struct Inner {
    pub(crate) state: Mutex<State>,
    /// Wakes the sweeper thread.  Always waited on with `state` locked.
    pub(crate) wakeup: Condvar,
    pub(crate) clock: Arc<dyn Clock>,
    /// Optional release listener.  `None` if the user didn't register one.
    pub(crate) listener: Option<Box<dyn ReleaseListener>>,
    pub(crate) metrics: StatsCounter,
}

/// What a lookup does to the entry it finds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Find,
    Use,
    Touch,
    Remove,
}

impl Inner {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Typed lookup shared by every access path.  Type is checked first,
    /// then validity, then the access side effect is applied.
    fn find_managed<T: ManagedObject>(
        &self,
        state: &mut State,
        handle: &str,
        access: Access,
    ) -> Option<Arc<T>> {
        if !is_valid_object_id(handle) {
            self.metrics.record_miss();
            return None;
        }
        let now = self.now_ms();
        let Some(entry) = state.entries.get_mut(handle) else {
            self.metrics.record_miss();
            return None;
        };
        let Some(object) = entry.downcast::<T>() else {
            self.metrics.record_miss();
            return None;
        };
        if !entry.is_valid(now) {
            self.metrics.record_miss();
            return None;
        }

        match access {
            Access::Find => {}
            Access::Use => entry.set_used(now),
            Access::Touch => entry.touch(now),
            Access::Remove => {
                if entry.set_removed(now) {
                    if let Some(entry) = state.entries.remove(handle) {
                        self.destroy(handle, entry, ReleaseCause::Explicit);
                    }
                    self.schedule_cleanup(state);
                } else {
                    trace!(handle, "object marked as removed");
                }
            }
        }
        self.metrics.record_hit();
        Some(object)
    }

    /// Disposes the payload and notifies the listener.  The entry has
    /// already been taken out of the map.
    fn destroy(&self, handle: &str, entry: ManagedEntry, cause: ReleaseCause) {
        let kind = entry.kind();
        entry.dispose();
        self.metrics.record_release(1);
        trace!(handle, kind, ?cause, "object released");
        if let Some(listener) = &self.listener {
            listener.on_release(handle, kind, cause);
        }
    }

    /// Arms the sweeper if the map has entries and no sweep is pending, or
    /// parks it if the map is empty.
    pub(crate) fn schedule_cleanup(&self, state: &mut State) {
        if state.entries.is_empty() {
            state.next_sweep = None;
        } else if state.next_sweep.is_none() {
            state.next_sweep = Some(Instant::now() + state.cleanup_period);
            self.wakeup.notify_one();
        }
    }

    /// Destroys every entry that is invalid and, if explicitly removed, past
    /// the grace delay.  Then rearms or parks the sweeper.
    pub(crate) fn sweep(&self, state: &mut State) {
        let now = self.now_ms();
        let delay = u64::try_from(CLEANUP_REMOVE_DELAY.as_millis()).unwrap_or(u64::MAX);
        let released = state
            .entries
            .extract_if(|_, entry| entry.is_ready_for_remove(now, delay));
        let count = released.len();
        for (handle, entry) in released {
            let cause = if entry.removed_time.is_some() {
                ReleaseCause::Explicit
            } else {
                ReleaseCause::Expired
            };
            self.destroy(&handle, entry, cause);
        }
        if count > 0 {
            debug!(released = count, remaining = state.entries.len(), "cleanup sweep finished");
        }

        state.next_sweep = None;
        self.schedule_cleanup(state);
    }

    /// Destroys every entry with the given tag, or every entry when `tag`
    /// is `None`.
    pub(crate) fn remove_all_with_tag(&self, state: &mut State, tag: Option<&str>) {
        let removed = state
            .entries
            .extract_if(|_, entry| tag.map_or(true, |t| entry.has_tag(t)));
        let count = removed.len();
        for (handle, entry) in removed {
            self.destroy(&handle, entry, ReleaseCause::Bulk);
        }
        debug!(tag, removed = count, "objects removed by tag");
        self.schedule_cleanup(state);
    }

    /// Body of the background sweeper thread.
    ///
    /// Sleeps on the condition variable bound to the register mutex: parked
    /// indefinitely while there's nothing to sweep, otherwise until the
    /// next deadline.  Any wakeup re-evaluates the deadline, so a changed
    /// period or a fresh registration takes effect right away.
    fn run_sweeper(&self) {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                break;
            }
            match state.next_sweep {
                None => self.wakeup.wait(&mut state),
                Some(deadline) if Instant::now() >= deadline => self.sweep(&mut state),
                Some(deadline) => {
                    let _ = self.wakeup.wait_until(&mut state, deadline);
                }
            }
        }
        trace!("sweeper stopped");
    }
}

// ---------------------------------------------------------------------------
// Sweeper ownership
// ---------------------------------------------------------------------------

/// Owns the sweeper thread.  Dropped together with the last [`Register`]
/// clone: stops the thread and releases everything still registered.
struct Sweeper {
    inner: Arc<Inner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    fn start(inner: Arc<Inner>) -> Self {
        let worker = Arc::clone(&inner);
        let thread = std::thread::Builder::new()
            .name("objreg-sweeper".to_string())
            .spawn(move || worker.run_sweeper());
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                // Lookups still evaluate policies inline; only reclamation
                // of untouched entries waits for an explicit sweep.
                warn!(error = %err, "failed to start sweeper thread");
                None
            }
        };
        Sweeper {
            inner,
            thread: Mutex::new(thread),
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            self.inner.remove_all_with_tag(&mut state, None);
        }
        self.inner.wakeup.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("sweeper thread panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Register handle
// ---------------------------------------------------------------------------

/// A thread-safe register of opaque handles to native objects.
///
/// Cloning is cheap and every clone refers to the same register.  When the
/// last clone is dropped the background sweeper stops and every remaining
/// object is disposed.
///
/// # Example
/// ```
/// use objreg::{Managed, Register, ReleasePolicy};
///
/// let register = Register::new();
/// let id = register.register_object(Managed::new(42u32), None, [ReleasePolicy::after_use(1)]);
/// assert_eq!(register.use_object::<Managed<u32>>(&id).map(|n| **n), Some(42));
/// assert!(register.use_object::<Managed<u32>>(&id).is_none());
/// ```
#[derive(Clone)]
pub struct Register {
    pub(crate) inner: Arc<Inner>,
    _sweeper: Arc<Sweeper>,
}

impl Register {
    /// A register with the default cleanup period and the system clock.
    pub fn new() -> Self {
        RegisterBuilder::new().build()
    }

    /// Returns a [`RegisterBuilder`] for constructing a new register.
    pub fn builder() -> RegisterBuilder {
        RegisterBuilder::new()
    }

    pub(crate) fn from_parts(
        cleanup_period: Duration,
        clock: Arc<dyn Clock>,
        listener: Option<Box<dyn ReleaseListener>>,
    ) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                entries: EntryMap::new(),
                cleanup_period,
                next_sweep: None,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            clock,
            listener,
            metrics: StatsCounter::new(),
        });
        let sweeper = Sweeper::start(Arc::clone(&inner));
        Register {
            inner,
            _sweeper: Arc::new(sweeper),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Registers `object` under a freshly generated handle and returns it.
    pub fn register_object<T: ManagedObject>(
        &self,
        object: T,
        tag: Option<&str>,
        policies: impl Into<PolicySet>,
    ) -> String {
        let object = Arc::new(object);
        let policies = policies.into();
        let mut state = self.inner.state.lock();
        let handle = state.entries.generate_handle();
        let now = self.inner.now_ms();
        state.entries.insert(
            handle.clone(),
            ManagedEntry::new(object, tag.map(str::to_string), policies, now),
        );
        self.inner.schedule_cleanup(&mut state);
        self.inner.metrics.record_registration();
        debug!(handle = %handle, tag, "object registered");
        handle
    }

    /// Registers the object built by `factory` under a caller-chosen `id`.
    ///
    /// Returns `Ok(false)` if `id` is empty or already taken; the factory is
    /// not called in that case.  The factory runs while the register lock is
    /// held, so it must not call back into the register.  A factory error
    /// is returned as-is and leaves the register untouched.
    pub fn register_object_with_id<T, E, F>(
        &self,
        id: &str,
        tag: Option<&str>,
        policies: impl Into<PolicySet>,
        factory: F,
    ) -> Result<bool, E>
    where
        T: ManagedObject,
        F: FnOnce() -> Result<T, E>,
    {
        if !is_valid_object_id(id) {
            return Ok(false);
        }
        let policies = policies.into();
        let mut state = self.inner.state.lock();
        if state.entries.contains(id) {
            debug!(handle = id, "object id already registered");
            return Ok(false);
        }
        let object = Arc::new(factory()?);
        let now = self.inner.now_ms();
        state.entries.insert(
            id.to_string(),
            ManagedEntry::new(object, tag.map(str::to_string), policies, now),
        );
        self.inner.schedule_cleanup(&mut state);
        self.inner.metrics.record_registration();
        debug!(handle = id, tag, "object registered with id");
        Ok(true)
    }

    /// Registers an already built object under a caller-chosen `id`.
    pub fn register_with_id<T: ManagedObject>(
        &self,
        object: T,
        id: &str,
        tag: Option<&str>,
        policies: impl Into<PolicySet>,
    ) -> bool {
        match self.register_object_with_id(id, tag, policies, || Ok::<T, Infallible>(object)) {
            Ok(registered) => registered,
            Err(never) => match never {},
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Resolves `handle` and counts the access as a use.
    pub fn use_object<T: ManagedObject>(&self, handle: &str) -> Option<Arc<T>> {
        let mut state = self.inner.state.lock();
        self.inner.find_managed(&mut state, handle, Access::Use)
    }

    /// Resolves `handle` and refreshes its inactivity timer without counting
    /// a use.
    pub fn touch_object<T: ManagedObject>(&self, handle: &str) -> Option<Arc<T>> {
        let mut state = self.inner.state.lock();
        self.inner.find_managed(&mut state, handle, Access::Touch)
    }

    /// Resolves `handle` without any side effect on the entry.
    pub fn find_object<T: ManagedObject>(&self, handle: &str) -> Option<Arc<T>> {
        let mut state = self.inner.state.lock();
        self.inner.find_managed(&mut state, handle, Access::Find)
    }

    /// Returns `true` if `handle` resolves to a valid object of any type.
    pub fn contains_object(&self, handle: &str) -> bool {
        if !is_valid_object_id(handle) {
            return false;
        }
        let state = self.inner.state.lock();
        let now = self.inner.now_ms();
        state
            .entries
            .get(handle)
            .is_some_and(|entry| entry.is_valid(now))
    }

    /// Returns `true` if `handle` resolves to a valid `T`.
    pub fn contains_object_of<T: ManagedObject>(&self, handle: &str) -> bool {
        let state = self.inner.state.lock();
        let now = self.inner.now_ms();
        state
            .entries
            .get(handle)
            .is_some_and(|entry| entry.is::<T>() && entry.is_valid(now))
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Removes the object behind `handle` and returns it.
    ///
    /// A manually managed object is disposed and erased right away.  A
    /// policy-managed object is only marked removed: it stops resolving at
    /// once, but stays in memory for [`CLEANUP_REMOVE_DELAY`] so a caller
    /// that resolved it just before the removal keeps working with an
    /// intact payload.  The sweep destroys it afterwards.
    pub fn remove_object<T: ManagedObject>(&self, handle: &str) -> Option<Arc<T>> {
        let mut state = self.inner.state.lock();
        self.inner.find_managed(&mut state, handle, Access::Remove)
    }

    /// Destroys every object tagged `tag`, or every object when `tag` is
    /// `None`.  Takes effect immediately, without the grace delay.
    pub fn remove_all_objects_with_tag(&self, tag: Option<&str>) {
        let mut state = self.inner.state.lock();
        self.inner.remove_all_with_tag(&mut state, tag);
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Sets the sweep period and sweeps immediately.
    ///
    /// See [`effective_cleanup_period`] for the accepted range.
    pub fn set_cleanup_period(&self, period_ms: u64) {
        let period = effective_cleanup_period(period_ms);
        let mut state = self.inner.state.lock();
        state.cleanup_period = period;
        debug!(period_ms = period.as_millis() as u64, "cleanup period changed");
        self.inner.sweep(&mut state);
        self.inner.wakeup.notify_one();
    }

    pub fn cleanup_period(&self) -> Duration {
        self.inner.state.lock().cleanup_period
    }

    /// Runs a sweep now instead of waiting for the next period.
    pub fn run_cleanup(&self) {
        let mut state = self.inner.state.lock();
        self.inner.sweep(&mut state);
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of entries in the map, including invalid ones the sweep hasn't
    /// reclaimed yet.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    pub fn stats(&self) -> Metrics {
        let live = self.len();
        self.inner.metrics.snapshot(live)
    }

    /// Returns `true` while a background sweep is scheduled.
    pub fn is_cleanup_scheduled(&self) -> bool {
        self.inner.state.lock().next_sweep.is_some()
    }
}

impl Default for Register {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::object::{Managed, SecretBytes};
    use crate::policy::ReleasePolicy;

    fn register_with_clock() -> (Register, ManualClock) {
        let clock = ManualClock::new();
        let register = RegisterBuilder::new().clock(clock.clone()).build();
        (register, clock)
    }

    #[test]
    fn cleanup_period_is_clamped_to_default() {
        assert_eq!(effective_cleanup_period(100), Duration::from_millis(100));
        assert_eq!(effective_cleanup_period(60_000), Duration::from_millis(60_000));
        assert_eq!(effective_cleanup_period(99), CLEANUP_PERIOD_DEFAULT);
        assert_eq!(effective_cleanup_period(0), CLEANUP_PERIOD_DEFAULT);
        assert_eq!(effective_cleanup_period(60_001), CLEANUP_PERIOD_DEFAULT);
    }

    #[test]
    fn empty_id_is_invalid() {
        assert!(!is_valid_object_id(""));
        assert!(is_valid_object_id("x"));
    }

    #[test]
    fn sweeper_is_parked_while_empty() {
        let (register, _clock) = register_with_clock();
        assert!(!register.is_cleanup_scheduled());
        let id = register.register_object(Managed::new(1u8), None, PolicySet::Manual);
        assert!(register.is_cleanup_scheduled());
        register.remove_object::<Managed<u8>>(&id);
        assert!(!register.is_cleanup_scheduled());
    }

    #[test]
    fn manual_removal_disposes_immediately() {
        let (register, _clock) = register_with_clock();
        let id = register.register_object(SecretBytes::from_slice(b"key"), None, PolicySet::Manual);
        let secret = register.remove_object::<SecretBytes>(&id).unwrap();
        assert!(secret.is_empty(), "payload must be wiped on removal");
        assert!(register.is_empty());
    }

    #[test]
    fn timed_removal_keeps_payload_intact_during_grace() {
        let (register, clock) = register_with_clock();
        let id = register.register_object(
            SecretBytes::from_slice(b"key"),
            None,
            [ReleasePolicy::keep_alive_ms(60_000)],
        );
        let secret = register.remove_object::<SecretBytes>(&id).unwrap();
        assert_eq!(secret.len(), 3);
        assert!(register.find_object::<SecretBytes>(&id).is_none());
        assert_eq!(register.len(), 1);

        clock.advance(Duration::from_millis(999));
        register.run_cleanup();
        assert_eq!(secret.len(), 3);
        assert_eq!(register.len(), 1);

        clock.advance(Duration::from_millis(1));
        register.run_cleanup();
        assert!(secret.is_empty());
        assert!(register.is_empty());
    }

    #[test]
    fn remove_of_invalid_entry_returns_none() {
        let (register, _clock) = register_with_clock();
        let id = register.register_object(Managed::new(1u8), None, [ReleasePolicy::after_use(1)]);
        assert!(register.use_object::<Managed<u8>>(&id).is_some());
        assert!(register.remove_object::<Managed<u8>>(&id).is_none());
    }

    #[test]
    fn stats_count_hits_misses_and_releases() {
        let (register, _clock) = register_with_clock();
        let id = register.register_object(Managed::new(1u8), None, PolicySet::Manual);
        register.find_object::<Managed<u8>>(&id);
        register.find_object::<Managed<u16>>(&id);
        register.find_object::<Managed<u8>>("missing");
        register.remove_object::<Managed<u8>>(&id);

        let stats = register.stats();
        assert_eq!(stats.registrations, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn dropping_last_clone_disposes_everything() {
        let (register, _clock) = register_with_clock();
        let id = register.register_object(
            SecretBytes::from_slice(b"secret"),
            None,
            [ReleasePolicy::keep_alive_ms(60_000)],
        );
        let secret = register.find_object::<SecretBytes>(&id).unwrap();
        let clone = register.clone();
        drop(register);
        assert_eq!(secret.len(), 6, "a live clone keeps the register running");
        drop(clone);
        assert!(secret.is_empty());
    }
}
