//! Secure password objects and the register-backed store that hands them
//! out by handle.
//!
//! A password is edited character by character by a remote caller that
//! only ever holds its handle.  Editing operations *touch* the entry (they
//! keep it alive but don't consume it); operations that actually spend the
//! password, such as signing, *use* it, which matters for passwords
//! created with `destroy_on_use`.
//!
//! ```
//! use objreg::{PasswordStore, Register};
//!
//! let store = PasswordStore::new(Register::new());
//! let id = store.create(true, None).unwrap();
//! store.add_character(&id, '1').unwrap();
//! store.add_character(&id, '2').unwrap();
//! assert_eq!(store.len(&id), Ok(2));
//!
//! let password = store.use_password(&id).unwrap();
//! assert_eq!(password.len(), 2);
//! assert!(store.use_password(&id).is_err(), "destroy-on-use passwords are single use");
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::error::PasswordError;
use crate::object::ManagedObject;
use crate::policy::{PolicySet, ReleasePolicy};
use crate::register::Register;

/// How long an untouched password stays valid.
pub const PASSWORD_KEEP_ALIVE: Duration = Duration::from_millis(5 * 60 * 1_000);

/// Smallest buffer a password grows into.
const MIN_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Password
// ---------------------------------------------------------------------------

/// A mutable password kept in memory that is wiped on drop and on dispose.
pub struct Password {
    chars: Mutex<Zeroizing<Vec<char>>>,
}

impl Password {
    pub fn new() -> Self {
        Password {
            chars: Mutex::new(Zeroizing::new(Vec::new())),
        }
    }

    /// Builds a password from plain text.
    pub fn from_text(text: &str) -> Self {
        // A str never holds more chars than bytes, so this never reallocates.
        let mut chars: Zeroizing<Vec<char>> = Zeroizing::new(Vec::with_capacity(text.len().max(MIN_CAPACITY)));
        chars.extend(text.chars());
        Password {
            chars: Mutex::new(chars),
        }
    }

    pub fn len(&self) -> usize {
        self.chars.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.lock().is_empty()
    }

    /// Appends a character and returns the new length.
    pub fn add_character(&self, ch: char) -> usize {
        let mut chars = self.chars.lock();
        reserve_wiped(&mut chars, 1);
        chars.push(ch);
        chars.len()
    }

    /// Inserts a character at `position` (`0..=len`) and returns the new
    /// length.
    pub fn insert_character(&self, ch: char, position: usize) -> Result<usize, PasswordError> {
        let mut chars = self.chars.lock();
        if position > chars.len() {
            return Err(PasswordError::OutOfRange {
                position,
                len: chars.len(),
            });
        }
        reserve_wiped(&mut chars, 1);
        chars.insert(position, ch);
        Ok(chars.len())
    }

    /// Removes the character at `position` (`0..len`) and returns the new
    /// length.
    pub fn remove_character(&self, position: usize) -> Result<usize, PasswordError> {
        let mut chars = self.chars.lock();
        if position >= chars.len() {
            return Err(PasswordError::OutOfRange {
                position,
                len: chars.len(),
            });
        }
        let mut removed = chars.remove(position);
        removed.zeroize();
        Ok(chars.len())
    }

    /// Removes the last character, if any, and returns the new length.
    pub fn remove_last_character(&self) -> usize {
        let mut chars = self.chars.lock();
        if let Some(mut last) = chars.pop() {
            last.zeroize();
        }
        chars.len()
    }

    pub fn clear(&self) {
        self.chars.lock().zeroize();
    }

    /// Compares two passwords.
    pub fn is_equal(&self, other: &Password) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        // Never hold both locks: two callers comparing in opposite order
        // would deadlock.
        let mine: Zeroizing<Vec<char>> = Zeroizing::new(self.chars.lock().to_vec());
        let theirs = other.chars.lock();
        *mine == **theirs
    }

    /// Runs `f` over the UTF-8 encoding of the password.  The temporary
    /// encoding is wiped before returning.  This is the hook the PIN
    /// strength checker uses to read the raw bytes.
    pub fn validate_complexity<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let chars = self.chars.lock();
        let mut encoded = Zeroizing::new(String::with_capacity(chars.len() * 4));
        encoded.extend(chars.iter());
        drop(chars);
        f(encoded.as_bytes())
    }
}

/// Makes room for `additional` more characters.
///
/// `Vec` growth frees the old buffer without wiping it, so growth happens
/// here instead: the characters move to a larger buffer and the old one is
/// zeroed before it is released.
fn reserve_wiped(chars: &mut Zeroizing<Vec<char>>, additional: usize) {
    let needed = chars.len() + additional;
    if needed <= chars.capacity() {
        return;
    }
    let capacity = needed.max(chars.capacity() * 2).max(MIN_CAPACITY);
    let mut grown = Vec::with_capacity(capacity);
    grown.extend_from_slice(&chars[..]);
    let mut old = std::mem::replace(chars, Zeroizing::new(grown));
    old.zeroize();
}

impl Default for Password {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedObject for Password {
    fn dispose(&self) {
        self.clear();
    }

    fn kind(&self) -> &'static str {
        "Password"
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PasswordStore
// ---------------------------------------------------------------------------

/// Creates passwords in a [`Register`] and resolves them back by handle.
#[derive(Clone)]
pub struct PasswordStore {
    register: Register,
    keep_alive: Duration,
}

impl PasswordStore {
    pub fn new(register: Register) -> Self {
        PasswordStore {
            register,
            keep_alive: PASSWORD_KEEP_ALIVE,
        }
    }

    /// Shortens the keep-alive time of passwords created from now on.
    ///
    /// Only honored in debug builds, and never longer than
    /// [`PASSWORD_KEEP_ALIVE`]; 0 restores the default.
    pub fn with_autorelease_ms(mut self, ms: u64) -> Self {
        if cfg!(debug_assertions) {
            self.keep_alive = if ms == 0 {
                PASSWORD_KEEP_ALIVE
            } else {
                Duration::from_millis(ms).min(PASSWORD_KEEP_ALIVE)
            };
        }
        self
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Registers a new empty password and returns its handle.
    ///
    /// `owner`, when given, must be a live object in the register; the
    /// password is tagged with it so tearing the owner down releases the
    /// password too.
    pub fn create(&self, destroy_on_use: bool, owner: Option<&str>) -> Result<String, PasswordError> {
        if let Some(owner) = owner {
            if !self.register.contains_object(owner) {
                return Err(PasswordError::InstanceNotConfigured(owner.to_string()));
            }
        }
        let keep_alive = ReleasePolicy::KeepAlive(self.keep_alive);
        let policies = if destroy_on_use {
            PolicySet::new([ReleasePolicy::after_use(1), keep_alive])
        } else {
            PolicySet::new([keep_alive])
        };
        let id = self.register.register_object(Password::new(), owner, policies);
        debug!(handle = %id, destroy_on_use, "password created");
        Ok(id)
    }

    /// Releases the password.  Unknown handles are ignored.
    pub fn release(&self, id: &str) {
        self.register.remove_object::<Password>(id);
    }

    /// Resolves the password and counts it as used.
    pub fn use_password(&self, id: &str) -> Result<Arc<Password>, PasswordError> {
        self.register
            .use_object::<Password>(id)
            .ok_or(PasswordError::InvalidObject)
    }

    /// Resolves the password without counting a use.
    pub fn touch_password(&self, id: &str) -> Result<Arc<Password>, PasswordError> {
        self.register
            .touch_object::<Password>(id)
            .ok_or(PasswordError::InvalidObject)
    }

    pub fn len(&self, id: &str) -> Result<usize, PasswordError> {
        Ok(self.touch_password(id)?.len())
    }

    pub fn clear(&self, id: &str) -> Result<(), PasswordError> {
        self.touch_password(id)?.clear();
        Ok(())
    }

    pub fn is_equal(&self, id1: &str, id2: &str) -> Result<bool, PasswordError> {
        let p1 = self.touch_password(id1)?;
        let p2 = self.touch_password(id2)?;
        Ok(p1.is_equal(&p2))
    }

    pub fn add_character(&self, id: &str, ch: char) -> Result<usize, PasswordError> {
        Ok(self.touch_password(id)?.add_character(ch))
    }

    pub fn insert_character(&self, id: &str, ch: char, position: usize) -> Result<usize, PasswordError> {
        self.touch_password(id)?.insert_character(ch, position)
    }

    pub fn remove_character(&self, id: &str, position: usize) -> Result<usize, PasswordError> {
        self.touch_password(id)?.remove_character(position)
    }

    pub fn remove_last_character(&self, id: &str) -> Result<usize, PasswordError> {
        Ok(self.touch_password(id)?.remove_last_character())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::object::Managed;
    use crate::RegisterBuilder;

    fn store() -> (PasswordStore, Register, ManualClock) {
        let clock = ManualClock::new();
        let register = RegisterBuilder::new().clock(clock.clone()).build();
        (PasswordStore::new(register.clone()), register, clock)
    }

    #[test]
    fn editing_operations() {
        let p = Password::new();
        assert_eq!(p.add_character('a'), 1);
        assert_eq!(p.add_character('c'), 2);
        assert_eq!(p.insert_character('b', 1), Ok(3));
        assert_eq!(
            p.insert_character('x', 4),
            Err(PasswordError::OutOfRange { position: 4, len: 3 })
        );
        assert!(p.is_equal(&Password::from_text("abc")));
        assert_eq!(p.remove_character(0), Ok(2));
        assert_eq!(p.remove_character(2), Err(PasswordError::OutOfRange { position: 2, len: 2 }));
        assert_eq!(p.remove_last_character(), 1);
        assert!(p.is_equal(&Password::from_text("b")));
        p.clear();
        assert!(p.is_empty());
        assert_eq!(p.remove_last_character(), 0);
    }

    #[test]
    fn growth_keeps_contents_in_order() {
        let p = Password::new();
        let expected: String = (0..100u32).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for ch in expected.chars().skip(1) {
            p.add_character(ch);
        }
        assert_eq!(p.insert_character('a', 0), Ok(100));
        assert!(p.is_equal(&Password::from_text(&expected)));
    }

    #[test]
    fn complexity_hook_sees_utf8_bytes() {
        let p = Password::from_text("1é");
        let len = p.validate_complexity(|bytes| {
            assert_eq!(bytes, "1é".as_bytes());
            bytes.len()
        });
        assert_eq!(len, 3);
    }

    #[test]
    fn password_compares_equal_to_itself() {
        let p = Password::from_text("1234");
        assert!(p.is_equal(&p));
    }

    #[test]
    fn dispose_wipes_contents() {
        let p = Password::from_text("secret");
        p.dispose();
        assert!(p.is_empty());
    }

    #[test]
    fn editing_through_store_touches_but_does_not_use() {
        let (store, _register, _clock) = store();
        let id = store.create(true, None).unwrap();
        for ch in "1234".chars() {
            store.add_character(&id, ch).unwrap();
        }
        assert_eq!(store.insert_character(&id, '0', 0), Ok(5));
        assert_eq!(store.remove_character(&id, 4), Ok(4));
        assert_eq!(store.len(&id), Ok(4));

        let p = store.use_password(&id).unwrap();
        assert!(p.is_equal(&Password::from_text("0123")));
        assert_eq!(store.len(&id), Err(PasswordError::InvalidObject));
    }

    #[test]
    fn reusable_password_survives_uses() {
        let (store, _register, _clock) = store();
        let id = store.create(false, None).unwrap();
        for _ in 0..3 {
            assert!(store.use_password(&id).is_ok());
        }
    }

    #[test]
    fn password_expires_after_keep_alive() {
        let (store, _register, clock) = store();
        let id = store.create(false, None).unwrap();
        clock.advance(PASSWORD_KEEP_ALIVE - Duration::from_millis(1));
        assert!(store.touch_password(&id).is_ok());
        clock.advance(PASSWORD_KEEP_ALIVE - Duration::from_millis(1));
        assert!(store.touch_password(&id).is_ok(), "touch refreshed the window");
        clock.advance(PASSWORD_KEEP_ALIVE);
        assert_eq!(store.touch_password(&id).err(), Some(PasswordError::InvalidObject));
    }

    #[test]
    fn owner_must_be_registered() {
        let (store, register, _clock) = store();
        assert_eq!(
            store.create(false, Some("instance")).err(),
            Some(PasswordError::InstanceNotConfigured("instance".to_string()))
        );
        assert!(register.register_with_id(Managed::new(()), "instance", Some("instance"), PolicySet::Manual));
        let id = store.create(false, Some("instance")).unwrap();
        assert!(store.touch_password(&id).is_ok());

        register.remove_all_objects_with_tag(Some("instance"));
        assert_eq!(store.touch_password(&id).err(), Some(PasswordError::InvalidObject));
    }

    #[test]
    fn released_password_no_longer_resolves() {
        let (store, register, _clock) = store();
        let id = store.create(false, None).unwrap();
        store.add_character(&id, 'x').unwrap();
        let held = store.touch_password(&id).unwrap();
        store.release(&id);
        assert_eq!(store.len(&id), Err(PasswordError::InvalidObject));
        assert_eq!(held.len(), 1, "payload intact during grace delay");
        assert_eq!(register.len(), 1);
    }

    #[test]
    fn compare_two_stored_passwords() {
        let (store, _register, _clock) = store();
        let a = store.create(false, None).unwrap();
        let b = store.create(false, None).unwrap();
        store.add_character(&a, '7').unwrap();
        store.add_character(&b, '7').unwrap();
        assert_eq!(store.is_equal(&a, &b), Ok(true));
        store.clear(&b).unwrap();
        assert_eq!(store.is_equal(&a, &b), Ok(false));
    }

    #[test]
    fn autorelease_override_is_capped() {
        let (store, _register, _clock) = store();
        let longer = store.clone().with_autorelease_ms(10 * 60 * 1_000);
        assert_eq!(longer.keep_alive(), PASSWORD_KEEP_ALIVE);
        if cfg!(debug_assertions) {
            let shorter = store.with_autorelease_ms(200);
            assert_eq!(shorter.keep_alive(), Duration::from_millis(200));
        }
    }
}
