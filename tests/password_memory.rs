//! Freed password buffers must not keep secret characters around.
//!
//! Runs in its own test binary because it installs a global allocator that
//! inspects every block on release.

use objreg::Password;
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const MARKER: char = '\u{1F511}';

static SCANNING: AtomicBool = AtomicBool::new(false);
static DIRTY_FREES: AtomicUsize = AtomicUsize::new(0);

struct ScanOnFree;

unsafe impl GlobalAlloc for ScanOnFree {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if SCANNING.load(Ordering::SeqCst) && holds_marker(ptr, layout.size()) {
            DIRTY_FREES.fetch_add(1, Ordering::SeqCst);
        }
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOC: ScanOnFree = ScanOnFree;

/// Looks for the marker as a `char` (UTF-32) and as UTF-8.
unsafe fn holds_marker(ptr: *const u8, size: usize) -> bool {
    let utf32 = (MARKER as u32).to_ne_bytes();
    let mut utf8 = [0u8; 4];
    MARKER.encode_utf8(&mut utf8);
    for i in 0..size.saturating_sub(3) {
        let mut window = [0u8; 4];
        for (j, slot) in window.iter_mut().enumerate() {
            *slot = ptr.add(i + j).read_volatile();
        }
        if window == utf32 || window == utf8 {
            return true;
        }
    }
    false
}

#[test]
fn freed_buffers_hold_no_password_characters() {
    let password = Password::new();
    SCANNING.store(true, Ordering::SeqCst);

    for _ in 0..64 {
        password.add_character(MARKER);
    }
    for i in 0..64 {
        password.insert_character(MARKER, i).unwrap();
    }
    assert_eq!(password.len(), 128);
    let encoded_len = password.validate_complexity(|bytes| bytes.len());
    assert_eq!(encoded_len, 128 * 4);
    let copy = Password::new();
    copy.add_character(MARKER);
    assert!(!password.is_equal(&copy));
    drop(copy);
    drop(password);

    SCANNING.store(false, Ordering::SeqCst);
    assert_eq!(
        DIRTY_FREES.load(Ordering::SeqCst),
        0,
        "released buffers still held password characters"
    );
}
