//! Small shared helpers for string comparison and locking.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard};

/// Case-insensitive ordering without allocating.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.chars().map(|c| c.to_ascii_lowercase()))
}

/// Case-insensitive substring match. `needle` must already be lowercase.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Lock a mutex, recovering from poisoning instead of panicking.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
