//! Business identifier generation.
//!
//! Identifiers are assigned client-side so new records can be displayed
//! before the backend confirms them. The scheme is prefix + random
//! alphanumeric fragment + base36 millisecond timestamp, e.g. `P-X4K9-lzq81v`.
//! There is no backend round-trip and no uniqueness guarantee beyond
//! collisions being astronomically unlikely.

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

/// Length of the random fragment between prefix and timestamp.
const RANDOM_FRAGMENT_LEN: usize = 4;

/// Generate a business identifier for the given entity prefix ("P-", "AFV-").
pub fn generate_id(prefix: &str) -> String {
    let fragment: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_FRAGMENT_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    let millis = Utc::now().timestamp_millis();
    format!("{}{}-{}", prefix, fragment, to_base36(millis))
}

fn to_base36(mut value: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
