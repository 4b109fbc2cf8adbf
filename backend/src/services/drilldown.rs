//! Surrogate keys linking aggregate rows to their query-history rows.
//!
//! Keys are stable across refreshes because they depend only on the grouping
//! values, never on row position or refresh time. Composite keys separate the
//! parts with a unit separator so ("ab", "c") and ("a", "bc") never collide.

use std::hash::Hasher;

use twox_hash::XxHash64;

const SEED: u64 = 0;
const SEP: u8 = 0x1f;

/// Key for a single grouping value (warehouse, database, role, ...).
pub fn surrogate_key(value: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(value.as_bytes());
    hasher.finish()
}

/// Key for a two-part grouping, e.g. (user, warehouse) or (database, table).
pub fn composite_key(a: &str, b: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(a.as_bytes());
    hasher.write(&[SEP]);
    hasher.write(b.as_bytes());
    hasher.finish()
}
