//! Identifier generation.
//!
//! Ids look like `job_1718000000000_k3j9xq`: a prefix, the creation time in
//! unix milliseconds and six random base36 characters. They are unique in
//! practice, sort roughly by creation time and are URL-safe.

use chrono::Utc;
use rand::RngExt;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Generate a new job id.
pub fn job_id() -> String {
    prefixed_id("job")
}

/// Generate a new track id.
pub fn track_id() -> String {
    prefixed_id("track")
}

fn prefixed_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), suffix)
}
