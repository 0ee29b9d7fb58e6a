use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::CredentialRecord;

/// Tokens this close to expiry are treated as already expired.
pub const EXPIRY_BUFFER_MS: u64 = 30_000;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Whether `record` can still be presented at `now` (ms).
///
/// Absent or zero `expiry_date` never counts as "never expires".
pub fn is_valid(record: &CredentialRecord, now: u64) -> bool {
    match record.expiry_date {
        Some(expiry) if expiry > 0 => now < expiry.saturating_sub(EXPIRY_BUFFER_MS),
        _ => false,
    }
}
