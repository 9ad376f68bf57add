use crate::model::{DAY, HOUR, Ms};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MAX_APPOINTMENT_DURATION_MS: Ms = 24 * HOUR;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY;
