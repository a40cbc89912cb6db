use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the epoch as a float, the timestamp unit used everywhere.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn now() -> f64 {
    epoch_seconds(SystemTime::now())
}
