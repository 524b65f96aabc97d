//! Clock abstraction for devices without a trustworthy wall clock
//!
//! A freshly booted sensor has no idea what time it is until NTP has run, so
//! the lifecycle manager never reads `SystemTime` directly. It asks a
//! [`TimeSource`], which also reports whether its answer can be trusted.
//!
//! # Strategies
//!
//! - [`SystemTimeSource`]: the host/system clock. Considered reliable only
//!   once it reads later than the build timestamp of this library.
//! - [`ManualTimeSource`]: a settable clock for tests and for embedding
//!   applications that get time from an RTC or GPS.
//!
//! The build timestamp is a hard lower bound: the code cannot be running
//! before it was compiled, so an earlier reading means the clock has not
//! been synchronised.

use crate::error::CPError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds in one day, used for expiry windows.
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Build timestamp set at compile time.
///
/// On platforms without `build.rs` support, falls back to a fixed default.
pub const BUILD_TIMESTAMP: u64 = {
    match option_env!("CERTPROV_BUILD_TIMESTAMP") {
        Some(s) => {
            let bytes = s.as_bytes();
            let mut result: u64 = 0;
            let mut i = 0;
            while i < bytes.len() {
                let digit = bytes[i] as u64 - b'0' as u64;
                result = result * 10 + digit;
                i += 1;
            }
            result
        }
        // 2025-01-01 00:00:00 UTC
        None => 1735689600,
    }
};

/// Time source abstraction for pluggable clocks
///
/// # Implementors
///
/// - [`SystemTimeSource`]: `std::time::SystemTime`
/// - [`ManualTimeSource`]: settable, shared between a test and the code under test
pub trait TimeSource: Send + Sync {
    /// Get the current time from this source.
    fn now(&self) -> Result<SystemTime, CPError>;

    /// Check if this time source is considered reliable.
    ///
    /// Expiry decisions are only made against a reliable clock.
    fn is_reliable(&self) -> bool {
        self.now_unix()
            .map(|now| now >= BUILD_TIMESTAMP)
            .unwrap_or(false)
    }

    /// Get current time as Unix timestamp (seconds since epoch).
    fn now_unix(&self) -> Result<u64, CPError> {
        let time = self.now()?;
        Ok(time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs())
    }

    /// Get current time in milliseconds since epoch.
    ///
    /// Used for short intervals (session heartbeats, restart delay) where
    /// only differences matter.
    fn now_millis(&self) -> Result<u64, CPError> {
        let time = self.now()?;
        let millis = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).map_err(|_| CPError::TimeError("Clock out of range".to_string()))
    }
}

/// System time source using `std::time::SystemTime`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Result<SystemTime, CPError> {
        Ok(SystemTime::now())
    }
}

/// Settable time source
///
/// Holds milliseconds since the epoch in an atomic so a test can keep a
/// shared handle (`Arc<ManualTimeSource>`) and move time forward while the
/// manager or session under test reads it.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    millis: AtomicU64,
}

impl ManualTimeSource {
    /// Create from a Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_secs(secs: u64) -> Self {
        Self {
            millis: AtomicU64::new(secs.saturating_mul(1000)),
        }
    }

    /// Set the clock to an absolute Unix timestamp.
    pub fn set_unix_secs(&self, secs: u64) {
        self.millis.store(secs.saturating_mul(1000), Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Result<SystemTime, CPError> {
        let millis = self.millis.load(Ordering::SeqCst);
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

/// Whole days from `now` until `expires_at`, zero if already past.
pub fn days_until(now: u64, expires_at: u64) -> u64 {
    expires_at.saturating_sub(now) / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_timestamp_is_reasonable() {
        assert!(BUILD_TIMESTAMP >= 1704067200);
        assert!(BUILD_TIMESTAMP < 4102444800);
    }

    #[test]
    fn test_system_time_source() {
        let source = SystemTimeSource;
        assert!(source.now_unix().unwrap() >= BUILD_TIMESTAMP);
        assert!(source.is_reliable());
    }

    #[test]
    fn test_manual_time_source() {
        let source = ManualTimeSource::from_unix_secs(1_900_000_000);
        assert_eq!(source.now_unix().unwrap(), 1_900_000_000);
        assert!(source.is_reliable());

        source.advance(Duration::from_millis(1500));
        assert_eq!(source.now_millis().unwrap(), 1_900_000_001_500);
        assert_eq!(source.now_unix().unwrap(), 1_900_000_001);

        source.set_unix_secs(1_900_000_100);
        assert_eq!(source.now_unix().unwrap(), 1_900_000_100);
    }

    #[test]
    fn test_unsynchronised_clock_is_unreliable() {
        // Uptime-style reading: 42 seconds after the epoch
        let source = ManualTimeSource::from_unix_secs(42);
        assert!(!source.is_reliable());
    }

    #[test]
    fn test_days_until() {
        assert_eq!(days_until(0, 15 * SECONDS_PER_DAY + 10), 15);
        assert_eq!(days_until(100, 50), 0);
    }
}
