//! Runtime configuration consumed by the orchestrator.

use core::time::Duration;

/// Shortest accepted autoupdate interval in milliseconds.
pub const MIN_INTERVAL_MS: u32 = 2_000;
/// Longest accepted autoupdate interval in milliseconds.
pub const MAX_INTERVAL_MS: u32 = 600_000;
/// Interval used when nothing else is configured.
pub const DEFAULT_INTERVAL_MS: u32 = MIN_INTERVAL_MS;
/// GPIO identifier reported when the front-end does not override it.
pub const DEFAULT_GPIO: u32 = 6;

/// Clamps a requested interval into the supported range.
#[must_use]
pub const fn clamp_interval_ms(requested: u32) -> u32 {
    if requested < MIN_INTERVAL_MS {
        MIN_INTERVAL_MS
    } else if requested > MAX_INTERVAL_MS {
        MAX_INTERVAL_MS
    } else {
        requested
    }
}

/// Interval and autoupdate settings.
///
/// The interval is clamped on every write so readers never observe an
/// out-of-range value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimingConfig {
    interval_ms: u32,
    autoupdate: bool,
}

impl TimingConfig {
    #[must_use]
    pub const fn new(interval_ms: u32, autoupdate: bool) -> Self {
        Self {
            interval_ms: clamp_interval_ms(interval_ms),
            autoupdate,
        }
    }

    pub const fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms as u64)
    }

    pub const fn autoupdate(&self) -> bool {
        self.autoupdate
    }

    /// Stores a new interval and returns the value actually applied.
    pub fn set_interval_ms(&mut self, requested: u32) -> u32 {
        self.interval_ms = clamp_interval_ms(requested);
        self.interval_ms
    }

    pub fn set_autoupdate(&mut self, enabled: bool) {
        self.autoupdate = enabled;
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_MS, false)
    }
}

/// Static identity of the attached sensor plus its timing settings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorConfig {
    pub gpio: u32,
    pub timing: TimingConfig,
}

impl SensorConfig {
    #[must_use]
    pub const fn new(gpio: u32, timing: TimingConfig) -> Self {
        Self { gpio, timing }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_GPIO, TimingConfig::default())
    }
}
