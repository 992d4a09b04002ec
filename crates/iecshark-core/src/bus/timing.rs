/// Ready phase length at or beyond which the talker signals EOI.
pub const EOI_THRESHOLD_US: u64 = 200;
/// Minimum length of the listener's EOI acknowledge pulse.
pub const EOI_ACK_MIN_US: u64 = 60;
/// All-high window that counts as an idle bus.
pub const IDLE_WINDOW_US: u64 = 1_000;

/// Sample-count to wall-time conversions for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleClock {
    sample_rate_hz: u32,
}

impl SampleClock {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self { sample_rate_hz }
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Elapsed time between two samples, in microseconds.
    ///
    /// # Examples
    /// ```
    /// use iecshark_core::SampleClock;
    ///
    /// let clock = SampleClock::new(4_000_000);
    /// assert_eq!(clock.micros_between(100, 900), 200.0);
    /// ```
    pub fn micros_between(&self, start: u64, end: u64) -> f64 {
        end.saturating_sub(start) as f64 * 1_000_000.0 / f64::from(self.sample_rate_hz)
    }

    /// Timestamp of a sample, in microseconds from the capture start.
    pub fn micros_at(&self, sample: u64) -> f64 {
        self.micros_between(0, sample)
    }

    /// Number of whole samples spanning at least `micros`.
    pub fn samples_for_micros(&self, micros: u64) -> u64 {
        (micros * u64::from(self.sample_rate_hz)).div_ceil(1_000_000)
    }

    /// Exact `end - start >= micros` test, free of float rounding.
    pub fn at_least_micros(&self, start: u64, end: u64, micros: u64) -> bool {
        let elapsed = u128::from(end.saturating_sub(start));
        elapsed * 1_000_000 >= u128::from(micros) * u128::from(self.sample_rate_hz)
    }
}
