//! Exclusive access to the shared capture timer.
//!
//! The capture timer and the reference prescaler are global resources used by
//! other clock consumers once startup completes. Calibration borrows them
//! through a [`TimerLease`], which snapshots their configuration on acquire and
//! writes the snapshot back on release (or on drop, for early exits).

use core::fmt;

/// Counter value read from the free-running 16-bit timer.
pub type Ticks = u16;

/// Prescaler applied to the reference clock before it reaches the capture input.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ReferenceDivider {
    #[default]
    Div1,
    Div2,
    Div4,
    Div8,
}

impl ReferenceDivider {
    /// Returns the integer divisor.
    pub const fn divisor(self) -> u32 {
        match self {
            ReferenceDivider::Div1 => 1,
            ReferenceDivider::Div2 => 2,
            ReferenceDivider::Div4 => 4,
            ReferenceDivider::Div8 => 8,
        }
    }

    /// Returns the two-bit field encoding shared by common prescaler registers.
    pub const fn bits(self) -> u8 {
        match self {
            ReferenceDivider::Div1 => 0b00,
            ReferenceDivider::Div2 => 0b01,
            ReferenceDivider::Div4 => 0b10,
            ReferenceDivider::Div8 => 0b11,
        }
    }

    /// Decodes a two-bit prescaler field; higher bits are ignored.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => ReferenceDivider::Div1,
            0b01 => ReferenceDivider::Div2,
            0b10 => ReferenceDivider::Div4,
            _ => ReferenceDivider::Div8,
        }
    }
}

impl fmt::Display for ReferenceDivider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.divisor())
    }
}

/// Counting mode of the timer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CountMode {
    #[default]
    Stopped,
    /// Counts up to the counter width and rolls over.
    Continuous,
}

/// Capture channel setup.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CaptureSetup {
    #[default]
    Disabled,
    /// Capture the counter on each rising edge of the reference input.
    ReferenceRisingEdge,
}

/// Snapshot of everything calibration touches on the timer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TimerConfig {
    pub mode: CountMode,
    pub capture: CaptureSetup,
    pub divider: ReferenceDivider,
}

impl TimerConfig {
    /// Configuration used while calibrating.
    pub const fn calibration(divider: ReferenceDivider) -> Self {
        Self {
            mode: CountMode::Continuous,
            capture: CaptureSetup::ReferenceRisingEdge,
            divider,
        }
    }

    /// Configuration of an idle timer with the given divider.
    pub const fn stopped(divider: ReferenceDivider) -> Self {
        Self {
            mode: CountMode::Stopped,
            capture: CaptureSetup::Disabled,
            divider,
        }
    }
}

/// Hardware capture timer driven by the main oscillator.
pub trait CaptureTimer {
    /// Reads the current configuration.
    fn config(&self) -> TimerConfig;

    /// Writes a configuration. Moving into [`CountMode::Continuous`] must also
    /// clear the counter and any stale capture flag.
    fn configure(&mut self, config: TimerConfig);

    /// Returns `true` once a reference edge has been captured.
    fn capture_pending(&self) -> bool;

    /// Clears the capture flag and returns the captured counter value.
    fn take_capture(&mut self) -> Ticks;
}

impl<T> CaptureTimer for &mut T
where
    T: CaptureTimer + ?Sized,
{
    fn config(&self) -> TimerConfig {
        (**self).config()
    }

    fn configure(&mut self, config: TimerConfig) {
        (**self).configure(config);
    }

    fn capture_pending(&self) -> bool {
        (**self).capture_pending()
    }

    fn take_capture(&mut self) -> Ticks {
        (**self).take_capture()
    }
}

/// Exclusive hold on a [`CaptureTimer`] configured for calibration.
///
/// The lease restores the configuration captured at [`acquire`] when it is
/// released or dropped.
///
/// [`acquire`]: TimerLease::acquire
pub struct TimerLease<'t, T>
where
    T: CaptureTimer + ?Sized,
{
    timer: &'t mut T,
    saved: TimerConfig,
    released: bool,
}

impl<'t, T> TimerLease<'t, T>
where
    T: CaptureTimer + ?Sized,
{
    /// Snapshots the timer and reconfigures it for reference capture.
    pub fn acquire(timer: &'t mut T, divider: ReferenceDivider) -> Self {
        let saved = timer.config();
        timer.configure(TimerConfig::calibration(divider));
        Self {
            timer,
            saved,
            released: false,
        }
    }

    /// Configuration that will be restored on release.
    pub const fn saved_config(&self) -> TimerConfig {
        self.saved
    }

    /// Returns `true` once the lease has given the timer back.
    pub const fn is_released(&self) -> bool {
        self.released
    }

    pub fn capture_pending(&self) -> bool {
        self.timer.capture_pending()
    }

    pub fn take_capture(&mut self) -> Ticks {
        self.timer.take_capture()
    }

    /// Stops the timer and restores the saved configuration.
    pub fn release(mut self) -> TimerConfig {
        self.restore();
        self.saved
    }

    fn restore(&mut self) {
        if self.released {
            return;
        }

        let divider = self.timer.config().divider;
        self.timer.configure(TimerConfig::stopped(divider));
        self.timer.configure(self.saved);
        self.released = true;
    }
}

impl<T> Drop for TimerLease<'_, T>
where
    T: CaptureTimer + ?Sized,
{
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTimer {
        config: TimerConfig,
        configure_calls: u8,
    }

    impl FakeTimer {
        fn new(config: TimerConfig) -> Self {
            Self {
                config,
                configure_calls: 0,
            }
        }
    }

    impl CaptureTimer for FakeTimer {
        fn config(&self) -> TimerConfig {
            self.config
        }

        fn configure(&mut self, config: TimerConfig) {
            self.config = config;
            self.configure_calls += 1;
        }

        fn capture_pending(&self) -> bool {
            false
        }

        fn take_capture(&mut self) -> Ticks {
            0
        }
    }

    #[test]
    fn divider_bits_round_trip() {
        for divider in [
            ReferenceDivider::Div1,
            ReferenceDivider::Div2,
            ReferenceDivider::Div4,
            ReferenceDivider::Div8,
        ] {
            assert_eq!(ReferenceDivider::from_bits(divider.bits()), divider);
        }
        assert_eq!(ReferenceDivider::Div8.divisor(), 8);
    }

    #[test]
    fn acquire_applies_calibration_config() {
        let mut timer = FakeTimer::new(TimerConfig::stopped(ReferenceDivider::Div1));
        let lease = TimerLease::acquire(&mut timer, ReferenceDivider::Div8);
        assert_eq!(
            lease.saved_config(),
            TimerConfig::stopped(ReferenceDivider::Div1)
        );
        let restored = lease.release();
        assert_eq!(restored, TimerConfig::stopped(ReferenceDivider::Div1));
        assert_eq!(timer.config, restored);
    }

    #[test]
    fn drop_restores_foreign_configuration() {
        let before = TimerConfig {
            mode: CountMode::Continuous,
            capture: CaptureSetup::Disabled,
            divider: ReferenceDivider::Div2,
        };
        let mut timer = FakeTimer::new(before);
        {
            let lease = TimerLease::acquire(&mut timer, ReferenceDivider::Div8);
            assert!(!lease.is_released());
        }
        assert_eq!(timer.config, before);
    }

    #[test]
    fn release_restores_only_once() {
        let mut timer = FakeTimer::new(TimerConfig::default());
        let lease = TimerLease::acquire(&mut timer, ReferenceDivider::Div8);
        let _ = lease.release();
        // acquire + stop + restore
        assert_eq!(timer.configure_calls, 3);
    }
}
