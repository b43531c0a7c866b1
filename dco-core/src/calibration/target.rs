//! Conversion between oscillator frequencies and capture deltas.

use core::fmt;

use crate::timer::{ReferenceDivider, Ticks};

/// Nominal frequency of the external watch crystal.
pub const REFERENCE_CRYSTAL_HZ: u32 = 32_768;

/// Reasons a target cannot be measured by the capture timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TargetError {
    /// Target delta of zero ticks.
    Zero,
    /// Reference frequency of zero.
    NoReference,
    /// Target delta does not fit the 16-bit counter.
    ExceedsCounter { delta: u64 },
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Zero => f.write_str("target delta is zero"),
            TargetError::NoReference => f.write_str("reference frequency is zero"),
            TargetError::ExceedsCounter { delta } => {
                write!(f, "target delta {delta} exceeds the 16-bit counter")
            }
        }
    }
}

/// Desired number of oscillator ticks per divided reference period.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CalibrationTarget {
    delta: Ticks,
}

impl CalibrationTarget {
    /// Uses `delta` directly as the target.
    pub const fn from_delta(delta: Ticks) -> Result<Self, TargetError> {
        if delta == 0 {
            Err(TargetError::Zero)
        } else {
            Ok(Self { delta })
        }
    }

    /// Derives the target delta for `target_hz` given the reference clock and
    /// the divider in front of the capture input.
    ///
    /// `from_frequency(16_000_000, REFERENCE_CRYSTAL_HZ, ReferenceDivider::Div8)`
    /// yields 3906 ticks.
    pub const fn from_frequency(
        target_hz: u32,
        reference_hz: u32,
        divider: ReferenceDivider,
    ) -> Result<Self, TargetError> {
        if reference_hz == 0 {
            return Err(TargetError::NoReference);
        }

        let delta = target_hz as u64 * divider.divisor() as u64 / reference_hz as u64;
        if delta > Ticks::MAX as u64 {
            return Err(TargetError::ExceedsCounter { delta });
        }

        #[allow(clippy::cast_possible_truncation)]
        let delta = delta as Ticks;
        Self::from_delta(delta)
    }

    pub const fn delta(self) -> Ticks {
        self.delta
    }

    /// Oscillator frequency corresponding to this target, rounded down to
    /// whole ticks per reference period.
    pub const fn frequency_hz(self, reference_hz: u32, divider: ReferenceDivider) -> u64 {
        self.delta as u64 * reference_hz as u64 / divider.divisor() as u64
    }
}

impl fmt::Display for CalibrationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.delta)
    }
}

/// Rate of capture edges after the divider.
pub const fn edge_rate_hz(reference_hz: u32, divider: ReferenceDivider) -> u32 {
    reference_hz / divider.divisor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_megahertz_from_watch_crystal() {
        let target =
            CalibrationTarget::from_frequency(16_000_000, REFERENCE_CRYSTAL_HZ, ReferenceDivider::Div8)
                .expect("target fits");
        assert_eq!(target.delta(), 3906);
        assert_eq!(
            target.frequency_hz(REFERENCE_CRYSTAL_HZ, ReferenceDivider::Div8),
            15_998_976
        );
    }

    #[test]
    fn undivided_reference_overflows_nothing_at_one_megahertz() {
        let target =
            CalibrationTarget::from_frequency(1_000_000, REFERENCE_CRYSTAL_HZ, ReferenceDivider::Div1)
                .expect("target fits");
        assert_eq!(target.delta(), 30);
    }

    #[test]
    fn rejects_delta_beyond_counter() {
        let result = CalibrationTarget::from_frequency(
            300_000_000,
            REFERENCE_CRYSTAL_HZ,
            ReferenceDivider::Div8,
        );
        assert!(matches!(result, Err(TargetError::ExceedsCounter { .. })));
    }

    #[test]
    fn rejects_zero_target_and_reference() {
        assert_eq!(CalibrationTarget::from_delta(0), Err(TargetError::Zero));
        assert_eq!(
            CalibrationTarget::from_frequency(1_000_000, 0, ReferenceDivider::Div8),
            Err(TargetError::NoReference)
        );
    }

    #[test]
    fn edge_rate_divides_reference() {
        assert_eq!(edge_rate_hz(REFERENCE_CRYSTAL_HZ, ReferenceDivider::Div8), 4096);
    }
}
