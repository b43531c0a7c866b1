//! Frequency error classification.

use core::fmt;

use crate::oscillator::AdjustDirection;
use crate::timer::Ticks;

/// Verdict for one observed delta.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrequencyError {
    /// Observed delta equals the target bit for bit.
    Exact,
    /// More ticks than the target per reference period; the oscillator must slow down.
    TooFast,
    /// Fewer ticks than the target per reference period; the oscillator must speed up.
    TooSlow,
}

impl FrequencyError {
    /// Adjustment that moves the oscillator towards the target, if any.
    pub const fn correction(self) -> Option<AdjustDirection> {
        match self {
            FrequencyError::Exact => None,
            FrequencyError::TooFast => Some(AdjustDirection::Slower),
            FrequencyError::TooSlow => Some(AdjustDirection::Faster),
        }
    }

    pub const fn is_exact(self) -> bool {
        matches!(self, FrequencyError::Exact)
    }
}

impl fmt::Display for FrequencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyError::Exact => f.write_str("exact"),
            FrequencyError::TooFast => f.write_str("too-fast"),
            FrequencyError::TooSlow => f.write_str("too-slow"),
        }
    }
}

/// Classifies `delta` against `target`. There is no tolerance band.
#[must_use]
pub const fn classify(delta: Ticks, target: Ticks) -> FrequencyError {
    if delta == target {
        FrequencyError::Exact
    } else if delta > target {
        FrequencyError::TooFast
    } else {
        FrequencyError::TooSlow
    }
}

/// Signed distance from the target in ticks; positive means too fast.
#[must_use]
pub const fn tick_error(delta: Ticks, target: Ticks) -> i32 {
    delta as i32 - target as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_requires_equality() {
        assert_eq!(classify(4096, 4096), FrequencyError::Exact);
        assert_eq!(classify(4097, 4096), FrequencyError::TooFast);
        assert_eq!(classify(4095, 4096), FrequencyError::TooSlow);
    }

    #[test]
    fn verdict_maps_to_correction() {
        assert_eq!(
            FrequencyError::TooFast.correction(),
            Some(AdjustDirection::Slower)
        );
        assert_eq!(
            FrequencyError::TooSlow.correction(),
            Some(AdjustDirection::Faster)
        );
        assert_eq!(FrequencyError::Exact.correction(), None);
    }

    #[test]
    fn tick_error_is_signed() {
        assert_eq!(tick_error(4200, 4096), 104);
        assert_eq!(tick_error(3906, 4096), -190);
    }
}
