//! Adjustable oscillator model shared by firmware and host targets.
//!
//! The oscillator exposes two bounded trim fields: a high-resolution fine tap
//! and a coarse range select. Hardware adapters pack them into whatever control
//! word the silicon uses; everything in this module works on the two fields in
//! isolation so the stepping policy can be exercised without a register map.

use core::fmt;

/// Live trim fields of the oscillator under calibration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct OscillatorState {
    pub fine_tap: u8,
    pub range_select: u8,
}

impl OscillatorState {
    /// Creates a state from raw field values.
    pub const fn new(fine_tap: u8, range_select: u8) -> Self {
        Self {
            fine_tap,
            range_select,
        }
    }
}

impl fmt::Display for OscillatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "range=0x{} fine=0x{}",
            HexByte(self.range_select),
            HexByte(self.fine_tap)
        )
    }
}

/// Upper bounds of the two trim fields for a concrete oscillator.
///
/// Both fields start at zero. `fine_max` is the value the fine tap wraps to
/// when decremented past zero, `range_max` is the coarse ceiling.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrimGeometry {
    pub fine_max: u8,
    pub range_max: u8,
}

impl TrimGeometry {
    /// MSP430 basic clock layout: 8-bit DCO/MOD tap and 4-bit RSEL.
    pub const MSP430_DCO: Self = Self::new(0xFF, 0x0F);

    pub const fn new(fine_max: u8, range_max: u8) -> Self {
        Self {
            fine_max,
            range_max,
        }
    }

    /// Returns `true` when both fields of `state` are within bounds.
    pub const fn contains(self, state: OscillatorState) -> bool {
        state.fine_tap <= self.fine_max && state.range_select <= self.range_max
    }

    /// Clamps each field of `state` to the geometry.
    #[must_use]
    pub fn clamp(self, state: OscillatorState) -> OscillatorState {
        OscillatorState::new(
            state.fine_tap.min(self.fine_max),
            state.range_select.min(self.range_max),
        )
    }

    /// Number of distinct fine positions per coarse range.
    pub const fn fine_positions(self) -> u32 {
        self.fine_max as u32 + 1
    }

    /// Total number of trim positions across every range.
    pub const fn total_positions(self) -> u32 {
        self.fine_positions() * (self.range_max as u32 + 1)
    }

    /// Applies a single adjustment step and reports what happened.
    #[must_use]
    pub fn step(self, state: OscillatorState, direction: AdjustDirection) -> Adjustment {
        let OscillatorState {
            fine_tap,
            range_select,
        } = state;

        match direction {
            AdjustDirection::Slower => {
                if fine_tap > 0 {
                    return Adjustment::new(
                        OscillatorState::new(fine_tap - 1, range_select),
                        StepKind::Fine,
                    );
                }

                if range_select > 0 {
                    Adjustment::new(
                        OscillatorState::new(self.fine_max, range_select - 1),
                        StepKind::RangeHandoff,
                    )
                } else {
                    Adjustment::new(
                        OscillatorState::new(self.fine_max, range_select),
                        StepKind::Saturated,
                    )
                }
            }
            AdjustDirection::Faster => {
                if fine_tap < self.fine_max {
                    return Adjustment::new(
                        OscillatorState::new(fine_tap + 1, range_select),
                        StepKind::Fine,
                    );
                }

                if range_select < self.range_max {
                    Adjustment::new(
                        OscillatorState::new(0, range_select + 1),
                        StepKind::RangeHandoff,
                    )
                } else {
                    Adjustment::new(OscillatorState::new(0, range_select), StepKind::Saturated)
                }
            }
        }
    }

    /// Steps the oscillator one unit towards a lower frequency.
    #[must_use]
    pub fn slow_down(self, state: OscillatorState) -> OscillatorState {
        self.step(state, AdjustDirection::Slower).state
    }

    /// Steps the oscillator one unit towards a higher frequency.
    #[must_use]
    pub fn speed_up(self, state: OscillatorState) -> OscillatorState {
        self.step(state, AdjustDirection::Faster).state
    }
}

impl Default for TrimGeometry {
    fn default() -> Self {
        Self::MSP430_DCO
    }
}

/// Steps `state` one unit slower within `geometry`.
#[must_use]
pub fn slow_down(state: OscillatorState, geometry: TrimGeometry) -> OscillatorState {
    geometry.slow_down(state)
}

/// Steps `state` one unit faster within `geometry`.
#[must_use]
pub fn speed_up(state: OscillatorState, geometry: TrimGeometry) -> OscillatorState {
    geometry.speed_up(state)
}

/// Direction of a single adjustment.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AdjustDirection {
    Slower,
    Faster,
}

impl fmt::Display for AdjustDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustDirection::Slower => f.write_str("slower"),
            AdjustDirection::Faster => f.write_str("faster"),
        }
    }
}

/// How a single adjustment step moved the trim fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepKind {
    /// Only the fine tap moved.
    Fine,
    /// The fine tap wrapped and the range select moved one step.
    RangeHandoff,
    /// The fine tap wrapped while the range select was pinned at an extreme.
    Saturated,
}

/// Result of [`TrimGeometry::step`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Adjustment {
    pub state: OscillatorState,
    pub kind: StepKind,
}

impl Adjustment {
    pub const fn new(state: OscillatorState, kind: StepKind) -> Self {
        Self { state, kind }
    }

    /// Returns `true` when the coarse field could not follow the fine wrap.
    pub const fn is_saturated(self) -> bool {
        matches!(self.kind, StepKind::Saturated)
    }
}

/// Access to the live oscillator control fields.
///
/// Implementations write straight through to hardware (or a model of it).
/// During a calibration run the controller is the only caller of [`apply`].
///
/// [`apply`]: Oscillator::apply
pub trait Oscillator {
    /// Bounds of the trim fields.
    fn geometry(&self) -> TrimGeometry;

    /// Reads the current trim fields.
    fn state(&self) -> OscillatorState;

    /// Writes new trim fields.
    fn apply(&mut self, state: OscillatorState);
}

impl<O> Oscillator for &mut O
where
    O: Oscillator + ?Sized,
{
    fn geometry(&self) -> TrimGeometry {
        (**self).geometry()
    }

    fn state(&self) -> OscillatorState {
        (**self).state()
    }

    fn apply(&mut self, state: OscillatorState) {
        (**self).apply(state);
    }
}

/// Formats a byte as two uppercase hex digits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HexByte(pub u8);

impl HexByte {
    const DIGITS: &'static [u8; 16] = b"0123456789ABCDEF";

    /// Returns the two ASCII digits, most significant first.
    pub const fn digits(self) -> [u8; 2] {
        [
            Self::DIGITS[(self.0 >> 4) as usize],
            Self::DIGITS[(self.0 & 0x0F) as usize],
        ]
    }
}

impl fmt::Display for HexByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [high, low] = self.digits();
        write!(f, "{}{}", high as char, low as char)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DCO: TrimGeometry = TrimGeometry::MSP430_DCO;

    #[test]
    fn slow_down_moves_fine_tap_only() {
        let next = DCO.slow_down(OscillatorState::new(0x7E, 0x0F));
        assert_eq!(next, OscillatorState::new(0x7D, 0x0F));
    }

    #[test]
    fn slow_down_hands_off_to_lower_range() {
        let adjustment = DCO.step(OscillatorState::new(0, 7), AdjustDirection::Slower);
        assert_eq!(adjustment.kind, StepKind::RangeHandoff);
        assert_eq!(adjustment.state, OscillatorState::new(0xFF, 6));
    }

    #[test]
    fn speed_up_hands_off_to_higher_range() {
        let adjustment = DCO.step(OscillatorState::new(0xFF, 7), AdjustDirection::Faster);
        assert_eq!(adjustment.kind, StepKind::RangeHandoff);
        assert_eq!(adjustment.state, OscillatorState::new(0, 8));
    }

    #[test]
    fn range_floor_saturates() {
        let adjustment = DCO.step(OscillatorState::new(0, 0), AdjustDirection::Slower);
        assert!(adjustment.is_saturated());
        assert_eq!(adjustment.state, OscillatorState::new(0xFF, 0));
    }

    #[test]
    fn range_ceiling_saturates() {
        let adjustment = DCO.step(OscillatorState::new(0xFF, 0x0F), AdjustDirection::Faster);
        assert!(adjustment.is_saturated());
        assert_eq!(adjustment.state, OscillatorState::new(0, 0x0F));
    }

    #[test]
    fn narrow_geometry_wraps_at_its_own_bound() {
        let geometry = TrimGeometry::new(15, 7);
        assert_eq!(
            geometry.slow_down(OscillatorState::new(0, 3)),
            OscillatorState::new(15, 2)
        );
        assert_eq!(
            geometry.speed_up(OscillatorState::new(15, 3)),
            OscillatorState::new(0, 4)
        );
        assert_eq!(geometry.total_positions(), 128);
    }

    #[test]
    fn clamp_pins_out_of_range_fields() {
        let geometry = TrimGeometry::new(15, 7);
        assert_eq!(
            geometry.clamp(OscillatorState::new(0x7E, 0x0F)),
            OscillatorState::new(15, 7)
        );
        assert!(!geometry.contains(OscillatorState::new(16, 0)));
    }

    #[test]
    fn hex_byte_uses_uppercase_digits() {
        assert_eq!(HexByte(0x8F).digits(), *b"8F");
        assert_eq!(HexByte(0x0a).digits(), *b"0A");
    }
}
