//! HSI16 trim layout on the STM32G0.
//!
//! `RCC_ICSCR.HSITRIM` is a single 7-bit field. The controller treats its upper
//! three bits as the range selector and the lower four as the fine tap, so a
//! fine-tap wrap carries into the next range exactly like incrementing the
//! whole field.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use dco_core::oscillator::{OscillatorState, TrimGeometry};

/// Low bits of `HSITRIM` forming the fine tap.
const FINE_BITS: u8 = 4;
const FINE_MASK: u8 = (1 << FINE_BITS) - 1;

/// Width of `HSITRIM`.
pub const HSITRIM_BITS: u8 = 7;
pub const HSITRIM_MAX: u8 = (1 << HSITRIM_BITS) - 1;

/// Geometry exposed to the calibration controller.
pub const HSI_TRIM_GEOMETRY: TrimGeometry =
    TrimGeometry::new(FINE_MASK, HSITRIM_MAX >> FINE_BITS);

/// Splits a raw `HSITRIM` value into controller trim fields.
pub const fn split(trim: u8) -> OscillatorState {
    let trim = trim & HSITRIM_MAX;
    OscillatorState::new(trim & FINE_MASK, trim >> FINE_BITS)
}

/// Packs controller trim fields back into a raw `HSITRIM` value.
pub const fn pack(state: OscillatorState) -> u8 {
    ((state.range_select << FINE_BITS) | (state.fine_tap & FINE_MASK)) & HSITRIM_MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use dco_core::oscillator::{slow_down, speed_up};

    /// Reset value of `HSITRIM`, the middle of the trim span.
    const HSITRIM_RESET: u8 = 0x40;

    #[test]
    fn reset_trim_sits_mid_span() {
        assert_eq!(split(HSITRIM_RESET), OscillatorState::new(0, 4));
        assert_eq!(HSI_TRIM_GEOMETRY.total_positions(), 128);
    }

    #[test]
    fn pack_inverts_split_for_every_trim() {
        for trim in 0..=HSITRIM_MAX {
            let state = split(trim);
            assert!(HSI_TRIM_GEOMETRY.contains(state));
            assert_eq!(pack(state), trim);
        }
    }

    #[test]
    fn controller_steps_match_raw_increments() {
        for trim in 0..HSITRIM_MAX {
            let faster = speed_up(split(trim), HSI_TRIM_GEOMETRY);
            assert_eq!(pack(faster), trim + 1);
        }
        for trim in 1..=HSITRIM_MAX {
            let slower = slow_down(split(trim), HSI_TRIM_GEOMETRY);
            assert_eq!(pack(slower), trim - 1);
        }
    }
}
