//! Serial console text shown once the system clock is settled.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::{self, Write};

use dco_core::oscillator::{HexByte, OscillatorState};
use heapless::String;

use crate::trim;

/// Capacity of a rendered settings banner.
pub const BANNER_CAPACITY: usize = 96;

/// Rendered banner text.
pub type Banner = String<BANNER_CAPACITY>;

/// Where the running trim value came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockSource {
    /// Startup calibration converged.
    Calibrated,
    /// Trim taken from a value stored at build time.
    Precalibrated,
    /// Calibration failed; the oscillator runs at whatever trim it was left on.
    Uncalibrated,
}

impl ClockSource {
    const fn headline(self) -> &'static str {
        match self {
            ClockSource::Calibrated => ">>Calibrated oscillator values are:",
            ClockSource::Precalibrated => ">>Stored oscillator values are:",
            ClockSource::Uncalibrated => ">>Calibration failed, oscillator values are:",
        }
    }
}

/// Renders the trim fields in effect as a CRLF-terminated banner.
///
/// # Errors
///
/// Returns [`fmt::Error`] if the text outgrows [`BANNER_CAPACITY`].
pub fn settings_banner(
    source: ClockSource,
    state: OscillatorState,
) -> Result<Banner, fmt::Error> {
    let mut banner = Banner::new();
    write!(
        banner,
        "\r\n{}\r\n   HSITRIM=0x{}\r\n   RANGE=0x{} FINE=0x{}\r\n",
        source.headline(),
        HexByte(trim::pack(state)),
        HexByte(state.range_select),
        HexByte(state.fine_tap),
    )?;
    Ok(banner)
}
