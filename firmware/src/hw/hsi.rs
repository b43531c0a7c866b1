//! HSI16 trim.

use dco_core::oscillator::{Oscillator, OscillatorState, TrimGeometry};
use embassy_stm32::pac;

use crate::trim;

/// Internal 16 MHz oscillator driving SYSCLK.
pub struct HsiOscillator {
    _private: (),
}

impl HsiOscillator {
    /// Takes over HSI trimming. Only one instance should exist.
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Oscillator for HsiOscillator {
    fn geometry(&self) -> TrimGeometry {
        trim::HSI_TRIM_GEOMETRY
    }

    fn state(&self) -> OscillatorState {
        trim::split(pac::RCC.icscr().read().hsitrim())
    }

    fn apply(&mut self, state: OscillatorState) {
        let hsitrim = trim::pack(state);
        pac::RCC.icscr().modify(|w| w.set_hsitrim(hsitrim));
    }
}
