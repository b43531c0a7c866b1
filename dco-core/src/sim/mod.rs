//! Deterministic oscillator and capture timer models.
//!
//! These stand in for the silicon on the host: the emulator drives the real
//! calibration loop against them, and the integration tests use them to check
//! convergence from arbitrary starting points. The timer advances its counter
//! by however many oscillator ticks fit into one divided reference period at
//! the oscillator's current setting, so counter rollover happens exactly as it
//! would on hardware.

use core::cell::Cell;

use crate::oscillator::{Oscillator, OscillatorState, TrimGeometry};
use crate::timer::{CaptureSetup, CaptureTimer, CountMode, Ticks, TimerConfig};

/// Frequency response of a simulated oscillator.
pub trait DcoModel {
    fn geometry(&self) -> TrimGeometry;

    /// Output frequency at `state`, in hertz.
    fn frequency_hz(&self, state: OscillatorState) -> u32;
}

/// Oscillator whose frequency rises linearly with the fine tap inside each
/// range, with evenly spaced and overlapping ranges.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinearDcoModel {
    pub geometry: TrimGeometry,
    pub base_hz: u32,
    pub range_spacing_hz: u32,
    pub step_hz: u32,
}

impl LinearDcoModel {
    pub const fn new(
        geometry: TrimGeometry,
        base_hz: u32,
        range_spacing_hz: u32,
        step_hz: u32,
    ) -> Self {
        Self {
            geometry,
            base_hz,
            range_spacing_hz,
            step_hz,
        }
    }

    /// Sixteen ranges of 256 taps around 16 MHz. One tap is one tick per
    /// reference period at a 4096 Hz edge rate, so every delta inside a range
    /// is reachable exactly.
    pub const fn msp430_like() -> Self {
        Self::new(TrimGeometry::MSP430_DCO, 14_336_000, 819_200, 4096)
    }

    /// Lowest frequency the model can produce.
    pub const fn min_hz(&self) -> u32 {
        self.base_hz
    }

    /// Highest frequency the model can produce.
    pub const fn max_hz(&self) -> u32 {
        self.base_hz
            + self.range_spacing_hz * self.geometry.range_max as u32
            + self.step_hz * self.geometry.fine_max as u32
    }
}

impl DcoModel for LinearDcoModel {
    fn geometry(&self) -> TrimGeometry {
        self.geometry
    }

    fn frequency_hz(&self, state: OscillatorState) -> u32 {
        let state = self.geometry.clamp(state);
        self.base_hz
            + self.range_spacing_hz * u32::from(state.range_select)
            + self.step_hz * u32::from(state.fine_tap)
    }
}

/// Simulated oscillator holding its live trim fields.
pub struct SimulatedDco<M> {
    model: M,
    state: Cell<OscillatorState>,
    writes: Cell<u32>,
}

impl<M> SimulatedDco<M>
where
    M: DcoModel,
{
    pub fn new(model: M, reset_state: OscillatorState) -> Self {
        Self {
            model,
            state: Cell::new(reset_state),
            writes: Cell::new(0),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn state(&self) -> OscillatorState {
        self.state.get()
    }

    /// Number of trim writes since construction.
    pub fn writes(&self) -> u32 {
        self.writes.get()
    }

    pub fn frequency_hz(&self) -> u32 {
        self.model.frequency_hz(self.state.get())
    }

    /// Returns a writable handle for the calibration controller.
    pub fn handle(&self) -> DcoHandle<'_, M> {
        DcoHandle { dco: self }
    }
}

/// [`Oscillator`] view of a [`SimulatedDco`].
pub struct DcoHandle<'a, M> {
    dco: &'a SimulatedDco<M>,
}

impl<M> Oscillator for DcoHandle<'_, M>
where
    M: DcoModel,
{
    fn geometry(&self) -> TrimGeometry {
        self.dco.model.geometry()
    }

    fn state(&self) -> OscillatorState {
        self.dco.state.get()
    }

    fn apply(&mut self, state: OscillatorState) {
        self.dco.state.set(state);
        self.dco.writes.set(self.dco.writes.get().wrapping_add(1));
    }
}

/// Small xorshift source used for capture jitter.
#[derive(Copy, Clone, Debug)]
struct Jitter {
    amplitude: u16,
    seed: u32,
}

impl Jitter {
    fn sample(&mut self) -> i32 {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;

        let span = u32::from(self.amplitude) * 2 + 1;
        #[allow(clippy::cast_possible_wrap)]
        let offset = (x % span) as i32;
        offset - i32::from(self.amplitude)
    }
}

/// Free-running 16-bit timer clocked by a [`SimulatedDco`], capturing a
/// divided reference clock.
pub struct SimulatedTimer<'a, M> {
    dco: &'a SimulatedDco<M>,
    reference_hz: u32,
    config: TimerConfig,
    counter: Ticks,
    remainder: u64,
    reference_alive: bool,
    jitter: Option<Jitter>,
    edges: u32,
}

impl<'a, M> SimulatedTimer<'a, M>
where
    M: DcoModel,
{
    pub fn new(dco: &'a SimulatedDco<M>, reference_hz: u32) -> Self {
        Self {
            dco,
            reference_hz,
            config: TimerConfig::default(),
            counter: 0,
            remainder: 0,
            reference_alive: true,
            jitter: None,
            edges: 0,
        }
    }

    /// Starts from a configuration left behind by some other clock consumer.
    #[must_use]
    pub fn with_config(mut self, config: TimerConfig) -> Self {
        self.config = config;
        self
    }

    /// Models a disconnected reference input: no edge is ever captured.
    #[must_use]
    pub fn with_dead_reference(mut self) -> Self {
        self.reference_alive = false;
        self
    }

    /// Adds up to `amplitude` ticks of deterministic noise to every capture.
    #[must_use]
    pub fn with_jitter(mut self, amplitude: u16, seed: u32) -> Self {
        self.jitter = Some(Jitter {
            amplitude,
            seed: seed.max(1),
        });
        self
    }

    /// Number of reference edges captured so far.
    pub fn edges(&self) -> u32 {
        self.edges
    }

    /// Current counter value.
    pub fn counter(&self) -> Ticks {
        self.counter
    }

    fn ticks_per_edge(&mut self) -> u64 {
        let numerator = u64::from(self.dco.frequency_hz())
            * u64::from(self.config.divider.divisor())
            + self.remainder;
        let reference = u64::from(self.reference_hz.max(1));
        self.remainder = numerator % reference;
        numerator / reference
    }

    fn is_capturing(&self) -> bool {
        self.config.mode == CountMode::Continuous
            && self.config.capture == CaptureSetup::ReferenceRisingEdge
    }
}

impl<M> CaptureTimer for SimulatedTimer<'_, M>
where
    M: DcoModel,
{
    fn config(&self) -> TimerConfig {
        self.config
    }

    fn configure(&mut self, config: TimerConfig) {
        let starting = self.config.mode != CountMode::Continuous
            && config.mode == CountMode::Continuous;
        if starting {
            self.counter = 0;
            self.remainder = 0;
        }
        self.config = config;
    }

    fn capture_pending(&self) -> bool {
        self.reference_alive && self.is_capturing()
    }

    fn take_capture(&mut self) -> Ticks {
        let mut ticks = self.ticks_per_edge();
        if let Some(jitter) = self.jitter.as_mut() {
            ticks = ticks.saturating_add_signed(i64::from(jitter.sample()));
        }

        #[allow(clippy::cast_possible_truncation)]
        let advance = ticks as Ticks;
        self.counter = self.counter.wrapping_add(advance);
        self.edges = self.edges.wrapping_add(1);
        self.counter
    }
}
