#![no_std]

// Shared logic for startup oscillator calibration.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware access happens through the `Oscillator` and
// `CaptureTimer` traits; firmware and the emulator provide the implementations.

pub mod calibration;
pub mod capture;
pub mod oscillator;
pub mod sim;
pub mod telemetry;
pub mod timer;

pub use calibration::{
    CalibrationConfig, CalibrationError, CalibrationReport, CalibrationState, CalibrationTarget,
    Calibrator, FrequencyError, IterationLimit, TargetError, UnreachableReason, calibrate,
    classify,
};
pub use capture::{CaptureSample, PollBudget, ReferenceSampler, tick_delta};
pub use oscillator::{
    Adjustment, AdjustDirection, HexByte, Oscillator, OscillatorState, StepKind, TrimGeometry,
    slow_down, speed_up,
};
pub use telemetry::{CalibrationTrace, TraceEvent};
pub use timer::{CaptureTimer, ReferenceDivider, Ticks, TimerConfig, TimerLease};
