//! Logging for the startup calibration.
//!
//! The core only records a `CalibrationTrace`; this module mirrors it to defmt
//! on target and to stdout on the host so a run can be read back during
//! bring-up.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt;

use dco_core::calibration::{CalibrationError, CalibrationReport};
use dco_core::oscillator::OscillatorState;
use dco_core::telemetry::{CalibrationTrace, TraceEvent};
use dco_core::timer::Ticks;

use crate::console::ClockSource;

/// Replays every retained trace record.
pub fn log_trace<const CAPACITY: usize>(trace: &CalibrationTrace<CAPACITY>) {
    let dropped = trace.recorded().saturating_sub(count(trace));
    if dropped > 0 {
        emit_dropped(dropped);
    }

    for record in trace.oldest_first() {
        emit_record(record.id, event_label(&record.event), &record.event);
    }
}

/// Logs the converged run summary.
pub fn log_report(report: &CalibrationReport) {
    emit_summary(
        ClockSource::Calibrated,
        report.state,
        Some(&Summary {
            delta: report.final_delta,
            iterations: report.iterations,
            adjustments: report.adjustments,
            range_handoffs: report.range_handoffs,
        }),
    );
}

/// Logs a stored trim being applied without calibrating.
pub fn log_precalibrated(state: OscillatorState) {
    emit_summary(ClockSource::Precalibrated, state, None);
}

/// Logs a failed run and the trim left in place.
pub fn log_failure(error: &CalibrationError, state: OscillatorState) {
    emit_failure(error);
    emit_summary(ClockSource::Uncalibrated, state, None);
}

struct Summary {
    delta: Ticks,
    iterations: u32,
    adjustments: u32,
    range_handoffs: u32,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delta={} iterations={} adjustments={} handoffs={}",
            self.delta, self.iterations, self.adjustments, self.range_handoffs
        )
    }
}

fn count<const CAPACITY: usize>(trace: &CalibrationTrace<CAPACITY>) -> u32 {
    u32::try_from(trace.len()).unwrap_or(u32::MAX)
}

const fn event_label(event: &TraceEvent) -> &'static str {
    match event {
        TraceEvent::Started { .. } => "start",
        TraceEvent::Seeded { .. } => "seed",
        TraceEvent::Iteration(_) => "iter",
        TraceEvent::Converged { .. } => "done",
        TraceEvent::Failed(_) => "fail",
    }
}

const fn source_label(source: ClockSource) -> &'static str {
    match source {
        ClockSource::Calibrated => "calibrated",
        ClockSource::Precalibrated => "precalibrated",
        ClockSource::Uncalibrated => "uncalibrated",
    }
}

#[cfg(target_os = "none")]
fn emit_record(id: u32, label: &'static str, event: &TraceEvent) {
    defmt::info!(
        "calibration:{} #{} {}",
        label,
        id,
        defmt::Display2Format(event)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_record(id: u32, label: &'static str, event: &TraceEvent) {
    println!("calibration:{label} #{id} {event}");
}

#[cfg(target_os = "none")]
fn emit_dropped(dropped: u32) {
    defmt::warn!("calibration: {} earlier trace records overwritten", dropped);
}

#[cfg(not(target_os = "none"))]
fn emit_dropped(dropped: u32) {
    println!("calibration: {dropped} earlier trace records overwritten");
}

#[cfg(target_os = "none")]
fn emit_failure(error: &CalibrationError) {
    defmt::warn!("calibration:error {}", defmt::Display2Format(error));
}

#[cfg(not(target_os = "none"))]
fn emit_failure(error: &CalibrationError) {
    println!("calibration:error {error}");
}

#[cfg(target_os = "none")]
fn emit_summary(source: ClockSource, state: OscillatorState, summary: Option<&Summary>) {
    let label = source_label(source);
    if let Some(summary) = summary {
        defmt::info!(
            "calibration:{} {} {}",
            label,
            defmt::Display2Format(&state),
            defmt::Display2Format(summary)
        );
    } else {
        defmt::info!("calibration:{} {}", label, defmt::Display2Format(&state));
    }
}

#[cfg(not(target_os = "none"))]
fn emit_summary(source: ClockSource, state: OscillatorState, summary: Option<&Summary>) {
    let label = source_label(source);
    if let Some(summary) = summary {
        println!("calibration:{label} {state} {summary}");
    } else {
        println!("calibration:{label} {state}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dco_core::calibration::{CalibrationTarget, Calibrator};
    use dco_core::oscillator::Oscillator;
    use dco_core::sim::{LinearDcoModel, SimulatedDco, SimulatedTimer};
    use dco_core::timer::ReferenceDivider;

    #[test]
    fn labels_cover_every_event() {
        let state = OscillatorState::new(1, 2);
        assert_eq!(event_label(&TraceEvent::Seeded { capture: 3 }), "seed");
        assert_eq!(
            event_label(&TraceEvent::Converged {
                state,
                iterations: 4
            }),
            "done"
        );
        assert_eq!(source_label(ClockSource::Uncalibrated), "uncalibrated");
    }

    #[test]
    fn summary_lists_run_counters() {
        let summary = Summary {
            delta: 3906,
            iterations: 12,
            adjustments: 11,
            range_handoffs: 1,
        };
        assert_eq!(
            summary.to_string(),
            "delta=3906 iterations=12 adjustments=11 handoffs=1"
        );
    }

    #[test]
    fn logs_a_simulated_run() {
        let dco = SimulatedDco::new(LinearDcoModel::msp430_like(), OscillatorState::new(0x10, 2));
        let mut timer = SimulatedTimer::new(&dco, 32_768);
        let mut handle = dco.handle();
        let target = CalibrationTarget::from_delta(3906).unwrap();

        let mut calibrator = Calibrator::new();
        let report = calibrator
            .run(&mut timer, &mut handle, target)
            .expect("simulated run converges");

        log_trace(calibrator.trace());
        log_report(&report);
        assert_eq!(report.state, handle.state());
        assert!(matches!(
            calibrator.trace().latest().map(|record| record.event),
            Some(TraceEvent::Converged { .. })
        ));
        assert_eq!(calibrator.config().divider, ReferenceDivider::Div8);
    }
}
