//! Closed-loop oscillator calibration.
//!
//! The [`Calibrator`] leases the capture timer, takes a seed capture, and then
//! repeats sample → classify → adjust until one reference period measures
//! exactly the target number of oscillator ticks. The timer configuration is
//! restored before the calibrator returns, on success and on failure.
//!
//! A dead reference or an unreachable target would keep the loop spinning
//! forever. [`CalibrationConfig`] bounds both by default;
//! [`CalibrationConfig::unbounded`] opts back into waiting indefinitely.

use core::fmt;

use crate::capture::{CaptureSample, PollBudget, ReferenceSampler, tick_delta};
use crate::oscillator::{AdjustDirection, Oscillator, OscillatorState, StepKind, TrimGeometry};
use crate::telemetry::{CalibrationTrace, IterationRecord, TraceEvent};
use crate::timer::{CaptureTimer, ReferenceDivider, Ticks, TimerLease};

pub mod evaluate;
pub mod target;

pub use evaluate::{FrequencyError, classify, tick_error};
pub use target::{CalibrationTarget, REFERENCE_CRYSTAL_HZ, TargetError, edge_rate_hz};

/// Phases of a calibration run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalibrationState {
    Idle,
    Acquiring,
    Sampling,
    Evaluating,
    Adjusting,
    Converged,
    Failed,
}

impl CalibrationState {
    /// Returns `true` while a run holds the timer.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            CalibrationState::Acquiring
                | CalibrationState::Sampling
                | CalibrationState::Evaluating
                | CalibrationState::Adjusting
        )
    }

    /// Returns `true` when the state represents a finished run.
    pub const fn is_terminal(self) -> bool {
        matches!(self, CalibrationState::Converged | CalibrationState::Failed)
    }
}

/// Why the target could not be reached.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnreachableReason {
    /// The fine tap wrapped while the range select sat at its extreme in the
    /// requested direction: the target lies outside the oscillator's span.
    Saturated(AdjustDirection),
    /// The iteration limit ran out before an exact match.
    IterationLimit(u32),
}

/// Failures surfaced by a bounded calibration run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalibrationError {
    /// No reference edge arrived within the poll budget.
    ReferenceMissing { iteration: u32, polls: u32 },
    /// The loop gave up without an exact match.
    TargetUnreachable {
        last: OscillatorState,
        reason: UnreachableReason,
    },
    /// The requested target cannot be measured.
    InvalidTarget(TargetError),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::ReferenceMissing { iteration, polls } => write!(
                f,
                "reference missing at iteration {iteration} after {polls} polls"
            ),
            CalibrationError::TargetUnreachable {
                last,
                reason: UnreachableReason::Saturated(direction),
            } => write!(
                f,
                "target unreachable: range saturated stepping {direction} at {last}"
            ),
            CalibrationError::TargetUnreachable {
                last,
                reason: UnreachableReason::IterationLimit(limit),
            } => write!(
                f,
                "target unreachable: no exact match within {limit} iterations at {last}"
            ),
            CalibrationError::InvalidTarget(error) => write!(f, "invalid target: {error}"),
        }
    }
}

impl From<TargetError> for CalibrationError {
    fn from(value: TargetError) -> Self {
        CalibrationError::InvalidTarget(value)
    }
}

/// Upper bound on evaluated deltas per run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IterationLimit {
    Unbounded,
    /// Enough iterations to sweep the oscillator's full span twice.
    SpanSweeps,
    Fixed(u32),
}

impl IterationLimit {
    fn resolve(self, geometry: TrimGeometry) -> Option<u32> {
        match self {
            IterationLimit::Unbounded => None,
            IterationLimit::SpanSweeps => {
                Some(geometry.total_positions().saturating_mul(2).saturating_add(1))
            }
            IterationLimit::Fixed(limit) => Some(limit),
        }
    }
}

/// Knobs controlling a calibration run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CalibrationConfig {
    /// Reference divider applied while calibrating.
    pub divider: ReferenceDivider,
    /// Wait limit for each reference edge.
    pub poll_budget: PollBudget,
    pub iteration_limit: IterationLimit,
    /// Stop as soon as a fine wrap cannot be followed by the range select.
    pub stop_on_saturation: bool,
}

impl CalibrationConfig {
    /// Divider used by default: slow enough that a 16-bit counter cannot
    /// wrap twice between edges at any practical oscillator setting.
    pub const DEFAULT_DIVIDER: ReferenceDivider = ReferenceDivider::Div8;

    pub const fn new() -> Self {
        Self {
            divider: Self::DEFAULT_DIVIDER,
            poll_budget: PollBudget::DEFAULT,
            iteration_limit: IterationLimit::SpanSweeps,
            stop_on_saturation: true,
        }
    }

    /// Loops until an exact match, however long that takes.
    pub const fn unbounded() -> Self {
        Self {
            divider: Self::DEFAULT_DIVIDER,
            poll_budget: PollBudget::Unbounded,
            iteration_limit: IterationLimit::Unbounded,
            stop_on_saturation: false,
        }
    }

    #[must_use]
    pub const fn with_divider(mut self, divider: ReferenceDivider) -> Self {
        self.divider = divider;
        self
    }

    #[must_use]
    pub const fn with_poll_budget(mut self, budget: PollBudget) -> Self {
        self.poll_budget = budget;
        self
    }

    #[must_use]
    pub const fn with_iteration_limit(mut self, limit: IterationLimit) -> Self {
        self.iteration_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_stop_on_saturation(mut self, stop: bool) -> Self {
        self.stop_on_saturation = stop;
        self
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a converged run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CalibrationReport {
    pub state: OscillatorState,
    pub target: CalibrationTarget,
    /// Delta that matched the target.
    pub final_delta: Ticks,
    /// Number of deltas evaluated, including the final exact one.
    pub iterations: u32,
    pub adjustments: u32,
    pub range_handoffs: u32,
}

/// Runs the calibration state machine.
pub struct Calibrator {
    config: CalibrationConfig,
    state: CalibrationState,
    trace: CalibrationTrace,
}

impl Calibrator {
    pub const fn new() -> Self {
        Self::with_config(CalibrationConfig::new())
    }

    pub const fn with_config(config: CalibrationConfig) -> Self {
        Self {
            config,
            state: CalibrationState::Idle,
            trace: CalibrationTrace::new(),
        }
    }

    pub const fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Current (or final) phase of the most recent run.
    pub const fn state(&self) -> CalibrationState {
        self.state
    }

    /// Trace of the most recent run.
    pub const fn trace(&self) -> &CalibrationTrace {
        &self.trace
    }

    /// Calibrates `oscillator` against the reference captured by `timer`.
    ///
    /// On success the oscillator is left at the converged state. On failure it
    /// is left at the last state applied. Either way the timer is handed back
    /// with the configuration it had on entry.
    pub fn run<T, O>(
        &mut self,
        timer: &mut T,
        oscillator: &mut O,
        target: CalibrationTarget,
    ) -> Result<CalibrationReport, CalibrationError>
    where
        T: CaptureTimer + ?Sized,
        O: Oscillator + ?Sized,
    {
        self.trace.clear();
        self.state = CalibrationState::Acquiring;

        let geometry = oscillator.geometry();
        let initial = oscillator.state();
        let start = geometry.clamp(initial);
        if start != initial {
            oscillator.apply(start);
        }

        self.trace.record(TraceEvent::Started {
            target: target.delta(),
            divider: self.config.divider,
            state: start,
        });

        let mut lease = TimerLease::acquire(timer, self.config.divider);
        let outcome = self.converge(&mut lease, oscillator, geometry, start, target);
        let _ = lease.release();

        match outcome {
            Ok(report) => {
                self.state = CalibrationState::Converged;
                self.trace.record(TraceEvent::Converged {
                    state: report.state,
                    iterations: report.iterations,
                });
                Ok(report)
            }
            Err(error) => {
                self.state = CalibrationState::Failed;
                self.trace.record(TraceEvent::Failed(error));
                Err(error)
            }
        }
    }

    fn converge<T, O>(
        &mut self,
        lease: &mut TimerLease<'_, T>,
        oscillator: &mut O,
        geometry: TrimGeometry,
        start: OscillatorState,
        target: CalibrationTarget,
    ) -> Result<CalibrationReport, CalibrationError>
    where
        T: CaptureTimer + ?Sized,
        O: Oscillator + ?Sized,
    {
        let limit = self.config.iteration_limit.resolve(geometry);
        let mut sampler = ReferenceSampler::new(lease, self.config.poll_budget);

        let mut previous = sampler
            .next_sample()
            .map_err(|timeout| CalibrationError::ReferenceMissing {
                iteration: 0,
                polls: timeout.polls,
            })?;
        self.trace.record(TraceEvent::Seeded {
            capture: previous.ticks(),
        });

        let mut current_state = start;
        let mut iterations: u32 = 0;
        let mut adjustments: u32 = 0;
        let mut range_handoffs: u32 = 0;

        loop {
            self.state = CalibrationState::Sampling;
            let current: CaptureSample =
                sampler
                    .next_sample()
                    .map_err(|timeout| CalibrationError::ReferenceMissing {
                        iteration: iterations.saturating_add(1),
                        polls: timeout.polls,
                    })?;
            let delta = tick_delta(previous, current);
            previous = current;
            iterations = iterations.saturating_add(1);

            self.state = CalibrationState::Evaluating;
            let verdict = classify(delta, target.delta());
            let mut record = IterationRecord {
                iteration: iterations,
                delta,
                verdict,
                state: current_state,
                step: None,
            };

            let Some(direction) = verdict.correction() else {
                self.trace.record(TraceEvent::Iteration(record));
                return Ok(CalibrationReport {
                    state: current_state,
                    target,
                    final_delta: delta,
                    iterations,
                    adjustments,
                    range_handoffs,
                });
            };

            if limit.is_some_and(|limit| iterations >= limit) {
                self.trace.record(TraceEvent::Iteration(record));
                return Err(CalibrationError::TargetUnreachable {
                    last: current_state,
                    reason: UnreachableReason::IterationLimit(iterations),
                });
            }

            self.state = CalibrationState::Adjusting;
            let adjustment = geometry.step(current_state, direction);
            if adjustment.is_saturated() && self.config.stop_on_saturation {
                record.step = Some(StepKind::Saturated);
                self.trace.record(TraceEvent::Iteration(record));
                return Err(CalibrationError::TargetUnreachable {
                    last: current_state,
                    reason: UnreachableReason::Saturated(direction),
                });
            }

            oscillator.apply(adjustment.state);
            record.step = Some(adjustment.kind);
            self.trace.record(TraceEvent::Iteration(record));

            current_state = adjustment.state;
            adjustments = adjustments.saturating_add(1);
            if adjustment.kind == StepKind::RangeHandoff {
                range_handoffs = range_handoffs.saturating_add(1);
            }
        }
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Calibrates `oscillator` until one reference period measures exactly
/// `target_delta` ticks, using the default bounded configuration.
pub fn calibrate<T, O>(
    timer: &mut T,
    oscillator: &mut O,
    target_delta: Ticks,
) -> Result<OscillatorState, CalibrationError>
where
    T: CaptureTimer + ?Sized,
    O: Oscillator + ?Sized,
{
    let target = CalibrationTarget::from_delta(target_delta)?;
    Calibrator::new()
        .run(timer, oscillator, target)
        .map(|report| report.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{CountMode, TimerConfig};

    /// Timer whose reference period always measures the same delta.
    struct SteadyTimer {
        config: TimerConfig,
        counter: Ticks,
        delta: Ticks,
    }

    impl CaptureTimer for SteadyTimer {
        fn config(&self) -> TimerConfig {
            self.config
        }

        fn configure(&mut self, config: TimerConfig) {
            self.config = config;
        }

        fn capture_pending(&self) -> bool {
            self.config.mode == CountMode::Continuous
        }

        fn take_capture(&mut self) -> Ticks {
            self.counter = self.counter.wrapping_add(self.delta);
            self.counter
        }
    }

    struct Trim {
        state: OscillatorState,
        writes: u32,
    }

    impl Oscillator for Trim {
        fn geometry(&self) -> TrimGeometry {
            TrimGeometry::MSP430_DCO
        }

        fn state(&self) -> OscillatorState {
            self.state
        }

        fn apply(&mut self, state: OscillatorState) {
            self.state = state;
            self.writes += 1;
        }
    }

    #[test]
    fn span_sweeps_is_the_default_limit() {
        assert_eq!(
            CalibrationConfig::new().iteration_limit,
            IterationLimit::SpanSweeps
        );
        assert_eq!(
            IterationLimit::SpanSweeps.resolve(TrimGeometry::MSP430_DCO),
            Some(8193)
        );
        assert_eq!(IterationLimit::Unbounded.resolve(TrimGeometry::MSP430_DCO), None);
    }

    #[test]
    fn default_limit_stops_a_loop_that_never_matches() {
        let mut timer = SteadyTimer {
            config: TimerConfig::default(),
            counter: 0,
            delta: 4200,
        };
        let mut trim = Trim {
            state: OscillatorState::new(0x80, 7),
            writes: 0,
        };
        let mut calibrator =
            Calibrator::with_config(CalibrationConfig::new().with_stop_on_saturation(false));
        let target = CalibrationTarget::from_delta(4096).expect("valid target");

        let error = calibrator
            .run(&mut timer, &mut trim, target)
            .expect_err("a constant 4200 delta never reaches 4096");

        assert!(matches!(
            error,
            CalibrationError::TargetUnreachable {
                reason: UnreachableReason::IterationLimit(8193),
                ..
            }
        ));
        assert_eq!(trim.writes, 8192);
        assert_eq!(calibrator.state(), CalibrationState::Failed);
        assert_eq!(timer.config(), TimerConfig::default());
    }
}
