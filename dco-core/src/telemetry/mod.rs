//! Calibration trace shared by firmware and host targets.
//!
//! The controller writes one record per notable step into a fixed-capacity
//! ring so a caller can replay the tail of a run after it finishes. The core
//! never logs; firmware mirrors the trace to defmt and the emulator writes it
//! into its transcript.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::calibration::{CalibrationError, FrequencyError};
use crate::oscillator::{OscillatorState, StepKind};
use crate::timer::{ReferenceDivider, Ticks};

/// Identifier assigned to every trace record.
pub type EventId = u32;

/// Number of records kept by [`CalibrationTrace`].
pub const TRACE_RING_CAPACITY: usize = 32;

/// One evaluated delta and the adjustment that followed it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub delta: Ticks,
    pub verdict: FrequencyError,
    /// Trim fields in effect while `delta` was measured.
    pub state: OscillatorState,
    /// Adjustment applied afterwards; `None` when the verdict was exact or the
    /// run stopped before adjusting.
    pub step: Option<StepKind>,
}

/// Events recorded during a calibration run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TraceEvent {
    Started {
        target: Ticks,
        divider: ReferenceDivider,
        state: OscillatorState,
    },
    Seeded {
        capture: Ticks,
    },
    Iteration(IterationRecord),
    Converged {
        state: OscillatorState,
        iterations: u32,
    },
    Failed(CalibrationError),
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Started {
                target,
                divider,
                state,
            } => write!(f, "start target={target} ref{divider} {state}"),
            TraceEvent::Seeded { capture } => write!(f, "seed capture={capture}"),
            TraceEvent::Iteration(record) => {
                write!(
                    f,
                    "iter={} delta={} {} {}",
                    record.iteration, record.delta, record.verdict, record.state
                )?;
                match record.step {
                    Some(StepKind::Fine) => f.write_str(" step=fine"),
                    Some(StepKind::RangeHandoff) => f.write_str(" step=range-handoff"),
                    Some(StepKind::Saturated) => f.write_str(" step=saturated"),
                    None => Ok(()),
                }
            }
            TraceEvent::Converged { state, iterations } => {
                write!(f, "converged {state} iterations={iterations}")
            }
            TraceEvent::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// Trace entry stored in the ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TraceRecord {
    pub id: EventId,
    pub event: TraceEvent,
}

/// Trace ring buffer type alias.
pub type TraceRing<const CAPACITY: usize = TRACE_RING_CAPACITY> = HistoryBuf<TraceRecord, CAPACITY>;

/// Fixed-capacity record of the most recent calibration events.
pub struct CalibrationTrace<const CAPACITY: usize = TRACE_RING_CAPACITY> {
    ring: TraceRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> CalibrationTrace<CAPACITY> {
    /// Creates an empty trace.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the retained records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TraceRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent record, if any.
    pub fn latest(&self) -> Option<&TraceRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently retained.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total number of events recorded since the last [`clear`](Self::clear),
    /// including ones that have been overwritten.
    pub const fn recorded(&self) -> EventId {
        self.next_event_id
    }

    /// Drops every record and restarts event numbering.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.next_event_id = 0;
    }

    /// Appends an event, overwriting the oldest record when full.
    pub fn record(&mut self, event: TraceEvent) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TraceRecord { id, event });
        id
    }
}

impl<const CAPACITY: usize> Default for CalibrationTrace<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iteration(iteration: u32, delta: Ticks) -> TraceEvent {
        TraceEvent::Iteration(IterationRecord {
            iteration,
            delta,
            verdict: FrequencyError::TooFast,
            state: OscillatorState::new(0x10, 3),
            step: Some(StepKind::Fine),
        })
    }

    #[test]
    fn records_are_numbered_in_order() {
        let mut trace: CalibrationTrace = CalibrationTrace::new();
        assert!(trace.is_empty());

        let first = trace.record(TraceEvent::Seeded { capture: 17 });
        let second = trace.record(iteration(1, 4200));

        assert_eq!((first, second), (0, 1));
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.latest().map(|record| record.event), Some(iteration(1, 4200)));
    }

    #[test]
    fn ring_keeps_newest_records() {
        let mut trace: CalibrationTrace<4> = CalibrationTrace::new();
        for index in 0..10 {
            trace.record(iteration(index, 4000 + index as Ticks));
        }

        assert_eq!(trace.len(), 4);
        assert_eq!(trace.recorded(), 10);
        let ids: heapless::Vec<EventId, 4> = trace.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[6, 7, 8, 9]);
    }

    #[test]
    fn clear_restarts_numbering() {
        let mut trace: CalibrationTrace<4> = CalibrationTrace::new();
        trace.record(TraceEvent::Seeded { capture: 1 });
        trace.clear();
        assert!(trace.is_empty());
        assert_eq!(trace.record(TraceEvent::Seeded { capture: 2 }), 0);
    }
}
