//! Reference edge timestamps.
//!
//! The sampler is a pure timestamp source: it waits for the timer to flag a
//! captured reference edge and hands back the raw counter value. Interpreting
//! the values is left to the calibration controller.

use core::fmt;

use crate::timer::{CaptureTimer, Ticks, TimerLease};

/// Counter value latched at a reference edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CaptureSample(pub Ticks);

impl CaptureSample {
    pub const fn ticks(self) -> Ticks {
        self.0
    }
}

/// Oscillator ticks elapsed between two adjacent captures.
///
/// Wrapping subtraction at the counter width, so a counter rollover between
/// the two edges needs no special handling.
#[must_use]
pub const fn tick_delta(previous: CaptureSample, current: CaptureSample) -> Ticks {
    current.0.wrapping_sub(previous.0)
}

/// Limit on how long the sampler waits for a single edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollBudget {
    /// Poll until an edge arrives, however long that takes.
    Unbounded,
    /// Give up after this many polls without an edge.
    Polls(u32),
}

impl PollBudget {
    /// Default budget: comfortably longer than one divided reference period at
    /// the slowest oscillator setting.
    pub const DEFAULT: Self = PollBudget::Polls(1_000_000);

    const fn allows(self, polls: u32) -> bool {
        match self {
            PollBudget::Unbounded => true,
            PollBudget::Polls(limit) => polls < limit,
        }
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// No reference edge arrived within the poll budget.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgeTimeout {
    pub polls: u32,
}

impl fmt::Display for EdgeTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no reference edge after {} polls", self.polls)
    }
}

/// Pulls successive captures out of a leased timer.
pub struct ReferenceSampler<'l, 't, T>
where
    T: CaptureTimer + ?Sized,
{
    lease: &'l mut TimerLease<'t, T>,
    budget: PollBudget,
    samples: u32,
}

impl<'l, 't, T> ReferenceSampler<'l, 't, T>
where
    T: CaptureTimer + ?Sized,
{
    pub fn new(lease: &'l mut TimerLease<'t, T>, budget: PollBudget) -> Self {
        Self {
            lease,
            budget,
            samples: 0,
        }
    }

    /// Number of captures returned so far.
    pub const fn samples_taken(&self) -> u32 {
        self.samples
    }

    /// Waits for the next reference edge and returns its timestamp.
    pub fn next_sample(&mut self) -> Result<CaptureSample, EdgeTimeout> {
        let mut polls: u32 = 0;

        while !self.lease.capture_pending() {
            polls = polls.saturating_add(1);
            if !self.budget.allows(polls) {
                return Err(EdgeTimeout { polls });
            }
            core::hint::spin_loop();
        }

        self.samples = self.samples.wrapping_add(1);
        Ok(CaptureSample(self.lease.take_capture()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{ReferenceDivider, TimerConfig};

    struct EdgeAfter {
        config: TimerConfig,
        polls_until_edge: core::cell::Cell<u32>,
        value: Ticks,
    }

    impl CaptureTimer for EdgeAfter {
        fn config(&self) -> TimerConfig {
            self.config
        }

        fn configure(&mut self, config: TimerConfig) {
            self.config = config;
        }

        fn capture_pending(&self) -> bool {
            let remaining = self.polls_until_edge.get();
            if remaining == 0 {
                true
            } else {
                self.polls_until_edge.set(remaining - 1);
                false
            }
        }

        fn take_capture(&mut self) -> Ticks {
            self.value
        }
    }

    #[test]
    fn delta_handles_counter_rollover() {
        let previous = CaptureSample(0xFF00);
        let current = CaptureSample(0x0100);
        assert_eq!(tick_delta(previous, current), 0x0200);
    }

    #[test]
    fn delta_without_rollover_is_plain_difference() {
        assert_eq!(tick_delta(CaptureSample(100), CaptureSample(4196)), 4096);
    }

    #[test]
    fn sampler_polls_until_edge() {
        let mut timer = EdgeAfter {
            config: TimerConfig::default(),
            polls_until_edge: core::cell::Cell::new(5),
            value: 1234,
        };
        let mut lease = TimerLease::acquire(&mut timer, ReferenceDivider::Div8);
        let mut sampler = ReferenceSampler::new(&mut lease, PollBudget::Polls(10));

        assert_eq!(sampler.next_sample(), Ok(CaptureSample(1234)));
        assert_eq!(sampler.samples_taken(), 1);
    }

    #[test]
    fn sampler_times_out_on_silent_reference() {
        let mut timer = EdgeAfter {
            config: TimerConfig::default(),
            polls_until_edge: core::cell::Cell::new(u32::MAX),
            value: 0,
        };
        let mut lease = TimerLease::acquire(&mut timer, ReferenceDivider::Div8);
        let mut sampler = ReferenceSampler::new(&mut lease, PollBudget::Polls(3));

        assert_eq!(sampler.next_sample(), Err(EdgeTimeout { polls: 3 }));
        assert_eq!(sampler.samples_taken(), 0);
    }
}
