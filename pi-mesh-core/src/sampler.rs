//! Sampler
//!
//! Runs one trial per call until the per-cycle quota is reached, then
//! suspends until the next heartbeat re-arms it. At most one quota of
//! unreported work is ever outstanding.

use crate::round::CycleCounters;
use crate::traits::TrialSource;

/// Result of one sampler step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStep {
    /// A trial ran; quota not reached yet
    Trial {
        /// Whether the trial landed inside
        hit: bool,
    },
    /// The trial filled the quota; counters were reset
    QuotaReached {
        /// Inside-count of the finished cycle
        inside: u32,
    },
    /// Waiting for the next heartbeat
    Suspended,
}

/// Quota-bounded trial loop
#[derive(Debug, Clone)]
pub struct Sampler {
    quota: u32,
    armed: bool,
}

impl Sampler {
    /// Create an armed sampler
    pub fn new(quota: u32) -> Self {
        Self { quota, armed: true }
    }

    /// Trials per cycle
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// True while trials may run
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Allow sampling again
    pub fn rearm(&mut self) {
        self.armed = true;
    }

    /// Run one trial into `cycle`
    pub fn step<S: TrialSource + ?Sized>(
        &mut self,
        cycle: &mut CycleCounters,
        source: &mut S,
    ) -> SampleStep {
        if !self.armed {
            return SampleStep::Suspended;
        }

        let hit = source.next_trial();
        if hit {
            cycle.inside += 1;
        }
        cycle.generated += 1;

        if cycle.generated >= self.quota {
            let inside = cycle.inside;
            *cycle = CycleCounters::default();
            self.armed = false;
            tracing::trace!(inside, quota = self.quota, "sampler quota reached");
            return SampleStep::QuotaReached { inside };
        }
        SampleStep::Trial { hit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alternating(bool);

    impl TrialSource for Alternating {
        fn next_trial(&mut self) -> bool {
            self.0 = !self.0;
            self.0
        }
    }

    #[test]
    fn quota_suspends_until_rearmed() {
        let mut sampler = Sampler::new(4);
        let mut cycle = CycleCounters::default();
        let mut source = Alternating(false);

        assert_eq!(
            sampler.step(&mut cycle, &mut source),
            SampleStep::Trial { hit: true }
        );
        assert_eq!(
            sampler.step(&mut cycle, &mut source),
            SampleStep::Trial { hit: false }
        );
        sampler.step(&mut cycle, &mut source);
        assert_eq!(
            sampler.step(&mut cycle, &mut source),
            SampleStep::QuotaReached { inside: 2 }
        );
        assert_eq!(cycle, CycleCounters::default());
        assert!(!sampler.is_armed());
        assert_eq!(sampler.step(&mut cycle, &mut source), SampleStep::Suspended);
        assert_eq!(cycle.generated, 0);

        sampler.rearm();
        assert!(matches!(
            sampler.step(&mut cycle, &mut source),
            SampleStep::Trial { .. }
        ));
        assert_eq!(cycle.generated, 1);
    }
}
