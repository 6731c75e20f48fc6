//! Sample accurate, drift free timing of continuously emitted grains.

use std::time::Duration;

use rand::Rng;

// -------------------------------------------------------------------------------------------------

/// Timing parameters of the cadence scheduler for a single tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CadenceParameters {
    /// Output sample rate.
    pub sample_rate: u32,
    /// Base time between two grain starts in milliseconds.
    pub cadence_ms: f32,
    /// Random amount in milliseconds added to the base cadence, resampled every tick.
    pub cadence_jitter_ms: f32,
}

impl Default for CadenceParameters {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            cadence_ms: 20.0,
            cadence_jitter_ms: 0.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Timing residue which the scheduler carries from one tick to the next.
///
/// After a tick which emitted grains, `samples_since_last_grain` holds the offset of the last
/// grain within that tick. At the start of the next tick it gets converted back into the
/// number of samples which elapsed since that grain started.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CadenceState {
    pub samples_since_last_grain: i64,
    pub grains_emitted_last_tick: usize,
}

// -------------------------------------------------------------------------------------------------

/// Ordered grain start offsets for one tick, as calculated by [`CadenceScheduler::schedule`].
///
/// Iterating the schedule yields sample frame offsets relative to the tick start. All offsets
/// are smaller than the tick's sample count.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CadenceSchedule {
    tick_samples: usize,
    cadence_samples: usize,
    first_offset: usize,
    count: usize,
    index: usize,
}

impl CadenceSchedule {
    fn empty(tick_samples: usize, cadence_samples: usize) -> Self {
        Self {
            tick_samples,
            cadence_samples,
            first_offset: 0,
            count: 0,
            index: 0,
        }
    }

    /// Length of the tick in sample frames.
    pub fn tick_samples(&self) -> usize {
        self.tick_samples
    }

    /// Distance between two grains in sample frames.
    pub fn cadence_samples(&self) -> usize {
        self.cadence_samples
    }

    /// Total number of grains in this schedule, including already iterated ones.
    pub fn grain_count(&self) -> usize {
        self.count
    }

    /// Offset of the last grain in this schedule, if any.
    pub fn last_offset(&self) -> Option<usize> {
        if self.count > 0 {
            Some(self.offset_at(self.count - 1))
        } else {
            None
        }
    }

    #[inline]
    fn offset_at(&self, index: usize) -> usize {
        self.first_offset + index * self.cadence_samples
    }
}

impl Iterator for CadenceSchedule {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.count {
            let offset = self.offset_at(self.index);
            self.index += 1;
            Some(offset)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CadenceSchedule {}

// -------------------------------------------------------------------------------------------------

/// Converts elapsed tick time into a number of continuous grains and their intra-tick offsets.
///
/// Each call to [`schedule`](Self::schedule) receives the time which elapsed since the previous
/// tick. This duration is used to advance the timing residue of the previous tick and also as
/// length of the window the new grains are placed in. Because the residue is tracked relative to
/// the last started grain and not to the tick boundary, the grain period does not creep when
/// the cadence is not a multiple of the tick length. Overdue grains start at the tick start and
/// the following grains keep a full cadence distance to them.
#[derive(Debug, Default, Clone)]
pub struct CadenceScheduler {
    state: CadenceState,
}

impl CadenceScheduler {
    /// Create a new scheduler with a zeroed timing state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current timing state.
    pub fn state(&self) -> CadenceState {
        self.state
    }

    /// Reset timing state, as if the scheduler just got created.
    pub fn reset(&mut self) {
        self.state = CadenceState::default();
    }

    /// Convert a duration to a number of sample frames, rounding to the nearest frame.
    pub fn duration_in_samples(duration: Duration, sample_rate: u32) -> usize {
        (duration.as_secs_f64() * sample_rate as f64).round() as usize
    }

    /// Convert a cadence in milliseconds to sample frames. Never returns less than one frame.
    pub fn cadence_in_samples(cadence_ms: f32, sample_rate: u32) -> usize {
        if !cadence_ms.is_finite() || cadence_ms <= 0.0 {
            return 1;
        }
        ((cadence_ms as f64 * sample_rate as f64 / 1000.0).round() as usize).max(1)
    }

    /// Calculate the continuous grains for a tick of the given duration, sampling the cadence
    /// jitter from the given random number generator.
    pub fn schedule<R: Rng>(
        &mut self,
        tick_duration: Duration,
        parameters: &CadenceParameters,
        rng: &mut R,
    ) -> CadenceSchedule {
        let tick_samples = Self::duration_in_samples(tick_duration, parameters.sample_rate);
        let jitter_ms = if parameters.cadence_jitter_ms > 0.0 {
            rng.random::<f32>() * parameters.cadence_jitter_ms
        } else {
            0.0
        };
        let cadence_samples =
            Self::cadence_in_samples(parameters.cadence_ms + jitter_ms, parameters.sample_rate);
        self.schedule_samples(tick_samples, cadence_samples)
    }

    /// Calculate the continuous grains for a tick of `tick_samples` frames with the given
    /// cadence in frames. Cadences below one frame are treated as one frame.
    pub fn schedule_samples(
        &mut self,
        tick_samples: usize,
        cadence_samples: usize,
    ) -> CadenceSchedule {
        let cadence_samples = cadence_samples.max(1);
        if tick_samples == 0 {
            // no time elapsed: nothing to schedule and nothing to carry
            return CadenceSchedule::empty(tick_samples, cadence_samples);
        }
        let tick = tick_samples as i64;
        let cadence = cadence_samples as i64;

        // Samples elapsed since the most recently started grain
        if self.state.grains_emitted_last_tick == 0 {
            self.state.samples_since_last_grain += tick;
        } else {
            self.state.samples_since_last_grain = tick - self.state.samples_since_last_grain;
        }

        // overdue grains start at the tick start, and the grid restarts from there
        let first_offset = (cadence - self.state.samples_since_last_grain).max(0);
        let schedule = if first_offset < tick {
            // number of offsets `first + i * cadence` which fit into the tick
            let count = ((tick - 1 - first_offset) / cadence + 1) as usize;
            self.state.samples_since_last_grain = first_offset + (count as i64 - 1) * cadence;
            CadenceSchedule {
                tick_samples,
                cadence_samples,
                first_offset: first_offset as usize,
                count,
                index: 0,
            }
        } else {
            CadenceSchedule::empty(tick_samples, cadence_samples)
        };
        self.state.grains_emitted_last_tick = schedule.count;
        schedule
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn cadence_conversion() {
        assert_eq!(CadenceScheduler::cadence_in_samples(100.0, 44100), 4410);
        assert_eq!(CadenceScheduler::cadence_in_samples(20.0, 48000), 960);
        assert_eq!(CadenceScheduler::cadence_in_samples(0.0, 44100), 1);
        assert_eq!(CadenceScheduler::cadence_in_samples(-3.0, 44100), 1);
        assert_eq!(CadenceScheduler::cadence_in_samples(0.001, 44100), 1);
        assert_eq!(CadenceScheduler::cadence_in_samples(f32::NAN, 44100), 1);
        assert_eq!(
            CadenceScheduler::duration_in_samples(Duration::from_millis(10), 44100),
            441
        );
    }

    #[test]
    fn no_drift_with_short_ticks() {
        let mut scheduler = CadenceScheduler::new();
        let mut total = 0;
        for _ in 0..10_000 {
            let schedule = scheduler.schedule_samples(441, 4410);
            for offset in schedule {
                assert!(offset < 441);
                total += 1;
            }
        }
        assert!((999..=1001).contains(&total), "emitted {total} grains");
    }

    #[test]
    fn no_drift_with_uneven_cadence() {
        // cadence is no multiple of the tick size
        let mut scheduler = CadenceScheduler::new();
        let mut total = 0;
        let ticks = 20_000;
        for _ in 0..ticks {
            total += scheduler.schedule_samples(512, 3000).count();
        }
        let expected = ticks * 512 / 3000;
        assert!(total.abs_diff(expected) <= 1, "{total} vs {expected}");
    }

    #[test]
    fn evenly_spaced_offsets() {
        let mut scheduler = CadenceScheduler::new();
        let mut absolute_times = Vec::new();
        let mut tick_start = 0;
        for _ in 0..200 {
            for offset in scheduler.schedule_samples(441, 1000) {
                absolute_times.push(tick_start + offset);
            }
            tick_start += 441;
        }
        assert!(absolute_times.len() > 50);
        for pair in absolute_times.windows(2) {
            assert_eq!(pair[1] - pair[0], 1000);
        }
    }

    #[test]
    fn multiple_grains_per_tick() {
        let mut scheduler = CadenceScheduler::new();
        let offsets = scheduler.schedule_samples(1000, 300).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 300, 600, 900]);
        // next tick continues the grid and never spills beyond the tick
        let offsets = scheduler.schedule_samples(1000, 300).collect::<Vec<_>>();
        assert_eq!(offsets, vec![200, 500, 800]);
        let offsets = scheduler.schedule_samples(1000, 300).collect::<Vec<_>>();
        assert_eq!(offsets, vec![100, 400, 700]);
        let offsets = scheduler.schedule_samples(1000, 300).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 300, 600, 900]);
        assert_eq!(scheduler.state().grains_emitted_last_tick, 4);
        assert_eq!(scheduler.state().samples_since_last_grain, 900);
    }

    #[test]
    fn residue_carry() {
        let mut scheduler = CadenceScheduler::new();
        // empty ticks accumulate
        for tick in 1..=2 {
            assert_eq!(scheduler.schedule_samples(100, 350).count(), 0);
            assert_eq!(scheduler.state().samples_since_last_grain, tick * 100);
        }
        let schedule = scheduler.schedule_samples(100, 350);
        assert_eq!(schedule.last_offset(), Some(50));
        assert_eq!(schedule.collect::<Vec<_>>(), vec![50]);
        assert_eq!(scheduler.state().samples_since_last_grain, 50);
        // and restart relative to the grain which just started
        assert_eq!(scheduler.schedule_samples(100, 350).count(), 0);
        assert_eq!(scheduler.state().samples_since_last_grain, 50);
        assert_eq!(scheduler.schedule_samples(100, 350).count(), 0);
        assert_eq!(scheduler.schedule_samples(100, 350).count(), 0);
        assert_eq!(
            scheduler.schedule_samples(100, 350).collect::<Vec<_>>(),
            vec![0]
        );
    }

    #[test]
    fn late_grains_restart_the_grid() {
        let mut scheduler = CadenceScheduler::new();
        assert_eq!(
            scheduler.schedule_samples(100, 250).collect::<Vec<_>>(),
            Vec::<usize>::new()
        );
        // grain at offset 50 of a predicted 100 frames tick
        assert_eq!(
            scheduler.schedule_samples(100, 250).collect::<Vec<_>>(),
            vec![50]
        );
        // the following tick took longer than predicted: the overdue grain plays at the tick
        // start and the following one keeps a full cadence distance to it
        assert_eq!(
            scheduler.schedule_samples(400, 250).collect::<Vec<_>>(),
            vec![0, 250]
        );
        assert_eq!(scheduler.state().samples_since_last_grain, 250);
    }

    #[test]
    fn first_tick_longer_than_cadence() {
        // e.g. 60 fps ticks with a 10 ms cadence
        let mut scheduler = CadenceScheduler::new();
        assert_eq!(
            scheduler.schedule_samples(735, 441).collect::<Vec<_>>(),
            vec![0, 441]
        );
        assert_eq!(scheduler.state().samples_since_last_grain, 441);
        assert_eq!(
            scheduler.schedule_samples(735, 441).collect::<Vec<_>>(),
            vec![147, 588]
        );
    }

    #[test]
    fn jittered_grains_keep_min_spacing() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let mut scheduler = CadenceScheduler::new();
        let tick = 221;
        let min_cadence = 441;
        let mut tick_start = 0;
        let mut last_start: Option<usize> = None;
        let mut grains = 0;
        for _ in 0..2_000 {
            // 10 ms base cadence with 10 ms jitter at 44.1 kHz
            let cadence = min_cadence + rng.random_range(0..441);
            for offset in scheduler.schedule_samples(tick, cadence) {
                let start = tick_start + offset;
                if let Some(last_start) = last_start {
                    assert!(
                        start - last_start >= min_cadence,
                        "grains at {last_start} and {start} are too close"
                    );
                }
                last_start = Some(start);
                grains += 1;
            }
            tick_start += tick;
        }
        assert!(grains > 500);
    }

    #[test]
    fn sub_sample_cadence_emits_every_tick() {
        let mut scheduler = CadenceScheduler::new();
        for _ in 0..10 {
            let schedule = scheduler.schedule_samples(64, 0);
            assert_eq!(schedule.cadence_samples(), 1);
            assert_eq!(schedule.grain_count(), 64);
        }
    }

    #[test]
    fn empty_tick_keeps_state() {
        let mut scheduler = CadenceScheduler::new();
        scheduler.schedule_samples(1000, 300).count();
        let state = scheduler.state();
        assert_eq!(scheduler.schedule_samples(0, 300).count(), 0);
        assert_eq!(scheduler.state(), state);
    }

    #[test]
    fn variable_tick_lengths_follow_cadence() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut scheduler = CadenceScheduler::new();
        let cadence = 2205;
        let mut elapsed = 0;
        let mut total = 0;
        for _ in 0..5_000 {
            let tick = rng.random_range(200..1200);
            total += scheduler.schedule_samples(tick, cadence).count();
            elapsed += tick;
        }
        // never ahead of the cadence, and late ticks only delay grains slightly
        let expected = elapsed / cadence;
        assert!(
            total <= expected + 1 && total * 100 >= expected * 96,
            "{total} vs {expected}"
        );
    }

    #[test]
    fn jitter_is_resampled_per_tick() {
        let parameters = CadenceParameters {
            sample_rate: 44100,
            cadence_ms: 1.0,
            cadence_jitter_ms: 10.0,
        };
        let mut rng = SmallRng::seed_from_u64(7);
        let mut scheduler = CadenceScheduler::new();
        let cadences = (0..32)
            .map(|_| {
                scheduler
                    .schedule(Duration::from_millis(10), &parameters, &mut rng)
                    .cadence_samples()
            })
            .collect::<Vec<_>>();
        assert!(cadences.iter().all(|c| (44..=485).contains(c)));
        assert!(cadences.windows(2).any(|w| w[0] != w[1]));
    }
}
