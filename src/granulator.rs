//! The tick driver: schedules continuous and burst grains and dispatches them into a voice pool.

use std::{sync::Arc, time::Duration};

use glam::Affine3A;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    burst::{BurstQueue, BurstSender},
    cadence::{CadenceParameters, CadenceScheduler, CadenceState},
    emission::EmissionCategory,
    error::Error,
    grain::{GrainDescriptor, SourceBody},
    pool::VoicePool,
    settings::GranulatorSettings,
    utils::{assert_no_alloc, permit_alloc},
    voice::{sample::SampleVoice, ClipBank, GrainVoice},
};

// -------------------------------------------------------------------------------------------------

/// Summary of a single [`Granulator::tick`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Length of the tick in sample frames.
    pub tick_samples: usize,
    /// Number of voices which finished since the last tick and got reclaimed.
    pub reclaimed: usize,
    /// Number of continuous grains scheduled by the cadence scheduler.
    pub continuous: usize,
    /// Number of burst grains drained from the burst queue.
    pub bursts: usize,
    /// Number of grains which got dispatched into a voice.
    pub dispatched: usize,
    /// Number of grains which got dropped because no voice was available.
    pub dropped: usize,
}

// -------------------------------------------------------------------------------------------------

/// Drives a single grain emitter: invoked once per update tick, it schedules continuous grains
/// via a [`CadenceScheduler`], merges grains from the [`BurstQueue`] and dispatches all of them
/// into a fixed size [`VoicePool`].
///
/// Each tick runs the following steps in this order:
/// 1. reclaim finished voices, so grains of this tick can reuse them
/// 2. schedule continuous grains for the elapsed time
/// 3. drain burst grains which got enqueued since the last tick
/// 4. dispatch all grains, dropping the ones no voice is left for
/// 5. clear the tick's grain list
///
/// Ticks never allocate: the grain list is preallocated with the pool's capacity.
pub struct Granulator<V: GrainVoice = SampleVoice, R: Rng = SmallRng> {
    settings: GranulatorSettings,
    sample_rate: u32,
    scheduler: CadenceScheduler,
    pool: VoicePool<V>,
    bursts: BurstQueue,
    grains: Vec<GrainDescriptor>,
    max_grains: usize,
    rng: R,
    dropped_grains: u64,
}

impl Granulator<SampleVoice, SmallRng> {
    /// Create a new granulator which renders grains with [`SampleVoice`]s, reading clips from
    /// the given clip bank.
    pub fn new(settings: GranulatorSettings, clips: Arc<ClipBank>) -> Self {
        let sample_rate = settings.sample_rate();
        Self::with_voice_factory(settings, |_| {
            SampleVoice::new(Arc::clone(&clips), sample_rate)
        })
    }
}

impl<V: GrainVoice> Granulator<V, SmallRng> {
    /// Create a new granulator with custom voices. The factory gets called once for each voice,
    /// with the voice's index in the pool.
    pub fn with_voice_factory<F>(settings: GranulatorSettings, voice_factory: F) -> Self
    where
        F: FnMut(usize) -> V,
    {
        let sample_rate = settings.sample_rate();
        let max_voices = settings.max_voices();
        let pool = VoicePool::new(max_voices, voice_factory);
        let bursts = BurstQueue::new(settings.burst_queue_size());
        let max_grains = pool.capacity();
        let grains = Vec::with_capacity(max_grains);
        let rng = SmallRng::from_rng(&mut rand::rng());
        Self {
            settings,
            sample_rate,
            scheduler: CadenceScheduler::new(),
            pool,
            bursts,
            grains,
            max_grains,
            rng,
            dropped_grains: 0,
        }
    }
}

impl<V: GrainVoice, R: Rng> Granulator<V, R> {
    /// Use the given random number generator for continuous grains, e.g. a seeded one.
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Granulator<V, R2> {
        Granulator {
            settings: self.settings,
            sample_rate: self.sample_rate,
            scheduler: self.scheduler,
            pool: self.pool,
            bursts: self.bursts,
            grains: self.grains,
            max_grains: self.max_grains,
            rng,
            dropped_grains: self.dropped_grains,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &GranulatorSettings {
        &self.settings
    }

    /// Mutable access to the settings. Changes apply with the next tick. The sample rate, max
    /// voice and burst queue size are fixed once the granulator got created.
    pub fn settings_mut(&mut self) -> &mut GranulatorSettings {
        &mut self.settings
    }

    /// Sample rate the granulator schedules grains with.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The voice pool.
    pub fn pool(&self) -> &VoicePool<V> {
        &self.pool
    }

    /// The cadence scheduler's timing state.
    pub fn cadence_state(&self) -> CadenceState {
        self.scheduler.state()
    }

    /// Total number of grains which got dropped since the granulator got created.
    pub fn dropped_grains(&self) -> u64 {
        self.dropped_grains
    }

    /// Create a new producer handle for burst grains, which can be moved to other threads.
    pub fn burst_sender(&self) -> BurstSender {
        self.bursts.sender(self.sample_rate)
    }

    /// Number of burst grains which wait for the next tick.
    pub fn pending_bursts(&self) -> usize {
        self.bursts.len()
    }

    /// Stop all voices, drop pending bursts and reset timing.
    pub fn reset(&mut self) {
        self.pool.stop_all();
        self.bursts.clear();
        self.scheduler.reset();
        self.grains.clear();
    }

    /// Run a single update tick.
    ///
    /// `elapsed` is the time since the last tick. `source` is the current state of the moving
    /// body the grains are emitted from and `local_to_world` the granulator's transform, which
    /// is used to move source positions into the granulator's local frame.
    pub fn tick(
        &mut self,
        elapsed: Duration,
        source: &SourceBody,
        local_to_world: &Affine3A,
    ) -> TickReport {
        assert_no_alloc(|| self.process_tick(elapsed, source, local_to_world))
    }

    /// Render and mix all active voices into the given interleaved output buffer.
    pub fn process(&mut self, output: &mut [f32], channel_count: usize) {
        self.pool.process(output, channel_count);
    }

    fn process_tick(
        &mut self,
        elapsed: Duration,
        source: &SourceBody,
        local_to_world: &Affine3A,
    ) -> TickReport {
        debug_assert!(self.grains.is_empty());
        let mut report = TickReport {
            reclaimed: self.pool.reclaim(),
            ..Default::default()
        };
        let mut dropped = 0;

        // Continuous grains
        let parameters = CadenceParameters {
            sample_rate: self.sample_rate,
            cadence_ms: self.settings.cadence_ms(),
            cadence_jitter_ms: self.settings.cadence_jitter_ms(),
        };
        let schedule = self.scheduler.schedule(elapsed, &parameters, &mut self.rng);
        report.tick_samples = schedule.tick_samples();

        let profile = self.settings.profile(EmissionCategory::Emitter);
        if profile.enabled() && schedule.grain_count() > 0 {
            let world_to_local = local_to_world.inverse();
            let source_position = world_to_local.transform_point3(source.position);
            let source_velocity = world_to_local.transform_vector3(source.velocity)
                * self.settings.inherit_velocity();
            report.continuous = schedule.grain_count();
            for sample_offset in schedule {
                if self.grains.len() >= self.max_grains {
                    dropped += 1;
                    continue;
                }
                self.grains.push(GrainDescriptor {
                    source_position,
                    source_velocity,
                    source_mass: source.mass,
                    clip: profile.clip(),
                    sample_offset,
                    duration_ms: profile.sample_duration_ms(&mut self.rng),
                    playhead_position: profile.sample_position(&mut self.rng),
                    pitch: profile.sample_pitch(&mut self.rng),
                    volume: profile.sample_volume(&mut self.rng),
                });
            }
        }

        // Burst grains
        let grains = &mut self.grains;
        let max_grains = self.max_grains;
        report.bursts = self.bursts.drain(|grain| {
            if grains.len() < max_grains {
                grains.push(grain);
            } else {
                dropped += 1;
            }
        });

        // Dispatch
        for (index, grain) in self.grains.iter().enumerate() {
            match self.pool.dispatch(grain) {
                Ok(_) => report.dispatched += 1,
                Err(err) => {
                    debug_assert_eq!(err, Error::PoolExhausted);
                    dropped += self.grains.len() - index;
                    break;
                }
            }
        }
        self.grains.clear();

        if dropped > 0 {
            self.dropped_grains += dropped as u64;
            let total = self.dropped_grains;
            permit_alloc(|| {
                log::warn!(
                    "Voice pool exhausted: dropped {dropped} grain(s) in this tick, {total} in total"
                );
            });
        }
        report.dropped = dropped;
        report
    }
}

// -------------------------------------------------------------------------------------------------
