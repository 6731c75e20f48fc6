//! Configuration of a granulator and of the spatial bucket index.

use four_cc::FourCC;

use crate::{
    emission::{EmissionCategory, EmissionProfile},
    error::Error,
    parameter::{
        FloatParameter, FloatParameterValue, IntegerParameter, IntegerParameterValue, Parameter,
        ParameterValueUpdate,
    },
};

// -------------------------------------------------------------------------------------------------

/// Snapshot of the collision burst configuration, as used by
/// [`BurstSender::trigger_collisions`](crate::BurstSender::trigger_collisions).
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionBurst {
    /// Emission profile of all burst grains.
    pub profile: EmissionProfile,
    /// Number of grains per collision.
    pub count: usize,
    /// Time between two grains of a burst in milliseconds.
    pub spacing_ms: f32,
}

// -------------------------------------------------------------------------------------------------

/// All settings of a [`Granulator`](crate::Granulator).
///
/// Values are never rejected: all setters and parameter updates clamp into the parameter's
/// range. The sample rate, max voice and burst queue size get applied when creating a new
/// granulator, all other settings can be changed while a granulator is running.
#[derive(Debug, Clone)]
pub struct GranulatorSettings {
    sample_rate: u32,
    cadence: FloatParameterValue,
    cadence_jitter: FloatParameterValue,
    max_voices: IntegerParameterValue,
    burst_queue_size: IntegerParameterValue,
    inherit_velocity: FloatParameterValue,
    burst_count: IntegerParameterValue,
    burst_spacing: FloatParameterValue,
    emitter: EmissionProfile,
    collision: EmissionProfile,
}

impl Default for GranulatorSettings {
    fn default() -> Self {
        Self {
            sample_rate: Self::DEFAULT_SAMPLE_RATE,
            cadence: FloatParameterValue::from_description(Self::CADENCE),
            cadence_jitter: FloatParameterValue::from_description(Self::CADENCE_JITTER),
            max_voices: IntegerParameterValue::from_description(Self::MAX_VOICES),
            burst_queue_size: IntegerParameterValue::from_description(Self::BURST_QUEUE_SIZE),
            inherit_velocity: FloatParameterValue::from_description(Self::INHERIT_VELOCITY),
            burst_count: IntegerParameterValue::from_description(Self::BURST_COUNT),
            burst_spacing: FloatParameterValue::from_description(Self::BURST_SPACING),
            emitter: EmissionProfile::default(),
            collision: EmissionProfile::default(),
        }
    }
}

impl GranulatorSettings {
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    pub const CADENCE: FloatParameter =
        FloatParameter::new(FourCC(*b"cadn"), "Cadence", 1.0..=1000.0, 20.0).with_unit("ms");
    pub const CADENCE_JITTER: FloatParameter =
        FloatParameter::new(FourCC(*b"cadj"), "Cadence Jitter", 0.0..=1000.0, 0.0)
            .with_unit("ms");
    pub const MAX_VOICES: IntegerParameter =
        IntegerParameter::new(FourCC(*b"voic"), "Max Voices", 1..=1024, 100);
    pub const BURST_QUEUE_SIZE: IntegerParameter =
        IntegerParameter::new(FourCC(*b"bqsz"), "Burst Queue Size", 16..=65536, 1024);
    pub const INHERIT_VELOCITY: FloatParameter =
        FloatParameter::new(FourCC(*b"ivel"), "Inherit Velocity", 0.0..=10.0, 0.5);
    pub const BURST_COUNT: IntegerParameter =
        IntegerParameter::new(FourCC(*b"bcnt"), "Burst Count", 0..=64, 5);
    pub const BURST_SPACING: FloatParameter =
        FloatParameter::new(FourCC(*b"bspc"), "Burst Spacing", 1.0..=1000.0, 40.0)
            .with_unit("ms");

    /// Create new settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style setter for the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.set_sample_rate(sample_rate);
        self
    }

    /// Builder style setter for the base cadence and jitter in milliseconds.
    pub fn with_cadence(mut self, cadence_ms: f32, jitter_ms: f32) -> Self {
        self.set_cadence_ms(cadence_ms);
        self.set_cadence_jitter_ms(jitter_ms);
        self
    }

    /// Builder style setter for the max number of voices.
    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.set_max_voices(max_voices);
        self
    }

    /// Builder style setter for the burst queue capacity.
    pub fn with_burst_queue_size(mut self, size: usize) -> Self {
        self.burst_queue_size
            .set_value_clamped(size.min(i32::MAX as usize) as i32);
        self
    }

    /// Builder style setter for the number and spacing of collision burst grains.
    pub fn with_burst(mut self, count: usize, spacing_ms: f32) -> Self {
        self.set_burst_count(count);
        self.set_burst_spacing_ms(spacing_ms);
        self
    }

    /// Builder style setter for the continuous emitter profile.
    pub fn with_emitter(mut self, profile: EmissionProfile) -> Self {
        self.emitter = profile;
        self
    }

    /// Builder style setter for the collision profile.
    pub fn with_collision(mut self, profile: EmissionProfile) -> Self {
        self.collision = profile;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    /// Set a new sample rate. Zero sample rates fall back to the default rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = if sample_rate > 0 {
            sample_rate
        } else {
            Self::DEFAULT_SAMPLE_RATE
        };
    }

    pub fn cadence_ms(&self) -> f32 {
        self.cadence.value()
    }
    pub fn set_cadence_ms(&mut self, cadence_ms: f32) {
        self.cadence.set_value_clamped(cadence_ms);
    }
    pub fn cadence_jitter_ms(&self) -> f32 {
        self.cadence_jitter.value()
    }
    pub fn set_cadence_jitter_ms(&mut self, jitter_ms: f32) {
        self.cadence_jitter.set_value_clamped(jitter_ms);
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices.value() as usize
    }
    pub fn set_max_voices(&mut self, max_voices: usize) {
        self.max_voices
            .set_value_clamped(max_voices.min(i32::MAX as usize) as i32);
    }

    pub fn burst_queue_size(&self) -> usize {
        self.burst_queue_size.value() as usize
    }

    pub fn inherit_velocity(&self) -> f32 {
        self.inherit_velocity.value()
    }
    pub fn set_inherit_velocity(&mut self, scalar: f32) {
        self.inherit_velocity.set_value_clamped(scalar);
    }

    pub fn burst_count(&self) -> usize {
        self.burst_count.value() as usize
    }
    pub fn set_burst_count(&mut self, count: usize) {
        self.burst_count
            .set_value_clamped(count.min(i32::MAX as usize) as i32);
    }

    pub fn burst_spacing_ms(&self) -> f32 {
        self.burst_spacing.value()
    }
    pub fn set_burst_spacing_ms(&mut self, spacing_ms: f32) {
        self.burst_spacing.set_value_clamped(spacing_ms);
    }

    /// Access the emission profile of the given category.
    pub fn profile(&self, category: EmissionCategory) -> &EmissionProfile {
        match category {
            EmissionCategory::Emitter => &self.emitter,
            EmissionCategory::Collision => &self.collision,
        }
    }

    /// Mutable access to the emission profile of the given category.
    pub fn profile_mut(&mut self, category: EmissionCategory) -> &mut EmissionProfile {
        match category {
            EmissionCategory::Emitter => &mut self.emitter,
            EmissionCategory::Collision => &mut self.collision,
        }
    }

    /// Snapshot of the current collision burst settings.
    pub fn collision_burst(&self) -> CollisionBurst {
        CollisionBurst {
            profile: self.collision.clone(),
            count: self.burst_count(),
            spacing_ms: self.burst_spacing_ms(),
        }
    }

    /// Descriptions of all top level parameters. See [`EmissionProfile::parameters`] for the
    /// parameters of the emission profiles.
    pub fn parameters(&self) -> Vec<&dyn Parameter> {
        vec![
            self.cadence.description() as &dyn Parameter,
            self.cadence_jitter.description(),
            self.max_voices.description(),
            self.burst_queue_size.description(),
            self.inherit_velocity.description(),
            self.burst_count.description(),
            self.burst_spacing.description(),
        ]
    }

    /// Apply a parameter update to a top level parameter.
    pub fn set_parameter(&mut self, id: FourCC, update: &ParameterValueUpdate) -> Result<(), Error> {
        match id {
            _ if id == Self::CADENCE.id() => self.cadence.apply_update(update),
            _ if id == Self::CADENCE_JITTER.id() => self.cadence_jitter.apply_update(update),
            _ if id == Self::MAX_VOICES.id() => self.max_voices.apply_update(update),
            _ if id == Self::BURST_QUEUE_SIZE.id() => self.burst_queue_size.apply_update(update),
            _ if id == Self::INHERIT_VELOCITY.id() => self.inherit_velocity.apply_update(update),
            _ if id == Self::BURST_COUNT.id() => self.burst_count.apply_update(update),
            _ if id == Self::BURST_SPACING.id() => self.burst_spacing.apply_update(update),
            _ => {
                return Err(Error::ParameterError(format!(
                    "Unknown granulator parameter: '{id}'"
                )))
            }
        }
        Ok(())
    }

    /// Apply a parameter update to the emission profile of the given category.
    pub fn set_profile_parameter(
        &mut self,
        category: EmissionCategory,
        id: FourCC,
        update: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        self.profile_mut(category).apply_parameter_update(id, update)
    }
}

// -------------------------------------------------------------------------------------------------

/// Settings of a [`BucketIndex`](crate::BucketIndex).
#[derive(Debug, Clone)]
pub struct SpatialSettings {
    cell_size: FloatParameterValue,
    worker_threads: IntegerParameterValue,
}

impl Default for SpatialSettings {
    fn default() -> Self {
        let worker_threads = num_cpus::get().clamp(1, 64) as i32;
        Self {
            cell_size: FloatParameterValue::from_description(Self::CELL_SIZE),
            worker_threads: IntegerParameterValue::from_description(Self::WORKER_THREADS)
                .with_value(worker_threads),
        }
    }
}

impl SpatialSettings {
    pub const CELL_SIZE: FloatParameter =
        FloatParameter::new(FourCC(*b"cell"), "Cell Size", 0.001..=10000.0, 5.0);
    pub const WORKER_THREADS: IntegerParameter =
        IntegerParameter::new(FourCC(*b"thrd"), "Worker Threads", 1..=64, 4);

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style setter for the cell size.
    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.set_cell_size(cell_size);
        self
    }

    /// Builder style setter for the number of insert workers.
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.set_worker_threads(count);
        self
    }

    /// Edge length of a cubic cell in world units. Always > 0.
    pub fn cell_size(&self) -> f32 {
        self.cell_size.value()
    }
    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size.set_value_clamped(cell_size);
    }

    /// Number of threads which insert entities in parallel.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads.value() as usize
    }
    pub fn set_worker_threads(&mut self, count: usize) {
        self.worker_threads
            .set_value_clamped(count.min(i32::MAX as usize) as i32);
    }

    pub fn parameters(&self) -> Vec<&dyn Parameter> {
        vec![
            self.cell_size.description() as &dyn Parameter,
            self.worker_threads.description(),
        ]
    }

    pub fn set_parameter(&mut self, id: FourCC, update: &ParameterValueUpdate) -> Result<(), Error> {
        match id {
            _ if id == Self::CELL_SIZE.id() => self.cell_size.apply_update(update),
            _ if id == Self::WORKER_THREADS.id() => self.worker_threads.apply_update(update),
            _ => {
                return Err(Error::ParameterError(format!(
                    "Unknown spatial parameter: '{id}'"
                )))
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = GranulatorSettings::default();
        assert_eq!(settings.sample_rate(), 44100);
        assert_eq!(settings.cadence_ms(), 20.0);
        assert_eq!(settings.max_voices(), 100);
        assert_eq!(settings.inherit_velocity(), 0.5);
        assert_eq!(settings.burst_count(), 5);
        assert_eq!(settings.burst_spacing_ms(), 40.0);
        assert_eq!(settings.parameters().len(), 7);

        let spatial = SpatialSettings::default();
        assert_eq!(spatial.cell_size(), 5.0);
        assert!(spatial.worker_threads() >= 1);
    }

    #[test]
    fn clamp_on_write() {
        let mut settings = GranulatorSettings::default()
            .with_sample_rate(0)
            .with_cadence(-5.0, 2000.0)
            .with_max_voices(0)
            .with_burst(1000, 0.0);
        assert_eq!(settings.sample_rate(), 44100);
        assert_eq!(settings.cadence_ms(), 1.0);
        assert_eq!(settings.cadence_jitter_ms(), 1000.0);
        assert_eq!(settings.max_voices(), 1);
        assert_eq!(settings.burst_count(), 64);
        assert_eq!(settings.burst_spacing_ms(), 1.0);

        settings.set_cadence_ms(f32::NAN);
        assert_eq!(settings.cadence_ms(), 20.0);

        let mut spatial = SpatialSettings::default().with_cell_size(0.0);
        assert!(spatial.cell_size() > 0.0);
        spatial.set_worker_threads(0);
        assert_eq!(spatial.worker_threads(), 1);
    }

    #[test]
    fn parameter_updates() {
        let mut settings = GranulatorSettings::default();
        let (id, update) = GranulatorSettings::CADENCE.value_update(100.0);
        settings.set_parameter(id, &update).unwrap();
        assert_eq!(settings.cadence_ms(), 100.0);
        let (id, update) = GranulatorSettings::MAX_VOICES.value_update(5000);
        settings.set_parameter(id, &update).unwrap();
        assert_eq!(settings.max_voices(), 1024);
        assert!(settings
            .set_parameter(FourCC(*b"none"), &ParameterValueUpdate::Normalized(0.0))
            .is_err());

        let (id, update) = EmissionProfile::DURATION.value_update(50.0);
        settings
            .set_profile_parameter(EmissionCategory::Collision, id, &update)
            .unwrap();
        assert_eq!(settings.collision_burst().profile.duration_ms(), 50.0);
        assert_eq!(
            settings.profile(EmissionCategory::Emitter).duration_ms(),
            EmissionProfile::DURATION.default_value()
        );

        let mut spatial = SpatialSettings::default();
        let (id, update) = SpatialSettings::CELL_SIZE.value_update(2.5);
        spatial.set_parameter(id, &update).unwrap();
        assert_eq!(spatial.cell_size(), 2.5);
    }
}
