//! Randomized per-category grain emission parameters.

use four_cc::FourCC;
use rand::Rng;

use crate::{
    error::Error,
    grain::ClipId,
    parameter::{
        BooleanParameter, BooleanParameterValue, FloatParameter, FloatParameterValue, Parameter,
        ParameterValueUpdate,
    },
};

// -------------------------------------------------------------------------------------------------

/// Grain emission categories. Each category has its own [`EmissionProfile`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::VariantNames,
)]
#[repr(u8)]
pub enum EmissionCategory {
    /// Grains which play back continuously, driven by the cadence scheduler.
    Emitter,
    /// Grains which are triggered in bursts by discrete events such as collisions.
    Collision,
}

// -------------------------------------------------------------------------------------------------

/// Base values and random jitter amounts for grains of one [`EmissionCategory`].
///
/// All setters clamp into the valid domain. Per grain values are sampled when creating a grain
/// descriptor and never written back into the profile:
/// - position: `base + U[0, jitter)`, clamped to `0..=1`
/// - duration: `base + U[0, jitter)`, clamped to `2..=1000` ms
/// - pitch: `base + U[-jitter, jitter)`, clamped to `0.1..=5`
/// - volume: `base + U[-jitter, jitter)`, clamped to `0..=3`
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionProfile {
    enabled: bool,
    clip: ClipId,
    position: f32,
    position_jitter: f32,
    duration_ms: f32,
    duration_jitter_ms: f32,
    pitch: f32,
    pitch_jitter: f32,
    volume: f32,
    volume_jitter: f32,
}

impl Default for EmissionProfile {
    fn default() -> Self {
        Self {
            enabled: Self::ENABLED.default_value(),
            clip: ClipId::default(),
            position: Self::POSITION.default_value(),
            position_jitter: Self::POSITION_JITTER.default_value(),
            duration_ms: Self::DURATION.default_value(),
            duration_jitter_ms: Self::DURATION_JITTER.default_value(),
            pitch: Self::PITCH.default_value(),
            pitch_jitter: Self::PITCH_JITTER.default_value(),
            volume: Self::VOLUME.default_value(),
            volume_jitter: Self::VOLUME_JITTER.default_value(),
        }
    }
}

impl EmissionProfile {
    pub const ENABLED: BooleanParameter =
        BooleanParameter::new(FourCC(*b"gena"), "Enabled", true);
    pub const POSITION: FloatParameter =
        FloatParameter::new(FourCC(*b"gpos"), "Position", 0.0..=1.0, 0.0);
    pub const POSITION_JITTER: FloatParameter =
        FloatParameter::new(FourCC(*b"gpoj"), "Position Jitter", 0.0..=1.0, 0.0);
    pub const DURATION: FloatParameter =
        FloatParameter::new(FourCC(*b"gdur"), "Duration", 2.0..=1000.0, 300.0).with_unit("ms");
    pub const DURATION_JITTER: FloatParameter =
        FloatParameter::new(FourCC(*b"gduj"), "Duration Jitter", 0.0..=1000.0, 0.0)
            .with_unit("ms");
    pub const PITCH: FloatParameter = FloatParameter::new(FourCC(*b"gpit"), "Pitch", 0.1..=5.0, 1.0);
    pub const PITCH_JITTER: FloatParameter =
        FloatParameter::new(FourCC(*b"gpij"), "Pitch Jitter", 0.0..=1.0, 0.0);
    pub const VOLUME: FloatParameter =
        FloatParameter::new(FourCC(*b"gvol"), "Volume", 0.0..=3.0, 1.0);
    pub const VOLUME_JITTER: FloatParameter =
        FloatParameter::new(FourCC(*b"gvoj"), "Volume Jitter", 0.0..=1.0, 0.0);

    /// Create a new profile with default values, playing the given clip.
    pub fn new(clip: ClipId) -> Self {
        Self {
            clip,
            ..Self::default()
        }
    }

    /// Builder style setter for the base values.
    pub fn with_base(mut self, position: f32, duration_ms: f32, pitch: f32, volume: f32) -> Self {
        self.set_position(position);
        self.set_duration_ms(duration_ms);
        self.set_pitch(pitch);
        self.set_volume(volume);
        self
    }

    /// Builder style setter for the jitter amounts.
    pub fn with_jitter(
        mut self,
        position: f32,
        duration_ms: f32,
        pitch: f32,
        volume: f32,
    ) -> Self {
        self.set_position_jitter(position);
        self.set_duration_jitter_ms(duration_ms);
        self.set_pitch_jitter(pitch);
        self.set_volume_jitter(volume);
        self
    }

    /// Descriptions of all parameters of a profile.
    pub fn parameters() -> [&'static dyn Parameter; 9] {
        [
            &Self::ENABLED,
            &Self::POSITION,
            &Self::POSITION_JITTER,
            &Self::DURATION,
            &Self::DURATION_JITTER,
            &Self::PITCH,
            &Self::PITCH_JITTER,
            &Self::VOLUME,
            &Self::VOLUME_JITTER,
        ]
    }

    /// Apply a parameter update to the profile. Values get clamped into the parameter's range.
    pub fn apply_parameter_update(
        &mut self,
        id: FourCC,
        update: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        fn updated(description: FloatParameter, value: f32, update: &ParameterValueUpdate) -> f32 {
            let mut value = FloatParameterValue::from_description(description).with_value(value);
            value.apply_update(update);
            value.value()
        }
        match id {
            _ if id == Self::ENABLED.id() => {
                let mut value = BooleanParameterValue::from_description(Self::ENABLED);
                value.set_value(self.enabled);
                value.apply_update(update);
                self.enabled = value.value();
            }
            _ if id == Self::POSITION.id() => {
                self.position = updated(Self::POSITION, self.position, update)
            }
            _ if id == Self::POSITION_JITTER.id() => {
                self.position_jitter = updated(Self::POSITION_JITTER, self.position_jitter, update)
            }
            _ if id == Self::DURATION.id() => {
                self.duration_ms = updated(Self::DURATION, self.duration_ms, update)
            }
            _ if id == Self::DURATION_JITTER.id() => {
                self.duration_jitter_ms =
                    updated(Self::DURATION_JITTER, self.duration_jitter_ms, update)
            }
            _ if id == Self::PITCH.id() => self.pitch = updated(Self::PITCH, self.pitch, update),
            _ if id == Self::PITCH_JITTER.id() => {
                self.pitch_jitter = updated(Self::PITCH_JITTER, self.pitch_jitter, update)
            }
            _ if id == Self::VOLUME.id() => {
                self.volume = updated(Self::VOLUME, self.volume, update)
            }
            _ if id == Self::VOLUME_JITTER.id() => {
                self.volume_jitter = updated(Self::VOLUME_JITTER, self.volume_jitter, update)
            }
            _ => {
                return Err(Error::ParameterError(format!(
                    "Unknown emission profile parameter: '{id}'"
                )))
            }
        }
        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn clip(&self) -> ClipId {
        self.clip
    }
    pub fn set_clip(&mut self, clip: ClipId) {
        self.clip = clip;
    }

    pub fn position(&self) -> f32 {
        self.position
    }
    pub fn set_position(&mut self, position: f32) {
        self.position = Self::POSITION.clamp_value(position);
    }
    pub fn position_jitter(&self) -> f32 {
        self.position_jitter
    }
    pub fn set_position_jitter(&mut self, jitter: f32) {
        self.position_jitter = Self::POSITION_JITTER.clamp_value(jitter);
    }

    pub fn duration_ms(&self) -> f32 {
        self.duration_ms
    }
    pub fn set_duration_ms(&mut self, duration_ms: f32) {
        self.duration_ms = Self::DURATION.clamp_value(duration_ms);
    }
    pub fn duration_jitter_ms(&self) -> f32 {
        self.duration_jitter_ms
    }
    pub fn set_duration_jitter_ms(&mut self, jitter: f32) {
        self.duration_jitter_ms = Self::DURATION_JITTER.clamp_value(jitter);
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = Self::PITCH.clamp_value(pitch);
    }
    pub fn pitch_jitter(&self) -> f32 {
        self.pitch_jitter
    }
    pub fn set_pitch_jitter(&mut self, jitter: f32) {
        self.pitch_jitter = Self::PITCH_JITTER.clamp_value(jitter);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = Self::VOLUME.clamp_value(volume);
    }
    pub fn volume_jitter(&self) -> f32 {
        self.volume_jitter
    }
    pub fn set_volume_jitter(&mut self, jitter: f32) {
        self.volume_jitter = Self::VOLUME_JITTER.clamp_value(jitter);
    }

    /// Sample a playhead position for a new grain.
    pub fn sample_position<R: Rng>(&self, rng: &mut R) -> f32 {
        Self::POSITION.clamp_value(self.position + unipolar(rng, self.position_jitter))
    }

    /// Sample a grain duration in milliseconds for a new grain.
    pub fn sample_duration_ms<R: Rng>(&self, rng: &mut R) -> f32 {
        Self::DURATION.clamp_value(self.duration_ms + unipolar(rng, self.duration_jitter_ms))
    }

    /// Sample a pitch for a new grain.
    pub fn sample_pitch<R: Rng>(&self, rng: &mut R) -> f32 {
        Self::PITCH.clamp_value(self.pitch + bipolar(rng, self.pitch_jitter))
    }

    /// Sample a volume for a new grain.
    pub fn sample_volume<R: Rng>(&self, rng: &mut R) -> f32 {
        Self::VOLUME.clamp_value(self.volume + bipolar(rng, self.volume_jitter))
    }
}

// -------------------------------------------------------------------------------------------------

#[inline]
fn unipolar<R: Rng>(rng: &mut R, jitter: f32) -> f32 {
    if jitter > 0.0 {
        rng.random::<f32>() * jitter
    } else {
        0.0
    }
}

#[inline]
fn bipolar<R: Rng>(rng: &mut R, jitter: f32) -> f32 {
    if jitter > 0.0 {
        (rng.random::<f32>() * 2.0 - 1.0) * jitter
    } else {
        0.0
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn setters_clamp() {
        let mut profile = EmissionProfile::default();
        profile.set_duration_ms(0.5);
        assert_eq!(profile.duration_ms(), 2.0);
        profile.set_duration_ms(5000.0);
        assert_eq!(profile.duration_ms(), 1000.0);
        profile.set_pitch(0.0);
        assert_eq!(profile.pitch(), 0.1);
        profile.set_pitch(1.5);
        assert_eq!(profile.pitch(), 1.5);
        profile.set_volume(-1.0);
        assert_eq!(profile.volume(), 0.0);
        profile.set_position(2.0);
        assert_eq!(profile.position(), 1.0);
    }

    #[test]
    fn sampling_stays_in_domain() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let profile = EmissionProfile::default()
            .with_base(0.9, 990.0, 4.8, 2.9)
            .with_jitter(1.0, 1000.0, 1.0, 1.0);
        for _ in 0..1000 {
            let position = profile.sample_position(&mut rng);
            assert!((0.0..=1.0).contains(&position));
            assert!(position >= 0.9);
            let duration = profile.sample_duration_ms(&mut rng);
            assert!((990.0..=1000.0).contains(&duration));
            let pitch = profile.sample_pitch(&mut rng);
            assert!((3.79..=5.0).contains(&pitch));
            let volume = profile.sample_volume(&mut rng);
            assert!((1.89..=3.0).contains(&volume));
        }
        // sampling never writes back
        assert_eq!(profile.position(), 0.9);
        assert_eq!(profile.duration_ms(), 990.0);
    }

    #[test]
    fn parameter_updates() {
        let mut profile = EmissionProfile::default();
        let (id, update) = EmissionProfile::PITCH.value_update(12.0);
        profile.apply_parameter_update(id, &update).unwrap();
        assert_eq!(profile.pitch(), 5.0);
        let (id, update) = EmissionProfile::ENABLED.value_update(false);
        profile.apply_parameter_update(id, &update).unwrap();
        assert!(!profile.enabled());
        profile
            .apply_parameter_update(
                EmissionProfile::VOLUME.id(),
                &ParameterValueUpdate::Normalized(1.0),
            )
            .unwrap();
        assert_eq!(profile.volume(), 3.0);
        assert!(profile
            .apply_parameter_update(FourCC(*b"none"), &ParameterValueUpdate::Normalized(0.5))
            .is_err());
        assert_eq!(EmissionProfile::parameters().len(), 9);
    }

    #[test]
    fn no_jitter_is_deterministic() {
        let mut rng = SmallRng::seed_from_u64(1);
        let profile = EmissionProfile::default().with_base(0.25, 80.0, 2.0, 0.5);
        assert_eq!(profile.sample_position(&mut rng), 0.25);
        assert_eq!(profile.sample_duration_ms(&mut rng), 80.0);
        assert_eq!(profile.sample_pitch(&mut rng), 2.0);
        assert_eq!(profile.sample_volume(&mut rng), 0.5);
    }
}
