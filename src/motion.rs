//! Maps the motion of a source body onto emitter parameters.

use std::{ops::RangeInclusive, time::Duration};

use glam::Vec3;

use crate::{emission::EmissionCategory, settings::GranulatorSettings};

// -------------------------------------------------------------------------------------------------

/// Emitter values which got applied by the last [`MotionMapper::update`].
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct MotionMapping {
    /// Normalized playhead position.
    pub position: f32,
    /// Emitter pitch.
    pub pitch: f32,
    /// Smoothed speed of the source in units per second.
    pub speed: f32,
    /// Emitter cadence in milliseconds.
    pub cadence_ms: f32,
}

// -------------------------------------------------------------------------------------------------

/// Turns gestures into sound: maps the local x position of a source over a range to the
/// emitter's playhead position, its y position to the emitter's pitch and its smoothed speed to
/// the emitter cadence, so faster motion emits denser grains.
#[derive(Debug, Clone)]
pub struct MotionMapper {
    position_range: RangeInclusive<f32>,
    pitch_range: RangeInclusive<f32>,
    pitch_scalar: f32,
    speed_range: RangeInclusive<f32>,
    cadence_range: RangeInclusive<f32>,
    smoothing: f32,
    last_position: Option<Vec3>,
    velocity: Vec3,
}

impl Default for MotionMapper {
    fn default() -> Self {
        Self {
            position_range: -3.0..=3.0,
            pitch_range: 0.0..=3.0,
            pitch_scalar: 1.5,
            speed_range: 0.0..=2.0,
            cadence_range: 500.0..=5.0,
            smoothing: 8.0,
            last_position: None,
            velocity: Vec3::ZERO,
        }
    }
}

impl MotionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style setter for the x range which maps to playhead positions 0..=1.
    pub fn with_position_range(mut self, range: RangeInclusive<f32>) -> Self {
        self.position_range = range;
        self
    }

    /// Builder style setter for the y range which maps to pitches `0..=pitch_scalar`.
    pub fn with_pitch_range(mut self, range: RangeInclusive<f32>, pitch_scalar: f32) -> Self {
        self.pitch_range = range;
        self.pitch_scalar = pitch_scalar;
        self
    }

    /// Builder style setter for the speed range which maps to the given cadence range.
    /// The cadence at the range start applies for slow motion.
    pub fn with_speed_range(
        mut self,
        speed_range: RangeInclusive<f32>,
        cadence_range: RangeInclusive<f32>,
    ) -> Self {
        self.speed_range = speed_range;
        self.cadence_range = cadence_range;
        self
    }

    /// Builder style setter for the velocity smoothing rate (per second).
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing.max(0.0);
        self
    }

    /// The current smoothed velocity.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Forget the motion history.
    pub fn reset(&mut self) {
        self.last_position = None;
        self.velocity = Vec3::ZERO;
    }

    /// Feed the source's current local position and write the mapped values into the emitter
    /// profile and cadence of the given settings. Values get clamped by the settings.
    pub fn update(
        &mut self,
        elapsed: Duration,
        local_position: Vec3,
        settings: &mut GranulatorSettings,
    ) -> MotionMapping {
        let delta_time = elapsed.as_secs_f32();
        if let Some(last_position) = self.last_position {
            if delta_time > 0.0 {
                let velocity = (local_position - last_position) / delta_time;
                let amount = (delta_time * self.smoothing).clamp(0.0, 1.0);
                self.velocity = self.velocity.lerp(velocity, amount);
            }
        }
        self.last_position = Some(local_position);

        let position = inverse_lerp(&self.position_range, local_position.x);
        let pitch = inverse_lerp(&self.pitch_range, local_position.y) * self.pitch_scalar;
        let speed = self.velocity.length();
        let cadence_ms = lerp(
            &self.cadence_range,
            inverse_lerp(&self.speed_range, speed),
        );

        let profile = settings.profile_mut(EmissionCategory::Emitter);
        profile.set_position(position);
        profile.set_pitch(pitch);
        settings.set_cadence_ms(cadence_ms);

        let profile = settings.profile(EmissionCategory::Emitter);
        MotionMapping {
            position: profile.position(),
            pitch: profile.pitch(),
            speed,
            cadence_ms: settings.cadence_ms(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Position of `value` in the given range, clamped to `0..=1`. Empty ranges map to 0.
fn inverse_lerp(range: &RangeInclusive<f32>, value: f32) -> f32 {
    let (start, end) = (*range.start(), *range.end());
    if (end - start).abs() <= f32::EPSILON {
        return 0.0;
    }
    ((value - start) / (end - start)).clamp(0.0, 1.0)
}

fn lerp(range: &RangeInclusive<f32>, amount: f32) -> f32 {
    let (start, end) = (*range.start(), *range.end());
    start + (end - start) * amount
}

// -------------------------------------------------------------------------------------------------
