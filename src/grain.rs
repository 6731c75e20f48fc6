//! Grain descriptors and the data the scheduler reads from its collaborators.

use glam::Vec3;

// -------------------------------------------------------------------------------------------------

/// Opaque reference to an audio clip. Resolved by the voice which renders the grain, e.g. via a
/// [`ClipBank`](crate::ClipBank).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub usize);

/// Opaque handle of some other body which took part in a collision.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u64);

// -------------------------------------------------------------------------------------------------

/// Read-only state of the moving body which emits grains, supplied with every tick.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct SourceBody {
    /// World space position.
    pub position: Vec3,
    /// World space velocity in units per second.
    pub velocity: Vec3,
    /// Mass, passed along to all grains.
    pub mass: f32,
}

// -------------------------------------------------------------------------------------------------

/// A raw collision, as reported by the physics collaborator.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CollisionEvent {
    /// World space intersection point.
    pub intersection: Vec3,
    /// The body the source collided with.
    pub other: BodyHandle,
}

// -------------------------------------------------------------------------------------------------

/// Immutable description of a single scheduled grain: everything a voice needs to render it.
///
/// Descriptors are plain values. Dispatching one into a voice copies it, so the scheduler's copy
/// can be discarded right after.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct GrainDescriptor {
    /// Source position in the granulator's local coordinate frame.
    pub source_position: Vec3,
    /// Source velocity.
    pub source_velocity: Vec3,
    /// Source mass.
    pub source_mass: f32,
    /// The clip the grain plays.
    pub clip: ClipId,
    /// Start delay in sample frames, relative to the tick which dispatched the grain.
    pub sample_offset: usize,
    /// Grain length in milliseconds.
    pub duration_ms: f32,
    /// Normalized clip position (0..=1) the grain starts playing from.
    pub playhead_position: f32,
    /// Playback speed factor.
    pub pitch: f32,
    /// Volume factor.
    pub volume: f32,
}

impl GrainDescriptor {
    /// Grain duration in sample frames at the given sample rate. Never zero.
    pub fn duration_in_samples(&self, sample_rate: u32) -> usize {
        ((self.duration_ms.max(0.0) as f64 * sample_rate as f64 / 1000.0).round() as usize).max(1)
    }
}
