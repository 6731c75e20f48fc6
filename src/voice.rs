//! Grain voices: reusable objects which render a single dispatched grain.

use std::sync::Arc;

use crate::grain::{ClipId, GrainDescriptor};

// -------------------------------------------------------------------------------------------------

pub(crate) mod sample;
pub(crate) mod window;

// -------------------------------------------------------------------------------------------------

/// A reusable voice which renders one grain at a time.
///
/// Voices are owned by a [`VoicePool`](crate::VoicePool). The pool starts them with a copy of
/// a [`GrainDescriptor`] and reclaims them once they report that they finished. A voice must
/// delay its output by the descriptor's `sample_offset` on its own and must report being
/// finished once its offset plus its duration elapsed.
pub trait GrainVoice: Send {
    /// Start playing the given grain. Called for idle voices only.
    fn start(&mut self, grain: &GrainDescriptor);

    /// The grain the voice is playing or played last.
    fn grain(&self) -> Option<&GrainDescriptor>;

    /// True when the voice played its grain completely or got stopped.
    fn is_finished(&self) -> bool;

    /// Stop playback immediately, marking the voice as finished.
    fn stop(&mut self);

    /// Render and mix (add) the next `output.len() / channel_count` frames of the grain
    /// into the given interleaved output buffer. Returns the number of frames which advanced
    /// the voice's playback clock.
    fn process(&mut self, output: &mut [f32], channel_count: usize) -> usize;
}

// -------------------------------------------------------------------------------------------------

/// A collection of preloaded mono audio clips, resolved by [`ClipId`].
///
/// Clips get registered before the bank is shared with voices, so voices can read them without
/// any locking.
#[derive(Debug, Default, Clone)]
pub struct ClipBank {
    clips: Vec<Arc<Box<[f32]>>>,
}

impl ClipBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new mono clip and return its id.
    pub fn insert<S: Into<Box<[f32]>>>(&mut self, samples: S) -> ClipId {
        let id = ClipId(self.clips.len());
        self.clips.push(Arc::new(samples.into()));
        id
    }

    /// Access a clip's samples. Returns `None` for unknown ids.
    pub fn get(&self, id: ClipId) -> Option<&Arc<Box<[f32]>>> {
        self.clips.get(id.0)
    }

    /// Number of registered clips.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
