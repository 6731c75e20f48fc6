//! Fixed size pool of reusable grain voices.

use crate::{error::Error, grain::GrainDescriptor, voice::GrainVoice};

// -------------------------------------------------------------------------------------------------

/// Identifies a voice in a [`VoicePool`]. Handles stay valid for the pool's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(usize);

impl VoiceHandle {
    /// The voice's index in the pool.
    pub fn index(&self) -> usize {
        self.0
    }
}

// -------------------------------------------------------------------------------------------------

/// An idle voice, picked by [`VoicePool::acquire`], which can be started with
/// [`dispatch`](Self::dispatch).
///
/// The voice stays in the idle set until it gets dispatched: dropping the slot without
/// dispatching leaves the pool unchanged.
pub struct VacantVoice<'a, V: GrainVoice> {
    pool: &'a mut VoicePool<V>,
    handle: VoiceHandle,
}

impl<V: GrainVoice> VacantVoice<'_, V> {
    /// The handle the voice will have once dispatched.
    pub fn handle(&self) -> VoiceHandle {
        self.handle
    }

    /// Copy the given grain into the voice, start it and move it into the active set.
    pub fn dispatch(self, grain: &GrainDescriptor) -> VoiceHandle {
        let pool = self.pool;
        let handle = self.handle;
        // the slot borrows the pool mutably, so its voice still is the last idle one
        let popped = pool.idle.pop();
        debug_assert_eq!(popped, Some(handle));
        pool.voices[handle.0].start(grain);
        pool.active.push(handle);
        handle
    }
}

// -------------------------------------------------------------------------------------------------

/// A fixed size set of reusable voices, partitioned into idle and active voices.
///
/// Every voice is either idle or active, so `active_count() + idle_count() == capacity()` holds
/// after every operation. Voices only become idle again via [`reclaim`](Self::reclaim): they
/// report being finished on their own, but never remove themselves from the active set.
///
/// All sets are preallocated, so acquiring, dispatching and reclaiming never allocates.
pub struct VoicePool<V: GrainVoice> {
    voices: Vec<V>,
    idle: Vec<VoiceHandle>,
    active: Vec<VoiceHandle>,
}

impl<V: GrainVoice> VoicePool<V> {
    /// Create a new pool of `capacity` voices, using the given factory to create them.
    ///
    /// The capacity is clamped to at least one voice.
    pub fn new<F>(capacity: usize, mut voice_factory: F) -> Self
    where
        F: FnMut(usize) -> V,
    {
        let capacity = capacity.max(1);
        let voices = (0..capacity).map(&mut voice_factory).collect::<Vec<_>>();
        // pop from the back hands out voices in index order
        let mut idle = Vec::with_capacity(capacity);
        idle.extend((0..capacity).rev().map(VoiceHandle));
        let active = Vec::with_capacity(capacity);
        Self {
            voices,
            idle,
            active,
        }
    }

    /// Total number of voices.
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices which are playing a grain.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of voices which can be dispatched.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Handles of all active voices, in dispatch order.
    pub fn active_voices(&self) -> &[VoiceHandle] {
        &self.active
    }

    /// Access a voice by handle.
    pub fn voice(&self, handle: VoiceHandle) -> &V {
        &self.voices[handle.0]
    }

    /// Mutable access to a voice by handle.
    pub fn voice_mut(&mut self, handle: VoiceHandle) -> &mut V {
        &mut self.voices[handle.0]
    }

    /// Pick an idle voice for dispatching.
    ///
    /// Returns [`Error::PoolExhausted`] when all voices are active. This is recoverable: callers
    /// should drop the grain and must not wait for a voice to become free.
    pub fn acquire(&mut self) -> Result<VacantVoice<'_, V>, Error> {
        let handle = *self.idle.last().ok_or(Error::PoolExhausted)?;
        Ok(VacantVoice { pool: self, handle })
    }

    /// Acquire an idle voice and start the given grain in it.
    pub fn dispatch(&mut self, grain: &GrainDescriptor) -> Result<VoiceHandle, Error> {
        Ok(self.acquire()?.dispatch(grain))
    }

    /// Move all active voices which report being finished back into the idle set.
    /// Returns the number of reclaimed voices.
    pub fn reclaim(&mut self) -> usize {
        let voices = &self.voices;
        let idle = &mut self.idle;
        let active_count = self.active.len();
        // single pass, which keeps the dispatch order of the remaining voices
        self.active.retain(|handle| {
            let finished = voices[handle.0].is_finished();
            if finished {
                idle.push(*handle);
            }
            !finished
        });
        active_count - self.active.len()
    }

    /// Stop all active voices and move them back into the idle set.
    pub fn stop_all(&mut self) {
        for handle in self.active.drain(..) {
            self.voices[handle.0].stop();
            self.idle.push(handle);
        }
    }

    /// Render and mix all active voices into the given interleaved output buffer.
    pub fn process(&mut self, output: &mut [f32], channel_count: usize) {
        for handle in &self.active {
            let voice = &mut self.voices[handle.0];
            if !voice.is_finished() {
                voice.process(output, channel_count);
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
