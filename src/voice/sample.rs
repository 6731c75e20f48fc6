use std::sync::Arc;

use assume::assume;

use crate::grain::GrainDescriptor;

use super::{window::GrainWindowMode, ClipBank, GrainVoice};

// -------------------------------------------------------------------------------------------------

/// Default [`GrainVoice`] implementation which plays back a windowed slice of a mono clip from
/// a [`ClipBank`].
///
/// The grain starts after its sample offset elapsed, reads the clip from the grain's playhead
/// position on with the grain's pitch as playback speed, wraps around at the clip's end and
/// writes the windowed, amplified mono signal into all output channels. Unknown clips play
/// silence, but still finish in time.
#[derive(Debug, Clone)]
pub struct SampleVoice {
    /// Resolves the grain's clip.
    clips: Arc<ClipBank>,
    /// Output sample rate.
    sample_rate: u32,
    /// Window shape for all grains of this voice.
    window_mode: GrainWindowMode,
    /// Last started grain.
    grain: Option<GrainDescriptor>,
    /// Frames to wait until the grain becomes audible.
    delay_remaining: usize,
    /// Frames left to play once the delay elapsed.
    samples_remaining: usize,
    /// Current read position in the clip, in frames.
    position: f64,
    /// Clip read position increment per output frame.
    increment: f64,
    /// Current position of the window envelope (0.0 to 1.0).
    window_phase: f64,
    /// Amount to increment window_phase each frame.
    window_increment: f64,
    /// Grain volume.
    volume: f32,
    /// Set when the grain played completely or got stopped.
    finished: bool,
}

impl SampleVoice {
    pub fn new(clips: Arc<ClipBank>, sample_rate: u32) -> Self {
        Self {
            clips,
            sample_rate,
            window_mode: GrainWindowMode::default(),
            grain: None,
            delay_remaining: 0,
            samples_remaining: 0,
            position: 0.0,
            increment: 0.0,
            window_phase: 0.0,
            window_increment: 0.0,
            volume: 1.0,
            finished: true,
        }
    }

    /// Use the given window shape for all following grains.
    pub fn with_window(mut self, window_mode: GrainWindowMode) -> Self {
        self.window_mode = window_mode;
        self
    }

    /// Frames which still need to be processed until the voice finishes.
    pub fn remaining_frames(&self) -> usize {
        self.delay_remaining + self.samples_remaining
    }
}

impl GrainVoice for SampleVoice {
    fn start(&mut self, grain: &GrainDescriptor) {
        let duration = grain.duration_in_samples(self.sample_rate);
        let clip_len = self
            .clips
            .get(grain.clip)
            .map(|clip| clip.len())
            .unwrap_or(0);

        self.grain = Some(*grain);
        self.delay_remaining = grain.sample_offset;
        self.samples_remaining = duration;
        self.position = grain.playhead_position.clamp(0.0, 1.0) as f64 * clip_len as f64;
        self.increment = grain.pitch.max(0.0) as f64;
        self.window_phase = 0.0;
        self.window_increment = 1.0 / duration as f64;
        self.volume = grain.volume.max(0.0);
        self.finished = false;
    }

    fn grain(&self) -> Option<&GrainDescriptor> {
        self.grain.as_ref()
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn stop(&mut self) {
        self.delay_remaining = 0;
        self.samples_remaining = 0;
        self.finished = true;
    }

    fn process(&mut self, output: &mut [f32], channel_count: usize) -> usize {
        if self.finished || channel_count == 0 {
            return 0;
        }
        let frame_count = output.len() / channel_count;

        // Wait until the grain's start offset elapsed
        let delay = self.delay_remaining.min(frame_count);
        self.delay_remaining -= delay;
        let playing = self.samples_remaining.min(frame_count - delay);

        let clips = &self.clips;
        match self.grain.and_then(|grain| clips.get(grain.clip)) {
            Some(clip) if !clip.is_empty() => {
                let clip_len = clip.len();
                for frame in output[delay * channel_count..]
                    .chunks_exact_mut(channel_count)
                    .take(playing)
                {
                    let index = (self.position as usize) % clip_len;
                    assume!(unsafe: index < clip_len);
                    let envelope = self.window_mode.gain(self.window_phase);
                    let value = clip[index] * envelope * self.volume;
                    for sample in frame.iter_mut() {
                        *sample += value;
                    }
                    self.position += self.increment;
                    if self.position >= clip_len as f64 {
                        self.position -= clip_len as f64;
                    }
                    self.window_phase += self.window_increment;
                }
            }
            _ => {
                // render silence, but keep the clock running
            }
        }

        self.samples_remaining -= playing;
        if self.delay_remaining == 0 && self.samples_remaining == 0 {
            self.finished = true;
        }
        delay + playing
    }
}

// -------------------------------------------------------------------------------------------------
