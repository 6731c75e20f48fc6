#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod burst;
mod cadence;
mod emission;
mod error;
mod grain;
mod granulator;
mod motion;
mod pool;
mod settings;
mod spatial;
mod utils;
mod voice;

// public, flat re-exports
pub use error::Error;

pub use grain::{BodyHandle, ClipId, CollisionEvent, GrainDescriptor, SourceBody};

pub use emission::{EmissionCategory, EmissionProfile};

pub use cadence::{CadenceParameters, CadenceSchedule, CadenceScheduler, CadenceState};

pub use voice::{sample::SampleVoice, window::GrainWindowMode, ClipBank, GrainVoice};

pub use pool::{VacantVoice, VoiceHandle, VoicePool};

pub use burst::{BurstQueue, BurstSender};

pub use settings::{CollisionBurst, GranulatorSettings, SpatialSettings};

pub use granulator::{Granulator, TickReport};

pub use motion::{MotionMapper, MotionMapping};

pub use spatial::{
    index::{BucketIndex, BucketIndexState, EntityCategory, EntityHandle, EntityRecord},
    key::{CellKey, CellKeySpace},
};

// public mods
pub mod parameter;

// re-export glam, which is part of the public API
pub use glam;
