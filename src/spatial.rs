//! Spatial bucket index: groups many moving entities into fixed size cells, rebuilt every cycle.
//!
//! The index has no shared state with the grain scheduler. It typically feeds proximity queries
//! which decide which bodies may collide with a grain source.

pub(crate) mod index;
pub(crate) mod key;
mod thread_pool;
