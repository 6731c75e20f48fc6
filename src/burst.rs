//! Lock free queue for grains which get triggered by discrete events such as collisions.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use glam::{Affine3A, Vec3};
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    emission::EmissionProfile,
    error::Error,
    grain::{CollisionEvent, GrainDescriptor},
    settings::CollisionBurst,
};

// -------------------------------------------------------------------------------------------------

/// Bounded, multi-producer queue of burst grains, drained once per tick by the
/// [`Granulator`](crate::Granulator).
///
/// Producers enqueue via [`BurstSender`]s, which may live on any thread. The tick only drains
/// the grains which were present when the drain started, so producers which keep pushing while
/// the tick runs can't stall it.
pub struct BurstQueue {
    queue: Arc<ArrayQueue<GrainDescriptor>>,
}

impl BurstQueue {
    /// Create a new queue which holds up to `capacity` grains. Capacity is at least one grain.
    pub fn new(capacity: usize) -> Self {
        let queue = Arc::new(ArrayQueue::new(capacity.max(1)));
        Self { queue }
    }

    /// Create a new producer handle for the queue, which creates grains for the given sample rate.
    pub fn sender(&self, sample_rate: u32) -> BurstSender {
        BurstSender {
            queue: Arc::clone(&self.queue),
            sample_rate,
            rng: SmallRng::from_rng(&mut rand::rng()),
        }
    }

    /// Max number of grains the queue can hold.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of grains which are waiting for the next tick.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pop all grains which are present right now and pass them to the given consumer.
    /// Returns the number of drained grains.
    pub fn drain<F>(&self, mut consumer: F) -> usize
    where
        F: FnMut(GrainDescriptor),
    {
        let count = self.queue.len();
        let mut drained = 0;
        while drained < count {
            match self.queue.pop() {
                Some(grain) => consumer(grain),
                None => break,
            }
            drained += 1;
        }
        drained
    }

    /// Drop all queued grains.
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}

// -------------------------------------------------------------------------------------------------

/// Producer handle of a [`BurstQueue`], e.g. for a physics collision callback.
///
/// Each sender owns its random number generator, so sampling grain parameters never needs to
/// synchronize with the tick thread or with other senders. Cloned senders get a fresh seed.
pub struct BurstSender {
    queue: Arc<ArrayQueue<GrainDescriptor>>,
    sample_rate: u32,
    rng: SmallRng,
}

impl Clone for BurstSender {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            sample_rate: self.sample_rate,
            rng: SmallRng::from_rng(&mut rand::rng()),
        }
    }
}

impl BurstSender {
    /// Use the given seed for the sender's random number generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Sample rate which is used to convert burst spacing into sample offsets.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Sample offset of the `index`th grain of a burst with the given spacing.
    pub fn burst_offset(index: usize, spacing_ms: f32, sample_rate: u32) -> usize {
        (index as f64 * spacing_ms.max(0.0) as f64 * sample_rate as f64 / 1000.0).round() as usize
    }

    /// Enqueue `burst_count` grains at the given world space position, spaced by `spacing_ms`.
    ///
    /// The position is transformed into the granulator's local frame right away, because the
    /// granulator may have moved when the tick dispatches the grains. Burst grains carry the
    /// source's mass, but no velocity.
    ///
    /// Returns the number of enqueued grains. Grains which don't fit into the queue get dropped
    /// and are reported as [`Error::BurstQueueFull`]. Nothing gets enqueued when the profile is
    /// disabled.
    pub fn enqueue_burst(
        &mut self,
        event_position: Vec3,
        burst_count: usize,
        spacing_ms: f32,
        profile: &EmissionProfile,
        local_to_world: &Affine3A,
        source_mass: f32,
    ) -> Result<usize, Error> {
        if !profile.enabled() || burst_count == 0 {
            return Ok(0);
        }
        let source_position = local_to_world.inverse().transform_point3(event_position);
        let mut dropped = 0;
        for index in 0..burst_count {
            let grain = GrainDescriptor {
                source_position,
                source_velocity: Vec3::ZERO,
                source_mass,
                clip: profile.clip(),
                sample_offset: Self::burst_offset(index, spacing_ms, self.sample_rate),
                duration_ms: profile.sample_duration_ms(&mut self.rng),
                playhead_position: profile.sample_position(&mut self.rng),
                pitch: profile.sample_pitch(&mut self.rng),
                volume: profile.sample_volume(&mut self.rng),
            };
            if self.queue.push(grain).is_err() {
                dropped = burst_count - index;
                break;
            }
        }
        if dropped > 0 {
            log::warn!(
                "Burst queue is full: dropped {dropped} of {burst_count} burst grain(s)"
            );
            Err(Error::BurstQueueFull(dropped))
        } else {
            Ok(burst_count)
        }
    }

    /// Enqueue one burst for each of the given collision events.
    ///
    /// Returns the total number of enqueued grains. When the queue overflows, the remaining
    /// events still get processed, as some of their grains may fit once the tick drained the
    /// queue, and the total number of dropped grains is reported as [`Error::BurstQueueFull`].
    pub fn trigger_collisions(
        &mut self,
        events: &[CollisionEvent],
        burst: &CollisionBurst,
        local_to_world: &Affine3A,
        source_mass: f32,
    ) -> Result<usize, Error> {
        let mut enqueued = 0;
        let mut dropped = 0;
        for event in events {
            match self.enqueue_burst(
                event.intersection,
                burst.count,
                burst.spacing_ms,
                &burst.profile,
                local_to_world,
                source_mass,
            ) {
                Ok(count) => enqueued += count,
                Err(Error::BurstQueueFull(count)) => {
                    enqueued += burst.count - count;
                    dropped += count;
                }
                Err(err) => return Err(err),
            }
        }
        if dropped > 0 {
            Err(Error::BurstQueueFull(dropped))
        } else {
            Ok(enqueued)
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::grain::{BodyHandle, ClipId};

    fn profile() -> EmissionProfile {
        EmissionProfile::new(ClipId(3)).with_base(0.5, 100.0, 1.0, 1.0)
    }

    #[test]
    fn burst_offsets() {
        let queue = BurstQueue::new(16);
        let mut sender = queue.sender(1000).with_seed(1);
        let enqueued = sender
            .enqueue_burst(Vec3::ZERO, 3, 40.0, &profile(), &Affine3A::IDENTITY, 2.0)
            .unwrap();
        assert_eq!(enqueued, 3);
        assert_eq!(queue.len(), 3);

        let mut grains = Vec::new();
        assert_eq!(queue.drain(|grain| grains.push(grain)), 3);
        assert!(queue.is_empty());
        assert_eq!(
            grains.iter().map(|g| g.sample_offset).collect::<Vec<_>>(),
            vec![0, 40, 80]
        );
        assert!(grains.iter().all(|g| g.clip == ClipId(3)));
        assert!(grains.iter().all(|g| g.source_mass == 2.0));
        assert!(grains.iter().all(|g| g.source_velocity == Vec3::ZERO));
    }

    #[test]
    fn positions_are_local() {
        let queue = BurstQueue::new(4);
        let mut sender = queue.sender(44100);
        let local_to_world = Affine3A::from_translation(Vec3::new(10.0, 0.0, -2.0));
        sender
            .enqueue_burst(
                Vec3::new(11.0, 2.0, -2.0),
                1,
                10.0,
                &profile(),
                &local_to_world,
                1.0,
            )
            .unwrap();
        let mut positions = Vec::new();
        queue.drain(|grain| positions.push(grain.source_position));
        assert!(positions[0].abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn overflow_drops_excess() {
        let queue = BurstQueue::new(4);
        let mut sender = queue.sender(44100);
        assert_eq!(
            sender.enqueue_burst(Vec3::ZERO, 6, 10.0, &profile(), &Affine3A::IDENTITY, 1.0),
            Err(Error::BurstQueueFull(2))
        );
        assert_eq!(queue.len(), 4);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn disabled_profile_enqueues_nothing() {
        let queue = BurstQueue::new(4);
        let mut sender = queue.sender(44100);
        let mut profile = profile();
        profile.set_enabled(false);
        assert_eq!(
            sender.enqueue_burst(Vec3::ZERO, 3, 10.0, &profile, &Affine3A::IDENTITY, 1.0),
            Ok(0)
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn collision_fan_out() {
        let queue = BurstQueue::new(8);
        let mut sender = queue.sender(44100);
        let burst = CollisionBurst {
            profile: profile(),
            count: 3,
            spacing_ms: 5.0,
        };
        let events = [
            CollisionEvent {
                intersection: Vec3::X,
                other: BodyHandle(1),
            },
            CollisionEvent {
                intersection: Vec3::Y,
                other: BodyHandle(2),
            },
        ];
        assert_eq!(
            sender.trigger_collisions(&events, &burst, &Affine3A::IDENTITY, 1.0),
            Ok(6)
        );
        // 2 of the third burst fit, 1 gets dropped
        assert_eq!(
            sender.trigger_collisions(&events[..1], &burst, &Affine3A::IDENTITY, 1.0),
            Err(Error::BurstQueueFull(1))
        );
        assert_eq!(queue.len(), 8);
    }

    #[test]
    fn drain_is_bounded_by_snapshot() {
        let queue = BurstQueue::new(8);
        let mut sender = queue.sender(44100);
        sender
            .enqueue_burst(Vec3::ZERO, 2, 10.0, &profile(), &Affine3A::IDENTITY, 1.0)
            .unwrap();
        let mut producer = sender.clone();
        let mut count = 0;
        queue.drain(|_| {
            // grains which arrive while draining wait for the next tick
            producer
                .enqueue_burst(Vec3::ZERO, 1, 10.0, &profile(), &Affine3A::IDENTITY, 1.0)
                .unwrap();
            count += 1;
        });
        assert_eq!(count, 2);
        assert_eq!(queue.len(), 2);
    }
}
