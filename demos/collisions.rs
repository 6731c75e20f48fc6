//! An example showcasing continuous grain emission, collision bursts from a separate thread and
//! proximity queries with the spatial bucket index.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use arg::{parse_args, Args};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use grainulator::{
    glam::{Affine3A, Vec3},
    BodyHandle, BucketIndex, ClipBank, CollisionEvent, EmissionProfile, EntityCategory,
    EntityHandle, EntityRecord, GrainWindowMode, Granulator, GranulatorSettings, MotionMapper,
    SourceBody, SpatialSettings,
};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

const SAMPLE_RATE: u32 = 44100;
const CHANNEL_COUNT: usize = 2;
const TICK_DURATION: Duration = Duration::from_millis(16);
const ENTITY_COUNT: usize = 5000;
const COLLISION_DISTANCE: f32 = 0.75;

// -------------------------------------------------------------------------------------------------

/// Program arguments.
#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"warn\" in release builds.
    log_level: Option<log::Level>,
    #[arg(short = "t", long = "ticks")]
    /// Number of update ticks to run. By default 500.
    ticks: Option<usize>,
}

// -------------------------------------------------------------------------------------------------

/// Create a decaying noise burst clip.
fn noise_clip(rng: &mut SmallRng, length: usize) -> Vec<f32> {
    (0..length)
        .map(|index| {
            let envelope = 1.0 - index as f32 / length as f32;
            (rng.random::<f32>() * 2.0 - 1.0) * envelope
        })
        .collect()
}

/// Create a sine clip with the given frequency.
fn sine_clip(frequency: f32, length: usize) -> Vec<f32> {
    (0..length)
        .map(|index| {
            (2.0 * std::f32::consts::PI * frequency * index as f32 / SAMPLE_RATE as f32).sin()
        })
        .collect()
}

// -------------------------------------------------------------------------------------------------

fn main() {
    let args = parse_args::<Arguments>();

    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()
        .expect("Failed to set logger");

    let mut rng = SmallRng::seed_from_u64(0x6772_6169_6e73);

    // Clips
    let mut clips = ClipBank::new();
    let drone = clips.insert(sine_clip(220.0, SAMPLE_RATE as usize));
    let impact = clips.insert(noise_clip(&mut rng, SAMPLE_RATE as usize / 4));

    // Granulator
    let settings = GranulatorSettings::new()
        .with_sample_rate(SAMPLE_RATE)
        .with_cadence(40.0, 10.0)
        .with_max_voices(64)
        .with_burst(4, 25.0)
        .with_emitter(
            EmissionProfile::new(drone)
                .with_base(0.0, 120.0, 1.0, 0.4)
                .with_jitter(0.5, 60.0, 0.05, 0.1),
        )
        .with_collision(
            EmissionProfile::new(impact)
                .with_base(0.0, 40.0, 1.0, 0.8)
                .with_jitter(0.1, 20.0, 0.3, 0.2),
        );
    let clips = Arc::new(clips);
    let mut granulator = Granulator::with_voice_factory(settings, |_| {
        grainulator::SampleVoice::new(Arc::clone(&clips), SAMPLE_RATE)
            .with_window(GrainWindowMode::Tukey)
    });
    let mut motion = MotionMapper::new().with_speed_range(0.0..=4.0, 200.0..=10.0);

    // Spatial index with a field of entities around the source
    let mut index = BucketIndex::new(&SpatialSettings::new().with_cell_size(2.0));
    let mut entities = (0..ENTITY_COUNT)
        .map(|entity| EntityRecord {
            entity: EntityHandle(entity as u64),
            position: Vec3::new(
                rng.random_range(-6.0..6.0),
                rng.random_range(-6.0..6.0),
                rng.random_range(-1.0..1.0),
            ),
            category: match entity % 3 {
                0 => EntityCategory::PhysicsEntity,
                1 => EntityCategory::Unit,
                _ => EntityCategory::Target,
            },
        })
        .collect::<Vec<_>>();

    // Random, rare collisions of some other body, reported from another thread
    let running = Arc::new(AtomicBool::new(true));
    let collision_thread = {
        let running = Arc::clone(&running);
        let mut sender = granulator.burst_sender();
        let burst = granulator.settings().collision_burst();
        thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(1);
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(rng.random_range(100..400)));
                let event = CollisionEvent {
                    intersection: Vec3::new(rng.random_range(-3.0..3.0), 0.0, 0.0),
                    other: BodyHandle(u64::MAX),
                };
                if let Err(err) =
                    sender.trigger_collisions(&[event], &burst, &Affine3A::IDENTITY, 1.0)
                {
                    log::warn!("Failed to trigger remote collision: {err}");
                }
            }
        })
    };

    // Update loop
    let mut sender = granulator.burst_sender();
    let local_to_world = Affine3A::IDENTITY;
    let mut output = Vec::new();
    let mut last_position = Vec3::ZERO;
    for tick in 0..args.ticks.unwrap_or(500) {
        let time = tick as f32 * TICK_DURATION.as_secs_f32();

        // Move the source on a lissajous curve
        let position = Vec3::new((time * 0.7).sin() * 3.0, (time * 1.1).cos() * 1.5 + 1.5, 0.0);
        let source = SourceBody {
            position,
            velocity: (position - last_position) / TICK_DURATION.as_secs_f32(),
            mass: 1.0,
        };
        last_position = position;
        motion.update(TICK_DURATION, position, granulator.settings_mut());

        // Let entities drift and find the ones which are close to the source
        for entity in entities.iter_mut() {
            entity.position.x += (entity.entity.0 % 7) as f32 * 0.001 - 0.003;
        }
        if let Err(err) = index.rebuild(&entities) {
            log::error!("Failed to rebuild the bucket index: {err}");
            continue;
        }
        let mut collisions = Vec::new();
        index.for_each_in_cell(index.key_of(position), |record| {
            if record.category == EntityCategory::PhysicsEntity
                && record.position.distance(position) < COLLISION_DISTANCE
            {
                collisions.push(CollisionEvent {
                    intersection: record.position,
                    other: BodyHandle(record.entity.0),
                });
            }
        });
        if !collisions.is_empty() {
            let burst = granulator.settings().collision_burst();
            if let Err(err) =
                sender.trigger_collisions(&collisions, &burst, &local_to_world, source.mass)
            {
                log::warn!("Failed to trigger collisions: {err}");
            }
        }

        // Schedule and render
        let report = granulator.tick(TICK_DURATION, &source, &local_to_world);
        output.clear();
        output.resize(report.tick_samples * CHANNEL_COUNT, 0.0);
        granulator.process(&mut output, CHANNEL_COUNT);

        if tick % 50 == 0 {
            let rms =
                (output.iter().map(|s| s * s).sum::<f32>() / output.len().max(1) as f32).sqrt();
            log::info!(
                "Tick #{tick}: {} continuous, {} burst grains, {} active voices, \
                {} collisions, rms {:.3}",
                report.continuous,
                report.bursts,
                granulator.pool().active_count(),
                collisions.len(),
                rms
            );
        }
    }

    running.store(false, Ordering::Relaxed);
    if collision_thread.join().is_err() {
        log::error!("Collision thread panicked");
    }
    println!(
        "Done. Dropped {} grains in total.",
        granulator.dropped_grains()
    );
}
