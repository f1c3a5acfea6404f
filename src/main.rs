// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

use glam::Vec3A;
use indicatif::{
    ProgressBar,
    ProgressIterator,
};
use octcull::{
    narrow,
    AabbOverlap,
    BoundingBox,
    Canvas,
    DebugDraw,
    ObjectId,
    Octree,
    OctreeConfig,
    World,
};
use rand::{
    rngs::ThreadRng,
    Rng,
};
use rgb::RGB8;
use tracing::info;

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 800;

pub const BODIES: usize = 600;
pub const FRAMES: u64 = 300;
pub const DT: f32 = 1.0 / 60.0;
pub const WORLD_HALF: f32 = 50.0;
/// Full rebuild every this many frames; incremental updates in between.
pub const REBUILD_EVERY: u64 = 30;

pub const MAX_DEPTH: u32 = 4;
pub const IDEAL_CAPACITY: usize = 6;
pub const MIN_SIZE: f32 = 2.0;
pub const MAX_BATCH: usize = 1024;

const LEAF_COLOR: RGB8 = RGB8::new(230, 200, 40);
const BODY_COLOR: RGB8 = RGB8::new(90, 140, 220);
const HIT_COLOR: RGB8 = RGB8::new(220, 60, 60);

#[inline]
pub fn random_body(rng: &mut ThreadRng) -> (BoundingBox, Vec3A) {
    let center = Vec3A::new(
        rng.gen_range(-WORLD_HALF..WORLD_HALF),
        rng.gen_range(-WORLD_HALF..WORLD_HALF),
        rng.gen_range(-WORLD_HALF..WORLD_HALF),
    );
    let half_widths = Vec3A::new(
        rng.gen_range(0.25..1.5),
        rng.gen_range(0.25..1.5),
        rng.gen_range(0.25..1.5),
    );
    let velocity = Vec3A::new(
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
    );
    (BoundingBox::from_center_half_widths(center, half_widths), velocity)
}

#[allow(clippy::cast_precision_loss)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fmt_subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)?;

    let arena = BoundingBox::cube(Vec3A::ZERO, WORLD_HALF * 2.0);
    let mut rng = rand::thread_rng();
    let mut world = World::new();
    for _ in 0..BODIES {
        let (bounds, velocity) = random_body(&mut rng);
        world.spawn(bounds, velocity);
    }

    let config =
        OctreeConfig::new(MAX_DEPTH, IDEAL_CAPACITY, MIN_SIZE).with_max_batch(MAX_BATCH);
    let mut octree = Octree::new(config);

    let begin_time = std::time::Instant::now();
    let ids = world.ids().collect::<Vec<_>>();
    octree.construct_tree(&mut world, ids);
    info!(
        octants = octree.octant_count(),
        leaves = octree.leaves().len(),
        "initial build in {}us",
        begin_time.elapsed().as_micros()
    );

    let exhaustive = BODIES * BODIES.saturating_sub(1) / 2;
    let mut candidates = 0usize;
    let mut collisions = 0usize;
    let mut rebuilds = 0usize;

    println!("Simulating {FRAMES} frames");
    let begin_time = std::time::Instant::now();
    let bar = ProgressBar::new(FRAMES);

    for frame in (0..FRAMES).progress_with(bar) {
        for id in world.step(DT, &arena) {
            octree.mark_dirty(id);
        }

        if frame % REBUILD_EVERY == 0 {
            octree.rebuild(&mut world);
            rebuilds += 1;
        } else if octree.update(&mut world).rebuilt {
            rebuilds += 1;
        }

        candidates += octree.candidate_pairs().len();
        collisions += octree.colliding_pairs(&AabbOverlap(&world)).len();
    }

    let elapsed = begin_time.elapsed();
    let frames = FRAMES as f64;
    println!("Simulated in {:.2}s", elapsed.as_secs_f32());
    println!(
        "{rebuilds} rebuilds\n\t- Avg candidates: {:.1} (of {exhaustive})\n\t- Avg collisions: {:.1}",
        candidates as f64 / frames,
        collisions as f64 / frames,
    );

    // The broad phase must never lose a pair the exhaustive scan finds.
    let all = world.ids().collect::<Vec<ObjectId>>();
    let brute = narrow::exhaustive_pairs(&all, &AabbOverlap(&world));
    let culled = octree.colliding_pairs(&AabbOverlap(&world));
    info!(brute = brute.len(), culled = culled.len(), "final frame check");

    let mut canvas = Canvas::new(WIDTH, HEIGHT, octree.root_bounds());
    let hits = culled
        .iter()
        .flat_map(|(a, b)| [*a, *b])
        .collect::<std::collections::BTreeSet<_>>();
    for id in world.ids() {
        let Some(body) = world.body(id) else {
            continue;
        };
        let color = if hits.contains(&id) {
            HIT_COLOR
        } else {
            BODY_COLOR
        };
        canvas.solid_box(&body.bounds, color);
    }
    octree.draw_leaves(&mut canvas, LEAF_COLOR);

    // Write results to a PNG
    let mut encoder = png::Encoder::new(std::fs::File::create("octree.png")?, WIDTH, HEIGHT);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(canvas.as_bytes())?;
    writer.finish()?;

    Ok(())
}
