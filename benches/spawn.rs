use std::hint::black_box;

use criterion::*;

use corral::prelude::*;

mod common;
use common::*;

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("create_100k_direct", |b| {
        b.iter(|| {
            let (mut world, ids) = make_world();
            let entities = world.create_entities(&ids, AGENTS_MED).unwrap();
            black_box(entities);
            black_box(world);
        });
    });

    group.bench_function("create_100k_deferred", |b| {
        b.iter(|| {
            let (mut world, ids) = make_world();
            let signature = Signature::from_ids(&ids);

            let mut buffer = CommandBuffer::new();
            for i in 0..AGENTS_MED {
                let target = buffer.create(signature);
                buffer.set(
                    target,
                    ids[0],
                    Position {
                        x: i as f32,
                        y: 0.0,
                    },
                );
            }
            world.playback(&mut buffer).unwrap();
            black_box(world);
        });
    });

    group.bench_function("destroy_10k_batched", |b| {
        b.iter_batched(
            || {
                let (mut world, ids) = make_world();
                let entities = populate(&mut world, &ids, AGENTS_SMALL);
                (world, entities)
            },
            |(mut world, entities)| {
                world.destroy_entities(&entities).unwrap();
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
