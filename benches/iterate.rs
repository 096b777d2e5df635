use std::hint::black_box;

use criterion::*;

use corral::prelude::*;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("for_each_write_position_100k", |b| {
        b.iter_batched(
            || {
                let (mut world, ids) = make_world();
                populate(&mut world, &ids, AGENTS_MED);
                let descriptor = world
                    .query()
                    .with::<Position>()
                    .unwrap()
                    .with::<Velocity>()
                    .unwrap()
                    .build();
                let query = world.create_query(descriptor);
                (world, query)
            },
            |(mut world, query)| {
                world
                    .for_each_chunk_mut(query, |mut view| {
                        let (positions, velocities) =
                            view.columns_mut::<Position, Velocity>().unwrap();
                        for (position, velocity) in positions.iter_mut().zip(velocities.iter()) {
                            position.x += velocity.dx;
                            position.y += velocity.dy;
                        }
                    })
                    .unwrap();
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("for_each_read_wealth_100k", |b| {
        b.iter_batched(
            || {
                let (mut world, ids) = make_world();
                populate(&mut world, &ids, AGENTS_MED);
                let descriptor = world.query().with::<Wealth>().unwrap().build();
                let query = world.create_query(descriptor);
                (world, query)
            },
            |(mut world, query)| {
                let mut total = 0.0f32;
                world
                    .for_each_chunk(query, |view| {
                        for wealth in view.column::<Wealth>().unwrap() {
                            total += wealth.value;
                        }
                    })
                    .unwrap();
                black_box(total);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
