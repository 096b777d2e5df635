use corral::prelude::*;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Frozen;

#[test]
fn exclusion_narrows_matches() {
    init_logs();
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let frozen = world.register_tag::<Frozen>().unwrap();

    // five entities with Position, two of them additionally Frozen
    for _ in 0..3 {
        world.create_entity(&[position]).unwrap();
    }
    for _ in 0..2 {
        world.create_entity(&[position, frozen]).unwrap();
    }

    let all = world.query().with::<Position>().unwrap().build();
    let all = world.create_query(all);

    let moving = world
        .query()
        .with::<Position>()
        .unwrap()
        .without::<Frozen>()
        .unwrap()
        .build();
    let moving = world.create_query(moving);

    assert_eq!(world.query_count(all), 5);
    assert_eq!(world.query_count(moving), 3);

    // lazy chunk iteration agrees with the counts
    let rows: usize = world
        .iter_chunks(moving)
        .unwrap()
        .map(|view| view.entities().len())
        .sum();
    assert_eq!(rows, 3);
}

#[test]
fn registration_and_archetypes_dedup_regardless_of_order() {
    init_logs();
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let velocity = world.register_component::<Velocity>().unwrap();

    // same type registered again keeps its id
    assert_eq!(world.register_component::<Position>().unwrap(), position);

    world.create_entity(&[position, velocity]).unwrap();
    let count = world.archetype_count();
    // same component set in a different order maps to the same archetype
    world.create_entity(&[velocity, position]).unwrap();
    assert_eq!(world.archetype_count(), count);
}

#[test]
fn cached_queries_see_archetypes_created_later() {
    let mut world = World::new();
    let descriptor = world.query().with::<Position>().unwrap().build();
    let query = world.create_query(descriptor);

    // query created before any matching archetype exists
    assert_eq!(world.query_count(query), 0);

    let position = world.component_id::<Position>().unwrap();
    let velocity = world.register_component::<Velocity>().unwrap();
    world.create_entity(&[position]).unwrap();
    world.create_entity(&[position, velocity]).unwrap();

    // the cache extends to the two new archetypes without re-interning
    assert_eq!(world.query_count(query), 2);

    // identical descriptor interns to the same handle
    let again = world.query().with::<Position>().unwrap().build();
    assert_eq!(world.create_query(again), query);
}

#[test]
fn chunk_views_expose_entities_and_columns() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let velocity = world.register_component::<Velocity>().unwrap();

    let entities = world.create_entities(&[position, velocity], 50).unwrap();
    for (i, &entity) in entities.iter().enumerate() {
        world
            .set_component(entity, Position { x: i as f32, y: 0.0 })
            .unwrap();
        world
            .set_component(entity, Velocity { dx: 1.0, dy: 2.0 })
            .unwrap();
    }

    let descriptor = world
        .query()
        .with::<Position>()
        .unwrap()
        .with::<Velocity>()
        .unwrap()
        .build();
    let query = world.create_query(descriptor);

    // one integration step over matching chunks
    world
        .for_each_chunk_mut(query, |mut view| {
            let (positions, velocities) = view.columns_mut::<Position, Velocity>().unwrap();
            for (position, velocity) in positions.iter_mut().zip(velocities.iter()) {
                position.x += velocity.dx;
                position.y += velocity.dy;
            }
        })
        .unwrap();

    let mut seen = 0;
    world
        .for_each_chunk(query, |view| {
            let entities_slice = view.entities();
            let positions = view.column::<Position>().unwrap();
            assert_eq!(entities_slice.len(), positions.len());
            for (entity, position) in entities_slice.iter().zip(positions.iter()) {
                assert!(world_value_matches(*entity, *position));
                seen += 1;
            }
        })
        .unwrap();
    assert_eq!(seen, 50);

    // a type the archetype does not store yields no column
    world
        .for_each_chunk(query, |view| {
            assert!(view.column::<Frozen>().is_none());
        })
        .unwrap();
}

fn world_value_matches(entity: Entity, position: Position) -> bool {
    // entity i started at x = i and moved by (1, 2) exactly once
    position.x == entity.index as f32 + 1.0 && position.y == 2.0
}

#[test]
fn row_mutation_never_invalidates_cached_matches() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();

    let descriptor = world.query().with::<Position>().unwrap().build();
    let query = world.create_query(descriptor);

    let entities = world.create_entities(&[position], 10).unwrap();
    assert_eq!(world.query_count(query), 10);

    world.destroy_entity(entities[4]).unwrap();
    assert_eq!(world.query_count(query), 9);

    world.create_entity(&[position]).unwrap();
    assert_eq!(world.query_count(query), 10);
}
