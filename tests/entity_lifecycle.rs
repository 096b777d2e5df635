use corral::prelude::*;
use corral::EcsError;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Health(f32);

#[test]
fn exists_tracks_create_destroy_recycle() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();

    let first = world.create_entity(&[position]).unwrap();
    assert!(world.exists(first));

    world.destroy_entity(first).unwrap();
    assert!(!world.exists(first));

    // the slot is recycled with a bumped generation; the old handle stays dead
    let second = world.create_entity(&[position]).unwrap();
    assert_eq!(second.index, first.index);
    assert_ne!(second.generation, first.generation);
    assert!(world.exists(second));
    assert!(!world.exists(first));

    // stale handle is rejected, not silently redirected to the new occupant
    assert!(matches!(
        world.set_component(first, Position { x: 9.0, y: 9.0 }),
        Err(EcsError::StaleEntity(_))
    ));
}

#[test]
fn double_destroy_is_an_error() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let entity = world.create_entity(&[position]).unwrap();

    world.destroy_entity(entity).unwrap();
    assert!(matches!(
        world.destroy_entity(entity),
        Err(EcsError::StaleEntity(_))
    ));
}

#[test]
fn destroying_middle_row_compacts_and_preserves_survivors() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let health = world.register_component::<Health>().unwrap();

    let entities = world.create_entities(&[position, health], 3).unwrap();
    for (i, &entity) in entities.iter().enumerate() {
        world
            .set_component(entity, Position { x: i as f32, y: 0.0 })
            .unwrap();
        world.set_component(entity, Health(100.0 + i as f32)).unwrap();
    }

    // destroying the middle row swaps the last row in
    world.destroy_entity(entities[1]).unwrap();
    assert_eq!(world.entity_count(), 2);

    assert_eq!(
        *world.get_component::<Position>(entities[0]).unwrap(),
        Position { x: 0.0, y: 0.0 }
    );
    assert_eq!(*world.get_component::<Health>(entities[0]).unwrap(), Health(100.0));
    assert_eq!(
        *world.get_component::<Position>(entities[2]).unwrap(),
        Position { x: 2.0, y: 0.0 }
    );
    assert_eq!(*world.get_component::<Health>(entities[2]).unwrap(), Health(102.0));
}

#[test]
fn destroy_all_leaves_storage_reusable() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();

    // enough rows to span several chunks
    let entities = world.create_entities(&[position], 3000).unwrap();
    assert_eq!(world.entity_count(), 3000);

    world.destroy_entities(&entities).unwrap();
    assert_eq!(world.entity_count(), 0);

    // the archetype's chunks are reusable afterwards
    let again = world.create_entities(&[position], 100).unwrap();
    assert_eq!(world.entity_count(), 100);
    for &entity in &again {
        assert!(world.exists(entity));
    }
}

#[test]
fn contiguous_run_destroy_moves_only_trailing_rows() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();

    let entities = world.create_entities(&[position], 10).unwrap();
    for (i, &entity) in entities.iter().enumerate() {
        world
            .set_component(entity, Position { x: i as f32, y: 0.0 })
            .unwrap();
    }

    // remove rows 3..6 in one batch
    world
        .destroy_entities(&[entities[3], entities[4], entities[5]])
        .unwrap();
    assert_eq!(world.entity_count(), 7);

    // every survivor keeps its identity and value
    for (i, &entity) in entities.iter().enumerate() {
        if (3..6).contains(&i) {
            assert!(!world.exists(entity));
        } else {
            assert_eq!(
                *world.get_component::<Position>(entity).unwrap(),
                Position { x: i as f32, y: 0.0 }
            );
        }
    }
}

#[test]
fn batch_destroy_validates_before_mutating() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();

    let entities = world.create_entities(&[position], 4).unwrap();
    let stale = entities[2];
    world.destroy_entity(stale).unwrap();

    // a stale handle in the batch fails the whole batch up front
    let result = world.destroy_entities(&[entities[0], stale, entities[3]]);
    assert!(matches!(result, Err(EcsError::StaleEntity(_))));
    assert!(world.exists(entities[0]));
    assert!(world.exists(entities[3]));
    assert_eq!(world.entity_count(), 3);
}

#[test]
fn entity_capacity_is_bounded() {
    // initial reservation is clamped to the hard bound
    let mut world = World::with_config(WorldConfig {
        entity_capacity_max: 4,
        initial_entity_capacity: 16,
        ..WorldConfig::default()
    });
    let position = world.register_component::<Position>().unwrap();

    for _ in 0..2 {
        world.create_entity(&[position]).unwrap();
    }

    // a batch that would exceed the bound fails without partial creation
    assert!(matches!(
        world.create_entities(&[position], 5),
        Err(EcsError::Capacity(_))
    ));
    assert_eq!(world.entity_count(), 2);

    for _ in 0..2 {
        world.create_entity(&[position]).unwrap();
    }
    assert!(matches!(
        world.create_entity(&[position]),
        Err(EcsError::Capacity(_))
    ));
}

#[test]
fn empty_signature_entities_are_allowed() {
    let mut world = World::new();
    let entity = world.create_entity(&[]).unwrap();
    assert!(world.exists(entity));
    world.destroy_entity(entity).unwrap();
    assert!(!world.exists(entity));
}
