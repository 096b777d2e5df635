use std::mem::{align_of, size_of};

use corral::engine::archetype::ArchetypeStore;
use corral::engine::column::{AnyColumn, Column};
use corral::engine::registry::TypeRegistry;
use corral::engine::types::{Signature, CHUNK_BYTE_BUDGET};
use corral::prelude::*;
use corral::{EcsError, StructuralError};

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

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Health(f32);

// One row of this does not fit a chunk.
#[derive(Clone, Copy)]
struct Oversized([u64; 4096]);

impl Default for Oversized {
    fn default() -> Self {
        Oversized([0; 4096])
    }
}

#[test]
fn column_chunk_is_contiguous_and_aligned() {
    let mut column: Column<Position> = Column::new(64);

    for i in 0..64 {
        let (chunk, row) = column.push(Position {
            x: i as f32,
            y: 0.0,
        });
        assert_eq!(chunk, 0);
        assert_eq!(row as usize, i);
    }
    // 65th value opens a second chunk
    let (chunk, row) = column.push(Position { x: 64.0, y: 0.0 });
    assert_eq!((chunk, row), (1, 0));

    let (ptr, bytes) = column.chunk_bytes(0, 64).expect("chunk 0 should exist");
    assert_eq!(bytes, 64 * size_of::<Position>());
    assert_eq!(
        (ptr as usize) % align_of::<Position>(),
        0,
        "chunk base pointer must be aligned for Position"
    );

    let slice = column.chunk_slice(0);
    assert_eq!(slice.len(), 64);
    assert_eq!(slice[17].x, 17.0);
    assert_eq!(column.iter().count(), 65);

    // writes through the raw mutable view land in the typed rows
    let (ptr, _) = column.chunk_bytes_mut(0, 64).expect("chunk 0 should exist");
    unsafe {
        (ptr as *mut Position).add(17).write(Position { x: -1.0, y: 9.0 });
    }
    assert_eq!(column.chunk_slice(0)[17].x, -1.0);
    assert_eq!(column.chunk_slice(0)[17].y, 9.0);
}

#[test]
fn chunk_capacity_saturates_byte_budget() {
    let mut registry = TypeRegistry::new();
    let position = registry.register::<Position>().unwrap();
    let velocity = registry.register::<Velocity>().unwrap();

    let mut store = ArchetypeStore::new(CHUNK_BYTE_BUDGET);
    let narrow = store
        .get_or_create(Signature::from_ids(&[position]), &registry)
        .unwrap();
    let wide = store
        .get_or_create(Signature::from_ids(&[position, velocity]), &registry)
        .unwrap();

    for id in [narrow, wide] {
        let archetype = store.get(id).unwrap();
        let capacity = archetype.chunk_capacity();
        let row_bytes = archetype.row_bytes();
        // capacity fills the budget: one more row would overflow it
        assert!(capacity * row_bytes <= CHUNK_BYTE_BUDGET);
        assert!((capacity + 1) * row_bytes > CHUNK_BYTE_BUDGET);
    }

    // adding components never increases per-chunk capacity
    assert!(store.get(wide).unwrap().chunk_capacity() <= store.get(narrow).unwrap().chunk_capacity());
}

#[test]
fn batched_allocation_splits_runs_at_chunk_boundaries() {
    let mut registry = TypeRegistry::new();
    let position = registry.register::<Position>().unwrap();

    let mut store = ArchetypeStore::new(CHUNK_BYTE_BUDGET);
    let id = store
        .get_or_create(Signature::from_ids(&[position]), &registry)
        .unwrap();
    let archetype = store.get_mut(id).unwrap();
    let capacity = archetype.chunk_capacity();

    // three rows more than one chunk holds
    let entities: Vec<Entity> = (0..capacity as u32 + 3)
        .map(|index| Entity {
            index,
            generation: 0,
        })
        .collect();
    let runs = archetype.allocate_rows(&entities).unwrap();

    assert_eq!(runs.len(), 2);
    assert_eq!((runs[0].chunk, runs[0].row), (0, 0));
    assert_eq!(runs[0].count, capacity);
    assert_eq!((runs[1].chunk, runs[1].row), (1, 0));
    assert_eq!(runs[1].count, 3);
}

#[test]
fn oversized_row_is_rejected_at_archetype_creation() {
    let mut registry = TypeRegistry::new();
    let oversized = registry.register::<Oversized>().unwrap();

    let mut store = ArchetypeStore::new(CHUNK_BYTE_BUDGET);
    let result = store.get_or_create(Signature::from_ids(&[oversized]), &registry);
    assert!(matches!(result, Err(StructuralError::RowBudget(_))));
}

#[test]
fn values_survive_component_migrations() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let entity = world.create_entity(&[position]).unwrap();
    world
        .set_component(entity, Position { x: 1.0, y: 2.0 })
        .unwrap();

    // widen: gain Velocity
    world
        .add_component(entity, Velocity { dx: 3.0, dy: 4.0 })
        .unwrap();
    assert_eq!(
        *world.get_component::<Position>(entity).unwrap(),
        Position { x: 1.0, y: 2.0 }
    );
    assert_eq!(
        *world.get_component::<Velocity>(entity).unwrap(),
        Velocity { dx: 3.0, dy: 4.0 }
    );

    // narrow: lose Velocity again
    world.remove_component::<Velocity>(entity).unwrap();
    assert_eq!(
        *world.get_component::<Position>(entity).unwrap(),
        Position { x: 1.0, y: 2.0 }
    );
    assert!(!world.has_component::<Velocity>(entity));
    assert!(matches!(
        world.get_component::<Velocity>(entity),
        Err(EcsError::MissingComponent(_))
    ));
}

#[test]
fn removing_missing_component_is_an_error() {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let entity = world.create_entity(&[position]).unwrap();

    assert!(matches!(
        world.remove_component::<Health>(entity),
        Err(EcsError::MissingComponent(_))
    ));
    // adding a component twice is a no-op, not an error
    world.add_component(entity, Health(10.0)).unwrap();
    world.add_component(entity, Health(20.0)).unwrap();
    assert_eq!(*world.get_component::<Health>(entity).unwrap(), Health(20.0));
}

#[test]
fn managed_components_move_without_loss() {
    let mut world = World::new();

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Name(String);

    let name = world.register_component::<Name>().unwrap();
    let a = world.create_entity(&[name]).unwrap();
    let b = world.create_entity(&[name]).unwrap();
    let c = world.create_entity(&[name]).unwrap();
    world.set_component(a, Name("alpha".into())).unwrap();
    world.set_component(b, Name("beta".into())).unwrap();
    world.set_component(c, Name("gamma".into())).unwrap();

    // swap-remove the middle row; the tail string moves into the hole
    world.destroy_entity(b).unwrap();
    assert_eq!(world.get_component::<Name>(a).unwrap().0, "alpha");
    assert_eq!(world.get_component::<Name>(c).unwrap().0, "gamma");

    // migration also moves the heap value rather than duplicating it
    world.add_component(c, Health(1.0)).unwrap();
    assert_eq!(world.get_component::<Name>(c).unwrap().0, "gamma");
}

#[test]
fn tag_registration_contract_is_enforced() {
    #[derive(Clone, Copy, Debug, Default)]
    struct Frozen;

    let mut registry = TypeRegistry::new();
    let first = registry.register_tag::<Frozen>().unwrap();
    // idempotent under the same contract
    assert_eq!(registry.register_tag::<Frozen>().unwrap(), first);
    // conflicting contract is rejected
    assert!(registry.register::<Frozen>().is_err());
    // data-carrying tag is rejected
    assert!(registry.register_tag::<Position>().is_err());

    let info = registry.describe(first).unwrap();
    assert!(info.is_tag);
    assert_eq!(info.size, 0);
}

#[test]
fn type_mismatch_is_reported_by_erased_columns() {
    let mut column: Column<Position> = Column::new(16);
    let result = column.push_dyn(Box::new(Velocity { dx: 0.0, dy: 0.0 }));
    assert!(result.is_err());
}
