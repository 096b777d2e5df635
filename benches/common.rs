#![allow(dead_code)]

use corral::prelude::*;
use corral::ComponentID;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Wealth {
    pub value: f32,
}

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

pub fn make_world() -> (World, [ComponentID; 3]) {
    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let velocity = world.register_component::<Velocity>().unwrap();
    let wealth = world.register_component::<Wealth>().unwrap();
    (world, [position, velocity, wealth])
}

pub fn populate(world: &mut World, ids: &[ComponentID], count: usize) -> Vec<Entity> {
    let entities = world.create_entities(ids, count).unwrap();
    for (i, &entity) in entities.iter().enumerate() {
        world
            .set_component(
                entity,
                Position {
                    x: i as f32,
                    y: 0.0,
                },
            )
            .unwrap();
    }
    entities
}
