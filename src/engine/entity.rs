use crate::engine::error::{CapacityError, StaleEntityError};
use crate::engine::types::{
    ArchetypeID, ChunkID, EntityIndexID, GenerationID, RowID, DEFAULT_ENTITY_CAPACITY_MAX,
    ENTITY_GROWTH_STEP,
};

/// Generational handle identifying one logical record.
///
/// The handle is live while `generation` matches the slot's stored
/// generation. Generations are bumped only on destroy, so a handle held
/// across its entity's destruction stops validating immediately.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Entity {
    /// Slot index in the entity index table.
    pub index: EntityIndexID,
    /// Generation the slot had when this handle was issued.
    pub generation: GenerationID,
}

/// Storage location of a live entity: archetype, chunk, and row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype holding the entity's row.
    pub archetype: ArchetypeID,
    /// Chunk within the archetype.
    pub chunk: ChunkID,
    /// Row within the chunk.
    pub row: RowID,
}

/// Entity index table: maps entity handles to storage locations and owns
/// the free-list of recycled slot indices.
///
/// Invariant: a slot's location is valid if and only if the slot is
/// occupied (`alive[index]`). Vacant slots live on the free-list.
pub struct EntityIndex {
    generations: Vec<GenerationID>,
    alive: Vec<bool>,
    locations: Vec<EntityLocation>,
    free_list: Vec<EntityIndexID>,
    capacity_max: usize,
    live_count: usize,
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::with_capacity(0, DEFAULT_ENTITY_CAPACITY_MAX)
    }
}

impl EntityIndex {
    /// Creates an empty index with the default capacity bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index with `initial` slots reserved up front and a hard
    /// bound of `capacity_max` slots. `initial` is clamped to the bound.
    pub fn with_capacity(initial: usize, capacity_max: usize) -> Self {
        let initial = initial.min(capacity_max);
        Self {
            generations: vec![0; initial],
            alive: vec![false; initial],
            locations: vec![EntityLocation::default(); initial],
            // reversed so low indices are handed out first
            free_list: (0..initial as EntityIndexID).rev().collect(),
            capacity_max,
            live_count: 0,
        }
    }

    /// Number of live entities.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    fn ensure_capacity(&mut self, additional: usize) -> Result<(), CapacityError> {
        if additional == 0 {
            return Ok(());
        }

        let current = self.generations.len();
        let needed = current + additional;
        if needed > self.capacity_max {
            return Err(CapacityError {
                entities_needed: needed as u64,
                capacity: self.capacity_max as u64,
            });
        }

        if needed == self.capacity_max {
            log::warn!("entity index reached its capacity bound of {needed} slots");
        } else {
            log::debug!("entity index grew to {needed} slots");
        }

        self.generations.resize(needed, 0);
        self.alive.resize(needed, false);
        self.locations.resize(needed, EntityLocation::default());

        // Push in reverse so low indices are recycled first.
        for index in (current..needed).rev() {
            self.free_list.push(index as EntityIndexID);
        }
        Ok(())
    }

    /// Allocates a handle for a freshly stored row.
    ///
    /// Pops the free-list head and stamps `location`. The returned handle
    /// carries the slot's *existing* generation: generations are bumped on
    /// destroy, not on allocate.
    pub fn allocate(&mut self, location: EntityLocation) -> Result<Entity, CapacityError> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                let step = ENTITY_GROWTH_STEP.min(self.capacity_max - self.generations.len());
                self.ensure_capacity(step.max(1))?;
                self.free_list
                    .pop()
                    .expect("capacity growth must yield a free slot")
            }
        };

        let slot = index as usize;
        self.alive[slot] = true;
        self.locations[slot] = location;
        self.live_count += 1;

        Ok(Entity {
            index,
            generation: self.generations[slot],
        })
    }

    /// Returns `true` if `entity` refers to a live slot with a matching
    /// generation.
    #[inline]
    pub fn exists(&self, entity: Entity) -> bool {
        let slot = entity.index as usize;
        slot < self.generations.len()
            && self.alive[slot]
            && self.generations[slot] == entity.generation
    }

    /// Destroys `entity`: bumps the slot generation, clears the location,
    /// and returns the index to the free-list head.
    ///
    /// Generation arithmetic wraps. A handle that survives a full 2^32
    /// destroy/recycle cycle of its slot would validate again; this is an
    /// accepted boundary condition, treated as practically unreachable.
    /// Debug builds fail loudly if a slot's generation ever wraps to zero.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), StaleEntityError> {
        if !self.exists(entity) {
            return Err(StaleEntityError { entity });
        }

        let slot = entity.index as usize;
        let next = self.generations[slot].wrapping_add(1);
        debug_assert!(
            next != 0,
            "entity generation counter wrapped for slot {}",
            entity.index
        );
        self.generations[slot] = next;
        self.alive[slot] = false;
        self.locations[slot] = EntityLocation::default();
        self.free_list.push(entity.index);
        self.live_count -= 1;
        Ok(())
    }

    /// Returns the storage location of a live entity.
    pub fn location_of(&self, entity: Entity) -> Result<EntityLocation, StaleEntityError> {
        if self.exists(entity) {
            Ok(self.locations[entity.index as usize])
        } else {
            Err(StaleEntityError { entity })
        }
    }

    /// Re-points a live entity at a new chunk/row after a structural change.
    /// Does not touch the generation.
    pub fn relocate(
        &mut self,
        entity: Entity,
        archetype: ArchetypeID,
        chunk: ChunkID,
        row: RowID,
    ) -> Result<(), StaleEntityError> {
        if !self.exists(entity) {
            return Err(StaleEntityError { entity });
        }
        self.locations[entity.index as usize] = EntityLocation {
            archetype,
            chunk,
            row,
        };
        Ok(())
    }
}
