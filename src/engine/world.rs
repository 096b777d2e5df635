//! The world: owning context for all engine state.
//!
//! A [`World`] owns the type registry, entity index, archetype store, query
//! cache, and job safety manager. There is no ambient or process-global
//! state: everything is reached through a `World` value, two worlds are
//! fully independent, and component IDs are only meaningful within the world
//! that issued them.
//!
//! ## Structural changes and fences
//!
//! Structural operations (create, destroy, add/remove component) relocate
//! rows in chunk memory that outstanding jobs may still be iterating. Every
//! structural entry point therefore first drains the outstanding fences of
//! the affected component types, blocking until conflicting jobs complete.
//! Deferring structural work instead of blocking is what
//! [`CommandBuffer`](crate::engine::commands::CommandBuffer) is for.
//!
//! ## Direct access guards
//!
//! Direct component reads and writes (`get_component`, `set_component`,
//! query iteration) are guarded in debug builds: touching an array with an
//! unobserved conflicting fence reports an
//! [`ExecutionError`](crate::engine::error::ExecutionError) rather than
//! silently racing. Release builds skip the check.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::archetype::{move_row, ArchetypeStore};
use crate::engine::column::Column;
use crate::engine::commands::{Command, CommandBuffer, EntityTarget};
use crate::engine::entity::{Entity, EntityIndex, EntityLocation};
use crate::engine::error::{CommandError, EcsError, EcsResult, MissingComponentError};
use crate::engine::query::{
    ChunkView, ChunkViewMut, QueryBuilder, QueryCache, QueryDescriptor, QueryHandle,
};
use crate::engine::registry::{Component, ComponentInfo, TypeRegistry};
use crate::engine::safety::{JobSafetyManager, TaskHandle};
use crate::engine::types::{
    ArchetypeID, ComponentID, RowID, Signature, CHUNK_BYTE_BUDGET, DEFAULT_ENTITY_CAPACITY_MAX,
};

/// Plain-integer world configuration.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// Fixed byte budget shared by every chunk.
    pub chunk_byte_budget: usize,

    /// Upper bound on entity index table capacity.
    pub entity_capacity_max: usize,

    /// Entity slots reserved up front, clamped to `entity_capacity_max`.
    pub initial_entity_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_byte_budget: CHUNK_BYTE_BUDGET,
            entity_capacity_max: DEFAULT_ENTITY_CAPACITY_MAX,
            initial_entity_capacity: 0,
        }
    }
}

/// Owning context for entity storage, queries, and job safety.
pub struct World {
    registry: TypeRegistry,
    entities: EntityIndex,
    archetypes: ArchetypeStore,
    queries: QueryCache,
    safety: JobSafetyManager,
}

impl Default for World {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl World {
    /// Creates a world with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a world with the given configuration.
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            registry: TypeRegistry::new(),
            entities: EntityIndex::with_capacity(
                config.initial_entity_capacity,
                config.entity_capacity_max,
            ),
            archetypes: ArchetypeStore::new(config.chunk_byte_budget),
            queries: QueryCache::new(),
            safety: JobSafetyManager::new(),
        }
    }

    // ---- registration ----------------------------------------------------

    /// Registers `T` as a value component. Idempotent.
    pub fn register_component<T: Component>(&mut self) -> EcsResult<ComponentID> {
        Ok(self.registry.register::<T>()?)
    }

    /// Registers `T` as a zero-sized tag component. Idempotent.
    pub fn register_tag<T: Component>(&mut self) -> EcsResult<ComponentID> {
        Ok(self.registry.register_tag::<T>()?)
    }

    /// Returns the `ComponentID` of `T`, if registered.
    pub fn component_id<T: 'static>(&self) -> Option<ComponentID> {
        self.registry.id_of::<T>()
    }

    /// Returns the descriptor for a registered component.
    pub fn describe(&self, component_id: ComponentID) -> EcsResult<&ComponentInfo> {
        Ok(self.registry.describe(component_id)?)
    }

    // ---- counters ---------------------------------------------------------

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.live_count()
    }

    /// Number of archetypes created so far.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Returns `true` if `entity` is live.
    #[inline]
    pub fn exists(&self, entity: Entity) -> bool {
        self.entities.exists(entity)
    }

    // ---- creation ---------------------------------------------------------

    /// Creates one entity whose signature is exactly `component_ids`.
    pub fn create_entity(&mut self, component_ids: &[ComponentID]) -> EcsResult<Entity> {
        self.create_with_signature(Signature::from_ids(component_ids))
    }

    /// Creates `count` entities of one signature, appending them as a
    /// contiguous run at the archetype's dense tail.
    pub fn create_entities(
        &mut self,
        component_ids: &[ComponentID],
        count: usize,
    ) -> EcsResult<Vec<Entity>> {
        let signature = Signature::from_ids(component_ids);
        self.drain_write_fences(&signature);
        let archetype_id = self.archetypes.get_or_create(signature, &self.registry)?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            match self.entities.allocate(EntityLocation::default()) {
                Ok(entity) => created.push(entity),
                Err(error) => {
                    // release the slots already taken, leaving the world untouched
                    for &entity in &created {
                        let _ = self.entities.destroy(entity);
                    }
                    return Err(error.into());
                }
            }
        }

        let archetype = self
            .archetypes
            .get_mut(archetype_id)
            .ok_or_else(|| EcsError::Internal(format!("archetype {archetype_id} vanished")))?;
        let runs = match archetype.allocate_rows(&created) {
            Ok(runs) => runs,
            Err(error) => {
                for &entity in &created {
                    let _ = self.entities.destroy(entity);
                }
                return Err(error.into());
            }
        };

        let mut next = 0;
        for run in runs {
            for offset in 0..run.count {
                self.entities.relocate(
                    created[next],
                    archetype_id,
                    run.chunk,
                    run.row + offset as RowID,
                )?;
                next += 1;
            }
        }
        Ok(created)
    }

    /// Creates one entity with the given signature.
    pub fn create_with_signature(&mut self, signature: Signature) -> EcsResult<Entity> {
        self.drain_write_fences(&signature);
        let archetype_id = self.archetypes.get_or_create(signature, &self.registry)?;
        self.allocate_into(archetype_id)
    }

    fn allocate_into(&mut self, archetype_id: ArchetypeID) -> EcsResult<Entity> {
        let entity = self.entities.allocate(EntityLocation::default())?;
        let archetype = self
            .archetypes
            .get_mut(archetype_id)
            .ok_or_else(|| EcsError::Internal(format!("archetype {archetype_id} vanished")))?;
        let (chunk, row) = match archetype.allocate_row(entity) {
            Ok(position) => position,
            Err(error) => {
                // roll back the slot so allocation stays all-or-nothing
                let _ = self.entities.destroy(entity);
                return Err(error.into());
            }
        };
        self.entities.relocate(entity, archetype_id, chunk, row)?;
        Ok(entity)
    }

    // ---- destruction ------------------------------------------------------

    /// Destroys one entity, compacting its chunk and bumping its slot
    /// generation.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let location = self.entities.location_of(entity)?;
        let signature = *self
            .archetypes
            .get(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?
            .signature();
        self.drain_write_fences(&signature);

        let archetype = self
            .archetypes
            .get_mut(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?;
        let backfill = archetype.remove_row(location.chunk, location.row)?;
        if let Some(moved) = backfill {
            self.entities
                .relocate(moved, location.archetype, location.chunk, location.row)?;
        }
        self.entities.destroy(entity)?;
        Ok(())
    }

    /// Destroys a batch of entities. Entities that sit in contiguous rows of
    /// one archetype are compacted in a single pass instead of one
    /// swap-remove each.
    ///
    /// Validates every handle before mutating anything, so a stale handle in
    /// the batch leaves the world untouched.
    pub fn destroy_entities(&mut self, entities: &[Entity]) -> EcsResult<()> {
        let mut unique: Vec<Entity> = entities.to_vec();
        unique.sort_unstable_by_key(|entity| (entity.index, entity.generation));
        unique.dedup();
        let entities = unique;

        // validate-then-mutate
        let mut by_archetype: HashMap<ArchetypeID, Vec<usize>> = HashMap::new();
        for &entity in &entities {
            let location = self.entities.location_of(entity)?;
            let archetype = self
                .archetypes
                .get(location.archetype)
                .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?;
            let linear =
                location.chunk as usize * archetype.chunk_capacity() + location.row as usize;
            by_archetype
                .entry(location.archetype)
                .or_default()
                .push(linear);
        }

        for (archetype_id, mut rows) in by_archetype {
            let signature = *self
                .archetypes
                .get(archetype_id)
                .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?
                .signature();
            self.drain_write_fences(&signature);

            // highest rows first, coalesced into contiguous runs; earlier
            // runs never disturb lower row indices
            rows.sort_unstable_by(|a, b| b.cmp(a));
            rows.dedup();

            let mut cursor = 0;
            while cursor < rows.len() {
                let high = rows[cursor];
                let mut low = high;
                while cursor + 1 < rows.len() && rows[cursor + 1] == low - 1 {
                    cursor += 1;
                    low = rows[cursor];
                }
                cursor += 1;

                let archetype = self
                    .archetypes
                    .get_mut(archetype_id)
                    .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?;
                let relocations = archetype.remove_rows(low, high - low + 1)?;
                for relocation in relocations {
                    self.entities.relocate(
                        relocation.entity,
                        archetype_id,
                        relocation.chunk,
                        relocation.row,
                    )?;
                }
            }
        }

        for entity in entities {
            self.entities.destroy(entity)?;
        }
        Ok(())
    }

    // ---- component structural changes --------------------------------------

    /// Extends `entity`'s signature with component `T` and sets its value.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let component_id = self.registry.register::<T>()?;
        self.add_component_id(entity, component_id)?;
        self.set_component::<T>(entity, value)
    }

    /// Extends `entity`'s signature with `component_id`, moving its row to
    /// the widened archetype. The new cell is default-initialized. A no-op
    /// if the component is already present.
    pub fn add_component_id(&mut self, entity: Entity, component_id: ComponentID) -> EcsResult<()> {
        let location = self.entities.location_of(entity)?;
        let source_signature = *self
            .archetypes
            .get(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?
            .signature();
        if source_signature.has(component_id) {
            return Ok(());
        }

        let mut destination_signature = source_signature;
        destination_signature.set(component_id);
        self.migrate(entity, location, destination_signature)
    }

    /// Removes component `T` from `entity`'s signature.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> EcsResult<()> {
        let component_id = self.registry.register::<T>()?;
        self.remove_component_id(entity, component_id)
    }

    /// Removes `component_id` from `entity`'s signature, moving its row to
    /// the narrowed archetype and dropping the removed value.
    pub fn remove_component_id(
        &mut self,
        entity: Entity,
        component_id: ComponentID,
    ) -> EcsResult<()> {
        let location = self.entities.location_of(entity)?;
        let source_signature = *self
            .archetypes
            .get(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?
            .signature();
        if !source_signature.has(component_id) {
            return Err(MissingComponentError {
                entity,
                component_id,
            }
            .into());
        }

        let mut destination_signature = source_signature;
        destination_signature.clear(component_id);
        self.migrate(entity, location, destination_signature)
    }

    fn migrate(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        destination_signature: Signature,
    ) -> EcsResult<()> {
        // drain fences over the union of both signatures: the move touches
        // columns on both sides
        let source_signature = *self
            .archetypes
            .get(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?
            .signature();
        self.drain_write_fences(&source_signature);
        self.drain_write_fences(&destination_signature);

        let destination_id = self
            .archetypes
            .get_or_create(destination_signature, &self.registry)?;
        let (source, destination) = self
            .archetypes
            .get_pair_mut(location.archetype, destination_id)
            .ok_or_else(|| EcsError::Internal("archetype pair borrow failed".into()))?;

        let outcome = move_row(source, destination, location.chunk, location.row)?;
        log::trace!(
            "entity {}:{} moved from archetype {} to {}",
            entity.index,
            entity.generation,
            location.archetype,
            destination_id
        );
        self.entities.relocate(
            entity,
            destination_id,
            outcome.destination.0,
            outcome.destination.1,
        )?;
        if let Some((moved, chunk, row)) = outcome.source_backfill {
            self.entities
                .relocate(moved, location.archetype, chunk, row)?;
        }
        Ok(())
    }

    // ---- component access --------------------------------------------------

    /// Returns `true` if `entity`'s signature contains `T`.
    pub fn has_component<T: 'static>(&self, entity: Entity) -> bool {
        let Some(component_id) = self.registry.id_of::<T>() else {
            return false;
        };
        let Ok(location) = self.entities.location_of(entity) else {
            return false;
        };
        self.archetypes
            .get(location.archetype)
            .map(|archetype| archetype.signature().has(component_id))
            .unwrap_or(false)
    }

    /// Reads one component value of `entity`. Registers `T` on first use.
    pub fn get_component<T: Component>(&mut self, entity: Entity) -> EcsResult<&T> {
        let component_id = self.registry.register::<T>()?;
        if cfg!(debug_assertions) {
            self.safety.assert_no_pending_write(component_id)?;
        }

        let location = self.entities.location_of(entity)?;
        let archetype = self
            .archetypes
            .get(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?;
        let column = archetype
            .column(component_id)
            .and_then(|column| column.as_any().downcast_ref::<Column<T>>())
            .ok_or(MissingComponentError {
                entity,
                component_id,
            })?;
        column
            .get(location.chunk, location.row)
            .ok_or_else(|| EcsError::Internal("entity location out of column bounds".into()))
    }

    /// Mutably borrows one component value of `entity`.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let component_id = self.registry.register::<T>()?;
        if cfg!(debug_assertions) {
            self.safety.assert_no_pending_access(component_id)?;
        }

        let location = self.entities.location_of(entity)?;
        let archetype = self
            .archetypes
            .get_mut(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?;
        let column = archetype
            .column_mut(component_id)
            .and_then(|column| column.as_any_mut().downcast_mut::<Column<T>>())
            .ok_or(MissingComponentError {
                entity,
                component_id,
            })?;
        column
            .get_mut(location.chunk, location.row)
            .ok_or_else(|| EcsError::Internal("entity location out of column bounds".into()))
    }

    /// Overwrites one component value of `entity`. The component must be
    /// part of the entity's signature.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        *self.get_component_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Type-erased component overwrite, used by command playback.
    pub fn set_component_dyn(
        &mut self,
        entity: Entity,
        component_id: ComponentID,
        value: Box<dyn Any + Send>,
    ) -> EcsResult<()> {
        if cfg!(debug_assertions) {
            self.safety.assert_no_pending_access(component_id)?;
        }
        let location = self.entities.location_of(entity)?;
        let archetype = self
            .archetypes
            .get_mut(location.archetype)
            .ok_or_else(|| EcsError::Internal("location names missing archetype".into()))?;
        let column = archetype
            .column_mut(component_id)
            .ok_or(MissingComponentError {
                entity,
                component_id,
            })?;
        column
            .set_dyn(location.chunk, location.row, value)
            .map_err(EcsError::from)
    }

    // ---- queries ------------------------------------------------------------

    /// Starts a typed query builder. Component types named by the builder
    /// are registered on first use.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(&mut self.registry)
    }

    /// Interns a query descriptor, returning the cached handle if an
    /// identical query exists.
    pub fn create_query(&mut self, descriptor: QueryDescriptor) -> QueryHandle {
        self.queries.intern(descriptor)
    }

    /// Number of entities currently matched by the query.
    pub fn query_count(&mut self, handle: QueryHandle) -> usize {
        let matches = self.queries.resolve(handle, &self.archetypes).to_vec();
        matches
            .iter()
            .filter_map(|&id| self.archetypes.get(id))
            .map(|archetype| archetype.entity_count())
            .sum()
    }

    /// Calls `visit` once per non-empty chunk matched by the query, in
    /// archetype-then-chunk order. Shared access; guarded against pending
    /// write fences on the query's required components in debug builds.
    pub fn for_each_chunk<F>(&mut self, handle: QueryHandle, mut visit: F) -> EcsResult<()>
    where
        F: FnMut(ChunkView<'_>),
    {
        if cfg!(debug_assertions) {
            if let Some(descriptor) = self.queries.descriptor(handle) {
                for component_id in descriptor.required.iterate_over_components() {
                    self.safety.assert_no_pending_write(component_id)?;
                }
            }
        }

        let matches = self.queries.resolve(handle, &self.archetypes).to_vec();
        for archetype_id in matches {
            let Some(archetype) = self.archetypes.get(archetype_id) else {
                continue;
            };
            for chunk in 0..archetype.chunk_count() {
                visit(ChunkView::new(archetype, chunk as u16));
            }
        }
        Ok(())
    }

    /// Lazily yields the chunks matched by the query, in
    /// archetype-then-chunk order. Each call re-resolves against the current
    /// archetype set, so the sequence is finite and restartable; it does not
    /// survive structural changes made while it is held.
    pub fn iter_chunks(
        &mut self,
        handle: QueryHandle,
    ) -> EcsResult<impl Iterator<Item = ChunkView<'_>>> {
        if cfg!(debug_assertions) {
            if let Some(descriptor) = self.queries.descriptor(handle) {
                for component_id in descriptor.required.iterate_over_components() {
                    self.safety.assert_no_pending_write(component_id)?;
                }
            }
        }

        let matches = self.queries.resolve(handle, &self.archetypes).to_vec();
        let archetypes = &self.archetypes;
        Ok(matches
            .into_iter()
            .filter_map(move |archetype_id| archetypes.get(archetype_id))
            .flat_map(|archetype| {
                (0..archetype.chunk_count())
                    .map(move |chunk| ChunkView::new(archetype, chunk as u16))
            }))
    }

    /// Mutable variant of [`World::for_each_chunk`]; guarded against any
    /// pending fence on the query's required components in debug builds.
    pub fn for_each_chunk_mut<F>(&mut self, handle: QueryHandle, mut visit: F) -> EcsResult<()>
    where
        F: FnMut(ChunkViewMut<'_>),
    {
        if cfg!(debug_assertions) {
            if let Some(descriptor) = self.queries.descriptor(handle) {
                for component_id in descriptor.required.iterate_over_components() {
                    self.safety.assert_no_pending_access(component_id)?;
                }
            }
        }

        let matches = self.queries.resolve(handle, &self.archetypes).to_vec();
        for archetype_id in matches {
            let Some(archetype) = self.archetypes.get_mut(archetype_id) else {
                continue;
            };
            for chunk in 0..archetype.chunk_count() {
                visit(ChunkViewMut::new(archetype, chunk as u16));
            }
        }
        Ok(())
    }

    // ---- job safety surface ---------------------------------------------------

    /// Fence a new reading job of `component_id` must depend on.
    pub fn read_fence(&self, component_id: ComponentID) -> Option<TaskHandle> {
        self.safety.read_fence(component_id)
    }

    /// Fence a new writing job of `component_id` must depend on.
    pub fn write_fence(&self, component_id: ComponentID) -> TaskHandle {
        self.safety.write_fence(component_id)
    }

    /// Registers a scheduled reading job on `component_id`.
    pub fn add_read_dependency(&mut self, component_id: ComponentID, handle: TaskHandle) {
        self.safety.add_read_dependency(component_id, handle);
    }

    /// Registers a scheduled writing job on `component_id`.
    pub fn add_write_dependency(&mut self, component_id: ComponentID, handle: TaskHandle) {
        self.safety.add_write_dependency(component_id, handle);
    }

    /// Blocks until main-thread reads of `component_id` are safe.
    pub fn complete_read(&mut self, component_id: ComponentID) {
        self.safety.complete_read(component_id);
    }

    /// Blocks until main-thread writes of `component_id` are safe.
    pub fn complete_write(&mut self, component_id: ComponentID) {
        self.safety.complete_write(component_id);
    }

    /// Blocks until every outstanding fence in the world has completed.
    pub fn complete_all(&mut self) {
        self.safety.complete_all();
    }

    /// Direct access to the job safety manager, for schedulers using the
    /// declaration API.
    pub fn safety(&mut self) -> &mut JobSafetyManager {
        &mut self.safety
    }

    fn drain_write_fences(&mut self, signature: &Signature) {
        for component_id in signature.iterate_over_components() {
            self.safety.complete_write(component_id);
        }
    }

    // ---- command playback --------------------------------------------------

    /// Replays a command buffer in recorded order, binding provisional
    /// tokens to real entities as creations execute. The buffer is left
    /// empty and reusable. Errors identify the offending command.
    pub fn playback(&mut self, buffer: &mut CommandBuffer) -> EcsResult<()> {
        let commands = buffer.drain();
        let mut resolved: HashMap<u32, Entity> = HashMap::new();

        for (command_index, command) in commands.into_iter().enumerate() {
            let result = self.play_one(command, &mut resolved);
            if let Err(source_error) = result {
                return Err(CommandError::Playback {
                    command_index,
                    source_error: Box::new(source_error),
                }
                .into());
            }
        }
        Ok(())
    }

    fn play_one(
        &mut self,
        command: Command,
        resolved: &mut HashMap<u32, Entity>,
    ) -> EcsResult<()> {
        match command {
            Command::Create { token, signature } => {
                let entity = self.create_with_signature(signature)?;
                resolved.insert(token, entity);
                Ok(())
            }
            Command::Set {
                target,
                component_id,
                value,
            } => {
                let entity = resolve_target(target, resolved)?;
                self.set_component_dyn(entity, component_id, value)
            }
            Command::AddTag {
                target,
                component_id,
            } => {
                let entity = resolve_target(target, resolved)?;
                self.add_component_id(entity, component_id)
            }
            Command::Destroy { target } => {
                let entity = resolve_target(target, resolved)?;
                self.destroy_entity(entity)
            }
        }
    }
}

fn resolve_target(
    target: EntityTarget,
    resolved: &HashMap<u32, Entity>,
) -> Result<Entity, EcsError> {
    match target {
        EntityTarget::Existing(entity) => Ok(entity),
        EntityTarget::Provisional(token) => resolved
            .get(&token)
            .copied()
            .ok_or_else(|| CommandError::UnresolvedToken { token }.into()),
    }
}
