//! Archetype storage and structural changes.
//!
//! An [`Archetype`] owns the columnar storage for every entity whose
//! component set equals one exact signature: one [`AnyColumn`] per component,
//! plus an implicit entity-handle column kept as a plain `Vec<Entity>`. All
//! columns of an archetype share one per-chunk row capacity, derived once at
//! creation from the fixed chunk byte budget:
//!
//! ```text
//! chunk_capacity = CHUNK_BYTE_BUDGET / (size_of::<Entity>() + sum of component sizes)
//! ```
//!
//! A signature whose single row exceeds the budget is rejected at creation.
//!
//! ## Dense prefix
//!
//! Rows are stored densely: every chunk is full except possibly the last.
//! Removals compact by moving tail rows into freed slots, and every column
//! (including the entity column) must perform the *same* displacement. Each
//! structural routine cross-checks the positions reported by every column and
//! reports [`StructuralError::RowMisalignment`] or
//! [`StructuralError::InconsistentSwapInfo`] on disagreement, since that
//! indicates corrupted storage rather than a recoverable condition.
//!
//! ## The store
//!
//! [`ArchetypeStore`] deduplicates archetypes on raw signature words: asking
//! for the same component set twice, in any registration order, yields the
//! same `ArchetypeID`. Cross-archetype row moves borrow the source and
//! destination simultaneously by splitting the archetype table.

use std::collections::HashMap;

use crate::engine::column::AnyColumn;
use crate::engine::entity::Entity;
use crate::engine::error::{RowBudgetError, StructuralError};
use crate::engine::registry::TypeRegistry;
use crate::engine::types::{
    ArchetypeID, ChunkID, ComponentID, RowID, Signature, SIGNATURE_SIZE,
};

/// Result of moving one entity's row to another archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Where the row landed in the destination archetype.
    pub destination: (ChunkID, RowID),

    /// If compacting the source displaced another entity, the displaced
    /// entity and the position it now occupies (the vacated slot).
    pub source_backfill: Option<(Entity, ChunkID, RowID)>,
}

/// An entity displaced by batched compaction, with its new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// The displaced entity.
    pub entity: Entity,
    /// Chunk the entity now occupies.
    pub chunk: ChunkID,
    /// Row the entity now occupies.
    pub row: RowID,
}

/// A contiguous run of freshly allocated rows within one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRun {
    /// Chunk holding the run.
    pub chunk: ChunkID,
    /// First row of the run.
    pub row: RowID,
    /// Number of rows in the run.
    pub count: usize,
}

/// Columnar storage for all entities sharing one exact component signature.
pub struct Archetype {
    id: ArchetypeID,
    signature: Signature,
    // sorted ascending; parallel to `columns`
    component_ids: Vec<ComponentID>,
    columns: Vec<Box<dyn AnyColumn>>,
    // implicit entity-handle column, linear order
    entities: Vec<Entity>,
    chunk_capacity: usize,
    row_bytes: usize,
}

impl Archetype {
    fn new(
        id: ArchetypeID,
        signature: Signature,
        registry: &TypeRegistry,
        chunk_byte_budget: usize,
    ) -> Result<Self, StructuralError> {
        let component_ids: Vec<ComponentID> = signature.iterate_over_components().collect();

        let mut row_bytes = std::mem::size_of::<Entity>();
        for &component_id in &component_ids {
            let info = registry
                .describe(component_id)
                .map_err(|_| StructuralError::InconsistentStorage { component_id })?;
            row_bytes += info.size;
        }

        let chunk_capacity = chunk_byte_budget / row_bytes;
        if chunk_capacity == 0 {
            return Err(RowBudgetError {
                row_bytes,
                budget: chunk_byte_budget,
            }
            .into());
        }

        let mut columns = Vec::with_capacity(component_ids.len());
        for &component_id in &component_ids {
            let column = registry
                .new_column(component_id, chunk_capacity)
                .map_err(|_| StructuralError::InconsistentStorage { component_id })?;
            columns.push(column);
        }

        log::debug!(
            "created archetype {} ({} components, {} bytes/row, {} rows/chunk)",
            id,
            component_ids.len(),
            row_bytes,
            chunk_capacity
        );

        Ok(Self {
            id,
            signature,
            component_ids,
            columns,
            entities: Vec::new(),
            chunk_capacity,
            row_bytes,
        })
    }

    #[inline]
    pub fn id(&self) -> ArchetypeID {
        self.id
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Component IDs of this signature in ascending order.
    #[inline]
    pub fn component_ids(&self) -> &[ComponentID] {
        &self.component_ids
    }

    /// Number of rows currently stored.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Per-chunk row capacity shared by every column of this archetype.
    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Bytes one row occupies across all columns, entity handle included.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    /// Number of chunks currently allocated.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        if self.entities.is_empty() {
            0
        } else {
            (self.entities.len() - 1) / self.chunk_capacity + 1
        }
    }

    /// Number of rows stored in `chunk`.
    #[inline]
    pub fn chunk_length(&self, chunk: ChunkID) -> usize {
        let chunk = chunk as usize;
        let chunks = self.chunk_count();
        if chunk >= chunks {
            0
        } else if chunk + 1 == chunks {
            self.entities.len() - chunk * self.chunk_capacity
        } else {
            self.chunk_capacity
        }
    }

    #[inline]
    fn linear(&self, chunk: ChunkID, row: RowID) -> usize {
        chunk as usize * self.chunk_capacity + row as usize
    }

    #[inline]
    fn position(&self, linear: usize) -> (ChunkID, RowID) {
        (
            (linear / self.chunk_capacity) as ChunkID,
            (linear % self.chunk_capacity) as RowID,
        )
    }

    /// Index into `columns` for `component_id`, if present.
    #[inline]
    pub fn column_index(&self, component_id: ComponentID) -> Option<usize> {
        self.component_ids.binary_search(&component_id).ok()
    }

    /// Type-erased column for `component_id`.
    pub fn column(&self, component_id: ComponentID) -> Option<&dyn AnyColumn> {
        self.column_index(component_id)
            .map(|index| self.columns[index].as_ref())
    }

    /// Mutable type-erased column for `component_id`.
    pub fn column_mut(&mut self, component_id: ComponentID) -> Option<&mut dyn AnyColumn> {
        self.column_index(component_id)
            .map(|index| self.columns[index].as_mut())
    }

    /// Type-erased column whose element type matches `type_id`. Linear scan;
    /// signatures hold few components.
    pub fn column_by_type(&self, type_id: std::any::TypeId) -> Option<&dyn AnyColumn> {
        self.columns
            .iter()
            .find(|column| column.element_type_id() == type_id)
            .map(|column| column.as_ref())
    }

    /// Mutable variant of [`Archetype::column_by_type`].
    pub fn column_by_type_mut(
        &mut self,
        type_id: std::any::TypeId,
    ) -> Option<&mut dyn AnyColumn> {
        self.columns
            .iter_mut()
            .find(|column| column.element_type_id() == type_id)
            .map(|column| column.as_mut())
    }

    /// Borrows two distinct columns mutably at once, by element type.
    pub fn column_pair_by_type_mut(
        &mut self,
        first: std::any::TypeId,
        second: std::any::TypeId,
    ) -> Option<(&mut dyn AnyColumn, &mut dyn AnyColumn)> {
        if first == second {
            return None;
        }
        let first_index = self
            .columns
            .iter()
            .position(|column| column.element_type_id() == first)?;
        let second_index = self
            .columns
            .iter()
            .position(|column| column.element_type_id() == second)?;
        let (low, high, swapped) = if first_index < second_index {
            (first_index, second_index, false)
        } else {
            (second_index, first_index, true)
        };
        let (head, tail) = self.columns.split_at_mut(high);
        let low_column = head[low].as_mut();
        let high_column = tail[0].as_mut();
        if swapped {
            Some((high_column, low_column))
        } else {
            Some((low_column, high_column))
        }
    }

    /// Entity handle stored at `(chunk, row)`.
    pub fn entity_at(&self, chunk: ChunkID, row: RowID) -> Option<Entity> {
        self.entities.get(self.linear(chunk, row)).copied()
    }

    /// Entity handles of one chunk, in row order.
    pub fn chunk_entities(&self, chunk: ChunkID) -> &[Entity] {
        let start = chunk as usize * self.chunk_capacity;
        let end = start + self.chunk_length(chunk);
        &self.entities[start..end]
    }

    /// Appends a default-initialized row for `entity` at the dense tail and
    /// returns its position. Every column must report the same position.
    pub fn allocate_row(&mut self, entity: Entity) -> Result<(ChunkID, RowID), StructuralError> {
        let expected = self.position(self.entities.len());
        for (index, column) in self.columns.iter_mut().enumerate() {
            let got = column.push_default_dyn();
            if got != expected {
                return Err(StructuralError::RowMisalignment {
                    expected,
                    got,
                    component_id: self.component_ids[index],
                });
            }
        }
        self.entities.push(entity);
        Ok(expected)
    }

    /// Appends one default-initialized row per entity at the dense tail,
    /// splitting across chunk boundaries as the last chunk fills. Returns
    /// the allocated positions coalesced into per-chunk runs, in order.
    pub fn allocate_rows(&mut self, entities: &[Entity]) -> Result<Vec<RowRun>, StructuralError> {
        let mut runs: Vec<RowRun> = Vec::new();
        for &entity in entities {
            let (chunk, row) = self.allocate_row(entity)?;
            match runs.last_mut() {
                Some(run) if run.chunk == chunk && run.row as usize + run.count == row as usize => {
                    run.count += 1;
                }
                _ => runs.push(RowRun {
                    chunk,
                    row,
                    count: 1,
                }),
            }
        }
        Ok(runs)
    }

    /// Removes the row at `(chunk, row)`, compacting with the dense tail.
    ///
    /// Returns the entity that was moved into the vacated slot, if any; the
    /// caller is responsible for re-pointing that entity's index entry.
    pub fn remove_row(
        &mut self,
        chunk: ChunkID,
        row: RowID,
    ) -> Result<Option<Entity>, StructuralError> {
        let index = self.linear(chunk, row);
        let last = self.entities.len() - 1;
        let expected_swap = if index != last {
            Some(self.position(last))
        } else {
            None
        };

        for (column_index, column) in self.columns.iter_mut().enumerate() {
            let component_id = self.component_ids[column_index];
            let moved_from = column
                .swap_remove_dyn(chunk, row)
                .map_err(|source_error| StructuralError::Column {
                    component_id,
                    source_error,
                })?;
            if moved_from != expected_swap {
                return Err(StructuralError::InconsistentSwapInfo { component_id });
            }
        }

        let backfill = if index != last {
            let moved = self.entities[last];
            self.entities[index] = moved;
            self.entities.pop();
            Some(moved)
        } else {
            self.entities.pop();
            None
        };
        Ok(backfill)
    }

    /// Removes the contiguous linear row range `[start, start + count)` in a
    /// single compaction pass. The freed range is refilled from the dense
    /// tail, moving only rows that actually survive the removal.
    ///
    /// Returns the surviving entities that changed position, with their new
    /// positions, so the caller can update the entity index.
    pub fn remove_rows(
        &mut self,
        start: usize,
        count: usize,
    ) -> Result<Vec<Relocation>, StructuralError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        debug_assert!(start + count <= self.entities.len());

        for (column_index, column) in self.columns.iter_mut().enumerate() {
            column
                .swap_remove_range_dyn(start, count)
                .map_err(|source_error| StructuralError::Column {
                    component_id: self.component_ids[column_index],
                    source_error,
                })?;
        }

        let end = start + count;
        let move_source = end.max(self.entities.len() - count);
        let mut relocations = Vec::with_capacity(self.entities.len() - move_source);
        let mut destination = start;
        for index in move_source..self.entities.len() {
            let entity = self.entities[index];
            self.entities[destination] = entity;
            let (chunk, row) = self.position(destination);
            relocations.push(Relocation { entity, chunk, row });
            destination += 1;
        }
        self.entities.truncate(self.entities.len() - count);
        Ok(relocations)
    }
}

/// Moves the row at `(chunk, row)` from `source` into `destination`.
///
/// Components shared by both signatures are moved value-wise; components only
/// in the destination are default-initialized; components only in the source
/// are dropped with the row. Every column of both archetypes must agree on
/// the landing position and on the source's swap displacement.
pub fn move_row(
    source: &mut Archetype,
    destination: &mut Archetype,
    chunk: ChunkID,
    row: RowID,
) -> Result<MoveOutcome, StructuralError> {
    let source_index = source.linear(chunk, row);
    let source_last = source.entities.len() - 1;
    let expected_destination = destination.position(destination.entities.len());
    let expected_swap = if source_index != source_last {
        Some(source.position(source_last))
    } else {
        None
    };

    for destination_column_index in 0..destination.component_ids.len() {
        let component_id = destination.component_ids[destination_column_index];
        let destination_column = destination.columns[destination_column_index].as_mut();

        let got = match source.column_index(component_id) {
            Some(source_column_index) => {
                let source_column = source.columns[source_column_index].as_mut();
                let (got, moved_from) = destination_column
                    .move_row_into_dyn(source_column, chunk, row)
                    .map_err(|source_error| StructuralError::Column {
                        component_id,
                        source_error,
                    })?;
                if moved_from != expected_swap {
                    return Err(StructuralError::InconsistentSwapInfo { component_id });
                }
                got
            }
            // component gained by the move: default value until set
            None => destination_column.push_default_dyn(),
        };

        if got != expected_destination {
            return Err(StructuralError::RowMisalignment {
                expected: expected_destination,
                got,
                component_id,
            });
        }
    }

    // components the move drops
    for source_column_index in 0..source.component_ids.len() {
        let component_id = source.component_ids[source_column_index];
        if destination.column_index(component_id).is_some() {
            continue;
        }
        let moved_from = source.columns[source_column_index]
            .swap_remove_dyn(chunk, row)
            .map_err(|source_error| StructuralError::Column {
                component_id,
                source_error,
            })?;
        if moved_from != expected_swap {
            return Err(StructuralError::InconsistentSwapInfo { component_id });
        }
    }

    let entity = source.entities[source_index];
    destination.entities.push(entity);

    let source_backfill = if source_index != source_last {
        let moved = source.entities[source_last];
        source.entities[source_index] = moved;
        source.entities.pop();
        let (backfill_chunk, backfill_row) = source.position(source_index);
        Some((moved, backfill_chunk, backfill_row))
    } else {
        source.entities.pop();
        None
    };

    Ok(MoveOutcome {
        destination: expected_destination,
        source_backfill,
    })
}

/// Owns all archetypes and deduplicates them by signature.
pub struct ArchetypeStore {
    archetypes: Vec<Archetype>,
    by_signature: HashMap<[u64; SIGNATURE_SIZE], ArchetypeID>,
    chunk_byte_budget: usize,
}

impl ArchetypeStore {
    /// Creates an empty store whose archetypes share `chunk_byte_budget`.
    pub fn new(chunk_byte_budget: usize) -> Self {
        Self {
            archetypes: Vec::new(),
            by_signature: HashMap::new(),
            chunk_byte_budget,
        }
    }

    /// Number of archetypes created so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Returns the archetype for `signature`, creating it on first request.
    /// Creation is deduplicated on the raw signature words, so component
    /// registration order never produces duplicate archetypes.
    pub fn get_or_create(
        &mut self,
        signature: Signature,
        registry: &TypeRegistry,
    ) -> Result<ArchetypeID, StructuralError> {
        if let Some(&existing) = self.by_signature.get(&signature.components) {
            return Ok(existing);
        }

        let id = self.archetypes.len() as ArchetypeID;
        let archetype = Archetype::new(id, signature, registry, self.chunk_byte_budget)?;
        self.by_signature.insert(signature.components, id);
        self.archetypes.push(archetype);
        Ok(id)
    }

    /// Looks up an existing archetype by signature without creating one.
    pub fn find(&self, signature: &Signature) -> Option<ArchetypeID> {
        self.by_signature.get(&signature.components).copied()
    }

    pub fn get(&self, id: ArchetypeID) -> Option<&Archetype> {
        self.archetypes.get(id as usize)
    }

    pub fn get_mut(&mut self, id: ArchetypeID) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id as usize)
    }

    /// Borrows two distinct archetypes mutably at once by splitting the
    /// archetype table at the higher index.
    pub fn get_pair_mut(
        &mut self,
        first: ArchetypeID,
        second: ArchetypeID,
    ) -> Option<(&mut Archetype, &mut Archetype)> {
        if first == second {
            return None;
        }
        let (low, high, swapped) = if first < second {
            (first as usize, second as usize, false)
        } else {
            (second as usize, first as usize, true)
        };
        if high >= self.archetypes.len() {
            return None;
        }
        let (head, tail) = self.archetypes.split_at_mut(high);
        let low_archetype = &mut head[low];
        let high_archetype = &mut tail[0];
        if swapped {
            Some((high_archetype, low_archetype))
        } else {
            Some((low_archetype, high_archetype))
        }
    }

    /// Iterates over all archetypes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }
}
