//! Chunked columnar storage and type-erased column access.
//!
//! This module implements the column primitive of the storage engine:
//! [`Column<T>`], a dense, chunked container holding one component type for
//! one archetype, and [`AnyColumn`], its dynamically-typed interface used by
//! archetypes to manage heterogeneous column sets behind trait objects.
//!
//! # Storage model
//!
//! A column stores its values as:
//!
//! ```text
//! Vec<Box<[MaybeUninit<T>]>>      // one boxed slice per chunk
//! ```
//!
//! Every chunk of a column has the same row capacity, fixed at archetype
//! creation from the chunk byte budget. Values are written densely from
//! chunk 0 upward with no gaps: all chunks except the final one are fully
//! initialized, and only the last chunk may be partially filled, tracked by
//! `last_chunk_length`. Positions are addressed as `(ChunkID, RowID)`
//! coordinates or as a single linear index.
//!
//! # Core operations
//!
//! - **Append**: `push` writes into the last chunk, allocating a new chunk
//!   when the previous one is full.
//! - **Remove**: `swap_remove` deletes one row in `O(1)` by moving the last
//!   row into the freed slot; `swap_remove_range` removes a contiguous run
//!   in one pass, filling the freed range with only the *actually trailing*
//!   rows.
//! - **Transfer**: `move_row_into_dyn` moves one row from a source column of
//!   the same element type into this column, compacting the source.
//!
//! All removal and transfer paths move values element-wise (`ptr::read` /
//! `ptr::write`), so managed (drop-glue) component types are handled
//! identically to plain data; nothing is ever duplicated or leaked.
//!
//! # Safety and invariants
//!
//! Soundness relies on maintaining these invariants:
//!
//! - `length` equals the total number of initialized rows.
//! - All chunks except the last are fully initialized.
//! - Only `0..last_chunk_length` in the last chunk are initialized.
//! - No method exposes references to uninitialized memory.
//!
//! Raw chunk views (`chunk_bytes`, `chunk_bytes_mut`) exist for callers that
//! hand column memory to external parallel tasks; bounds are checked on
//! every view, and the job safety manager is responsible for serializing
//! conflicting access to the returned memory.

use std::any::{type_name, Any, TypeId};
use std::mem::MaybeUninit;
use std::ptr;
use std::slice;

use crate::engine::error::{ColumnError, PositionOutOfBoundsError, TypeMismatchError};
use crate::engine::types::{ChunkID, RowID};

/// A dynamically-typed interface over a [`Column<T>`].
///
/// Archetypes store columns behind `Box<dyn AnyColumn>` so a single
/// structural-change routine can operate on every column of a signature
/// without knowing element types. Typed access is recovered by downcasting
/// through `as_any` / `as_any_mut`.
///
/// Implementations must keep the dense-prefix invariant documented on
/// [`Column<T>`]; the archetype relies on every column of one archetype
/// reporting identical lengths and identical swap-remove displacement.
pub trait AnyColumn: Any + Send + Sync {
    /// Total number of initialized rows.
    fn length(&self) -> usize;

    /// Number of allocated chunks.
    fn chunk_count(&self) -> usize;

    /// Per-chunk row capacity.
    fn chunk_capacity(&self) -> usize;

    /// `TypeId` of the element type stored by this column.
    fn element_type_id(&self) -> TypeId;

    /// Human-readable name of the element type.
    fn element_type_name(&self) -> &'static str;

    /// Immutable type-erased reference for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable type-erased reference for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Appends a default-initialized row and returns its position.
    fn push_default_dyn(&mut self) -> (ChunkID, RowID);

    /// Appends a dynamically-typed value.
    fn push_dyn(&mut self, value: Box<dyn Any + Send>) -> Result<(ChunkID, RowID), ColumnError>;

    /// Overwrites the row at `(chunk, row)` with a dynamically-typed value.
    /// The previous value is dropped.
    fn set_dyn(
        &mut self,
        chunk: ChunkID,
        row: RowID,
        value: Box<dyn Any + Send>,
    ) -> Result<(), ColumnError>;

    /// Moves one row out of `source` (which must store the same element
    /// type) and appends it to this column. The source is compacted by
    /// moving its last row into the vacated slot.
    ///
    /// Returns the destination position and, if the source performed a
    /// swap, the position the displaced row was moved *from*.
    fn move_row_into_dyn(
        &mut self,
        source: &mut dyn AnyColumn,
        source_chunk: ChunkID,
        source_row: RowID,
    ) -> Result<((ChunkID, RowID), Option<(ChunkID, RowID)>), ColumnError>;

    /// Removes one row, dropping its value; the last row is swapped in.
    ///
    /// Returns the position the filling row was moved from, or `None` if
    /// the removed row was already last.
    fn swap_remove_dyn(
        &mut self,
        chunk: ChunkID,
        row: RowID,
    ) -> Result<Option<(ChunkID, RowID)>, ColumnError>;

    /// Removes the contiguous linear range `[start, start + count)` in one
    /// pass, dropping the removed values and filling the freed range with
    /// the column's trailing rows.
    fn swap_remove_range_dyn(&mut self, start: usize, count: usize) -> Result<(), ColumnError>;

    /// Raw byte view of the first `length` rows of a chunk.
    fn chunk_bytes(&self, chunk: ChunkID, length: usize) -> Option<(*const u8, usize)>;

    /// Mutable raw byte view of the first `length` rows of a chunk.
    fn chunk_bytes_mut(&mut self, chunk: ChunkID, length: usize) -> Option<(*mut u8, usize)>;
}

/// A chunked, dense, column-oriented container for rows of type `T`.
///
/// See the module documentation for the storage model and invariants.
pub struct Column<T> {
    chunks: Vec<Box<[MaybeUninit<T>]>>,
    chunk_capacity: usize,
    // number of initialized rows in the last chunk
    last_chunk_length: usize,
    length: usize,
}

fn new_chunk<T>(capacity: usize) -> Box<[MaybeUninit<T>]> {
    let mut chunk = Vec::with_capacity(capacity);
    // SAFETY: MaybeUninit<T> requires no initialization; the spare capacity
    // becomes the chunk's uninitialized row storage.
    unsafe {
        chunk.set_len(capacity);
    }
    chunk.into_boxed_slice()
}

impl<T: Send + Sync + 'static> Column<T> {
    /// Creates an empty column whose chunks hold `chunk_capacity` rows each.
    pub fn new(chunk_capacity: usize) -> Self {
        assert!(chunk_capacity > 0, "chunk capacity must be at least one row");
        Self {
            chunks: Vec::new(),
            chunk_capacity,
            last_chunk_length: 0,
            length: 0,
        }
    }

    /// Total number of initialized rows.
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of allocated chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Per-chunk row capacity.
    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Number of initialized rows in `chunk`.
    #[inline]
    pub fn chunk_length(&self, chunk: ChunkID) -> usize {
        let chunk = chunk as usize;
        if chunk >= self.chunks.len() {
            0
        } else if chunk + 1 == self.chunks.len() {
            self.last_chunk_length
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

    #[inline]
    fn valid_position(&self, chunk: ChunkID, row: RowID) -> bool {
        (row as usize) < self.chunk_capacity && self.linear(chunk, row) < self.length
    }

    #[inline]
    fn out_of_bounds(&self, chunk: ChunkID, row: RowID) -> PositionOutOfBoundsError {
        PositionOutOfBoundsError {
            chunk,
            row,
            length: self.length,
            chunk_capacity: self.chunk_capacity,
        }
    }

    /// Raw pointer to the slot at linear index `index`. No bounds checks in
    /// release builds.
    #[inline]
    fn slot_ptr(&mut self, index: usize) -> *mut MaybeUninit<T> {
        debug_assert!(index < self.chunks.len() * self.chunk_capacity);
        let chunk = index / self.chunk_capacity;
        let row = index % self.chunk_capacity;
        &mut self.chunks[chunk][row] as *mut MaybeUninit<T>
    }

    /// Ensures there is a writable slot at the dense tail.
    #[inline]
    fn ensure_last_chunk(&mut self) {
        if self.chunks.is_empty() || self.last_chunk_length == self.chunk_capacity {
            self.chunks.push(new_chunk::<T>(self.chunk_capacity));
            self.last_chunk_length = 0;
        }
    }

    /// Recomputes chunk allocation and `last_chunk_length` after the logical
    /// length dropped to `new_length`. Rows beyond `new_length` must already
    /// be logically dead (moved out or dropped).
    fn shrink_to(&mut self, new_length: usize) {
        self.length = new_length;
        if new_length == 0 {
            self.chunks.clear();
            self.last_chunk_length = 0;
            return;
        }
        let needed_chunks = (new_length - 1) / self.chunk_capacity + 1;
        self.chunks.truncate(needed_chunks);
        self.last_chunk_length = (new_length - 1) % self.chunk_capacity + 1;
    }

    /// Returns a shared reference to the row at `(chunk, row)`.
    pub fn get(&self, chunk: ChunkID, row: RowID) -> Option<&T> {
        if !self.valid_position(chunk, row) {
            return None;
        }
        // SAFETY: valid_position guarantees the slot is initialized.
        Some(unsafe { self.chunks[chunk as usize][row as usize].assume_init_ref() })
    }

    /// Returns a mutable reference to the row at `(chunk, row)`.
    pub fn get_mut(&mut self, chunk: ChunkID, row: RowID) -> Option<&mut T> {
        if !self.valid_position(chunk, row) {
            return None;
        }
        // SAFETY: valid_position guarantees the slot is initialized.
        Some(unsafe { self.chunks[chunk as usize][row as usize].assume_init_mut() })
    }

    /// Returns the initialized prefix of `chunk` as a typed slice.
    pub fn chunk_slice(&self, chunk: ChunkID) -> &[T] {
        let length = self.chunk_length(chunk);
        if length == 0 {
            return &[];
        }
        // SAFETY: the first `length` rows of the chunk are initialized, and
        // MaybeUninit<T> has the same layout as T.
        unsafe {
            slice::from_raw_parts(self.chunks[chunk as usize].as_ptr() as *const T, length)
        }
    }

    /// Returns the initialized prefix of `chunk` as a mutable typed slice.
    pub fn chunk_slice_mut(&mut self, chunk: ChunkID) -> &mut [T] {
        let length = self.chunk_length(chunk);
        if length == 0 {
            return &mut [];
        }
        // SAFETY: as for chunk_slice.
        unsafe {
            slice::from_raw_parts_mut(self.chunks[chunk as usize].as_mut_ptr() as *mut T, length)
        }
    }

    /// Appends a row at the dense tail.
    pub fn push(&mut self, value: T) -> (ChunkID, RowID) {
        self.ensure_last_chunk();
        let chunk = self.chunks.len() - 1;
        let row = self.last_chunk_length;

        // SAFETY: ensure_last_chunk guarantees the slot exists and is
        // uninitialized.
        unsafe {
            self.chunks[chunk][row].as_mut_ptr().write(value);
        }
        self.last_chunk_length += 1;
        self.length += 1;

        (chunk as ChunkID, row as RowID)
    }

    /// Removes the row at `(chunk, row)`, dropping its value and swapping
    /// the last row into the freed slot when necessary.
    pub fn swap_remove(
        &mut self,
        chunk: ChunkID,
        row: RowID,
    ) -> Result<Option<(ChunkID, RowID)>, ColumnError> {
        if !self.valid_position(chunk, row) {
            return Err(self.out_of_bounds(chunk, row).into());
        }

        let index = self.linear(chunk, row);
        let last_index = self.length - 1;

        // SAFETY: index is initialized; the value is dropped exactly once.
        unsafe {
            ptr::drop_in_place(self.slot_ptr(index) as *mut T);
        }

        let moved_from = if index != last_index {
            // SAFETY: last_index is initialized and distinct from index; the
            // read value is written into the (now vacant) removed slot.
            unsafe {
                let last_value = ptr::read(self.slot_ptr(last_index) as *const T);
                ptr::write(self.slot_ptr(index) as *mut T, last_value);
            }
            Some(self.position(last_index))
        } else {
            None
        };

        self.shrink_to(self.length - 1);
        Ok(moved_from)
    }

    /// Removes the contiguous linear range `[start, start + count)` in one
    /// pass. Removed values are dropped; the freed range is filled by the
    /// column's trailing rows (only rows that actually survive are moved).
    pub fn swap_remove_range(&mut self, start: usize, count: usize) -> Result<(), ColumnError> {
        if count == 0 {
            return Ok(());
        }
        let end = start + count;
        if end > self.length {
            let (chunk, row) = self.position(start.min(self.length));
            return Err(self.out_of_bounds(chunk, row).into());
        }

        // SAFETY: all rows in [start, end) are initialized and dropped once.
        unsafe {
            for index in start..end {
                ptr::drop_in_place(self.slot_ptr(index) as *mut T);
            }
        }

        // Trailing survivors are rows in [max(end, length - count), length);
        // anything earlier in the tail window was itself removed.
        let move_source = end.max(self.length - count);
        let mut destination = start;
        // SAFETY: source rows are initialized (they are outside the removed
        // range), destination slots are vacant after the drops above.
        unsafe {
            for index in move_source..self.length {
                let value = ptr::read(self.slot_ptr(index) as *const T);
                ptr::write(self.slot_ptr(destination) as *mut T, value);
                destination += 1;
            }
        }

        self.shrink_to(self.length - count);
        Ok(())
    }

    /// Iterates over all initialized rows in linear order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.chunk_count() as u16).flat_map(move |chunk| self.chunk_slice(chunk).iter())
    }
}

impl<T> Drop for Column<T> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }
        let chunk_total = self.chunks.len();
        for (chunk_index, chunk) in self.chunks.iter_mut().enumerate() {
            let initialized = if chunk_index + 1 == chunk_total {
                self.last_chunk_length
            } else {
                self.chunk_capacity
            };
            for slot in &mut chunk[..initialized] {
                // SAFETY: the dense-prefix invariant says exactly these
                // slots are initialized.
                unsafe {
                    ptr::drop_in_place(slot.as_mut_ptr());
                }
            }
        }
    }
}

impl<T: Send + Sync + Default + 'static> AnyColumn for Column<T> {
    fn length(&self) -> usize {
        self.length
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn push_default_dyn(&mut self) -> (ChunkID, RowID) {
        self.push(T::default())
    }

    fn push_dyn(&mut self, value: Box<dyn Any + Send>) -> Result<(ChunkID, RowID), ColumnError> {
        let value = value.downcast::<T>().map_err(|_| TypeMismatchError {
            expected: TypeId::of::<T>(),
            expected_name: type_name::<T>(),
        })?;
        Ok(self.push(*value))
    }

    fn set_dyn(
        &mut self,
        chunk: ChunkID,
        row: RowID,
        value: Box<dyn Any + Send>,
    ) -> Result<(), ColumnError> {
        if !self.valid_position(chunk, row) {
            return Err(self.out_of_bounds(chunk, row).into());
        }
        let value = value.downcast::<T>().map_err(|_| TypeMismatchError {
            expected: TypeId::of::<T>(),
            expected_name: type_name::<T>(),
        })?;
        // SAFETY: valid_position guarantees the slot is initialized.
        *unsafe { self.chunks[chunk as usize][row as usize].assume_init_mut() } = *value;
        Ok(())
    }

    fn move_row_into_dyn(
        &mut self,
        source: &mut dyn AnyColumn,
        source_chunk: ChunkID,
        source_row: RowID,
    ) -> Result<((ChunkID, RowID), Option<(ChunkID, RowID)>), ColumnError> {
        let source = source
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .ok_or(TypeMismatchError {
                expected: TypeId::of::<T>(),
                expected_name: type_name::<T>(),
            })?;

        if !source.valid_position(source_chunk, source_row) {
            return Err(source.out_of_bounds(source_chunk, source_row).into());
        }

        let source_index = source.linear(source_chunk, source_row);
        let source_last = source.length - 1;

        // SAFETY: the slot is initialized; ownership transfers to the push
        // below, and the vacated slot is either refilled from the source's
        // tail or trimmed by shrink_to.
        let value = unsafe { ptr::read(source.slot_ptr(source_index) as *const T) };
        let destination = self.push(value);

        let moved_from = if source_index != source_last {
            // SAFETY: the last row is initialized and distinct from the
            // vacated slot.
            unsafe {
                let last_value = ptr::read(source.slot_ptr(source_last) as *const T);
                ptr::write(source.slot_ptr(source_index) as *mut T, last_value);
            }
            Some(source.position(source_last))
        } else {
            None
        };

        source.shrink_to(source.length - 1);
        Ok((destination, moved_from))
    }

    fn swap_remove_dyn(
        &mut self,
        chunk: ChunkID,
        row: RowID,
    ) -> Result<Option<(ChunkID, RowID)>, ColumnError> {
        self.swap_remove(chunk, row)
    }

    fn swap_remove_range_dyn(&mut self, start: usize, count: usize) -> Result<(), ColumnError> {
        self.swap_remove_range(start, count)
    }

    fn chunk_bytes(&self, chunk: ChunkID, length: usize) -> Option<(*const u8, usize)> {
        if length > self.chunk_length(chunk) {
            return None;
        }
        Some((
            self.chunks[chunk as usize].as_ptr() as *const u8,
            length * std::mem::size_of::<T>(),
        ))
    }

    fn chunk_bytes_mut(&mut self, chunk: ChunkID, length: usize) -> Option<(*mut u8, usize)> {
        if length > self.chunk_length(chunk) {
            return None;
        }
        Some((
            self.chunks[chunk as usize].as_mut_ptr() as *mut u8,
            length * std::mem::size_of::<T>(),
        ))
    }
}
