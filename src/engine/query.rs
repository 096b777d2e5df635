//! Query matching, per-query caching, and chunk views.
//!
//! A query selects archetypes by signature: every component in `required`
//! must be present and every component in `excluded` must be absent.
//! Matching is subtractive only; there is no "any of" clause.
//!
//! ## Caching
//!
//! Queries are interned by the [`QueryCache`]: creating a query with a
//! descriptor that was seen before returns the existing handle. Each cached
//! query remembers its matching archetype list together with an
//! archetype-count **watermark**: archetypes are append-only and their
//! signatures never change, so a cached list is refreshed by testing only the
//! archetypes created since the watermark. Row mutation (create, destroy,
//! component set) never invalidates a cached match list.
//!
//! ## Chunk views
//!
//! Iteration yields one [`ChunkView`] (or [`ChunkViewMut`]) per non-empty
//! chunk, in archetype-then-chunk order. A view exposes the chunk's entity
//! slice and typed component column slices, resolved by element type. Typed
//! access goes through the [`AnyColumn`](crate::engine::column::AnyColumn)
//! downcast, so asking a chunk for a type its archetype does not store simply
//! yields `None`.

use std::any::TypeId;
use std::collections::HashMap;

use crate::engine::archetype::{Archetype, ArchetypeStore};
use crate::engine::column::Column;
use crate::engine::entity::Entity;
use crate::engine::error::RegistryError;
use crate::engine::registry::{Component, TypeRegistry};
use crate::engine::types::{ArchetypeID, ChunkID, Signature, SIGNATURE_SIZE};

/// What a query matches: all of `required`, none of `excluded`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct QueryDescriptor {
    /// Components an archetype must contain to match.
    pub required: Signature,
    /// Components an archetype must not contain to match.
    pub excluded: Signature,
}

impl QueryDescriptor {
    /// Returns `true` if an archetype with `signature` matches this query.
    #[inline]
    pub fn matches(&self, signature: &Signature) -> bool {
        signature.contains_all(&self.required) && signature.is_disjoint(&self.excluded)
    }
}

/// Typed builder for [`QueryDescriptor`].
///
/// Component types named by the builder are registered on first use, so a
/// query may be declared before any entity carries its components.
pub struct QueryBuilder<'r> {
    registry: &'r mut TypeRegistry,
    descriptor: QueryDescriptor,
}

impl<'r> QueryBuilder<'r> {
    pub fn new(registry: &'r mut TypeRegistry) -> Self {
        Self {
            registry,
            descriptor: QueryDescriptor::default(),
        }
    }

    /// Requires component `T` to be present.
    pub fn with<T: Component>(mut self) -> Result<Self, RegistryError> {
        let component_id = self.registry.register::<T>()?;
        self.descriptor.required.set(component_id);
        Ok(self)
    }

    /// Requires component `T` to be absent.
    pub fn without<T: Component>(mut self) -> Result<Self, RegistryError> {
        let component_id = self.registry.register::<T>()?;
        self.descriptor.excluded.set(component_id);
        Ok(self)
    }

    pub fn build(self) -> QueryDescriptor {
        self.descriptor
    }
}

/// Opaque handle to an interned query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryHandle(u32);

struct CachedQuery {
    descriptor: QueryDescriptor,
    matches: Vec<ArchetypeID>,
    // number of archetypes already tested against the descriptor
    watermark: usize,
}

/// Interns query descriptors and caches their matching archetype lists.
#[derive(Default)]
pub struct QueryCache {
    queries: Vec<CachedQuery>,
    by_descriptor: HashMap<([u64; SIGNATURE_SIZE], [u64; SIGNATURE_SIZE]), QueryHandle>,
}

impl QueryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct queries interned.
    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Interns `descriptor`, returning the existing handle if an identical
    /// descriptor was interned before.
    pub fn intern(&mut self, descriptor: QueryDescriptor) -> QueryHandle {
        let key = (
            descriptor.required.components,
            descriptor.excluded.components,
        );
        if let Some(&existing) = self.by_descriptor.get(&key) {
            return existing;
        }
        let handle = QueryHandle(self.queries.len() as u32);
        self.by_descriptor.insert(key, handle);
        self.queries.push(CachedQuery {
            descriptor,
            matches: Vec::new(),
            watermark: 0,
        });
        handle
    }

    /// Returns the descriptor interned under `handle`.
    pub fn descriptor(&self, handle: QueryHandle) -> Option<&QueryDescriptor> {
        self.queries
            .get(handle.0 as usize)
            .map(|cached| &cached.descriptor)
    }

    /// Returns the up-to-date matching archetype list for `handle`, testing
    /// only archetypes created since the last resolve.
    pub fn resolve(&mut self, handle: QueryHandle, store: &ArchetypeStore) -> &[ArchetypeID] {
        let cached = &mut self.queries[handle.0 as usize];
        if cached.watermark < store.len() {
            for archetype in store.iter().skip(cached.watermark) {
                if cached.descriptor.matches(archetype.signature()) {
                    cached.matches.push(archetype.id());
                }
            }
            cached.watermark = store.len();
        }
        &cached.matches
    }
}

/// Shared view of one chunk of one matching archetype.
pub struct ChunkView<'a> {
    archetype: &'a Archetype,
    chunk: ChunkID,
}

impl<'a> ChunkView<'a> {
    pub(crate) fn new(archetype: &'a Archetype, chunk: ChunkID) -> Self {
        Self { archetype, chunk }
    }

    /// Archetype this chunk belongs to.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeID {
        self.archetype.id()
    }

    /// Chunk index within the archetype.
    #[inline]
    pub fn chunk_id(&self) -> ChunkID {
        self.chunk
    }

    /// Number of rows in this chunk.
    #[inline]
    pub fn length(&self) -> usize {
        self.archetype.chunk_length(self.chunk)
    }

    /// Entity handles of this chunk, in row order.
    pub fn entities(&self) -> &'a [Entity] {
        self.archetype.chunk_entities(self.chunk)
    }

    /// Typed component slice for this chunk, or `None` if the archetype
    /// does not store `T`.
    pub fn column<T: Component>(&self) -> Option<&'a [T]> {
        let column = self
            .archetype
            .column_by_type(TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<Column<T>>()?;
        Some(column.chunk_slice(self.chunk))
    }
}

/// Mutable view of one chunk of one matching archetype.
///
/// Typed mutable access borrows the view, so two columns are obtained either
/// sequentially or together through [`ChunkViewMut::columns_mut`].
pub struct ChunkViewMut<'a> {
    archetype: &'a mut Archetype,
    chunk: ChunkID,
}

impl<'a> ChunkViewMut<'a> {
    pub(crate) fn new(archetype: &'a mut Archetype, chunk: ChunkID) -> Self {
        Self { archetype, chunk }
    }

    #[inline]
    pub fn archetype_id(&self) -> ArchetypeID {
        self.archetype.id()
    }

    #[inline]
    pub fn chunk_id(&self) -> ChunkID {
        self.chunk
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.archetype.chunk_length(self.chunk)
    }

    pub fn entities(&self) -> &[Entity] {
        self.archetype.chunk_entities(self.chunk)
    }

    /// Typed shared component slice for this chunk.
    pub fn column<T: Component>(&self) -> Option<&[T]> {
        let column = self
            .archetype
            .column_by_type(TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<Column<T>>()?;
        Some(column.chunk_slice(self.chunk))
    }

    /// Typed mutable component slice for this chunk.
    pub fn column_mut<T: Component>(&mut self) -> Option<&mut [T]> {
        let chunk = self.chunk;
        let column = self
            .archetype
            .column_by_type_mut(TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<Column<T>>()?;
        Some(column.chunk_slice_mut(chunk))
    }

    /// Two typed mutable component slices at once. `A` and `B` must be
    /// distinct types stored by this archetype.
    pub fn columns_mut<A: Component, B: Component>(
        &mut self,
    ) -> Option<(&mut [A], &mut [B])> {
        let chunk = self.chunk;
        let (first, second) = self
            .archetype
            .column_pair_by_type_mut(TypeId::of::<A>(), TypeId::of::<B>())?;
        let first = first.as_any_mut().downcast_mut::<Column<A>>()?;
        let second = second.as_any_mut().downcast_mut::<Column<B>>()?;
        Some((first.chunk_slice_mut(chunk), second.chunk_slice_mut(chunk)))
    }
}
