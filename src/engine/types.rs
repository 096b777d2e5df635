//! Core identifiers, capacity constants, and component signatures.
//!
//! This module defines the **fundamental types, identifiers, and bit layouts**
//! shared across all subsystems of the storage engine: the entity index,
//! archetype storage, query matching, the job safety manager, and command
//! playback.
//!
//! ## Design Philosophy
//!
//! The engine is designed around:
//!
//! - **Dense columnar storage**
//! - **Bitset-based signatures**
//! - **Stable numeric identifiers**
//! - **Explicit access declaration**
//!
//! To support these goals efficiently, this module:
//!
//! - Uses small, copyable numeric IDs for all engine concepts,
//! - Represents component sets as fixed-size bit arrays,
//! - Avoids heap allocation in hot paths.
//!
//! ## Signatures
//!
//! Component signatures:
//!
//! - are fixed-size arrays of `u64`,
//! - support fast bitwise subset and disjointness tests,
//! - allow efficient iteration over set bits,
//! - are used for both archetype identity and query matching.
//!
//! Two archetypes with equal signatures are the *same* archetype; archetype
//! creation deduplicates on the raw signature words.
//!
//! ## Capacities
//!
//! All capacities are plain integers with no dynamic configuration schema.
//! The chunk byte budget bounds the per-chunk row capacity of every
//! archetype: `chunk_capacity = CHUNK_BYTE_BUDGET / row_bytes`, computed once
//! at archetype creation.

/// Unique identifier for a registered component type.
pub type ComponentID = u16;

/// Unique identifier for an archetype.
pub type ArchetypeID = u16;

/// Chunk index within an archetype.
pub type ChunkID = u16;

/// Row index within a chunk.
pub type RowID = u32;

/// Slot index within the entity index table.
pub type EntityIndexID = u32;

/// Generation counter used to detect stale entity handles.
pub type GenerationID = u32;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 1024;

/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

/// Fixed byte budget shared by every chunk, across all archetypes.
///
/// An archetype's per-chunk row capacity is derived from this budget and the
/// archetype's total row width (entity handle plus all component sizes).
pub const CHUNK_BYTE_BUDGET: usize = 16 * 1024;

/// Number of entity slots added per growth step of the entity index table.
pub const ENTITY_GROWTH_STEP: usize = 1024;

/// Default upper bound on entity index table capacity.
pub const DEFAULT_ENTITY_CAPACITY_MAX: usize = (u32::MAX - 1) as usize;

/// Bound on the per-component read fence list held by the job safety
/// manager. Once reached, existing read fences are combined into one before
/// another is admitted.
pub const MAX_READ_FENCES: usize = 16;

/// Bitset representing a set of component types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            components: [0u64; SIGNATURE_SIZE],
        }
    }
}

impl Signature {
    /// Builds a signature from a list of component IDs.
    pub fn from_ids(component_ids: &[ComponentID]) -> Self {
        let mut signature = Signature::default();
        for &component_id in component_ids {
            signature.set(component_id);
        }
        signature
    }

    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if all components in `required` are present.
    #[inline]
    pub fn contains_all(&self, required: &Signature) -> bool {
        for (word, required_word) in self.components.iter().zip(required.components.iter()) {
            if (word & required_word) != *required_word {
                return false;
            }
        }
        true
    }

    /// Returns `true` if no component is present in both signatures.
    #[inline]
    pub fn is_disjoint(&self, other: &Signature) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(word, other_word)| (word & other_word) == 0)
    }

    /// Returns `true` if no bits are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&word| word == 0)
    }

    /// Number of components present in this signature.
    #[inline]
    pub fn count(&self) -> usize {
        self.components
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }

    /// Iterates over all component IDs set in this signature, in ascending
    /// order. Ascending iteration order is what makes a signature equivalent
    /// to a *sorted* component type list.
    pub fn iterate_over_components(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentID)
                })
            })
    }
}
