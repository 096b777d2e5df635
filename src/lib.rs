//! # Corral
//!
//! Archetype-based columnar entity storage with per-component job-safety
//! fences.
//!
//! ## Design Goals
//! - Archetype/chunk columnar storage for cache efficiency
//! - Generational entity handles with free-list recycling
//! - Explicit, fence-based serialization of conflicting job access
//! - Deferred structural changes via replayable command buffers
//!
//! The engine owns storage and bookkeeping only: parallel tasks are spawned
//! by an external scheduler, which hands the engine opaque completion
//! handles to store, combine, and await.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core storage types

pub use engine::world::{World, WorldConfig};

pub use engine::entity::{Entity, EntityLocation};

pub use engine::registry::{Component, ComponentInfo};

pub use engine::query::{
    ChunkView, ChunkViewMut, QueryBuilder, QueryDescriptor, QueryHandle,
};

pub use engine::safety::{JobSafetyManager, TaskHandle};

pub use engine::commands::{Command, CommandBuffer, CommandRegion, EntityTarget};

pub use engine::error::{
    CapacityError, ColumnError, CommandError, EcsError, EcsResult, ExecutionError,
    MissingComponentError, RegistryError, RowBudgetError, StaleEntityError, StructuralError,
};

pub use engine::types::{
    ArchetypeID, ChunkID, ComponentID, RowID, Signature, CHUNK_BYTE_BUDGET, COMPONENT_CAP,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used storage types.
///
/// Import with:
/// ```rust
/// use corral::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CommandBuffer, Component, EcsError, EcsResult, Entity, EntityTarget, QueryDescriptor,
        QueryHandle, Signature, TaskHandle, World, WorldConfig,
    };
}
