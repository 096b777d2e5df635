//! Error types for the storage engine.
//!
//! This module declares focused, composable error types used across the
//! entity index, columnar storage, structural-change, query, safety, and
//! command subsystems. Each error carries enough context to make failures
//! actionable while remaining small and cheap to pass around or convert into
//! the aggregate [`EcsError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (stale
//!   entity handles, insufficient capacity, type contract conflicts, pending
//!   job fences).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`EcsError`].
//! * **Actionability:** Structured fields (requested vs. available capacity,
//!   offending entity or component, expected vs. actual types) make failures
//!   diagnosable without reproducing the issue.
//!
//! ## Taxonomy
//! Three families, reported at the call site and never deferred:
//! 1. **Usage errors** — operating on a destroyed entity, double destroy,
//!    requesting a component a signature doesn't have, registering
//!    conflicting type contracts.
//! 2. **Concurrency-safety violations** — touching component data while a
//!    conflicting, unobserved job fence is outstanding ([`ExecutionError`]).
//! 3. **Capacity exhaustion** — entity table or chunk allocation failure
//!    ([`CapacityError`], [`RowBudgetError`]), fatal for the operation and
//!    surfaced to the caller rather than silently truncating data.

use std::any::TypeId;
use std::fmt;

use crate::engine::entity::Entity;
use crate::engine::types::{ChunkID, ComponentID, RowID};

/// Convenience alias for results carrying the aggregate [`EcsError`].
pub type EcsResult<T> = Result<T, EcsError>;

/// Returned when the engine cannot satisfy a request to create additional
/// entities because the entity index table is at its configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    /// Total entity slots the operation attempted to reach.
    pub entities_needed: u64,

    /// Configured upper bound that prevented the operation.
    pub capacity: u64,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity limit reached ({} needed; capacity {})",
            self.entities_needed, self.capacity
        )
    }
}

impl std::error::Error for CapacityError {}

/// Returned when an `Entity` handle is no longer valid — typically because
/// it was destroyed and the slot's generation no longer matches the handle.
///
/// Use this to catch use-after-free style logic errors at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError {
    /// The offending handle.
    pub entity: Entity,
}

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stale or dead entity handle {:?} (generation mismatch)",
            self.entity
        )
    }
}

impl std::error::Error for StaleEntityError {}

/// Returned when an operation requires a component that the entity's
/// archetype signature does not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingComponentError {
    /// Entity whose archetype lacks the component.
    pub entity: Entity,

    /// Component that was requested.
    pub component_id: ComponentID,
}

impl fmt::Display for MissingComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity {:?} has no component {} in its signature",
            self.entity, self.component_id
        )
    }
}

impl std::error::Error for MissingComponentError {}

/// Configuration errors caught at component registration time.
///
/// These never occur at runtime: mixing the value and tag contracts on one
/// type, or registering a tag type that carries data or drop glue, is a
/// programming error reported by `register`/`register_tag` immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The same Rust type was registered under both the value-component and
    /// tag-component contracts.
    ContractConflict {
        /// Rust type name of the offending component.
        type_name: &'static str,
        /// `true` if the earlier registration used the tag contract.
        registered_as_tag: bool,
    },

    /// A tag component must be zero-sized and must not need drop.
    InvalidTagType {
        /// Rust type name of the offending component.
        type_name: &'static str,
        /// Size of the type in bytes.
        size: usize,
    },

    /// The component registry is full.
    ComponentCapacity {
        /// Configured component capacity.
        capacity: usize,
    },

    /// A `ComponentID` was used that no registration produced.
    UnknownComponent {
        /// The offending identifier.
        component_id: ComponentID,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::ContractConflict {
                type_name,
                registered_as_tag,
            } => write!(
                f,
                "component type {type_name} already registered under the {} contract",
                if *registered_as_tag { "tag" } else { "value" }
            ),
            RegistryError::InvalidTagType { type_name, size } => write!(
                f,
                "tag component {type_name} must be zero-sized and trivially droppable (size {size})"
            ),
            RegistryError::ComponentCapacity { capacity } => {
                write!(f, "component registry full (capacity {capacity})")
            }
            RegistryError::UnknownComponent { component_id } => {
                write!(f, "component id {component_id} is not registered")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Returned when a `(ChunkID, RowID)` pair refers to a position outside
/// valid column storage bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOutOfBoundsError {
    /// Chunk index that was addressed.
    pub chunk: ChunkID,

    /// Row index that was addressed.
    pub row: RowID,

    /// Number of initialized rows in the column.
    pub length: usize,

    /// Per-chunk row capacity of the column.
    pub chunk_capacity: usize,
}

impl fmt::Display for PositionOutOfBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "position (chunk {}, row {}) out of bounds (length {}, chunk capacity {})",
            self.chunk, self.row, self.length, self.chunk_capacity
        )
    }
}

impl std::error::Error for PositionOutOfBoundsError {}

/// Returned when a type-erased column operation is handed a value or a
/// source column of the wrong element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatchError {
    /// Element type the column actually stores.
    pub expected: TypeId,

    /// Human-readable name of the expected element type.
    pub expected_name: &'static str,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "column element type mismatch (column stores {})",
            self.expected_name
        )
    }
}

impl std::error::Error for TypeMismatchError {}

/// Errors raised by typed or type-erased column storage operations.
#[derive(Debug)]
pub enum ColumnError {
    /// Addressed position is invalid.
    Position(PositionOutOfBoundsError),

    /// Element type mismatch on a dynamically-typed operation.
    TypeMismatch(TypeMismatchError),
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnError::Position(e) => e.fmt(f),
            ColumnError::TypeMismatch(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ColumnError {}

impl From<PositionOutOfBoundsError> for ColumnError {
    fn from(e: PositionOutOfBoundsError) -> Self {
        ColumnError::Position(e)
    }
}

impl From<TypeMismatchError> for ColumnError {
    fn from(e: TypeMismatchError) -> Self {
        ColumnError::TypeMismatch(e)
    }
}

/// Errors raised while moving an entity's row between archetypes.
///
/// Row moves are the single most failure-prone structural operation: every
/// column of both archetypes must agree on the destination row and on any
/// swap-remove displacement in the source. Disagreement indicates storage
/// corruption and is reported rather than tolerated.
#[derive(Debug)]
pub enum StructuralError {
    /// A single row of this signature does not fit the chunk byte budget.
    RowBudget(RowBudgetError),

    /// A column that the signature promises is missing from the archetype.
    InconsistentStorage {
        /// Component whose column was absent.
        component_id: ComponentID,
    },

    /// Columns disagreed about the destination row of a move.
    RowMisalignment {
        /// Destination reported by the first column.
        expected: (ChunkID, RowID),
        /// Destination reported by the offending column.
        got: (ChunkID, RowID),
        /// Offending component.
        component_id: ComponentID,
    },

    /// Columns disagreed about swap-remove displacement in the source.
    InconsistentSwapInfo {
        /// Offending component.
        component_id: ComponentID,
    },

    /// A column-level operation failed during the move.
    Column {
        /// Component whose column failed.
        component_id: ComponentID,
        /// Underlying storage error.
        source_error: ColumnError,
    },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::RowBudget(e) => e.fmt(f),
            StructuralError::InconsistentStorage { component_id } => {
                write!(f, "missing column for component {component_id}")
            }
            StructuralError::RowMisalignment {
                expected,
                got,
                component_id,
            } => write!(
                f,
                "row misalignment while moving component {component_id}: expected {expected:?}, got {got:?}"
            ),
            StructuralError::InconsistentSwapInfo { component_id } => write!(
                f,
                "inconsistent swap-remove displacement for component {component_id}"
            ),
            StructuralError::Column {
                component_id,
                source_error,
            } => write!(f, "column {component_id} failed: {source_error}"),
        }
    }
}

impl std::error::Error for StructuralError {}

impl From<RowBudgetError> for StructuralError {
    fn from(e: RowBudgetError) -> Self {
        StructuralError::RowBudget(e)
    }
}

/// Returned at archetype creation when a single row of the requested
/// signature exceeds the fixed chunk byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBudgetError {
    /// Bytes required by one row (entity handle plus all components).
    pub row_bytes: usize,

    /// The fixed chunk byte budget.
    pub budget: usize,
}

impl fmt::Display for RowBudgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signature row of {} bytes exceeds chunk byte budget of {}",
            self.row_bytes, self.budget
        )
    }
}

impl std::error::Error for RowBudgetError {}

/// Concurrency-safety violations detected by the job safety manager.
///
/// Touching a component array while an unobserved job holds a conflicting
/// fence is a programmer error and is reported as soon as detected — before
/// any memory can be corrupted — never silently raced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionError {
    /// Component data was accessed while a write job is still pending.
    PendingWriteFence {
        /// Component whose write fence is outstanding.
        component_id: ComponentID,
    },

    /// Component data was accessed for writing while read jobs are pending.
    PendingReadFence {
        /// Component with outstanding read fences.
        component_id: ComponentID,
        /// Number of incomplete read fences observed.
        pending: usize,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::PendingWriteFence { component_id } => write!(
                f,
                "component {component_id} array accessed while a write job is still pending"
            ),
            ExecutionError::PendingReadFence {
                component_id,
                pending,
            } => write!(
                f,
                "component {component_id} array accessed for writing while {pending} read job(s) are still pending"
            ),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Errors raised during deferred command playback.
#[derive(Debug)]
pub enum CommandError {
    /// A command referenced a provisional token that no prior `Create`
    /// command in the log resolved.
    UnresolvedToken {
        /// The offending provisional token.
        token: u32,
    },

    /// A command targeted an entity that no longer exists.
    StaleTarget(StaleEntityError),

    /// A parallel command region ran out of its pre-reserved provisional
    /// tokens.
    RegionExhausted {
        /// Number of creations the region was reserved for.
        reserved: u32,
    },

    /// Replaying the command against the store failed.
    Playback {
        /// Index of the offending command in the log.
        command_index: usize,
        /// Underlying engine error.
        source_error: Box<EcsError>,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnresolvedToken { token } => {
                write!(f, "provisional entity token {token} was never created")
            }
            CommandError::StaleTarget(e) => e.fmt(f),
            CommandError::RegionExhausted { reserved } => write!(
                f,
                "command region exhausted its {reserved} reserved provisional token(s)"
            ),
            CommandError::Playback {
                command_index,
                source_error,
            } => write!(f, "command {command_index} failed: {source_error}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<StaleEntityError> for CommandError {
    fn from(e: StaleEntityError) -> Self {
        CommandError::StaleTarget(e)
    }
}

/// Aggregate error for the public world API.
#[derive(Debug)]
pub enum EcsError {
    /// Entity table exhaustion.
    Capacity(CapacityError),

    /// Stale or dead entity handle.
    StaleEntity(StaleEntityError),

    /// Component absent from the entity's signature.
    MissingComponent(MissingComponentError),

    /// Component registration contract violation.
    Registry(RegistryError),

    /// Column storage failure.
    Column(ColumnError),

    /// Structural change failure.
    Structural(StructuralError),

    /// Concurrency-safety violation.
    Execution(ExecutionError),

    /// Deferred command playback failure.
    Command(CommandError),

    /// Internal invariant violation. Indicates a bug in the engine itself.
    Internal(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::Capacity(e) => e.fmt(f),
            EcsError::StaleEntity(e) => e.fmt(f),
            EcsError::MissingComponent(e) => e.fmt(f),
            EcsError::Registry(e) => e.fmt(f),
            EcsError::Column(e) => e.fmt(f),
            EcsError::Structural(e) => e.fmt(f),
            EcsError::Execution(e) => e.fmt(f),
            EcsError::Command(e) => e.fmt(f),
            EcsError::Internal(message) => write!(f, "internal invariant violation: {message}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<CapacityError> for EcsError {
    fn from(e: CapacityError) -> Self {
        EcsError::Capacity(e)
    }
}

impl From<StaleEntityError> for EcsError {
    fn from(e: StaleEntityError) -> Self {
        EcsError::StaleEntity(e)
    }
}

impl From<MissingComponentError> for EcsError {
    fn from(e: MissingComponentError) -> Self {
        EcsError::MissingComponent(e)
    }
}

impl From<RegistryError> for EcsError {
    fn from(e: RegistryError) -> Self {
        EcsError::Registry(e)
    }
}

impl From<ColumnError> for EcsError {
    fn from(e: ColumnError) -> Self {
        EcsError::Column(e)
    }
}

impl From<StructuralError> for EcsError {
    fn from(e: StructuralError) -> Self {
        EcsError::Structural(e)
    }
}

impl From<RowBudgetError> for EcsError {
    fn from(e: RowBudgetError) -> Self {
        EcsError::Structural(StructuralError::RowBudget(e))
    }
}

impl From<ExecutionError> for EcsError {
    fn from(e: ExecutionError) -> Self {
        EcsError::Execution(e)
    }
}

impl From<CommandError> for EcsError {
    fn from(e: CommandError) -> Self {
        EcsError::Command(e)
    }
}
