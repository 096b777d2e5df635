//! # Engine Module
//!
//! Internal storage-engine implementation.
//!
//! This module contains all core building blocks:
//! - Entity index and generational handles
//! - Component registry
//! - Chunked columnar storage
//! - Archetypes and structural changes
//! - Query matching and caching
//! - Job safety fences
//! - Deferred command buffers
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod registry;
pub mod entity;
pub mod column;
pub mod archetype;
pub mod query;
pub mod safety;
pub mod commands;
pub mod world;
