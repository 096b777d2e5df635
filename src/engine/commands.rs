//! Deferred structural commands.
//!
//! Structural changes (create, destroy, archetype moves) cannot run while
//! jobs iterate chunk memory. A [`CommandBuffer`] records them instead:
//! an append-only log replayed later, on a single thread, at a point where
//! structural mutation is safe.
//!
//! ## Provisional entities
//!
//! Recording a `Create` cannot return a real [`Entity`]; entity slots are
//! assigned at playback. It returns an [`EntityTarget::Provisional`] token
//! instead, valid as the target of later commands *in the same log*.
//! Playback replays commands in recorded order, binding each token to the
//! real entity the moment its `Create` executes; a command that uses a token
//! before its `Create` has run fails with
//! [`CommandError::UnresolvedToken`](crate::engine::error::CommandError).
//!
//! ## Parallel recording
//!
//! [`CommandBuffer::split`] carves the buffer into [`CommandRegion`]s, each
//! with a pre-reserved, disjoint range of provisional tokens. Regions are
//! `Send`: parallel tasks record into their own region lock-free, and
//! [`CommandBuffer::commit`] merges the regions back in region order on one
//! thread. Tokens stay unambiguous because no two regions can mint the same
//! one.

use std::any::Any;

use crate::engine::entity::Entity;
use crate::engine::error::CommandError;
use crate::engine::registry::Component;
use crate::engine::types::{ComponentID, Signature};

/// Target of a deferred command: a live entity, or an entity this same log
/// will create during playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityTarget {
    /// An entity that is already live.
    Existing(Entity),
    /// An entity a `Create` command in the same log will produce.
    Provisional(u32),
}

impl From<Entity> for EntityTarget {
    fn from(entity: Entity) -> Self {
        EntityTarget::Existing(entity)
    }
}

/// One recorded structural command.
pub enum Command {
    /// Create an entity with the given signature and bind it to `token`.
    Create { token: u32, signature: Signature },

    /// Overwrite one component value on the target. The component must be
    /// part of the target's signature at playback time.
    Set {
        target: EntityTarget,
        component_id: ComponentID,
        value: Box<dyn Any + Send>,
    },

    /// Extend the target's signature with one component (default value if
    /// not a tag). Moves the target's row to the widened archetype.
    AddTag {
        target: EntityTarget,
        component_id: ComponentID,
    },

    /// Destroy the target.
    Destroy { target: EntityTarget },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Create { token, .. } => {
                f.debug_struct("Create").field("token", token).finish()
            }
            Command::Set {
                target,
                component_id,
                ..
            } => f
                .debug_struct("Set")
                .field("target", target)
                .field("component_id", component_id)
                .finish(),
            Command::AddTag {
                target,
                component_id,
            } => f
                .debug_struct("AddTag")
                .field("target", target)
                .field("component_id", component_id)
                .finish(),
            Command::Destroy { target } => {
                f.debug_struct("Destroy").field("target", target).finish()
            }
        }
    }
}

/// Append-only log of deferred structural commands.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_token: u32,
}

impl CommandBuffer {
    /// Creates an empty command log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Discards all recorded commands and token bindings.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.next_token = 0;
    }

    /// Records the creation of an entity with `signature` and returns a
    /// provisional target usable by later commands in this log.
    pub fn create(&mut self, signature: Signature) -> EntityTarget {
        let token = self.next_token;
        self.next_token += 1;
        self.commands.push(Command::Create { token, signature });
        EntityTarget::Provisional(token)
    }

    /// Records a component overwrite on `target`.
    pub fn set<T: Component>(
        &mut self,
        target: EntityTarget,
        component_id: ComponentID,
        value: T,
    ) {
        self.commands.push(Command::Set {
            target,
            component_id,
            value: Box::new(value),
        });
    }

    /// Records extending `target`'s signature with `component_id`.
    pub fn add_tag(&mut self, target: EntityTarget, component_id: ComponentID) {
        self.commands.push(Command::AddTag {
            target,
            component_id,
        });
    }

    /// Records the destruction of `target`.
    pub fn destroy(&mut self, target: EntityTarget) {
        self.commands.push(Command::Destroy { target });
    }

    /// Carves off `parts` independent recording regions, each pre-reserved
    /// for `creations_per_part` entity creations. Regions record lock-free
    /// on separate threads; merge them back with [`CommandBuffer::commit`].
    pub fn split(&mut self, parts: usize, creations_per_part: u32) -> Vec<CommandRegion> {
        let mut regions = Vec::with_capacity(parts);
        for _ in 0..parts {
            let start = self.next_token;
            self.next_token += creations_per_part;
            regions.push(CommandRegion {
                commands: Vec::new(),
                next_token: start,
                token_end: start + creations_per_part,
                reserved: creations_per_part,
            });
        }
        regions
    }

    /// Merges regions back into the log in region order.
    pub fn commit(&mut self, regions: Vec<CommandRegion>) {
        for mut region in regions {
            self.commands.append(&mut region.commands);
        }
    }

    /// Drains the log in recorded order for playback. The buffer is empty
    /// and reusable afterwards.
    pub(crate) fn drain(&mut self) -> Vec<Command> {
        self.next_token = 0;
        std::mem::take(&mut self.commands)
    }
}

/// One lock-free recording region produced by [`CommandBuffer::split`].
///
/// Carries its own disjoint provisional-token range, so creations recorded
/// in parallel never collide.
pub struct CommandRegion {
    commands: Vec<Command>,
    next_token: u32,
    token_end: u32,
    reserved: u32,
}

impl CommandRegion {
    /// Number of commands recorded in this region.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Records an entity creation against this region's reserved token
    /// range. Fails once the reservation is used up.
    pub fn create(&mut self, signature: Signature) -> Result<EntityTarget, CommandError> {
        if self.next_token == self.token_end {
            return Err(CommandError::RegionExhausted {
                reserved: self.reserved,
            });
        }
        let token = self.next_token;
        self.next_token += 1;
        self.commands.push(Command::Create { token, signature });
        Ok(EntityTarget::Provisional(token))
    }

    /// Records a component overwrite on `target`.
    pub fn set<T: Component>(
        &mut self,
        target: EntityTarget,
        component_id: ComponentID,
        value: T,
    ) {
        self.commands.push(Command::Set {
            target,
            component_id,
            value: Box::new(value),
        });
    }

    /// Records extending `target`'s signature with `component_id`.
    pub fn add_tag(&mut self, target: EntityTarget, component_id: ComponentID) {
        self.commands.push(Command::AddTag {
            target,
            component_id,
        });
    }

    /// Records the destruction of `target`.
    pub fn destroy(&mut self, target: EntityTarget) {
        self.commands.push(Command::Destroy { target });
    }
}
