//! Component type registry.
//!
//! Assigns a stable [`ComponentID`] to every component type on first use and
//! records its byte size, alignment, and whether it carries drop glue
//! ("managed"). The registry also stores a per-type column factory used by
//! archetype construction to allocate empty columns from a `ComponentID`
//! alone.
//!
//! ## Contracts
//! Two registration contracts exist:
//! - **Value components** ([`TypeRegistry::register`]): ordinary typed data.
//! - **Tag components** ([`TypeRegistry::register_tag`]): zero-sized markers
//!   used purely for signature matching.
//!
//! Mixing the two contracts on one Rust type, or registering a tag type that
//! carries data or drop glue, is a configuration error caught at
//! registration time, not at runtime.
//!
//! ## Ownership
//! The registry is a plain value owned by the world context object. There is
//! no process-global state: two worlds may assign different IDs to the same
//! Rust type, and IDs are only meaningful within the world that issued them.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::mem::{align_of, needs_drop, size_of};

use crate::engine::column::{AnyColumn, Column};
use crate::engine::error::RegistryError;
use crate::engine::types::{ComponentID, COMPONENT_CAP};

/// Marker bound for storable component types.
///
/// `Default` is required because structural changes that add a component
/// leave the new column cell default-initialized until a value is set.
pub trait Component: Send + Sync + Default + 'static {}

impl<T: Send + Sync + Default + 'static> Component for T {}

/// Factory producing an empty column for a component, given the owning
/// archetype's per-chunk row capacity.
pub type ColumnFactory = fn(usize) -> Box<dyn AnyColumn>;

fn make_column<T: Component>(chunk_capacity: usize) -> Box<dyn AnyColumn> {
    Box::new(Column::<T>::new(chunk_capacity))
}

/// Describes a registered component type. Immutable once registered.
#[derive(Copy, Clone, Debug)]
pub struct ComponentInfo {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentID,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// Size of the component type in bytes.
    pub size: usize,

    /// Alignment of the component type in bytes.
    pub align: usize,

    /// `true` if values of this type carry drop glue and must be moved
    /// element-wise rather than treated as plain bytes.
    pub is_managed: bool,

    /// `true` if the type was registered under the tag contract.
    pub is_tag: bool,
}

impl std::fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ComponentInfo {{ id: {}, name: {}, size: {}, managed: {}, tag: {} }}",
            self.component_id, self.name, self.size, self.is_managed, self.is_tag
        )
    }
}

/// Maps Rust component types to compact, stable [`ComponentID`] values and
/// stores their descriptors and column factories.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching descriptor and factory.
/// - IDs are assigned sequentially and never reused.
#[derive(Default)]
pub struct TypeRegistry {
    by_type: HashMap<TypeId, ComponentID>,
    infos: Vec<ComponentInfo>,
    factories: Vec<ColumnFactory>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns `true` if no component types are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    fn register_inner<T: Component>(&mut self, as_tag: bool) -> Result<ComponentID, RegistryError> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            let info = &self.infos[existing as usize];
            if info.is_tag != as_tag {
                return Err(RegistryError::ContractConflict {
                    type_name: info.name,
                    registered_as_tag: info.is_tag,
                });
            }
            return Ok(existing);
        }

        if as_tag && (size_of::<T>() != 0 || needs_drop::<T>()) {
            return Err(RegistryError::InvalidTagType {
                type_name: type_name::<T>(),
                size: size_of::<T>(),
            });
        }

        if self.infos.len() >= COMPONENT_CAP {
            return Err(RegistryError::ComponentCapacity {
                capacity: COMPONENT_CAP,
            });
        }

        let component_id = self.infos.len() as ComponentID;
        self.by_type.insert(type_id, component_id);
        self.infos.push(ComponentInfo {
            component_id,
            name: type_name::<T>(),
            type_id,
            size: size_of::<T>(),
            align: align_of::<T>(),
            is_managed: needs_drop::<T>(),
            is_tag: as_tag,
        });
        self.factories.push(make_column::<T>);

        log::debug!(
            "registered component {} as id {} ({} bytes{})",
            type_name::<T>(),
            component_id,
            size_of::<T>(),
            if as_tag { ", tag" } else { "" }
        );

        Ok(component_id)
    }

    /// Registers `T` as a value component. Idempotent: the same type always
    /// receives the same ID within this registry.
    pub fn register<T: Component>(&mut self) -> Result<ComponentID, RegistryError> {
        self.register_inner::<T>(false)
    }

    /// Registers `T` as a zero-sized tag component.
    ///
    /// Fails if `T` carries data or drop glue, or if `T` was previously
    /// registered as a value component.
    pub fn register_tag<T: Component>(&mut self) -> Result<ComponentID, RegistryError> {
        self.register_inner::<T>(true)
    }

    /// Returns the `ComponentID` for `T`, if registered.
    pub fn id_of<T: 'static>(&self) -> Option<ComponentID> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the descriptor for `component_id`.
    pub fn describe(&self, component_id: ComponentID) -> Result<&ComponentInfo, RegistryError> {
        self.infos
            .get(component_id as usize)
            .ok_or(RegistryError::UnknownComponent { component_id })
    }

    /// Allocates an empty column for `component_id` with the given per-chunk
    /// row capacity.
    pub fn new_column(
        &self,
        component_id: ComponentID,
        chunk_capacity: usize,
    ) -> Result<Box<dyn AnyColumn>, RegistryError> {
        let factory = self
            .factories
            .get(component_id as usize)
            .ok_or(RegistryError::UnknownComponent { component_id })?;
        Ok(factory(chunk_capacity))
    }
}
