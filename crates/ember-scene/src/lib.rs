//! Entity store for the Ember renderer.
//!
//! Uses hecs as the ECS backend. Render crates attach their own GPU
//! handle components next to the ones defined here.

use glam::Vec3;
pub use ember_core::Transform;
pub use hecs::{Entity, World};

/// Point light component.
///
/// The light's radius is stored in `Transform::scale.x` and its color in
/// the entity's [`Tint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub intensity: f32,
}

/// Base color of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tint(pub Vec3);

impl Default for Tint {
    fn default() -> Self {
        Self(Vec3::ONE)
    }
}

/// Material selector passed to the main pass shaders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialIndex(pub i32);

/// Parameters for [`Scene::spawn_point_light`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLightDesc {
    pub intensity: f32,
    pub radius: f32,
    pub color: Vec3,
}

impl Default for PointLightDesc {
    fn default() -> Self {
        Self {
            intensity: 10.0,
            radius: 0.1,
            color: Vec3::ONE,
        }
    }
}

/// The set of entities rendered each frame.
#[derive(Default)]
pub struct Scene {
    world: World,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the underlying world.
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Get the underlying world mutably.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Spawn an entity with arbitrary components.
    pub fn spawn(&mut self, components: impl hecs::DynamicBundle) -> Entity {
        self.world.spawn(components)
    }

    /// Spawn a point light at `position`.
    pub fn spawn_point_light(&mut self, position: Vec3, desc: PointLightDesc) -> Entity {
        let transform = Transform {
            translation: position,
            scale: Vec3::new(desc.radius, 1.0, 1.0),
            ..Transform::default()
        };
        self.world.spawn((
            transform,
            PointLight {
                intensity: desc.intensity,
            },
            Tint(desc.color),
        ))
    }

    /// Remove an entity. Returns false if it did not exist.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity).is_ok()
    }

    /// Number of live entities.
    pub fn len(&self) -> u32 {
        self.world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }

    /// Number of entities carrying a [`PointLight`].
    pub fn point_light_count(&self) -> usize {
        self.world.query::<&PointLight>().iter().count()
    }
}

/// Stable numeric id of an entity, used for ordering and debugging.
pub fn entity_id(entity: Entity) -> u64 {
    entity.to_bits().get()
}
