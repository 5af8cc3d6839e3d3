//! Descriptor set layouts, pools and writers.
//!
//! A [`DescriptorSetLayout`] remembers its bindings so a
//! [`DescriptorWriter`] can check every write against the declaration.
//! Pool exhaustion is not an error: [`DescriptorPool::allocate`] returns
//! `None` and the caller decides what to do.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use ash::vk;
use hashbrown::HashMap;
use std::sync::Arc;

/// Descriptor set layout builder.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: HashMap<u32, vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    ///
    /// # Panics
    /// If `binding` was already added.
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        assert!(
            !self.bindings.contains_key(&binding),
            "descriptor binding {binding} already in use"
        );
        self.bindings.insert(
            binding,
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Build the descriptor set layout.
    pub fn build(self, ctx: &Arc<GpuContext>) -> Result<DescriptorSetLayout> {
        let mut bindings: Vec<_> = self.bindings.values().copied().collect();
        bindings.sort_by_key(|b| b.binding);

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { ctx.device().create_descriptor_set_layout(&layout_info, None)? };

        Ok(DescriptorSetLayout {
            ctx: Arc::clone(ctx),
            layout,
            bindings: self.bindings,
        })
    }
}

/// A descriptor set layout and the bindings it declares.
pub struct DescriptorSetLayout {
    ctx: Arc<GpuContext>,
    layout: vk::DescriptorSetLayout,
    bindings: HashMap<u32, vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayout {
    /// Start building a layout.
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::new()
    }

    /// Get the raw layout handle.
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Declared binding, if any.
    pub fn binding(&self, binding: u32) -> Option<&vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings.get(&binding)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx
                .device()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool builder.
pub struct DescriptorPoolBuilder {
    max_sets: u32,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            max_sets: 1000,
            pool_sizes: Vec::new(),
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorPoolBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve room for `count` descriptors of `descriptor_type`.
    pub fn pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(descriptor_type)
                .descriptor_count(count),
        );
        self
    }

    /// Set the maximum number of sets.
    pub const fn max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    /// Set pool creation flags.
    pub const fn flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Build the descriptor pool.
    pub fn build(self, ctx: &Arc<GpuContext>) -> Result<DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes)
            .flags(self.flags);

        let pool = unsafe { ctx.device().create_descriptor_pool(&create_info, None)? };
        Ok(DescriptorPool {
            ctx: Arc::clone(ctx),
            pool,
        })
    }
}

/// Descriptor pool for allocating descriptor sets.
pub struct DescriptorPool {
    ctx: Arc<GpuContext>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Start building a pool.
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::new()
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one set with `layout`.
    ///
    /// Returns `Ok(None)` when the pool is exhausted or fragmented. Any
    /// other failure is an error.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> Result<Option<vk::DescriptorSet>> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        match unsafe { self.ctx.device().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(sets.first().copied()),
            Err(e) => allocation_failure(e),
        }
    }

    /// Return sets to the pool.
    ///
    /// The pool must have been built with `FREE_DESCRIPTOR_SET`.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> Result<()> {
        if !sets.is_empty() {
            unsafe { self.ctx.device().free_descriptor_sets(self.pool, sets)? };
        }
        Ok(())
    }

    /// Return every set to the pool.
    ///
    /// No set from this pool may still be in use by the GPU.
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.ctx
                .device()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.ctx.device().destroy_descriptor_pool(self.pool, None) };
    }
}

enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: WriteInfo,
}

/// Collects writes for one set and applies them to a new or existing set.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorWriter<'a> {
    /// Writer for sets of `layout` allocated from `pool`.
    pub const fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            writes: Vec::new(),
        }
    }

    /// Write a buffer descriptor.
    ///
    /// # Panics
    /// If the layout does not declare `binding` as a single descriptor.
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        let descriptor_type = single_descriptor_type(self.layout.binding(binding), binding);
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            info: WriteInfo::Buffer(info),
        });
        self
    }

    /// Write an image descriptor.
    ///
    /// # Panics
    /// If the layout does not declare `binding` as a single descriptor.
    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        let descriptor_type = single_descriptor_type(self.layout.binding(binding), binding);
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            info: WriteInfo::Image(info),
        });
        self
    }

    /// Allocate a set from the pool and apply the writes to it.
    ///
    /// Returns `Ok(None)` if the pool is exhausted.
    pub fn build(&self) -> Result<Option<vk::DescriptorSet>> {
        let Some(set) = self.pool.allocate(self.layout)? else {
            return Ok(None);
        };
        self.overwrite(set);
        Ok(Some(set))
    }

    /// Apply the writes to an existing set.
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let writes: Vec<_> = self
            .writes
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.descriptor_type);
                match &write.info {
                    WriteInfo::Buffer(info) => base.buffer_info(std::slice::from_ref(info)),
                    WriteInfo::Image(info) => base.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        unsafe { self.pool.ctx.device().update_descriptor_sets(&writes, &[]) };
    }
}

/// Exhaustion is recoverable, everything else is not.
fn allocation_failure<T>(result: vk::Result) -> Result<Option<T>> {
    match result {
        vk::Result::ERROR_FRAGMENTED_POOL | vk::Result::ERROR_OUT_OF_POOL_MEMORY => {
            tracing::debug!("Descriptor pool exhausted");
            Ok(None)
        }
        e => Err(GpuError::from(e)),
    }
}

fn single_descriptor_type(
    declared: Option<&vk::DescriptorSetLayoutBinding<'_>>,
    binding: u32,
) -> vk::DescriptorType {
    let Some(declared) = declared else {
        panic!("layout does not contain binding {binding}");
    };
    assert_eq!(
        declared.descriptor_count, 1,
        "binding {binding} expects a single descriptor"
    );
    declared.descriptor_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuContextBuilder;

    #[test]
    fn builder_collects_bindings() {
        let builder = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                1,
            )
            .add_binding(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            );
        assert_eq!(builder.bindings.len(), 2);
        assert_eq!(
            builder.bindings[&1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    #[should_panic(expected = "already in use")]
    fn duplicate_binding_panics() {
        let _ = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .add_binding(
                0,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            );
    }

    #[test]
    fn declared_single_binding_passes() {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(2)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1);
        assert_eq!(
            single_descriptor_type(Some(&binding), 2),
            vk::DescriptorType::STORAGE_BUFFER
        );
    }

    #[test]
    #[should_panic(expected = "does not contain binding 3")]
    fn undeclared_binding_panics() {
        single_descriptor_type(None, 3);
    }

    #[test]
    #[should_panic(expected = "single descriptor")]
    fn array_binding_panics() {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(4);
        single_descriptor_type(Some(&binding), 0);
    }

    #[test]
    fn exhausted_pool_is_not_an_error() {
        for result in [
            vk::Result::ERROR_FRAGMENTED_POOL,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY,
        ] {
            assert!(matches!(allocation_failure::<()>(result), Ok(None)));
        }
    }

    #[test]
    fn other_allocation_failures_propagate() {
        for result in [
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_DEVICE_LOST,
        ] {
            assert!(matches!(
                allocation_failure::<()>(result),
                Err(GpuError::Vulkan(e)) if e == result
            ));
        }
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn pool_reset_restores_capacity() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();

        let layout = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .build(&ctx)
            .unwrap();
        let pool = DescriptorPool::builder()
            .max_sets(2)
            .pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
            .build(&ctx)
            .unwrap();

        assert!(pool.allocate(&layout).unwrap().is_some());
        assert!(pool.allocate(&layout).unwrap().is_some());
        assert!(pool.allocate(&layout).unwrap().is_none());

        pool.reset().unwrap();
        assert!(pool.allocate(&layout).unwrap().is_some());
        assert!(pool.allocate(&layout).unwrap().is_some());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn writer_builds_and_overwrites() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();

        let layout = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .build(&ctx)
            .unwrap();
        let pool = DescriptorPool::builder()
            .max_sets(1)
            .pool_size(vk::DescriptorType::UNIFORM_BUFFER, 1)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .build(&ctx)
            .unwrap();
        let buffer = ctx
            .create_buffer(
                "ubo",
                64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
            .unwrap();

        let writer =
            DescriptorWriter::new(&layout, &pool).write_buffer(0, buffer.descriptor_info_whole());
        let set = writer.build().unwrap().unwrap();
        writer.overwrite(set);

        pool.free(&[set]).unwrap();
        assert!(writer.build().unwrap().is_some());
    }
}
