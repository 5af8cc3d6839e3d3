//! GPU memory management.
//!
//! Memory is sub-allocated through `gpu-allocator`. Every request is first
//! checked against the device's memory types with [`find_memory_type`], so
//! a request no memory type can satisfy fails with
//! [`GpuError::MemoryTypeNotFound`] before anything is allocated.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
        })
    }

    /// Sub-allocate memory for a resource.
    pub fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Return an allocation to the allocator.
    pub fn free(&mut self, allocation: Allocation) -> Result<()> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        // Dropping the inner allocator calls vkFreeMemory on every block
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// First memory type index allowed by `type_filter` whose flags contain
/// all of `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(GpuError::MemoryTypeNotFound {
            type_filter,
            properties,
        })
}

/// Allocator location for a set of required memory properties.
pub fn memory_location(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Round `size` up to a multiple of `alignment` (a power of two or zero).
pub const fn align_size(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment > 0 {
        (size + alignment - 1) & !(alignment - 1)
    } else {
        size
    }
}

/// Memory-relative `(offset, size)` of a flush or invalidate over
/// `offset..offset + size` of a buffer bound at `base` in its memory.
///
/// The range is clamped to the buffer and widened to `atom`. When widening
/// would pass the end of the allocation the size becomes
/// [`vk::WHOLE_SIZE`], which stays inside the memory object.
fn atom_range(
    base: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
    buffer_size: vk::DeviceSize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
) -> Result<(vk::DeviceSize, vk::DeviceSize)> {
    if offset > buffer_size {
        return Err(GpuError::InvalidState(format!(
            "Offset {offset} exceeds buffer of {buffer_size} bytes"
        )));
    }

    let atom = atom.max(1);
    let start = base + offset;
    let aligned_start = start / atom * atom;
    let end = align_size(start + size.min(buffer_size - offset), atom);

    if end > base + allocation_size {
        Ok((aligned_start, vk::WHOLE_SIZE))
    } else {
        Ok((aligned_start, end - aligned_start))
    }
}

/// Allocate memory for a resource after checking a memory type exists.
fn allocate_for(
    ctx: &GpuContext,
    name: &str,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    linear: bool,
) -> Result<Allocation> {
    ctx.find_memory_type(requirements.memory_type_bits, properties)?;
    ctx.allocator()
        .lock()
        .allocate(name, requirements, memory_location(properties), linear)
}

/// Free an allocation, logging instead of failing inside `Drop`.
fn release(ctx: &GpuContext, allocation: Option<Allocation>) {
    if let Some(allocation) = allocation {
        if let Err(e) = ctx.allocator().lock().free(allocation) {
            tracing::error!("Failed to free GPU allocation: {e}");
        }
    }
}

/// A GPU buffer with its allocation.
///
/// The buffer is laid out as `instance_count` slots of `alignment_size`
/// bytes each, so per-frame data can live in one buffer and be addressed
/// by index.
pub struct GpuBuffer {
    ctx: Arc<GpuContext>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
}

impl GpuBuffer {
    /// Create a buffer of `size` bytes holding a single instance.
    pub fn new(
        ctx: &Arc<GpuContext>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        Self::instanced(ctx, name, size, 1, usage, properties, 1)
    }

    /// Create a buffer of `instance_count` instances, each padded to
    /// `min_offset_alignment`.
    pub fn instanced(
        ctx: &Arc<GpuContext>,
        name: &str,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> Result<Self> {
        let alignment_size = align_size(instance_size, min_offset_alignment);
        let size = alignment_size * vk::DeviceSize::from(instance_count);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let device = ctx.device();
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = match allocate_for(ctx, name, requirements, properties, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let mut this = Self {
            ctx: Arc::clone(ctx),
            buffer,
            allocation: None,
            size,
            instance_size,
            instance_count,
            alignment_size,
            usage,
            properties,
        };

        // Stored before binding so a failed bind still frees through Drop
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        this.allocation = Some(allocation);
        unsafe { device.bind_buffer_memory(buffer, memory, offset)? };

        Ok(this)
    }

    /// Get the raw buffer handle.
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Total size in bytes.
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Unpadded size of one instance.
    pub const fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    /// Number of instances.
    pub const fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Padded size of one instance.
    pub const fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Usage flags the buffer was created with.
    pub const fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Memory properties the buffer was created with.
    pub const fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }

    /// Host pointer to the start of the buffer, if it is host-visible.
    fn mapped_ptr(&self) -> Result<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))
    }

    fn check_range(&self, offset: vk::DeviceSize, len: usize) -> Result<usize> {
        let end = offset
            .checked_add(len as vk::DeviceSize)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "Range {offset}..{end} exceeds buffer of {} bytes",
                self.size
            )));
        }
        usize::try_from(offset).map_err(|_| GpuError::InvalidState("Offset overflow".to_string()))
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        let ptr = self.mapped_ptr()?;
        let offset = self.check_range(offset, data.len())?;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset), data.len());
        }

        Ok(())
    }

    /// Write typed data to the start of the buffer (must be host-visible).
    pub fn write<T: Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write one instance at `index * alignment_size`.
    pub fn write_to_index(&self, index: u32, data: &[u8]) -> Result<()> {
        self.write_bytes(self.alignment_size * vk::DeviceSize::from(index), data)
    }

    /// Copy bytes out of the buffer (must be host-visible).
    pub fn read_bytes(&self, offset: vk::DeviceSize, len: usize) -> Result<Vec<u8>> {
        let ptr = self.mapped_ptr()?;
        let offset = self.check_range(offset, len)?;

        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.add(offset), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    /// Mapped range covering `offset..offset + size`, widened to the
    /// device's non-coherent atom size. `None` for coherent memory.
    fn non_coherent_range(
        &self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<Option<vk::MappedMemoryRange<'static>>> {
        let Some(allocation) = self.allocation.as_ref() else {
            return Ok(None);
        };
        let atom = self.ctx.capabilities().non_coherent_atom_size;
        let (start, len) = atom_range(
            allocation.offset(),
            allocation.size(),
            self.size,
            offset,
            size,
            atom,
        )?;

        if allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(None);
        }

        Ok(Some(
            vk::MappedMemoryRange::default()
                .memory(unsafe { allocation.memory() })
                .offset(start)
                .size(len),
        ))
    }

    /// Make host writes in the range visible to the device.
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<()> {
        if let Some(range) = self.non_coherent_range(offset, size)? {
            unsafe { self.ctx.device().flush_mapped_memory_ranges(&[range])? };
        }
        Ok(())
    }

    /// Flush the whole buffer.
    pub fn flush_all(&self) -> Result<()> {
        self.flush(0, self.size)
    }

    /// Flush one instance.
    pub fn flush_index(&self, index: u32) -> Result<()> {
        if index >= self.instance_count {
            return Err(GpuError::InvalidState(format!(
                "Instance {index} out of range for {} instances",
                self.instance_count
            )));
        }
        self.flush(
            self.alignment_size * vk::DeviceSize::from(index),
            self.alignment_size,
        )
    }

    /// Make device writes in the range visible to the host.
    pub fn invalidate(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<()> {
        if let Some(range) = self.non_coherent_range(offset, size)? {
            unsafe { self.ctx.device().invalidate_mapped_memory_ranges(&[range])? };
        }
        Ok(())
    }

    /// Descriptor info for a range of the buffer.
    pub fn descriptor_info(
        &self,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(range)
    }

    /// Descriptor info for the whole buffer.
    pub fn descriptor_info_whole(&self) -> vk::DescriptorBufferInfo {
        self.descriptor_info(0, vk::WHOLE_SIZE)
    }

    /// Descriptor info for one instance.
    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(
            self.alignment_size * vk::DeviceSize::from(index),
            self.alignment_size,
        )
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        release(&self.ctx, self.allocation.take());
        unsafe { self.ctx.device().destroy_buffer(self.buffer, None) };
    }
}

/// A GPU image with its allocation and an optional view.
pub struct GpuImage {
    ctx: Arc<GpuContext>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    layer_count: u32,
}

impl GpuImage {
    /// Create an image bound to memory with the requested properties.
    pub fn new(
        ctx: &Arc<GpuContext>,
        name: &str,
        create_info: &vk::ImageCreateInfo,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let device = ctx.device();
        let image = unsafe { device.create_image(create_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let linear = create_info.tiling == vk::ImageTiling::LINEAR;
        let allocation = match allocate_for(ctx, name, requirements, properties, linear) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut this = Self {
            ctx: Arc::clone(ctx),
            image,
            view: vk::ImageView::null(),
            allocation: None,
            format: create_info.format,
            extent: create_info.extent,
            layer_count: create_info.array_layers,
        };

        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        this.allocation = Some(allocation);
        unsafe { device.bind_image_memory(image, memory, offset)? };

        Ok(this)
    }

    /// Create the image's 2D view. Replaces any previous view.
    pub fn create_view(&mut self, aspect: vk::ImageAspectFlags) -> Result<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(self.layer_count),
            );

        let device = self.ctx.device();
        let view = unsafe { device.create_image_view(&view_info, None)? };
        if self.view != vk::ImageView::null() {
            unsafe { device.destroy_image_view(self.view, None) };
        }
        self.view = view;
        Ok(view)
    }

    /// Get the raw image handle.
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the image view (null until [`create_view`](Self::create_view)).
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Get the image format.
    pub const fn format(&self) -> vk::Format {
        self.format
    }

    /// Get the image extent.
    pub const fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
        }
        release(&self.ctx, self.allocation.take());
        unsafe { device.destroy_image(self.image, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuContextBuilder;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn first_matching_memory_type_wins() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        // Type 1 filtered out, so the cached type is next.
        assert_eq!(find_memory_type(&props, 0b101, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn missing_memory_type_is_an_error() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(
            result,
            Err(GpuError::MemoryTypeNotFound { type_filter: 0b1, .. })
        ));
    }

    #[test]
    fn alignment_rounds_up() {
        assert_eq!(align_size(100, 0), 100);
        assert_eq!(align_size(100, 64), 128);
        assert_eq!(align_size(128, 64), 128);
        assert_eq!(align_size(1, 256), 256);
    }

    #[test]
    fn atom_range_widens_to_atoms() {
        // Buffer at 4096 in its memory, 1000 bytes, atom 256
        assert_eq!(atom_range(4096, 1024, 1000, 100, 200, 256).unwrap(), (4096, 512));
        assert_eq!(atom_range(4096, 1024, 1000, 300, 100, 256).unwrap(), (4352, 256));
    }

    #[test]
    fn atom_range_clamps_size_to_buffer() {
        let (offset, size) = atom_range(0, 1024, 1024, 512, vk::WHOLE_SIZE, 64).unwrap();
        assert_eq!((offset, size), (512, 512));
    }

    #[test]
    fn atom_range_past_allocation_end_uses_whole_size() {
        // Rounding 4096 + 1000 up to 256 would reach 5120, past the allocation
        let (offset, size) = atom_range(4096, 1000, 1000, 0, 1000, 256).unwrap();
        assert_eq!((offset, size), (4096, vk::WHOLE_SIZE));
    }

    #[test]
    fn atom_range_rejects_offset_past_buffer() {
        assert!(matches!(
            atom_range(0, 256, 256, 512, 64, 64),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn host_visible_memory_is_cpu_to_gpu() {
        assert_eq!(
            memory_location(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn buffer_round_trip_through_device_local_memory() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let data: Vec<u8> = (0..=255).collect();
        let size = data.len() as vk::DeviceSize;

        let staging = ctx
            .create_buffer("staging", size, vk::BufferUsageFlags::TRANSFER_SRC, host)
            .unwrap();
        staging.write_bytes(0, &data).unwrap();

        let device_local = ctx
            .create_buffer(
                "device-local",
                size,
                vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .unwrap();
        let readback = ctx
            .create_buffer("readback", size, vk::BufferUsageFlags::TRANSFER_DST, host)
            .unwrap();

        ctx.copy_buffer(staging.handle(), device_local.handle(), size)
            .unwrap();
        ctx.copy_buffer(device_local.handle(), readback.handle(), size)
            .unwrap();

        readback.invalidate(0, size).unwrap();
        assert_eq!(readback.read_bytes(0, data.len()).unwrap(), data);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn instanced_buffer_pads_each_instance() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        let alignment = ctx.capabilities().min_uniform_buffer_offset_alignment;
        let buffer = GpuBuffer::instanced(
            &ctx,
            "uniforms",
            24,
            3,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            alignment,
        )
        .unwrap();

        assert_eq!(buffer.alignment_size(), align_size(24, alignment));
        assert_eq!(buffer.size(), buffer.alignment_size() * 3);
        buffer.write_to_index(2, &[7u8; 24]).unwrap();
        let tail = buffer
            .read_bytes(buffer.alignment_size() * 2, 24)
            .unwrap();
        assert_eq!(tail, vec![7u8; 24]);
    }
}
