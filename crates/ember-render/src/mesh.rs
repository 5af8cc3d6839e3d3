//! Device-local meshes.

use crate::error::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{GpuBuffer, GpuContext};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};
use std::sync::Arc;

/// Vertex layout shared by the shadow and main passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
        ]
    }
}

/// CPU-side geometry waiting to be uploaded.
#[derive(Debug, Clone, Default)]
pub struct MeshBuilder {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshBuilder {
    /// Axis-aligned cube spanning `[-0.5, 0.5]` with per-face normals.
    pub fn cube(color: Vec3) -> Self {
        // (normal, tangent u, tangent v)
        let faces = [
            (Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::X, Vec3::Y),
        ];

        let mut builder = Self::default();
        for (normal, u, v) in faces {
            let base = builder.vertices.len() as u32;
            let center = normal * 0.5;
            for (su, sv, uv) in [
                (-0.5, -0.5, Vec2::new(0.0, 0.0)),
                (0.5, -0.5, Vec2::new(1.0, 0.0)),
                (0.5, 0.5, Vec2::new(1.0, 1.0)),
                (-0.5, 0.5, Vec2::new(0.0, 1.0)),
            ] {
                builder.vertices.push(Vertex {
                    position: center + u * su + v * sv,
                    color,
                    normal,
                    uv,
                });
            }
            builder
                .indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        builder
    }

    /// Square in the XZ plane facing -Y, with `half_extent` on each side
    /// of the origin. With +Y pointing down this is a floor.
    pub fn quad(half_extent: f32, color: Vec3) -> Self {
        let corners = [
            (Vec3::new(-half_extent, 0.0, -half_extent), Vec2::new(0.0, 0.0)),
            (Vec3::new(half_extent, 0.0, -half_extent), Vec2::new(1.0, 0.0)),
            (Vec3::new(half_extent, 0.0, half_extent), Vec2::new(1.0, 1.0)),
            (Vec3::new(-half_extent, 0.0, half_extent), Vec2::new(0.0, 1.0)),
        ];
        Self {
            vertices: corners
                .iter()
                .map(|&(position, uv)| Vertex {
                    position,
                    color,
                    normal: Vec3::NEG_Y,
                    uv,
                })
                .collect(),
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }
}

/// Vertex and optional index buffer in device-local memory.
pub struct Mesh {
    vertex_buffer: GpuBuffer,
    vertex_count: u32,
    index_buffer: Option<GpuBuffer>,
    index_count: u32,
}

impl Mesh {
    /// Upload `builder` through staging buffers.
    ///
    /// # Panics
    /// If the builder has fewer than three vertices.
    pub fn new(ctx: &Arc<GpuContext>, builder: &MeshBuilder) -> Result<Self> {
        let vertex_count = builder.vertices.len() as u32;
        assert!(vertex_count >= 3, "Vertex count must be at least 3");

        let vertex_buffer = upload(
            ctx,
            "mesh vertices",
            bytemuck::cast_slice(&builder.vertices),
            size_of::<Vertex>() as vk::DeviceSize,
            vertex_count,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        let index_count = builder.indices.len() as u32;
        let index_buffer = if index_count > 0 {
            Some(upload(
                ctx,
                "mesh indices",
                bytemuck::cast_slice(&builder.indices),
                size_of::<u32>() as vk::DeviceSize,
                index_count,
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?)
        } else {
            None
        };

        Ok(Self {
            vertex_buffer,
            vertex_count,
            index_buffer,
            index_count,
        })
    }

    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    pub const fn has_index_buffer(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Bind the vertex buffer, and the index buffer if there is one.
    pub fn bind(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.handle()], &[0]);
            if let Some(index_buffer) = &self.index_buffer {
                device.cmd_bind_index_buffer(cmd, index_buffer.handle(), 0, vk::IndexType::UINT32);
            }
        }
    }

    /// Draw indexed when there is an index buffer.
    pub fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe {
            if self.index_buffer.is_some() {
                device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
            } else {
                device.cmd_draw(cmd, self.vertex_count, 1, 0, 0);
            }
        }
    }
}

fn upload(
    ctx: &Arc<GpuContext>,
    name: &str,
    bytes: &[u8],
    instance_size: vk::DeviceSize,
    instance_count: u32,
    usage: vk::BufferUsageFlags,
) -> Result<GpuBuffer> {
    let staging = GpuBuffer::instanced(
        ctx,
        &format!("{name} staging"),
        instance_size,
        instance_count,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        1,
    )?;
    staging.write_bytes(0, bytes)?;

    let buffer = GpuBuffer::instanced(
        ctx,
        name,
        instance_size,
        instance_count,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        1,
    )?;
    ctx.copy_buffer(staging.handle(), buffer.handle(), bytes.len() as vk::DeviceSize)?;
    Ok(buffer)
}

/// Mesh component attached to scene entities.
#[derive(Clone)]
pub struct MeshHandle(pub Arc<Mesh>);

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gpu::GpuContextBuilder;

    #[test]
    fn vertex_attributes_follow_layout() {
        let attributes = Vertex::attribute_descriptions();
        let offsets: Vec<_> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        assert_eq!(attributes[3].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(Vertex::binding_descriptions()[0].stride, 44);
    }

    #[test]
    fn cube_has_outward_faces() {
        let cube = MeshBuilder::cube(Vec3::ONE);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for vertex in &cube.vertices {
            // Every vertex lies on the face its normal points out of
            assert!((vertex.position.dot(vertex.normal) - 0.5).abs() < 1e-6);
        }
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));
    }

    #[test]
    fn quad_is_flat_floor() {
        let quad = MeshBuilder::quad(3.0, Vec3::splat(0.5));
        assert_eq!(quad.vertices.len(), 4);
        assert!(quad.vertices.iter().all(|v| v.position.y == 0.0));
        assert!(quad.vertices.iter().all(|v| v.normal == Vec3::NEG_Y));
        assert_eq!(quad.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn uploads_indexed_mesh() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        let mesh = Mesh::new(&ctx, &MeshBuilder::cube(Vec3::ONE)).unwrap();
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert!(mesh.has_index_buffer());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    #[should_panic(expected = "at least 3")]
    fn rejects_degenerate_mesh() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        let builder = MeshBuilder {
            vertices: vec![Vertex::default(); 2],
            indices: Vec::new(),
        };
        let _ = Mesh::new(&ctx, &builder);
    }
}
