//! Viewer application: a shadowed floor with cubes and orbiting lights.

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use glam::Vec3;
use tracing::info;

use ember_app::{AppContext, EmberApp};
use ember_core::constants::MAX_LIGHTS;
use ember_render::{Mesh, MeshBuilder, MeshHandle, Texture, TextureHandle};
use ember_scene::{Entity, MaterialIndex, PointLightDesc, Transform};

/// Camera orbit radius around the origin.
const ORBIT_RADIUS: f32 = 5.0;

/// Camera height (+Y is down).
const CAMERA_HEIGHT: f32 = -2.0;

/// Camera orbit speed in radians per second.
const CAMERA_SPEED: f32 = 0.15;

const LIGHT_RING_RADIUS: f32 = 1.6;
const LIGHT_HEIGHT: f32 = -1.0;

/// Light orbit speed in radians per second.
const LIGHT_SPEED: f32 = 0.5;

const FLOOR_HALF_EXTENT: f32 = 3.0;
const FLOOR_HEIGHT: f32 = 0.5;

const CHECKER_SIZE: u32 = 64;
const CHECKER_CELL: u32 = 8;

const LIGHT_COLORS: [Vec3; 6] = [
    Vec3::new(1.0, 0.1, 0.1),
    Vec3::new(0.1, 0.1, 1.0),
    Vec3::new(0.1, 1.0, 0.1),
    Vec3::new(1.0, 1.0, 0.1),
    Vec3::new(0.1, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
];

/// (x, z, edge length, color) of the cubes resting on the floor.
const CUBES: [(f32, f32, f32, Vec3); 3] = [
    (-1.0, 0.0, 0.5, Vec3::new(0.8, 0.3, 0.2)),
    (1.0, 0.5, 0.8, Vec3::new(0.3, 0.6, 0.8)),
    (0.0, -1.2, 0.6, Vec3::new(0.9, 0.8, 0.4)),
];

/// Command line options of the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerParams {
    pub settings: Option<PathBuf>,
    pub shader_dir: Option<PathBuf>,
    pub lights: usize,
    pub vsync: bool,
}

impl Default for ViewerParams {
    fn default() -> Self {
        Self {
            settings: None,
            shader_dir: None,
            lights: LIGHT_COLORS.len(),
            vsync: true,
        }
    }
}

impl ViewerParams {
    /// Parse options, excluding the program name.
    pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut params = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--settings" => params.settings = Some(next_value(&mut args, &arg)?.into()),
                "--shaders" => params.shader_dir = Some(next_value(&mut args, &arg)?.into()),
                "--lights" => {
                    let value = next_value(&mut args, &arg)?;
                    let lights: usize = value
                        .parse()
                        .with_context(|| format!("--lights expects a number, got {value:?}"))?;
                    anyhow::ensure!(lights <= MAX_LIGHTS, "--lights must be at most {MAX_LIGHTS}");
                    params.lights = lights;
                }
                "--no-vsync" => params.vsync = false,
                other => anyhow::bail!("Unknown argument: {other}"),
            }
        }

        Ok(params)
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next().with_context(|| format!("{flag} expects a value"))
}

/// Point on a horizontal circle around the Y axis.
pub fn orbit_position(angle: f32, radius: f32, height: f32) -> Vec3 {
    Vec3::new(radius * angle.sin(), height, -radius * angle.cos())
}

/// Angles and colors of `count` lights spread evenly around a ring.
pub fn light_ring(count: usize) -> Vec<(f32, Vec3)> {
    (0..count)
        .map(|i| {
            let angle = i as f32 * TAU / count as f32;
            (angle, LIGHT_COLORS[i % LIGHT_COLORS.len()])
        })
        .collect()
}

/// RGBA8 checkerboard of `size`x`size` texels in `cell`-sized squares.
pub fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let value = if (x / cell + y / cell) % 2 == 0 { 255 } else { 96 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

/// Viewer application state.
pub struct Viewer {
    /// Point lights and their angle on the ring at time zero.
    lights: Vec<(Entity, f32)>,
    camera_angle: f32,
    light_angle: f32,
}

impl EmberApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let params = ViewerParams::parse(std::env::args().skip(1)).unwrap_or_default();
        let gpu = Arc::clone(&ctx.gpu);

        // Floor
        let floor = Mesh::new(&gpu, &MeshBuilder::quad(FLOOR_HALF_EXTENT, Vec3::splat(0.9)))?;
        let checker = Texture::from_rgba8(
            &gpu,
            CHECKER_SIZE,
            CHECKER_SIZE,
            &checkerboard(CHECKER_SIZE, CHECKER_CELL),
        )?;
        ctx.scene.spawn((
            Transform::from_translation(Vec3::new(0.0, FLOOR_HEIGHT, 0.0)),
            MeshHandle(Arc::new(floor)),
            TextureHandle(Arc::new(checker)),
            MaterialIndex(1),
        ));

        // Cubes resting on the floor
        for (x, z, size, color) in CUBES {
            let mesh = Mesh::new(&gpu, &MeshBuilder::cube(color))?;
            let transform = Transform::from_translation(Vec3::new(x, FLOOR_HEIGHT - size * 0.5, z))
                .with_scale(Vec3::splat(size))
                .with_rotation(Vec3::new(0.0, x * 0.4, 0.0));
            ctx.scene.spawn((transform, MeshHandle(Arc::new(mesh))));
        }

        // Lights
        let lights = light_ring(params.lights)
            .into_iter()
            .map(|(angle, color)| {
                let position = orbit_position(angle, LIGHT_RING_RADIUS, LIGHT_HEIGHT);
                let desc = PointLightDesc {
                    intensity: 0.3,
                    color,
                    ..PointLightDesc::default()
                };
                (ctx.scene.spawn_point_light(position, desc), angle)
            })
            .collect::<Vec<_>>();

        info!(
            "Scene ready: {} entities, {} point lights",
            ctx.scene.len(),
            lights.len()
        );

        Ok(Self {
            lights,
            camera_angle: 0.0,
            light_angle: 0.0,
        })
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) {
        self.camera_angle = (self.camera_angle + CAMERA_SPEED * dt) % TAU;
        self.light_angle = (self.light_angle + LIGHT_SPEED * dt) % TAU;

        let eye = orbit_position(self.camera_angle, ORBIT_RADIUS, CAMERA_HEIGHT);
        ctx.camera.set_view_target(eye, Vec3::ZERO, Vec3::NEG_Y);

        let world = ctx.scene.world_mut();
        for &(entity, base_angle) in &self.lights {
            if let Ok(mut transform) = world.get::<&mut Transform>(entity) {
                transform.translation =
                    orbit_position(base_angle + self.light_angle, LIGHT_RING_RADIUS, LIGHT_HEIGHT);
            }
        }
    }

    fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        info!("Viewport now {width}x{height}");
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        info!("Rendered {} frames", ctx.frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_defaults() {
        assert_eq!(ViewerParams::parse(args(&[])).unwrap(), ViewerParams::default());
    }

    #[test]
    fn parses_every_option() {
        let params = ViewerParams::parse(args(&[
            "--settings",
            "look.toml",
            "--shaders",
            "spv",
            "--lights",
            "3",
            "--no-vsync",
        ]))
        .unwrap();

        assert_eq!(params.settings, Some(PathBuf::from("look.toml")));
        assert_eq!(params.shader_dir, Some(PathBuf::from("spv")));
        assert_eq!(params.lights, 3);
        assert!(!params.vsync);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(ViewerParams::parse(args(&["--lights"])).is_err());
        assert!(ViewerParams::parse(args(&["--lights", "many"])).is_err());
        assert!(ViewerParams::parse(args(&["--lights", "11"])).is_err());
        assert!(ViewerParams::parse(args(&["--fullscreen"])).is_err());
    }

    #[test]
    fn orbit_stays_on_circle() {
        for step in 0..16 {
            let p = orbit_position(step as f32 * 0.4, ORBIT_RADIUS, CAMERA_HEIGHT);
            assert_relative_eq!(p.x.hypot(p.z), ORBIT_RADIUS, epsilon = 1e-5);
            assert_eq!(p.y, CAMERA_HEIGHT);
        }
    }

    #[test]
    fn light_ring_spreads_evenly() {
        let ring = light_ring(4);
        let angles: Vec<_> = ring.iter().map(|&(a, _)| a).collect();
        for (i, angle) in angles.iter().enumerate() {
            assert_relative_eq!(*angle, i as f32 * TAU / 4.0);
        }
        assert_eq!(ring[0].1, LIGHT_COLORS[0]);
        assert!(light_ring(0).is_empty());
    }

    #[test]
    fn light_ring_cycles_colors() {
        let ring = light_ring(MAX_LIGHTS);
        assert_eq!(ring.len(), MAX_LIGHTS);
        assert_eq!(ring[LIGHT_COLORS.len()].1, LIGHT_COLORS[0]);
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let pixels = checkerboard(4, 2);
        assert_eq!(pixels.len(), 4 * 4 * 4);
        let texel = |x: usize, y: usize| pixels[(y * 4 + x) * 4];
        assert_eq!(texel(0, 0), 255);
        assert_eq!(texel(1, 1), 255);
        assert_eq!(texel(2, 0), 96);
        assert_eq!(texel(0, 2), 96);
        assert_eq!(texel(2, 2), 255);
        assert!(pixels.chunks(4).all(|p| p[3] == 255));
    }
}
