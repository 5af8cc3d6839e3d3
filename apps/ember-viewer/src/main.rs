//! Ember Demo Viewer
//!
//! Renders a textured floor, a few cubes and a ring of colored point lights,
//! with a directional shadow map, while the camera orbits the scene.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--settings <FILE>`: Load render settings from a TOML file
//! - `--shaders <DIR>`: Load SPIR-V from this directory instead of the built-in shaders
//! - `--lights <N>`: Number of orbiting point lights (default: 6, max: 10)
//! - `--no-vsync`: Present without waiting for vertical blank
//! - `-h, --help`: Print help message
//!
//! ## Settings file
//!
//! Any field left out keeps its default:
//!
//! ```toml
//! clear_color = [0.02, 0.02, 0.03, 1.0]
//! fov_y_degrees = 60.0
//!
//! [shadow]
//! resolution = 2048
//! light_position = [2.0, -3.0, -2.0]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use ember_app::{run_app, AppConfig};
use ember_core::RenderSettings;

use crate::app::{Viewer, ViewerParams};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let params = ViewerParams::parse(std::env::args().skip(1))?;

    let settings = match &params.settings {
        Some(path) => RenderSettings::load(path)?,
        None => RenderSettings::default(),
    };

    let mut config = AppConfig::new("Ember Viewer")
        .with_size(WIDTH, HEIGHT)
        .with_vsync(params.vsync)
        .with_settings(settings);
    if let Some(dir) = &params.shader_dir {
        config = config.with_shader_dir(dir);
    }

    run_app::<Viewer>(config)
}

fn print_help() {
    eprintln!(
        "Ember Demo Viewer

USAGE:
    cargo run -p ember-viewer -- [OPTIONS]

OPTIONS:
    --settings <FILE>   Load render settings from a TOML file
    --shaders <DIR>     Load SPIR-V shaders from DIR
    --lights <N>        Number of orbiting point lights (default: 6, max: 10)
    --no-vsync          Present without waiting for vertical blank
    -h, --help          Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}
