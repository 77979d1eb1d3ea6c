use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::mesh::load_mesh;
use crate::scene::{Scene, SceneDescription};

const USAGE: &str = "Usage: ray-tracer <mesh.txt> [--scene <scene.xml>] [--summary-only]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub mesh: PathBuf,
    pub scene: Option<PathBuf>,
    pub summary_only: bool,
}

impl CliOptions {
    pub fn parse() -> Result<Self> {
        Self::from_args(env::args().skip(1))
    }

    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let Some(mesh) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut scene = None;
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--scene" => {
                    let path = args
                        .next()
                        .ok_or_else(|| anyhow!("--scene expects a file path"))?;
                    scene = Some(PathBuf::from(path));
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --scene or --summary-only"
                    ));
                }
            }
        }
        Ok(Self {
            mesh: PathBuf::from(mesh),
            scene,
            summary_only,
        })
    }
}

/// Reads the scene description (or the defaults) and the mesh, then builds
/// the scene with its bounding volumes.
pub fn load_scene(options: &CliOptions) -> Result<(SceneDescription, Scene)> {
    let description = match &options.scene {
        Some(path) => SceneDescription::load(path)?,
        None => SceneDescription::default(),
    };
    let triangles = load_mesh(&options.mesh)
        .with_context(|| format!("failed to load mesh {}", options.mesh.display()))?;
    let scene = Scene::new(
        description.lights.clone(),
        description.spheres.clone(),
        triangles,
    );
    info!("scene totals: {:?}", scene.totals());
    Ok((description, scene))
}

pub fn print_summary(description: &SceneDescription, scene: &Scene) {
    let totals = scene.totals();
    println!(
        "Scene: {} lights, {} spheres, {} triangles",
        totals.lights, totals.spheres, totals.triangles
    );
    println!("Scene bounding radius: {:.3}", totals.bounding_radius);
    let camera = description.camera.position;
    println!(
        "Camera at ({:.2}, {:.2}, {:.2}), fov {:.1}",
        camera.x, camera.y, camera.z, description.camera.fov
    );
    println!(
        "Render size: {}x{}",
        description.render.width, description.render.height
    );
}
