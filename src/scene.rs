use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::bounds;
use crate::camera::CameraSettings;
use crate::frame::{TILE_HEIGHT, TILE_WIDTH};

/// Triangle record as laid out in the triangle storage buffer.
///
/// `bounding_volume.xyz` holds the centroid and `.w` the enclosing radius;
/// both stay zero until [`bounds::scene_bound`] runs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    pub points: [[f32; 4]; 3],
    pub color: [f32; 4],
    pub bounding_volume: [f32; 4],
}

impl Triangle {
    /// Builds an opaque white triangle with an empty bounding volume.
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self {
            points: [
                a.extend(0.0).into(),
                b.extend(0.0).into(),
                c.extend(0.0).into(),
            ],
            color: [1.0; 4],
            bounding_volume: [0.0; 4],
        }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        self.points.map(|point| Vec4::from(point).truncate())
    }

    pub fn bounding_volume(&self) -> Vec4 {
        Vec4::from(self.bounding_volume)
    }
}

/// Point light record (slot 1). `opacity` rides in the fourth color lane.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    pub position: [f32; 4],
    pub color: [f32; 3],
    pub opacity: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, opacity: f32) -> Self {
        Self {
            position: position.extend(0.0).into(),
            color: color.into(),
            opacity,
        }
    }
}

/// Sphere record (slot 2).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub center: [f32; 3],
    pub radius: f32,
    pub color: [f32; 4],
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32, color: Vec4) -> Self {
        Self {
            center: center.into(),
            radius,
            color: color.into(),
        }
    }
}

/// Resolution of the ray traced output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
        }
    }
}

impl RenderSettings {
    /// The kernel has no partial tiles, so both sides must be whole tiles.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("render size {}x{} has zero area", self.width, self.height);
        }
        if self.width % TILE_WIDTH != 0 || self.height % TILE_HEIGHT != 0 {
            bail!(
                "render size {}x{} is not a multiple of the {TILE_WIDTH}x{TILE_HEIGHT} tile",
                self.width,
                self.height
            );
        }
        Ok(())
    }
}

/// Everything the scene file configures besides the mesh itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescription {
    pub camera: CameraSettings,
    pub background: Vec3,
    pub render: RenderSettings,
    pub lights: Vec<PointLight>,
    pub spheres: Vec<Sphere>,
}

impl Default for SceneDescription {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            background: Vec3::ZERO,
            render: RenderSettings::default(),
            lights: vec![
                PointLight::new(Vec3::new(0.0, 2.0, 1.5), Vec3::new(0.0, 1.0, 0.0), 0.1),
                PointLight::new(Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, 1.0), 0.1),
                PointLight::new(Vec3::new(2.0, 0.0, 1.5), Vec3::new(1.0, 0.0, 0.0), 0.1),
            ],
            spheres: Vec::new(),
        }
    }
}

impl SceneDescription {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("unable to read scene file {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("invalid scene file {}", path.display()))
    }

    /// Parses a scene file. Lights and spheres listed in the file replace the
    /// defaults entirely; a file with no `<light>` has no lights.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("root element must be <scene>");
        }

        let mut description = Self {
            lights: Vec::new(),
            ..Self::default()
        };

        if let Some(node) = child(&root, "camera") {
            let camera = &mut description.camera;
            camera.position = parse_vec3(optional_text(&node, "position"), camera.position)?;
            camera.fov = parse_f32(optional_text(&node, "fov"), camera.fov)?;
            camera.speed = parse_f32(optional_text(&node, "speed"), camera.speed)?;
            camera.sensitivity =
                parse_f32(optional_text(&node, "sensitivity"), camera.sensitivity)?;
        }
        description.background = parse_vec3(optional_text(&root, "background"), Vec3::ZERO)?;
        if let Some(node) = child(&root, "render") {
            let render = &mut description.render;
            render.width = parse_u32(optional_text(&node, "width"), render.width)?;
            render.height = parse_u32(optional_text(&node, "height"), render.height)?;
        }
        description.render.validate()?;

        for node in root.children().filter(|n| n.has_tag_name("light")) {
            let position = parse_vec3(Some(required_text(&node, "position")?), Vec3::ZERO)?;
            let color = parse_vec3(optional_text(&node, "color"), Vec3::ONE)?;
            let opacity = parse_f32(optional_text(&node, "opacity"), 0.1)?;
            description
                .lights
                .push(PointLight::new(position, color, opacity));
        }

        for node in root.children().filter(|n| n.has_tag_name("sphere")) {
            let center = parse_vec3(Some(required_text(&node, "center")?), Vec3::ZERO)?;
            let radius = parse_f32(Some(required_text(&node, "radius")?), 0.0)?;
            if radius.is_nan() || radius <= 0.0 {
                bail!("sphere radius must be positive, got {radius}");
            }
            let color = parse_vec3(optional_text(&node, "color"), Vec3::ONE)?;
            description
                .spheres
                .push(Sphere::new(center, radius, color.extend(1.0)));
        }

        Ok(description)
    }
}

/// Counts and bounding radius passed to the kernel; fixed after load.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneTotals {
    pub lights: u32,
    pub spheres: u32,
    pub triangles: u32,
    pub bounding_radius: f32,
}

/// The three primitive collections plus their derived totals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub lights: Vec<PointLight>,
    pub spheres: Vec<Sphere>,
    pub triangles: Vec<Triangle>,
    totals: SceneTotals,
}

impl Scene {
    /// Assembles the scene and computes the bounding volumes once.
    pub fn new(lights: Vec<PointLight>, spheres: Vec<Sphere>, mut triangles: Vec<Triangle>) -> Self {
        let bounding_radius = bounds::scene_bound(&mut triangles);
        let totals = SceneTotals {
            lights: lights.len() as u32,
            spheres: spheres.len() as u32,
            triangles: triangles.len() as u32,
            bounding_radius,
        };
        Self {
            lights,
            spheres,
            triangles,
            totals,
        }
    }

    pub fn totals(&self) -> SceneTotals {
        self.totals
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let components = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid vector component `{component}`: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match components.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("expected three vector components, got `{value}`")),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer: {err}")),
        None => Ok(default),
    }
}
