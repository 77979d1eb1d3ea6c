use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp file");
    tmp.write_all(contents.as_bytes()).expect("write temp file");
    tmp
}

fn unit_triangle_mesh() -> NamedTempFile {
    write_temp(
        "# unit triangle\n\
         v 1 0 0\n\
         v 0 1 0\n\
         v 0 0 1\n\
         vn 0 0 1\n\
         f 1 2 3\n",
    )
}

#[test]
fn summary_reports_totals_and_bounding_radius() {
    let mesh = unit_triangle_mesh();
    let mut cmd = Command::cargo_bin("ray-tracer").expect("binary exists");
    cmd.arg(mesh.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded 1 triangles"))
        .stdout(contains("Scene: 3 lights, 0 spheres, 1 triangles"))
        .stdout(contains("Scene bounding radius: 1.000"))
        .stdout(contains("Render size: 1024x1024"));
}

#[test]
fn out_of_range_face_index_aborts_the_load() {
    let mesh = write_temp("v 1 0 0\nv 0 1 0\nv 0 0 1\nf 1 2 4\n");
    let mut cmd = Command::cargo_bin("ray-tracer").expect("binary exists");
    cmd.arg(mesh.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("references vertex 4, but only 3 vertices exist"));
}

#[test]
fn scene_file_replaces_default_lights_and_adds_spheres() {
    let mesh = unit_triangle_mesh();
    let scene = write_temp(
        r#"<scene>
  <camera>
    <position>0 1 5</position>
    <fov>60</fov>
  </camera>
  <render>
    <width>640</width>
    <height>480</height>
  </render>
  <sphere>
    <center>0 0 -2</center>
    <radius>0.5</radius>
    <color>1 0 0</color>
  </sphere>
</scene>
"#,
    );
    let mut cmd = Command::cargo_bin("ray-tracer").expect("binary exists");
    cmd.arg(mesh.path())
        .arg("--scene")
        .arg(scene.path())
        .arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Scene: 0 lights, 1 spheres, 1 triangles"))
        .stdout(contains("Camera at (0.00, 1.00, 5.00), fov 60.0"))
        .stdout(contains("Render size: 640x480"));
}

#[test]
fn render_size_must_be_whole_tiles() {
    let mesh = unit_triangle_mesh();
    let scene = write_temp("<scene><render><width>100</width><height>30</height></render></scene>");
    let mut cmd = Command::cargo_bin("ray-tracer").expect("binary exists");
    cmd.arg(mesh.path())
        .arg("--scene")
        .arg(scene.path())
        .arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("not a multiple of the 8x4 tile"));
}

#[test]
fn unknown_argument_is_rejected() {
    let mesh = unit_triangle_mesh();
    let mut cmd = Command::cargo_bin("ray-tracer").expect("binary exists");
    cmd.arg(mesh.path()).arg("--run-scripts");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --run-scripts"))
        .stdout(predicate::str::is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn missing_display_is_fatal_without_summary_only() {
    let mesh = unit_triangle_mesh();
    let mut cmd = Command::cargo_bin("ray-tracer").expect("binary exists");
    cmd.arg(mesh.path())
        .env_remove("DISPLAY")
        .env_remove("WAYLAND_DISPLAY");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("failed to initialize"))
        .stdout(contains("Scene bounding radius").not());
}
