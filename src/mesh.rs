use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use log::{info, warn};

use crate::error::{MalformedRecord, MeshError};
use crate::scene::Triangle;

/// Three 1-based vertex indices naming a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face(pub [i64; 3]);

/// Raw contents of a mesh file before expansion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedMesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Face>,
    pub warnings: Vec<MalformedRecord>,
}

/// Reads `v x y z` and `f a b c` records, one per line.
///
/// Unknown tags are skipped with a warning. A missing or non-numeric field
/// ends parsing and whatever was read up to that point is returned.
pub fn parse<R: BufRead>(reader: R) -> Result<ParsedMesh, MeshError> {
    let mut mesh = ParsedMesh::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = line_no + 1;
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        let record = match tag {
            "v" => parse_fields(line_no, parts).map(|[x, y, z]| {
                mesh.vertices.push(Vec3::new(x, y, z));
            }),
            // Indices may be written as floats; truncate like an integer cast.
            "f" => parse_fields(line_no, parts).map(|[a, b, c]| {
                mesh.faces.push(Face([a as i64, b as i64, c as i64]));
            }),
            other => Err(MalformedRecord::UnknownTag {
                line: line_no,
                tag: other.to_string(),
            }),
        };
        if let Err(record) = record {
            warn!("skipping mesh record: {record}");
            let recoverable = record.is_recoverable();
            mesh.warnings.push(record);
            if !recoverable {
                warn!("stopping mesh parse at line {line_no}");
                break;
            }
        }
    }

    Ok(mesh)
}

fn parse_fields<'a>(
    line: usize,
    mut parts: impl Iterator<Item = &'a str>,
) -> Result<[f32; 3], MalformedRecord> {
    let mut fields = [0.0; 3];
    for field in &mut fields {
        let text = parts.next().ok_or(MalformedRecord::MissingField { line })?;
        *field = text
            .parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| MalformedRecord::InvalidField {
                line,
                field: text.to_string(),
            })?;
    }
    Ok(fields)
}

/// Resolves every face into a standalone triangle.
///
/// Fails on the first index that does not name a vertex; 0 and negative
/// indices are never valid.
pub fn expand(vertices: &[Vec3], faces: &[Face]) -> Result<Vec<Triangle>, MeshError> {
    faces
        .iter()
        .enumerate()
        .map(|(face_no, face)| -> Result<Triangle, MeshError> {
            let [a, b, c] = face.0.map(|index| resolve(vertices, face_no, index));
            Ok(Triangle::new(a?, b?, c?))
        })
        .collect()
}

fn resolve(vertices: &[Vec3], face: usize, index: i64) -> Result<Vec3, MeshError> {
    index
        .checked_sub(1)
        .and_then(|zero_based| usize::try_from(zero_based).ok())
        .and_then(|zero_based| vertices.get(zero_based).copied())
        .ok_or(MeshError::IndexOutOfRange {
            face,
            index,
            vertex_count: vertices.len(),
        })
}

/// Parses and expands a mesh file from disk.
pub fn load_mesh<P: AsRef<Path>>(path: P) -> Result<Vec<Triangle>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("unable to open mesh {}", path.display()))?;
    let mesh = parse(BufReader::new(file))
        .with_context(|| format!("failed to read mesh {}", path.display()))?;
    info!(
        "parsed {} vertices and {} faces from {} ({} malformed records)",
        mesh.vertices.len(),
        mesh.faces.len(),
        path.display(),
        mesh.warnings.len()
    );
    let triangles = expand(&mesh.vertices, &mesh.faces)
        .with_context(|| format!("failed to build triangles from {}", path.display()))?;
    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(data: &str) -> ParsedMesh {
        parse(data.as_bytes()).unwrap()
    }

    #[test]
    fn parses_vertices_and_faces() {
        let mesh = parse_str("v 0 0 0\nv 1 0 0\n\nv 0 1 0\nf 1 2 3\n");
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[1], Vec3::X);
        assert_eq!(mesh.faces, vec![Face([1, 2, 3])]);
        assert!(mesh.warnings.is_empty());
    }

    #[test]
    fn face_indices_written_as_floats_are_truncated() {
        let mesh = parse_str("f 1.0 2.9 3\n");
        assert_eq!(mesh.faces, vec![Face([1, 2, 3])]);
    }

    #[test]
    fn unknown_tags_are_skipped_with_a_warning() {
        let mesh = parse_str("# comment\nv 1 2 3\nvn 0 1 0\nv 4 5 6\n");
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(
            mesh.warnings,
            vec![
                MalformedRecord::UnknownTag {
                    line: 1,
                    tag: "#".to_string()
                },
                MalformedRecord::UnknownTag {
                    line: 3,
                    tag: "vn".to_string()
                },
            ]
        );
    }

    #[test]
    fn malformed_number_stops_parsing() {
        let mesh = parse_str("v 1 2 3\nv 1 oops 3\nv 7 8 9\nf 1 1 1\n");
        assert_eq!(mesh.vertices, vec![Vec3::new(1.0, 2.0, 3.0)]);
        assert!(mesh.faces.is_empty());
        assert_eq!(
            mesh.warnings,
            vec![MalformedRecord::InvalidField {
                line: 2,
                field: "oops".to_string()
            }]
        );
    }

    #[test]
    fn short_record_stops_parsing() {
        let mesh = parse_str("v 1 2\nv 1 2 3\n");
        assert!(mesh.vertices.is_empty());
        assert_eq!(mesh.warnings, vec![MalformedRecord::MissingField { line: 1 }]);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mesh = parse_str("v 1 2 3 4\n");
        assert_eq!(mesh.vertices, vec![Vec3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn expand_emits_one_triangle_per_face() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let faces = vec![Face([1, 2, 3]), Face([4, 3, 2]), Face([1, 1, 4])];
        let triangles = expand(&vertices, &faces).unwrap();
        assert_eq!(triangles.len(), faces.len());
        for (triangle, face) in triangles.iter().zip(&faces) {
            let expected = face.0.map(|index| vertices[index as usize - 1]);
            assert_eq!(triangle.vertices(), expected);
            assert_eq!(triangle.color, [1.0; 4]);
            assert_eq!(triangle.bounding_volume, [0.0; 4]);
        }
    }

    #[test]
    fn zero_index_is_out_of_range() {
        let vertices = vec![Vec3::X, Vec3::Y, Vec3::Z];
        let err = expand(&vertices, &[Face([0, 1, 2])]).unwrap_err();
        assert!(matches!(
            err,
            MeshError::IndexOutOfRange {
                face: 0,
                index: 0,
                vertex_count: 3
            }
        ));
    }

    #[test]
    fn index_past_the_end_is_out_of_range() {
        let vertices = vec![Vec3::X, Vec3::Y, Vec3::Z];
        let faces = [Face([1, 2, 3]), Face([1, 2, 4])];
        let err = expand(&vertices, &faces).unwrap_err();
        assert!(matches!(
            err,
            MeshError::IndexOutOfRange {
                face: 1,
                index: 4,
                ..
            }
        ));
    }

    #[test]
    fn negative_index_is_out_of_range() {
        let vertices = vec![Vec3::X, Vec3::Y, Vec3::Z];
        assert!(expand(&vertices, &[Face([-1, 2, 3])]).is_err());
    }

    #[test]
    fn huge_negative_index_is_out_of_range() {
        let mesh = parse_str("v 1 0 0\nv 0 1 0\nv 0 0 1\nf -1e30 1 2\n");
        assert_eq!(mesh.faces, vec![Face([i64::MIN, 1, 2])]);
        let err = expand(&mesh.vertices, &mesh.faces).unwrap_err();
        assert!(matches!(
            err,
            MeshError::IndexOutOfRange {
                face: 0,
                index: i64::MIN,
                vertex_count: 3
            }
        ));
    }

    #[test]
    fn load_mesh_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        std::fs::write(&path, "v 1 0 0\nv 0 1 0\nv 0 0 1\nf 1 2 3\n").unwrap();
        let triangles = load_mesh(&path).unwrap();
        assert_eq!(triangles.len(), 1);
    }
}
