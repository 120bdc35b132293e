//! Turns extracted OBJ text into renderable geometry.
//!
//! Only `v` and `f` statements matter for rendering. Normals, texture
//! coordinates, groups and material statements are skipped, and so is any
//! line the model wrote that isn't an OBJ statement at all.
use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::AssetError;

#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    pub vertices: Vec<[f64; 3]>,
    /// Zero based vertex indices, one polygon per entry.
    pub faces: Vec<Vec<u32>>,
    /// Location of the materialized `.obj` file, if one was written.
    pub path: Option<PathBuf>,
}

/// Face references are resolved once every vertex is known.
enum FaceRef {
    Absolute(i64),
    Resolved(u32),
}

fn parse_vertex(line_no: usize, args: &[&str]) -> Result<[f64; 3], AssetError> {
    if args.len() < 3 {
        return Err(AssetError::Parse {
            line: line_no,
            reason: format!("vertex needs 3 coordinates, got {}", args.len()),
        });
    }

    let mut vertex = [0.0; 3];
    for (slot, arg) in vertex.iter_mut().zip(args) {
        *slot = arg.parse::<f64>().map_err(|err| AssetError::Parse {
            line: line_no,
            reason: format!("invalid coordinate {arg:?}: {err}"),
        })?;
    }

    Ok(vertex)
}

fn parse_face_ref(line_no: usize, arg: &str, num_vertices: usize) -> Result<FaceRef, AssetError> {
    // `f 1/2/3` and `f 1//3` both reference vertex 1
    let index = arg.split('/').next().unwrap_or_default();
    let index = index.parse::<i64>().map_err(|err| AssetError::Parse {
        line: line_no,
        reason: format!("invalid face index {arg:?}: {err}"),
    })?;

    match index {
        0 => Err(AssetError::Parse {
            line: line_no,
            reason: "face index 0 is not valid".into(),
        }),
        i if i < 0 => {
            // Relative to the vertices defined so far.
            let resolved = num_vertices as i64 + i;
            if resolved < 0 {
                return Err(AssetError::Parse {
                    line: line_no,
                    reason: format!("relative face index {i} is out of range"),
                });
            }
            Ok(FaceRef::Resolved(resolved as u32))
        }
        i => Ok(FaceRef::Absolute(i)),
    }
}

impl MeshAsset {
    /// Parse OBJ text into geometry.
    pub fn from_obj(obj: &str) -> Result<Self, AssetError> {
        let mut vertices = Vec::new();
        let mut pending_faces: Vec<(usize, Vec<FaceRef>)> = Vec::new();

        for (idx, line) in obj.lines().enumerate() {
            let line_no = idx + 1;
            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let args: Vec<&str> = parts.collect();

            match keyword {
                "v" => vertices.push(parse_vertex(line_no, &args)?),
                "f" => {
                    if args.len() < 3 {
                        return Err(AssetError::Parse {
                            line: line_no,
                            reason: format!("face needs 3 vertices, got {}", args.len()),
                        });
                    }

                    let refs = args
                        .iter()
                        .map(|arg| parse_face_ref(line_no, arg, vertices.len()))
                        .collect::<Result<Vec<_>, _>>()?;
                    pending_faces.push((line_no, refs));
                }
                _ => {}
            }
        }

        if vertices.is_empty() {
            return Err(AssetError::Empty);
        }

        let num_vertices = vertices.len() as i64;
        let mut faces = Vec::with_capacity(pending_faces.len());
        for (line_no, refs) in pending_faces {
            let mut face = Vec::with_capacity(refs.len());
            for face_ref in refs {
                let index = match face_ref {
                    FaceRef::Resolved(index) => index,
                    FaceRef::Absolute(i) if i <= num_vertices => (i - 1) as u32,
                    FaceRef::Absolute(i) => {
                        return Err(AssetError::Parse {
                            line: line_no,
                            reason: format!(
                                "face references vertex {i} but only {num_vertices} exist"
                            ),
                        })
                    }
                };
                face.push(index);
            }
            faces.push(face);
        }

        Ok(Self {
            vertices,
            faces,
            path: None,
        })
    }

    /// Parse OBJ text and save it as a standalone file at `path`, replacing
    /// what an earlier snapshot wrote there.
    pub fn materialize(obj: &str, path: &Path) -> Result<Self, AssetError> {
        let mut asset = Self::from_obj(obj)?;
        write_obj_file(obj, path)?;
        asset.path = Some(path.to_path_buf());
        Ok(asset)
    }

    pub fn triangle_count(&self) -> usize {
        self.faces
            .iter()
            .map(|face| face.len().saturating_sub(2))
            .sum()
    }
}

/// Fresh `<uuid>.obj` location in `dir`.
pub fn obj_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.obj", Uuid::new_v4()))
}

/// Write mesh text out as-is so other 3D tooling can pick it up.
pub fn write_obj_file(obj: &str, path: &Path) -> Result<(), AssetError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, obj.as_bytes())?;
    log::debug!("wrote {} bytes of mesh data to {:?}", obj.len(), path);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{obj_file_path, MeshAsset};
    use crate::error::AssetError;

    const CUBE_FACE: &str = "# a square\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1 4//1\n";

    #[test]
    fn test_parse_quad() {
        let asset = MeshAsset::from_obj(CUBE_FACE).expect("valid obj");
        assert_eq!(asset.vertices.len(), 4);
        assert_eq!(asset.vertices[2], [1.0, 1.0, 0.0]);
        assert_eq!(asset.faces, vec![vec![0, 1, 2, 3]]);
        assert_eq!(asset.triangle_count(), 2);
        assert!(asset.path.is_none());
    }

    #[test]
    fn test_relative_indices() {
        let asset = MeshAsset::from_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1").expect("valid obj");
        assert_eq!(asset.faces, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_empty_text() {
        assert!(matches!(MeshAsset::from_obj(""), Err(AssetError::Empty)));
        assert!(matches!(
            MeshAsset::from_obj("Here is your table:"),
            Err(AssetError::Empty)
        ));
    }

    #[test]
    fn test_partial_vertex() {
        let res = MeshAsset::from_obj("v 0 0 0\nv 1 0.");
        assert!(matches!(res, Err(AssetError::Parse { line: 2, .. })));

        let res = MeshAsset::from_obj("v 0 0 0\nv 1 0 0\nv 0 1 -");
        assert!(matches!(res, Err(AssetError::Parse { line: 3, .. })));
    }

    #[test]
    fn test_face_out_of_range() {
        let res = MeshAsset::from_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4");
        assert!(matches!(res, Err(AssetError::Parse { line: 4, .. })));

        let res = MeshAsset::from_obj("v 0 0 0\nf 0 1 1");
        assert!(matches!(res, Err(AssetError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_materialize_writes_file() {
        let dir = std::env::temp_dir().join(format!("llamamesh-asset-{}", uuid::Uuid::new_v4()));
        let target = obj_file_path(&dir);
        assert_eq!(target.extension().and_then(|ext| ext.to_str()), Some("obj"));

        let asset = MeshAsset::materialize("v 0 0 0", &target).expect("valid obj");
        assert_eq!(asset.path.as_deref(), Some(target.as_path()));
        let asset = MeshAsset::materialize(CUBE_FACE, &target).expect("valid obj");
        let path = asset.path.expect("file should be written");
        assert_eq!(std::fs::read_to_string(&path).expect("readable"), CUBE_FACE);
        assert_eq!(std::fs::read_dir(&dir).expect("dir exists").count(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_materialize_invalid_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("llamamesh-asset-{}", uuid::Uuid::new_v4()));
        assert!(MeshAsset::materialize("", &obj_file_path(&dir)).is_err());
        assert!(!dir.exists());
    }
}
