//! Mesh file I/O for STL and OBJ.
//!
//! STL is written binary and carries positions only. OBJ keeps the indexed
//! structure and vertex colors (as the common `v x y z r g b` extension), which
//! makes it the better choice for inspecting generator output.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::log_io_operation;
use crate::types::{Mesh, Vertex, VertexColor};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Obj,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "stl" => Some(MeshFormat::Stl),
                "obj" => Some(MeshFormat::Obj),
                _ => None,
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
        }
    }
}

fn format_of(path: &Path) -> MeshResult<MeshFormat> {
    MeshFormat::from_path(path).ok_or_else(|| {
        MeshError::unsupported_format(path.extension().and_then(|e| e.to_str()).map(String::from))
    })
}

/// Load a mesh from file, auto-detecting format from extension.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let format = format_of(path)?;
    info!(path = ?path, format = format.name(), "Loading mesh");

    let result = match format {
        MeshFormat::Stl => load_stl(path),
        MeshFormat::Obj => load_obj(path),
    };
    log_io_operation("load", path, format.name(), result.is_ok());
    let mesh = result?;

    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(MeshError::empty_mesh("mesh has no vertices or faces"));
    }
    check_mesh_data(&mesh, path)?;

    if let Some((min, max)) = mesh.bounds() {
        let dims = max - min;
        info!(
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            "Loaded mesh"
        );
        debug!(
            "Dimensions: {:.1} x {:.1} x {:.1}",
            dims.x, dims.y, dims.z
        );
        let max_dim = dims.x.max(dims.y).max(dims.z);
        if max_dim < 0.1 {
            warn!(max_dim, "Mesh largest dimension is tiny, units may not be millimetres");
        }
    }
    Ok(mesh)
}

/// Reject out-of-range indices and non-finite coordinates.
fn check_mesh_data(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let n = mesh.vertices.len() as u32;
    if let Some((f, face)) = mesh
        .faces
        .iter()
        .enumerate()
        .find(|(_, face)| face.iter().any(|&i| i >= n))
    {
        return Err(MeshError::parse_error(
            path,
            format!("face {f} references vertex {face:?} beyond {n} vertices"),
        ));
    }
    if let Some(v) = mesh
        .vertices
        .iter()
        .position(|v| !v.position.coords.iter().all(|c| c.is_finite()))
    {
        return Err(MeshError::parse_error(
            path,
            format!("vertex {v} has a non-finite coordinate"),
        ));
    }
    Ok(())
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    // read_stl welds identical corners into an indexed mesh
    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    debug!(
        vertices = stl.vertices.len(),
        triangles = stl.faces.len(),
        "STL parsed"
    );

    let vertices: Vec<Vertex> = stl
        .vertices
        .iter()
        .map(|v| Vertex::from_coords(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64))
        .collect();

    let faces: Vec<[u32; 3]> = stl
        .faces
        .iter()
        .map(|face| face.vertices.map(|i| i as u32))
        .filter(|[a, b, c]| a != b && b != c && a != c)
        .collect();
    if faces.len() < stl.faces.len() {
        debug!(
            skipped = stl.faces.len() - faces.len(),
            "Skipped degenerate STL facets"
        );
    }

    Ok(Mesh {
        vertices,
        faces,
        groups: Vec::new(),
    })
}

/// Load mesh from OBJ file, merging all objects into one mesh.
fn load_obj(path: &Path) -> MeshResult<Mesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    if models.is_empty() {
        return Err(MeshError::empty_mesh("OBJ file contains no models"));
    }

    let mut mesh = Mesh::new();
    for model in &models {
        let obj = &model.mesh;
        let offset = mesh.vertices.len() as u32;
        let count = obj.positions.len() / 3;
        debug!(name = %model.name, vertices = count, "OBJ model");

        for i in 0..count {
            let p = &obj.positions[3 * i..3 * i + 3];
            let mut vertex = Vertex::from_coords(p[0] as f64, p[1] as f64, p[2] as f64);
            if obj.normals.len() == obj.positions.len() {
                let n = &obj.normals[3 * i..3 * i + 3];
                vertex.normal = Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64)
                    .try_normalize(1e-12);
            }
            if obj.vertex_color.len() == obj.positions.len() {
                let c = &obj.vertex_color[3 * i..3 * i + 3];
                vertex.color = Some(VertexColor::from_float(c[0], c[1], c[2]));
            }
            mesh.vertices.push(vertex);
        }
        mesh.faces.extend(
            obj.indices
                .chunks_exact(3)
                .map(|c| [c[0] + offset, c[1] + offset, c[2] + offset]),
        );
    }

    debug!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        models = models.len(),
        "OBJ loaded"
    );
    Ok(mesh)
}

/// Save a mesh, choosing the format from the extension.
pub fn save_mesh(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let format = format_of(path)?;
    let result = match format {
        MeshFormat::Stl => save_stl(mesh, path),
        MeshFormat::Obj => save_obj(mesh, path),
    };
    log_io_operation("save", path, format.name(), result.is_ok());
    result
}

/// Save mesh to STL file (binary format).
pub fn save_stl(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|tri| {
            let n = tri.normal().unwrap_or_else(Vector3::zeros);
            let corner = |p: nalgebra::Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [corner(tri.v0), corner(tri.v1), corner(tri.v2)],
            }
        })
        .collect();

    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::io_write(path, e))?;
    writer.flush().map_err(|e| MeshError::io_write(path, e))?;

    debug!(triangles = triangles.len(), path = ?path, "Saved STL");
    Ok(())
}

/// Save mesh to OBJ file (ASCII format).
///
/// Vertex order and face indices are preserved exactly. Colors, when every
/// vertex has one, are appended to the `v` lines as floats in `[0, 1]`.
pub fn save_obj(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    write_obj(mesh, &mut writer).map_err(|e| MeshError::io_write(path, e))?;
    debug!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        path = ?path,
        "Saved OBJ"
    );
    Ok(())
}

fn write_obj(mesh: &Mesh, w: &mut impl Write) -> std::io::Result<()> {
    writeln!(w, "# Vertices: {}", mesh.vertices.len())?;
    writeln!(w, "# Faces: {}", mesh.faces.len())?;

    let has_colors = !mesh.vertices.is_empty() && mesh.vertices.iter().all(|v| v.color.is_some());
    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());

    for v in &mesh.vertices {
        let p = v.position;
        match v.color.filter(|_| has_colors) {
            Some(c) => {
                let (r, g, b) = c.to_float();
                writeln!(w, "v {:.6} {:.6} {:.6} {:.4} {:.4} {:.4}", p.x, p.y, p.z, r, g, b)?;
            }
            None => writeln!(w, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z)?,
        }
    }

    if has_normals {
        for v in &mesh.vertices {
            // zero placeholder keeps normal indices aligned with vertices
            let n = v.normal.unwrap_or_else(Vector3::zeros);
            writeln!(w, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
        }
    }

    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| i + 1);
        if has_normals {
            writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(w, "f {a} {b} {c}")?;
        }
    }
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::capped_cylinder;
    use nalgebra::Point3;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_stl() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();
        writeln!(file, "solid test").unwrap();
        writeln!(file, "  facet normal 0 0 1").unwrap();
        writeln!(file, "    outer loop").unwrap();
        writeln!(file, "      vertex 0 0 0").unwrap();
        writeln!(file, "      vertex 100 0 0").unwrap();
        writeln!(file, "      vertex 0 100 0").unwrap();
        writeln!(file, "    endloop").unwrap();
        writeln!(file, "  endfacet").unwrap();
        writeln!(file, "endsolid test").unwrap();
        file
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(MeshFormat::from_path(Path::new("test.stl")), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_path(Path::new("test.STL")), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_path(Path::new("shell.obj")), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path(Path::new("test.ply")), None);
        assert!(load_mesh(Path::new("scan.xyz")).is_err());
    }

    #[test]
    fn test_load_ascii_stl() {
        let file = create_test_stl();
        let mesh = load_mesh(file.path()).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(100.0, 100.0, 0.0));
    }

    #[test]
    fn test_stl_reload_welds_corners() {
        let mesh = capped_cylinder(5.0, 10.0, 16, 2.5, false);
        let file = NamedTempFile::with_suffix(".stl").unwrap();
        save_mesh(&mesh, file.path()).unwrap();
        let reloaded = load_mesh(file.path()).unwrap();
        assert_eq!(reloaded.vertex_count(), mesh.vertex_count());
        assert_eq!(reloaded.face_count(), mesh.face_count());
        assert!((reloaded.signed_volume() - mesh.signed_volume()).abs() < 1e-2);
    }

    #[test]
    fn test_obj_preserves_order_and_colors() {
        let mut mesh = capped_cylinder(5.0, 10.0, 12, 2.5, false);
        mesh.set_color(VertexColor::LIGHT_GREEN);
        let file = NamedTempFile::with_suffix(".obj").unwrap();
        save_obj(&mesh, file.path()).unwrap();

        let reloaded = load_mesh(file.path()).unwrap();
        assert_eq!(reloaded.vertex_count(), mesh.vertex_count());
        assert_eq!(reloaded.faces, mesh.faces);
        for (orig, loaded) in mesh.vertices.iter().zip(&reloaded.vertices) {
            assert!((orig.position - loaded.position).norm() < 1e-5);
            assert_eq!(loaded.color, Some(VertexColor::LIGHT_GREEN));
        }
    }

    #[test]
    fn test_obj_with_normals() {
        let mut mesh = Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(0.0, 10.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        for v in &mut mesh.vertices {
            v.normal = Some(Vector3::z());
        }
        let file = NamedTempFile::with_suffix(".obj").unwrap();
        save_obj(&mesh, file.path()).unwrap();
        let reloaded = load_mesh(file.path()).unwrap();
        assert_eq!(reloaded.vertex_count(), 3);
        assert_eq!(reloaded.vertices[1].normal, Some(Vector3::z()));
        assert_eq!(reloaded.vertices[1].color, None);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_mesh(Path::new("/nonexistent/dir/scan.stl")).unwrap_err();
        assert!(matches!(err, MeshError::IoRead { .. }));
    }
}
