//! device info command - display mesh statistics.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use device_shell::shell_groups;
use mesh_kernel::components::find_connected_components;
use mesh_kernel::{DynamicMesh, load_mesh};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    vertices: usize,
    faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface_area: Option<f64>,
    has_colors: bool,
    components: usize,
    boundary_loops: usize,
    groups: Vec<GroupInfo>,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

#[derive(Serialize)]
struct GroupInfo {
    id: i32,
    name: &'static str,
    faces: usize,
}

fn group_name(id: i32) -> &'static str {
    match id {
        shell_groups::TRIMMED => "trimmed",
        shell_groups::INNER => "inner wall",
        shell_groups::OUTER => "outer wall",
        shell_groups::STITCH => "rim",
        _ => "connector",
    }
}

pub fn run(input: &Path, detailed: bool, cli: &Cli) -> Result<()> {
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let dm = DynamicMesh::from_mesh(&mesh);

    let bounds = mesh.bounds().map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });

    let info = MeshInfo {
        path: input.display().to_string(),
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
        bounds,
        volume: detailed.then(|| mesh.signed_volume()),
        surface_area: detailed.then(|| mesh.surface_area()),
        has_colors: mesh.vertices.iter().any(|v| v.color.is_some()),
        components: find_connected_components(&dm).component_count(),
        boundary_loops: dm.boundary_loops().len(),
        groups: mesh
            .group_histogram()
            .into_iter()
            .map(|(id, faces)| GroupInfo {
                id,
                name: group_name(id),
                faces,
            })
            .collect(),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&info, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Information".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!("  {}: {}", "Vertices".cyan(), info.vertices);
                println!("  {}: {}", "Faces".cyan(), info.faces);
                println!("  {}: {}", "Components".cyan(), info.components);
                println!("  {}: {}", "Boundary loops".cyan(), info.boundary_loops);

                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.2} x {:.2} x {:.2} mm",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                    println!(
                        "  {}: ({:.2}, {:.2}, {:.2})",
                        "Min bounds".cyan(),
                        b.min[0],
                        b.min[1],
                        b.min[2]
                    );
                }

                if let Some(vol) = info.volume {
                    println!("  {}: {:.2} mm³", "Volume".cyan(), vol);
                }
                if let Some(area) = info.surface_area {
                    println!("  {}: {:.2} mm²", "Surface area".cyan(), area);
                }

                if info.groups.len() > 1 {
                    println!("  {}:", "Groups".cyan());
                    for g in &info.groups {
                        println!("    {:>3} {:<12} {} faces", g.id, g.name, g.faces);
                    }
                }
                println!(
                    "  {}: {}",
                    "Has colors".cyan(),
                    if info.has_colors { "yes" } else { "no" }
                );
            }
        }
    }

    Ok(())
}
