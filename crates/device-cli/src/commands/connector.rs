//! device connector command - build connector geometry and report it.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use device_shell::{Connector, ConnectorConfig, ConnectorGeometry, PipelineConfig};
use mesh_kernel::{DynamicMesh, Mesh, save_mesh};
use nalgebra::Vector3;
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ConnectorReport {
    name: String,
    diameter: f64,
    height: f64,
    has_inner: bool,
    outer_loop: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    inner_loop: Option<usize>,
    outer_faces: usize,
    inner_faces: usize,
    holes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

pub fn run(
    config_path: Option<&Path>,
    diameter: Option<f64>,
    output_path: Option<&Path>,
    cli: &Cli,
) -> Result<()> {
    let mut connector_config = match config_path {
        Some(path) => PipelineConfig::load(path)?.connector.unwrap_or_default(),
        None => ConnectorConfig::default(),
    };
    if let Some(d) = diameter {
        connector_config.flat_base.diameter = d;
    }
    connector_config.flat_base.validate()?;

    let connector = connector_config.build();
    let geometry = connector.geometry()?;

    if let Some(path) = output_path {
        save_mesh(&combined(&geometry), path)
            .with_context(|| format!("Failed to save connector to {:?}", path))?;
    }

    let bounds = geometry.combined_bounds;
    let report = ConnectorReport {
        name: connector.name().to_string(),
        diameter: bounds.width(),
        height: bounds.height(),
        has_inner: geometry.has_inner(),
        outer_loop: geometry.outer_loop.len(),
        inner_loop: geometry.inner_loop.as_ref().map(|l| l.len()),
        outer_faces: geometry.outer.face_count(),
        inner_faces: geometry.inner.as_ref().map_or(0, Mesh::face_count),
        holes: geometry.holes.len(),
        output: output_path.map(|p| p.display().to_string()),
    };

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Connector".bold().underline());
                println!("  {}: {}", "Type".cyan(), report.name);
                println!(
                    "  {}: {:.2} x {:.2} mm",
                    "Diameter x height".cyan(),
                    report.diameter,
                    report.height
                );
                println!("  {}: {} vertices", "Outer loop".cyan(), report.outer_loop);
                match report.inner_loop {
                    Some(n) => println!("  {}: {} vertices", "Inner loop".cyan(), n),
                    None => println!("  {}: none", "Inner loop".cyan()),
                }
                println!(
                    "  {}: {} outer, {} inner",
                    "Faces".cyan(),
                    report.outer_faces,
                    report.inner_faces
                );
                println!("  {}: {}", "Holes".cyan(), report.holes);
                if let Some(path) = &report.output {
                    output::success(&format!("Connector saved to {path}"), cli.format, cli.quiet);
                }
            }
        }
    }

    Ok(())
}

/// Both parts in one mesh, in connector space.
fn combined(geometry: &ConnectorGeometry) -> Mesh {
    let mut dm = DynamicMesh::new();
    geometry.append_to(&mut dm, Vector3::zeros());
    dm.to_mesh()
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_shell::FlatBaseConnector;

    #[test]
    fn test_combined_keeps_both_parts() {
        let connector = FlatBaseConnector::new(Default::default(), Vec::new());
        let geometry = connector.geometry().unwrap();
        let mesh = combined(&geometry);
        let inner = geometry.inner.as_ref().unwrap();
        assert_eq!(mesh.face_count(), geometry.outer.face_count() + inner.face_count());
        assert_eq!(mesh.group_histogram().len(), 2);
    }
}
