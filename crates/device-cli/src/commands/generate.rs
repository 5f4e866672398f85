//! device generate command - run the generator once and save the shell.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use device_shell::{
    Curve, DeviceGenerator, OffsetMethod, PipelineConfig, SharedCurve, SharedMesh, Status,
};
use mesh_kernel::{Mesh, load_mesh, save_mesh};
use nalgebra::Point3;
use serde::Serialize;
use tracing::debug;

use crate::{Cli, GenerateArgs, OutputFormat, Preset, output};

/// Samples on a circle built from `--trim-height`.
const TRIM_CIRCLE_SAMPLES: usize = 96;

#[derive(Serialize)]
struct GenerateResult {
    input: String,
    output: String,
    status: Status,
    stage: String,
    finish: &'static str,
    input_faces: usize,
    output_faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

pub fn run(args: &GenerateArgs, cli: &Cli) -> Result<()> {
    let scan = load_mesh(&args.input)
        .with_context(|| format!("Failed to load mesh from {:?}", args.input))?;
    let input_faces = scan.face_count();

    let curve = match (&args.curve, args.trim_height) {
        (Some(path), _) => load_curve(path)?,
        (None, Some(height)) => trim_circle(&scan, height)?,
        (None, None) => bail!("either --curve or --trim-height is required"),
    };
    debug!(points = curve.len(), "Trim curve ready");

    let config = build_config(args)?;
    let mut generator = DeviceGenerator::default();
    config.apply_to(&mut generator)?;
    generator.set_mesh_source(Arc::new(SharedMesh::new(scan)));
    generator.set_curve_source(Arc::new(SharedCurve::new(curve)));

    output::info(
        &format!(
            "Generating {} shell ({:.1} mm offset, {:.1} mm wall)...",
            config.finish.name(),
            config.device.inner_offset,
            config.device.thickness
        ),
        cli.format,
        cli.quiet,
    );

    generator.update()?;
    let Some(result) = generator.take_result() else {
        bail!("generator produced no result");
    };

    save_mesh(&result.mesh, &args.output)
        .with_context(|| format!("Failed to save shell to {:?}", args.output))?;

    let report = GenerateResult {
        input: args.input.display().to_string(),
        output: args.output.display().to_string(),
        status: result.status,
        stage: result.stage.to_string(),
        finish: config.finish.name(),
        input_faces,
        output_faces: result.mesh.face_count(),
        failure: result.failure.as_ref().map(|f| f.message.clone()),
    };

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                if result.is_error() {
                    output::warning(
                        &format!("fallback mesh saved to {}", args.output.display()),
                        cli.quiet,
                    );
                } else {
                    output::success(
                        &format!("Shell saved to {}", args.output.display()),
                        cli.format,
                        cli.quiet,
                    );
                }
                println!("  {}: {}", "Status".cyan(), report.status);
                println!("  {}: {}", "Last stage".cyan(), report.stage);
                println!(
                    "  {}: {} → {} faces",
                    "Faces".cyan(),
                    report.input_faces,
                    report.output_faces
                );
            }
        }
    }

    if let Some(failure) = &result.failure {
        bail!("{} stage failed [{}]: {}", failure.stage, failure.code, failure.message);
    }
    Ok(())
}

/// Configuration file or preset, then command-line overrides.
fn build_config(args: &GenerateArgs) -> Result<PipelineConfig> {
    let mut config = match (&args.config, args.preset) {
        (Some(path), _) => PipelineConfig::load(path)?,
        (None, Some(Preset::Socket)) => PipelineConfig::preset_socket(),
        (None, Some(Preset::Afo)) => PipelineConfig::preset_afo(),
        (None, None) => PipelineConfig::default(),
    };

    let device = &mut config.device;
    if let Some(v) = args.inner_offset {
        device.inner_offset = v;
    }
    if let Some(v) = args.thickness {
        device.thickness = v;
    }
    if let (Some(offset), Some(band)) = (args.flare_offset, args.flare_band) {
        device.flare_offset = offset;
        device.flare_band_width = band;
    }
    if args.flip {
        device.flip_trim_side = true;
    }
    if args.sdf {
        device.offset_method = OffsetMethod::Sdf;
    }
    if args.stop_after.is_some() {
        device.stop_after = args.stop_after;
    }

    config.validate()?;
    Ok(config)
}

fn load_curve(path: &Path) -> Result<Curve> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read curve from {:?}", path))?;
    let curve: Curve = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse curve in {:?}", path))?;
    if curve.len() < 3 {
        bail!("trim curve in {:?} has {} points, need at least 3", path, curve.len());
    }
    Ok(curve)
}

/// Horizontal circle around the scan, `height` above its lowest point.
fn trim_circle(scan: &Mesh, height: f64) -> Result<Curve> {
    let Some(bounds) = scan.aabb() else {
        bail!("scan is empty");
    };
    let c = bounds.center();
    let e = bounds.extents();
    Ok(Curve::horizontal_circle(
        Point3::new(c.x, c.y, bounds.min.z + height),
        e.x.max(e.y),
        TRIM_CIRCLE_SAMPLES,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_kernel::primitives::capped_cylinder;

    #[test]
    fn test_trim_circle_around_scan() {
        let scan = capped_cylinder(30.0, 100.0, 32, 5.0, false);
        let curve = trim_circle(&scan, 40.0).unwrap();
        assert_eq!(curve.len(), TRIM_CIRCLE_SAMPLES);
        for p in &curve.points {
            assert_relative_eq!(p.z, 40.0, epsilon = 1e-9);
            assert!(p.coords.xy().norm() >= 29.0);
        }
    }

    #[test]
    fn test_curve_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trim.json");
        std::fs::write(&path, r#"{"points": [[0, 0, 5], [1, 0, 5], [0, 1, 5]]}"#).unwrap();
        let curve = load_curve(&path).unwrap();
        assert!(curve.closed);
        assert_eq!(curve.len(), 3);

        std::fs::write(&path, r#"{"points": [[0, 0, 5]]}"#).unwrap();
        assert!(load_curve(&path).is_err());
    }
}
