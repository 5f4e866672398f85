//! device config command - example and check configuration files.

use anyhow::Result;
use colored::Colorize;
use device_shell::PipelineConfig;
use serde::Serialize;

use crate::{Cli, ConfigAction, OutputFormat, Preset, output};

#[derive(Serialize)]
struct CheckResult {
    path: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    finish: &'static str,
    connector: bool,
    holes: usize,
}

pub fn run(action: &ConfigAction, cli: &Cli) -> Result<()> {
    match action {
        ConfigAction::Example { preset, output: dest } => {
            let config = match preset {
                Preset::Socket => PipelineConfig::preset_socket(),
                Preset::Afo => PipelineConfig::preset_afo(),
            };
            match dest {
                Some(path) => {
                    config.save(path)?;
                    output::success(
                        &format!("Example configuration saved to {}", path.display()),
                        cli.format,
                        cli.quiet,
                    );
                }
                None => match cli.format {
                    OutputFormat::Json => output::print(&config, cli.format, cli.quiet),
                    OutputFormat::Text => {
                        if !cli.quiet {
                            print!("{}", config.to_toml()?);
                        }
                    }
                },
            }
        }
        ConfigAction::Check { path } => {
            let config = PipelineConfig::load(path)?;
            config.validate()?;
            let result = CheckResult {
                path: path.display().to_string(),
                valid: true,
                name: config.name.clone(),
                finish: config.finish.name(),
                connector: config.connector.is_some(),
                holes: config.connector.as_ref().map_or(0, |c| c.holes.len()),
            };
            match cli.format {
                OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
                OutputFormat::Text => {
                    if !cli.quiet {
                        output::success(
                            &format!("{} is valid", path.display()),
                            cli.format,
                            cli.quiet,
                        );
                        println!("  {}: {}", "Finish".cyan(), result.finish);
                        println!(
                            "  {}: {}",
                            "Connector".cyan(),
                            if result.connector {
                                format!("flat base, {} holes", result.holes)
                            } else {
                                "none".to_string()
                            }
                        );
                    }
                }
            }
        }
    }
    Ok(())
}
