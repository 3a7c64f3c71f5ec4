use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};

use crate::api::PackResponse;
use crate::manifest::{Manifest, write_csv_template};
use crate::optimizer::{PackingConfig, pack_items_with_config};
use crate::report::PlacementResult;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plans the load of a single shipping container")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
    #[arg(
        short,
        long,
        global = true,
        value_name = "[off, error, warn, info, debug, trace]",
        default_value = "info"
    )]
    pub log_level: LevelFilter,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API (default)
    Serve,
    /// Pack a manifest (JSON) or cargo list (CSV) and print the report
    Pack(PackArgs),
    /// Write a CSV cargo list template
    Template(TemplateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PackArgs {
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,
    /// Write the JSON result to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Keep every item in its declared orientation
    #[arg(long)]
    pub no_rotation: bool,
    #[arg(long, value_name = "RATIO")]
    pub support_ratio: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "sample_data/template_cargo_items.csv"
    )]
    pub output: PathBuf,
}

impl PackArgs {
    fn packing_config(&self, base: PackingConfig) -> PackingConfig {
        let mut config = base;
        if self.no_rotation {
            config.allow_item_rotation = false;
        }
        if let Some(ratio) = self.support_ratio {
            config.support_ratio = ratio;
        }
        config
    }
}

/// Packs the manifest named by `args` and writes the JSON output if requested.
pub fn run_pack(args: &PackArgs, base: PackingConfig) -> Result<PlacementResult> {
    if let Some(ratio) = args.support_ratio {
        ensure!(
            (0.0..=1.0).contains(&ratio),
            "--support-ratio must be between 0 and 1, got {ratio}"
        );
    }

    let (container, items) = Manifest::load(&args.input)
        .and_then(Manifest::into_parts)
        .with_context(|| format!("could not load manifest {}", args.input.display()))?;
    info!(
        "📄 Loaded {} item types from {}",
        items.len(),
        args.input.display()
    );

    let result = pack_items_with_config(container, &items, args.packing_config(base))?;

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&PackResponse::from_placement_result(&result))?;
        fs::write(output, json)
            .with_context(|| format!("could not write result to {}", output.display()))?;
        info!("💾 Result written to {}", output.display());
    }
    Ok(result)
}

/// Writes the cargo list template named by `args`.
pub fn run_template(args: &TemplateArgs) -> Result<()> {
    write_csv_template(&args.output)
        .with_context(|| format!("could not write template {}", args.output.display()))?;
    info!("📝 Template written to {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    fn manifest_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "container": {{"width": 2.0, "height": 1.0, "depth": 1.0, "max_weight": 100.0}},
                "items": [{{"name": "pole", "width": 1.0, "height": 2.0, "depth": 1.0, "weight": 5.0, "quantity": 1}}]
            }}"#
        )
        .unwrap();
        file
    }

    #[test]
    fn parses_pack_subcommand() {
        let cli = Cli::parse_from([
            "load_planner",
            "--log-level",
            "debug",
            "pack",
            "--input",
            "cargo.json",
            "--no-rotation",
            "--support-ratio",
            "0.8",
        ]);

        assert_eq!(cli.log_level, LevelFilter::Debug);
        match cli.command {
            Some(Command::Pack(args)) => {
                assert_eq!(args.input, PathBuf::from("cargo.json"));
                assert!(args.no_rotation);
                assert_eq!(args.support_ratio, Some(0.8));
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["load_planner"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, LevelFilter::Info);
    }

    #[test]
    fn run_pack_writes_json_output() {
        let manifest = manifest_file();
        let dir = tempdir().unwrap();
        let output = dir.path().join("result.json");
        let args = PackArgs {
            input: manifest.path().to_path_buf(),
            output: Some(output.clone()),
            no_rotation: false,
            support_ratio: None,
        };

        let result = run_pack(&args, PackingConfig::default()).unwrap();
        assert!(result.is_complete());

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(written["placed"][0]["orientation"], 1);
    }

    #[test]
    fn run_pack_honours_no_rotation() {
        let manifest = manifest_file();
        let args = PackArgs {
            input: manifest.path().to_path_buf(),
            output: None,
            no_rotation: true,
            support_ratio: None,
        };

        let result = run_pack(&args, PackingConfig::default()).unwrap();
        assert_eq!(result.rejected.len(), 1);
    }

    #[test]
    fn run_pack_reads_csv_cargo_list() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("cargo.csv");
        fs::write(
            &input,
            "名前,幅(mm),高さ(mm),奥行き(mm),重量(g),個数\ncrate,1000,1000,1000,50000,3\n",
        )
        .unwrap();
        let args = PackArgs {
            input,
            output: None,
            no_rotation: false,
            support_ratio: None,
        };

        let result = run_pack(&args, PackingConfig::default()).unwrap();
        assert!(result.is_complete());
        assert_eq!(result.placed.len(), 3);
        assert!((result.placed_weight - 150.0).abs() < 1e-9);
    }

    #[test]
    fn template_subcommand_writes_default_path_or_given_file() {
        let cli = Cli::parse_from(["load_planner", "template"]);
        match cli.command {
            Some(Command::Template(args)) => assert_eq!(
                args.output,
                PathBuf::from("sample_data/template_cargo_items.csv")
            ),
            other => panic!("unexpected command: {other:?}"),
        }

        let dir = tempdir().unwrap();
        let output = dir.path().join("cargo.csv");
        run_template(&TemplateArgs {
            output: output.clone(),
        })
        .unwrap();
        let args = PackArgs {
            input: output,
            output: None,
            no_rotation: false,
            support_ratio: None,
        };
        let result = run_pack(&args, PackingConfig::default()).unwrap();
        assert_eq!(result.placed.len() + result.rejected.len(), 23);
    }

    #[test]
    fn run_pack_rejects_out_of_range_ratio() {
        let args = PackArgs {
            input: PathBuf::from("unused.json"),
            output: None,
            no_rotation: false,
            support_ratio: Some(2.0),
        };
        assert!(run_pack(&args, PackingConfig::default()).is_err());
    }
}
