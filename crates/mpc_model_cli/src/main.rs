use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mpc_model::config::{build_model, load_config};
use mpc_model::generator::{generate_from_file, GenerationReport};
use mpc_model::symbolic::SymbolSource;
use mpc_model::{BoundModel, VarKind};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mpc_model_cli")]
#[command(about = "Dynamics-model generation for MPC solvers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, bind and discretize the configured model, then write its variable map
    Generate {
        /// Path to the generation YAML file
        config_path: PathBuf,
        /// Print the discrete-time update expressions
        #[arg(long)]
        print_update: bool,
    },
    /// Print the layout and bounds of the configured model without writing anything
    Show {
        /// Path to the generation YAML file
        config_path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::Generate {
            config_path,
            print_update,
        } => {
            let report = generate_from_file(&config_path)?;
            write_report(&mut stdout, &report, print_update)?;
        }
        Commands::Show { config_path } => show(&mut stdout, &config_path)?,
    }
    Ok(())
}

fn write_report(out: &mut impl Write, report: &GenerationReport, print_update: bool) -> Result<()> {
    writeln!(
        out,
        "Generated {} (nu = {}, nx = {})",
        report.model_name, report.nu, report.nx
    )?;
    writeln!(out, "Variable map: {}", report.variable_map_path.display())?;
    if print_update {
        let states = report
            .variable_map
            .iter()
            .filter(|(_, idx)| idx.kind == VarKind::State)
            .map(|(name, _)| name);
        for (name, expr) in states.zip(&report.discrete_update) {
            writeln!(out, "  {}+ = {}", name, expr)?;
        }
    }
    Ok(())
}

fn show(out: &mut impl Write, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config {}.", config_path.display()))?;
    let model = build_model(&config.model)?;
    let bound = BoundModel::new(model.as_ref(), &SymbolSource::new())?;

    writeln!(out, "Model: {}", model.spec().name())?;
    writeln!(out, "{:<12} {:<5} {:>5} {:>12} {:>12}", "name", "kind", "index", "lower", "upper")?;
    for (name, idx) in model.variable_map().iter() {
        let bounds = model.get_bounds(name)?;
        writeln!(
            out,
            "{:<12} {:<5} {:>5} {:>12.4} {:>12.4}",
            name,
            idx.kind.as_str(),
            idx.index,
            bounds.lower,
            bounds.upper
        )?;
    }
    writeln!(out, "Continuous dynamics:")?;
    for (name, f) in model.states().iter().zip(bound.explicit_dynamics().iter()) {
        writeln!(out, "  d{}/dt = {}", name, f)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("mpc_model_cli_{}", std::process::id()))
            .join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("generation.yaml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn show_lists_layout_and_dynamics_without_writing() {
        let path = write_config(
            "show",
            "model:\n  kind: second_order_unicycle\nintegrator_step: 0.1\n",
        );
        let mut out = Vec::<u8>::new();
        show(&mut out, &path).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Model: second_order_unicycle\n"));
        let rows: Vec<&str> = text.lines().skip(2).take(6).collect();
        assert!(rows[0].starts_with("x "));
        assert!(rows[0].contains(" x "));
        assert!(rows[4].starts_with("a "));
        assert!(rows[4].contains(" u "));
        assert!(text.contains("3.0000"));
        assert!(text.contains("Continuous dynamics:"));
        assert_eq!(text.matches("/dt = ").count(), 4);
        assert!(!path.with_file_name("model_map.yaml").exists());
    }

    #[test]
    fn show_reports_missing_config() {
        let missing = std::env::temp_dir().join("mpc_model_cli_missing/generation.yaml");
        let err = show(&mut Vec::<u8>::new(), &missing).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load config"));
    }

    #[test]
    fn generate_prints_one_update_per_state() {
        let path = write_config(
            "generate",
            "model:\n  kind: contouring_second_order_unicycle\nintegrator_step: 0.2\n",
        );
        let report = generate_from_file(&path).unwrap();

        let mut out = Vec::<u8>::new();
        write_report(&mut out, &report, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Generated contouring_second_order_unicycle (nu = 2, nx = 5)\n"));
        let updates: Vec<&str> = text.lines().filter(|l| l.starts_with("  ")).collect();
        assert_eq!(updates.len(), 5);
        assert!(updates[0].starts_with("  x+ = "));
        assert!(updates[4].starts_with("  spline+ = "));

        let mut out = Vec::<u8>::new();
        write_report(&mut out, &report, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }
}
