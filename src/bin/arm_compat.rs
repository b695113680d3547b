//! ARM64 compatibility analysis CLI.
//!
//! A thin front end over the engine: it owns no analysis logic, only
//! argument parsing, logging bootstrap, and result formatting. Modeled on
//! `src/bin/valknut.rs`'s `clap`-derive + `tracing-subscriber` pattern.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use arm_compat::core::config::EngineConfig;
use arm_compat::Orchestrator;

/// ARM64 compatibility analysis engine.
#[derive(Debug, Parser)]
#[command(name = "arm-compat", version, about)]
struct Cli {
    /// Enable debug-level logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyze a repository for ARM64 compatibility.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Repository URL, e.g. `https://github.com/acme/widgets`.
    url: String,

    /// Optional path to a YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Analyze(args) => analyze_command(args).await,
    }
}

async fn analyze_command(args: AnalyzeArgs) -> ExitCode {
    let config = match EngineConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = Orchestrator::new(config);
    match orchestrator.analyze(&args.url).await {
        Ok(verdict) => {
            print_verdict(&verdict, args.format);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("analysis failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_verdict(verdict: &arm_compat::Verdict, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(verdict) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("failed to serialize verdict: {err}"),
        },
        OutputFormat::Pretty => {
            println!("Repository: {}", verdict.repository);
            println!("Default branch: {}", verdict.default_branch);
            println!("Overall compatibility: {:?}", verdict.overall_compatibility);
            println!(
                "Files analyzed: {}",
                verdict.statistics.total_files_analyzed
            );
            if !verdict.reasoning.is_empty() {
                println!("\nReasoning:");
                for line in &verdict.reasoning {
                    println!("  - {line}");
                }
            }
            if !verdict.recommendations.is_empty() {
                println!("\nRecommendations:");
                for rec in &verdict.recommendations {
                    println!("  - {rec}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_analyze_defaults() {
        let cli = Cli::parse_from(["arm-compat", "analyze", "https://github.com/acme/widgets"]);
        assert!(!cli.verbose);
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.url, "https://github.com/acme/widgets");
                assert_eq!(args.config, None);
                assert_eq!(args.format, OutputFormat::Pretty);
            }
        }
    }

    #[test]
    fn test_cli_parsing_analyze_with_options() {
        let cli = Cli::parse_from([
            "arm-compat",
            "--verbose",
            "analyze",
            "https://github.com/acme/widgets",
            "--config",
            "arm.yml",
            "--format",
            "json",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.config, Some(PathBuf::from("arm.yml")));
                assert_eq!(args.format, OutputFormat::Json);
            }
        }
    }
}
