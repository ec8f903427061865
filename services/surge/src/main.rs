//! surge: scenario-driven HTTP load generator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use surge::{build_load_test, ResultsReport, ScenarioFile};
use surge_core::{LoadTest, RunConfig, Scenario, Snapshot, Template};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "surge")]
#[command(about = "Scenario-driven HTTP load generator", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "SURGE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override number of virtual users
        #[arg(short, long)]
        users: Option<u32>,

        /// Override test duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Override target base URL
        #[arg(long, env = "SURGE_BASE_URL")]
        base_url: Option<String>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Hammer a single path with GET requests
    Quick {
        /// Base URL
        #[arg(short, long, env = "SURGE_BASE_URL", default_value = "http://localhost:8080")]
        url: String,

        /// Path appended to the base URL
        #[arg(short, long, default_value = "/")]
        path: String,

        /// Number of virtual users
        #[arg(short = 'c', long, default_value = "50")]
        users: u32,

        /// Test duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // stdout is reserved for reports
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    match cli.command {
        Commands::Run {
            scenario,
            users,
            duration,
            base_url,
            output,
        } => {
            let mut file = ScenarioFile::from_file(&scenario)?;

            // Apply overrides
            if let Some(u) = users {
                file.concurrent_users = u;
            }
            if let Some(d) = duration {
                file.duration_secs = d;
            }
            if let Some(url) = base_url {
                file.base_url = url;
            }

            file.validate()?;

            info!(
                scenario = %scenario.display(),
                name = %file.name,
                description = %file.description,
                steps = file.steps.len(),
                "Scenario loaded"
            );

            let test = build_load_test(&file)?;
            match test.run().await? {
                Some(snapshot) => print_results(&snapshot, &output)?,
                None => println!("No load test templates!"),
            }
            Ok(())
        }
        Commands::Quick {
            url,
            path,
            users,
            duration,
        } => {
            let config = RunConfig::new(url, users, Duration::from_secs(duration)).with_name("quick");
            let scenario = Scenario::new(vec![Template::new("quick", path)])?;

            if let Some(snapshot) = LoadTest::new(config, scenario).run().await? {
                print_results(&snapshot, "table")?;
            }
            Ok(())
        }
        Commands::List { dir } => list_scenarios(&dir),
    }
}

fn print_results(snapshot: &Snapshot, output: &str) -> anyhow::Result<()> {
    match output {
        "json" => println!("{}", ResultsReport::format_json(snapshot)?),
        "csv" => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(snapshot));
        }
        _ => println!("{}", ResultsReport::format_table(snapshot)),
    }
    Ok(())
}

fn list_scenarios(dir: &Path) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read scenario directory {}", dir.display()))?;

    let mut scenarios = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );
        if !is_yaml {
            continue;
        }
        match ScenarioFile::from_file(&path) {
            Ok(file) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                scenarios.push((filename, file.name, file.description));
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping scenario"),
        }
    }

    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

    println!("Available scenarios in {}:", dir.display());
    println!();
    if scenarios.is_empty() {
        println!("No scenario files found");
    } else {
        for (filename, name, desc) in scenarios {
            println!("  {} - {}", filename, name);
            println!("    {}", desc);
            println!();
        }
    }
    Ok(())
}
