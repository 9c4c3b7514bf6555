use anyhow::Result;
use bootstrap_orchestrator::{
    Orchestrator, PipelineFile, RepeatOverrides, RunFailure, SimulatedProcess, Step, StepKind,
    build_config, load_pipeline, resolve_pipeline_path,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bootstrap-orchestrator")]
#[command(about = "Staged bootstrap pipeline runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline file, then repeat its repeatable steps
    Run {
        /// Pipeline file (defaults to BOOTSTRAP_PIPELINE, then the XDG config dir, then ./pipeline.json)
        #[arg(short, long)]
        pipeline: Option<PathBuf>,
        /// Number of repeat runs after the first successful run
        #[arg(short, long, default_value_t = 0)]
        repeat: u32,
    },
    /// Load and check a pipeline file without running it
    Validate {
        #[arg(short, long)]
        pipeline: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("bootstrap_orchestrator=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { pipeline, repeat } => {
            let path = resolve_pipeline_path(pipeline)?;
            info!("Loading pipeline from {}", path.display());
            let file = load_pipeline(&path)?;

            let config = build_config(&file)
                .on_step_success(|step, step_time, total| {
                    println!(
                        "  ok   {:<24} {:>6} ms (total {} ms)",
                        step_name(step),
                        step_time.as_millis(),
                        total.as_millis()
                    );
                })
                .on_error(|error, _, step, total| {
                    println!(
                        "  FAIL {:<24} {} (after {} ms)",
                        step_name(step),
                        error,
                        total.as_millis()
                    );
                });
            let orchestrator = Orchestrator::new(config)?;

            println!("Run 1");
            let mut current = orchestrator.run().await.into_result().map_err(run_failed)?;
            println!(
                "Completed: {}",
                serde_json::to_string(current.container())?
            );

            for attempt in 1..=repeat {
                println!("Run {} (repeat)", attempt + 1);
                let outcome = current.repeat(RepeatOverrides::new()).await?;
                current = outcome.into_result().map_err(run_failed)?;
                println!(
                    "Completed: {}",
                    serde_json::to_string(current.container())?
                );
            }
        }
        Commands::Validate { pipeline } => {
            let path = resolve_pipeline_path(pipeline)?;
            let file = load_pipeline(&path)?;
            let orchestrator = Orchestrator::new(build_config(&file))?;
            let config = orchestrator.config();

            println!("Pipeline: {}", path.display());
            println!(
                "Stages: {} pre, {} concurrent, {} post",
                config.pre().len(),
                config.concurrent().len(),
                config.post().len()
            );
            print_repeatable(&file);
        }
    }

    Ok(())
}

fn step_name(step: &Step<SimulatedProcess>) -> &str {
    step.title().unwrap_or("<untitled>")
}

fn run_failed(failure: RunFailure<SimulatedProcess>) -> anyhow::Error {
    anyhow::anyhow!(
        "{} step `{}` failed: {}",
        failure.stage,
        step_name(&failure.step),
        failure.error
    )
}

fn print_repeatable(file: &PipelineFile) {
    let stages = [
        ("pre", &file.pre),
        ("concurrent", &file.concurrent),
        ("post", &file.post),
    ];
    for (stage, specs) in stages {
        let titles: Vec<&str> = specs
            .iter()
            .filter(|spec| spec.kind == StepKind::Repeatable)
            .map(|spec| spec.title.as_str())
            .collect();
        if !titles.is_empty() {
            println!("Repeatable {}: {}", stage, titles.join(", "));
        }
    }
}
