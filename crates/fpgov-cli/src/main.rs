//! fpgov - Command-line interface for the adaptive precision governor

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use fpgov_control::{WorkloadParams, WorkloadType};
use fpgov_core::{DataTypeHint, OperationKind, WorkloadDescriptor};
use fpgov_telemetry::TelemetryBackend;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::collect::CollectOptions;
use commands::score::ScoreInput;
use commands::simulate::{parse_workload, SimulateOptions};
use output::{OutputFormat, OutputFormatter};

/// Command-line interface for the adaptive precision governor
#[derive(Debug, Parser)]
#[command(name = "fpgov")]
#[command(about = "Adaptive GPU precision governor")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable JSON output (overrides --format)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sample device telemetry into a CSV file
    Collect {
        /// How long to collect, in seconds
        #[arg(long)]
        duration: u64,

        /// CSV file to append to
        #[arg(long, value_name = "PATH")]
        out: PathBuf,

        /// Sampling period in milliseconds (overrides configuration)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Telemetry backend (smi, mock)
        #[arg(long, default_value = "smi")]
        backend: TelemetryBackend,

        /// GPU index to sample
        #[arg(long, default_value = "0")]
        gpu: u32,

        /// Path to the nvidia-smi executable
        #[arg(long, value_name = "PATH")]
        smi_binary: Option<PathBuf>,
    },

    /// Score a workload, prompt or workload type and show the tier the
    /// thresholds imply
    #[command(group(
        ArgGroup::new("input")
            .required(true)
            .args(["op", "prompt", "workload_type"])
    ))]
    Score {
        /// Operation kind (matmul, convolution, attention, reduction, elementwise, other)
        #[arg(long, requires = "elements")]
        op: Option<OperationKind>,

        /// Elements per batch item
        #[arg(long, requires = "op")]
        elements: Option<u64>,

        /// Batch size (default 1 for --op)
        #[arg(long)]
        batch: Option<u64>,

        /// Data type hint (float64, float32, float16, bfloat16, int8)
        #[arg(long, default_value = "unknown")]
        dtype: DataTypeHint,

        /// Prompt text to estimate
        #[arg(long)]
        prompt: Option<String>,

        /// Named workload type (text_generation, model_training, inference, ...)
        #[arg(long, value_name = "TYPE")]
        workload_type: Option<WorkloadType>,

        /// Sequence length of a typed workload
        #[arg(long, requires = "workload_type")]
        sequence_length: Option<u64>,

        /// Image size of a typed workload
        #[arg(long, requires = "workload_type")]
        image_size: Option<u64>,
    },

    /// Run the governor against simulated telemetry
    Simulate {
        /// How long to simulate, in seconds
        #[arg(long)]
        duration: u64,

        /// CSV file for the simulated telemetry
        #[arg(long, value_name = "PATH")]
        out: PathBuf,

        /// Workloads to submit, as op:elements[:batch[:dtype]]
        #[arg(long = "workload", value_name = "SPEC", required = true, value_parser = parse_workload)]
        workloads: Vec<WorkloadDescriptor>,

        /// Sampling period in milliseconds (overrides configuration)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Cooldown between transitions in milliseconds (overrides configuration)
        #[arg(long)]
        cooldown_ms: Option<u64>,

        /// Write the decision history as JSON
        #[arg(long, value_name = "PATH")]
        decisions: Option<PathBuf>,
    },

    /// Print or write the default configuration
    Config {
        /// File to write the YAML to
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file given with --config
    Validate,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "fpgov_cli={level},fpgov_core={level},fpgov_telemetry={level},fpgov_control={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    debug!("Starting fpgov CLI with {:?}", cli);

    let format = if cli.json { OutputFormat::Json } else { cli.format };
    let formatter = OutputFormatter::new(format);

    match cli.command {
        Commands::Collect {
            duration,
            out,
            interval_ms,
            backend,
            gpu,
            smi_binary,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let options = CollectOptions {
                duration: Duration::from_secs(duration),
                out,
                interval: interval_ms.map(Duration::from_millis),
                backend,
                gpu_index: gpu,
                smi_binary,
            };
            commands::collect::collect(config, options, &formatter).await?;
        }

        Commands::Score {
            op,
            elements,
            batch,
            dtype,
            prompt,
            workload_type,
            sequence_length,
            image_size,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let input = match (op, elements, prompt, workload_type) {
                (Some(op), Some(elements), _, _) => ScoreInput::Workload(WorkloadDescriptor::new(
                    op,
                    elements,
                    batch.unwrap_or(1),
                    dtype,
                )),
                (_, _, Some(prompt), _) => ScoreInput::Prompt(prompt),
                (_, _, _, Some(workload_type)) => ScoreInput::WorkloadType(
                    workload_type,
                    WorkloadParams {
                        batch_size: batch,
                        sequence_length,
                        image_size,
                    },
                ),
                _ => bail!("score needs --op with --elements, --prompt, or --workload-type"),
            };
            commands::score::score_workload(&config, &input, &formatter)?;
        }

        Commands::Simulate {
            duration,
            out,
            workloads,
            interval_ms,
            cooldown_ms,
            decisions,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let options = SimulateOptions {
                duration: Duration::from_secs(duration),
                out,
                workloads,
                interval: interval_ms.map(Duration::from_millis),
                cooldown: cooldown_ms.map(Duration::from_millis),
                decisions_out: decisions,
            };
            commands::simulate::simulate(config, options, &formatter).await?;
        }

        Commands::Config { output } => {
            commands::config::show_default(output.as_deref(), &formatter)?;
        }

        Commands::Validate => {
            let path = cli
                .config
                .as_deref()
                .context("validate requires --config <FILE>")?;
            commands::config::validate(path, &formatter)?;
        }
    }

    Ok(())
}
