// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use edgeviewer::{Config, ProcessorKind, SourceKind};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "edgeviewer")]
#[command(about = "Live camera edge viewer")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Values that take precedence over the config file
#[derive(Args)]
struct Overrides {
    /// Config file (default: ~/.config/edgeviewer/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Frame source
    #[arg(short, long, global = true, value_enum)]
    source: Option<SourceArg>,

    /// Device node or PipeWire target
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Capture width
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Capture height
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Processor applied to each frame
    #[arg(short, long, global = true, value_enum)]
    processor: Option<ProcessorArg>,

    /// Frames processed concurrently
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Show processing completions in arrival order, even if out of capture order
    #[arg(long, global = true)]
    unordered: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SourceArg {
    V4l2,
    Pipewire,
    TestPattern,
    Synthetic,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ProcessorArg {
    Edges,
    Color,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live pipeline (default)
    Run {
        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(short = 't', long)]
        duration: Option<u64>,
    },

    /// Save the first processed frame as PNG
    Snapshot {
        /// Output file path (default: ~/Pictures/edgeviewer/edges_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available V4L2 cameras
    List,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(source) = self.source {
            config.source = match source {
                SourceArg::V4l2 => SourceKind::V4l2,
                SourceArg::Pipewire => SourceKind::PipeWire,
                SourceArg::TestPattern => SourceKind::TestPattern,
                SourceArg::Synthetic => SourceKind::Synthetic,
            };
        }
        if let Some(device) = &self.device {
            config.device_path = Some(device.clone());
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(processor) = self.processor {
            config.processor = match processor {
                ProcessorArg::Edges => ProcessorKind::Edges,
                ProcessorArg::Color => ProcessorKind::Color,
            };
        }
        if let Some(workers) = self.workers {
            config.max_in_flight = workers;
        }
        if self.unordered {
            config.enforce_capture_order = false;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=edgeviewer=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::List) = cli.command {
        return cli::list_cameras();
    }

    let mut config = Config::load(cli.overrides.config.as_deref())?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command {
        Some(Commands::Snapshot { output }) => cli::snapshot(&config, output),
        Some(Commands::Run { duration }) => cli::run(&config, duration),
        Some(Commands::List) => cli::list_cameras(),
        None => cli::run(&config, None),
    }
}
