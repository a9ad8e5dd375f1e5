use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use flowsift::chunk_dispatch::types::ChunkDescriptor;
use flowsift::chunk_dispatch::worker::{serve_chunk, ChunkWorker, InProcessWorker, SubprocessWorker};
use flowsift::configuration::config::ConfigOverrides;
use flowsift::flow_analysis::dissector::TsharkDissector;
use flowsift::housekeeping::clean_directory;
use flowsift::pipeline::run_analysis;
use log::{debug, error, info};

#[derive(Parser)]
#[command(name = "flowsift")]
#[command(version)]
#[command(about = "Sensitive data extraction from HTTP flows in capture files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a capture file and write the CSV report
    Analyze {
        /// Capture file (pcap or pcapng)
        input: PathBuf,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Run chunks on threads of this process instead of child processes
        #[arg(long)]
        in_process: bool,
    },

    /// Delete everything inside a directory, keeping the directory
    Clean {
        dir: PathBuf,
    },

    /// Analyze one chunk and print its results as JSON lines
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args)]
struct WorkerArgs {
    #[arg(long)]
    run_id: String,

    #[arg(long)]
    chunk: PathBuf,

    #[arg(long)]
    index: usize,

    #[arg(long)]
    transient: bool,

    #[arg(long)]
    tshark: PathBuf,

    #[arg(long)]
    image_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    // logs go to stderr, stdout belongs to the worker protocol
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            input,
            overrides,
            in_process,
        } => analyze(input, overrides, in_process).await,
        Command::Clean { dir } => {
            if let Err(e) = clean_directory(&dir) {
                error!("Unable to clean {}: {}", dir.display(), e);
                std::process::exit(1);
            }
        }
        Command::Worker(args) => worker(args),
    }
}

async fn analyze(input: PathBuf, overrides: ConfigOverrides, in_process: bool) {
    info!(
        "flowsift v{} starting on {}",
        env!("CARGO_PKG_VERSION"),
        input.display()
    );

    let config = match overrides.load() {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    debug!("Effective configuration: {:?}", config);

    let worker: Arc<dyn ChunkWorker> = if in_process {
        let dissector = Arc::new(TsharkDissector::new(&config.tshark_path));
        Arc::new(InProcessWorker::new(dissector, config.image_dir.clone()))
    } else {
        match SubprocessWorker::current(config.tshark_path.clone(), config.image_dir.clone()) {
            Ok(worker) => Arc::new(worker),
            Err(e) => {
                error!("Unable to locate the worker executable: {}", e);
                std::process::exit(1);
            }
        }
    };

    match run_analysis(&config, &input, worker).await {
        Ok(summary) => info!("Finished: {}", summary),
        Err(e) => {
            error!("Analysis failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn worker(args: WorkerArgs) {
    let chunk = ChunkDescriptor {
        index: args.index,
        path: args.chunk,
        transient: args.transient,
    };
    let stdout = std::io::stdout();
    match serve_chunk(&args.run_id, &chunk, &args.tshark, &args.image_dir, stdout.lock()) {
        Ok(count) => debug!("[{}] chunk {} emitted {} result(s)", args.run_id, chunk.index, count),
        Err(e) => {
            error!("[{}] chunk {} output failed: {}", args.run_id, chunk.index, e);
            std::process::exit(1);
        }
    }
}
