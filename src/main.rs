use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use resize_cache::config::ResizeConfig;
use resize_cache::params::{Color, Dimensions};
use resize_cache::{Resizer, TransformOptions, config, tools};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resize-cache")]
#[command(about = "Content-addressed cache of resized image derivatives")]
#[command(long_about = "\
Content-addressed cache of resized image derivatives

Every (source image, transform options) pair maps to one deterministic key
under the target directory. Generating the same derivative twice is a cache
or storage hit; concurrent generators of the same key are serialized by a
lock in the configured cache backend.

Layout under the storage root:

  photos/cat.png                     # source images (never modified)
  resized-images/<digest>.jpg        # generated derivatives

Run 'resize-cache gen-config' to generate a documented resize.toml.")]
#[command(version)]
struct Cli {
    /// Config file. Missing means all defaults.
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve (generating if needed) a derivative for each file, printing its URL
    Generate(GenerateArgs),
    /// List generated images or cached keys
    List {
        #[command(subcommand)]
        what: ListTarget,
    },
    /// Reconcile the cache with storage
    Sync {
        #[command(subcommand)]
        what: SyncTarget,
    },
    /// Delete generated images, cached keys, or both
    Clear {
        #[command(subcommand)]
        what: ClearTarget,
    },
    /// Print a stock resize.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum ListTarget {
    Images,
    Cache,
}

#[derive(Subcommand)]
enum SyncTarget {
    Cache,
}

#[derive(Subcommand)]
enum ClearTarget {
    Images,
    Cache,
    All,
}

#[derive(Args)]
struct GenerateArgs {
    /// Source image paths or URLs. Read from stdin, one per line, when empty.
    files: Vec<String>,

    /// Target size: `WxH`, `Wx`, `xH` or `W`
    #[arg(long)]
    dimensions: Option<Dimensions>,

    /// Output format: jpeg or png (defaults to the source format)
    #[arg(long)]
    format: Option<String>,

    /// JPEG quality, 1-100
    #[arg(long, default_value_t = 80)]
    quality: u32,

    /// Fill the exact box, padding with the background color
    #[arg(long)]
    fill: bool,

    /// Background color, e.g. `#ffffff`
    #[arg(long)]
    bgcolor: Option<Color>,

    /// Never produce output larger than the source
    #[arg(long)]
    no_upscale: bool,

    /// Baseline instead of progressive JPEG
    #[arg(long)]
    no_progressive: bool,

    /// Render a placeholder when a source is missing
    #[arg(long)]
    placeholder: bool,
}

impl GenerateArgs {
    fn options(&self) -> TransformOptions {
        TransformOptions {
            dimensions: self.dimensions,
            format: self.format.clone(),
            quality: self.quality,
            fill: self.fill,
            bgcolor: self.bgcolor,
            upscale: !self.no_upscale,
            progressive: !self.no_progressive,
            placeholder: self.placeholder,
        }
    }

    fn inputs(&self) -> Result<Vec<String>, std::io::Error> {
        if !self.files.is_empty() {
            return Ok(self.files.clone());
        }
        let mut inputs = Vec::new();
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                inputs.push(line.to_string());
            }
        }
        Ok(inputs)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => {
            let (config, resizer) = open(&cli.config)?;
            init_thread_pool(&config.processing);
            let options = args.options();
            let inputs = args.inputs()?;
            let results: Vec<_> = inputs
                .par_iter()
                .map(|input| (input, resizer.resolve(input, &options)))
                .collect();

            let mut failed = 0;
            for (input, result) in results {
                match result {
                    Ok(url) => println!("{url}"),
                    Err(err) => {
                        failed += 1;
                        eprintln!("{input}: {err}");
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} of {} images failed", inputs.len()).into());
            }
        }
        Command::List { what } => {
            let (_, resizer) = open(&cli.config)?;
            let keys = match what {
                ListTarget::Images => tools::list_images(&resizer)?,
                ListTarget::Cache => tools::list_cache(&resizer)?,
            };
            for key in keys {
                println!("{key}");
            }
        }
        Command::Sync {
            what: SyncTarget::Cache,
        } => {
            let (_, resizer) = open(&cli.config)?;
            print!("{}", tools::sync_cache(&resizer)?);
        }
        Command::Clear { what } => {
            let (_, resizer) = open(&cli.config)?;
            match what {
                ClearTarget::Images => print_deleted(tools::clear_images(&resizer)?),
                ClearTarget::Cache => {
                    tools::clear_cache(&resizer)?;
                }
                ClearTarget::All => print_deleted(tools::clear_all(&resizer)?),
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn open(path: &Path) -> Result<(ResizeConfig, Resizer), Box<dyn std::error::Error>> {
    let config = config::load_config(path)?;
    let resizer = config::make_resizer(&config)?;
    Ok((config, resizer))
}

fn print_deleted(keys: Vec<String>) {
    for key in keys {
        println!("Deleted {key}");
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
