use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mirrorfs_core::{LogLevel, MirrorConfig};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mirrorfs")]
#[command(about = "Mirror a directory through a transform pipeline over FUSE")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a mirror of a directory
    Mount {
        #[command(flatten)]
        paths: PathArgs,

        /// Mount options, comma separated (may be repeated)
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Verbose logging, including the FUSE session
        #[arg(long)]
        debug: bool,

        /// Refuse every write through the mirror
        #[arg(long)]
        read_only: bool,

        /// Kernel attribute cache TTL in seconds
        #[arg(long)]
        attr_ttl: Option<u64>,
    },

    /// Validate a mirror configuration without mounting
    Check {
        #[command(flatten)]
        paths: PathArgs,
    },
}

#[derive(Args)]
struct PathArgs {
    /// Real directory to mirror
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Mount point for the mirror
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl PathArgs {
    fn load(&self) -> Result<MirrorConfig> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let source = self.source.clone().context("--source is required without --config")?;
                let target = self.target.clone().context("--target is required without --config")?;
                MirrorConfig::new(source, target)
            }
        };

        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(level) = self.log_level {
            config.log_level = Some(level);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Mount {
            paths,
            options,
            debug,
            read_only,
            attr_ttl,
        } => {
            let mut config = paths.load()?;
            config.options.extend(options);
            config.debug |= debug;
            config.read_only |= read_only;
            if let Some(secs) = attr_ttl {
                config.attr_ttl_secs = secs;
            }

            init_tracing(&config);
            mount_filesystem(config).await?;
        }
        Commands::Check { paths } => {
            let config = paths.load()?;
            init_tracing(&config);
            check_config(&config)?;
        }
    }

    Ok(())
}

fn init_tracing(config: &MirrorConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn check_config(config: &MirrorConfig) -> Result<()> {
    match config.validate() {
        Ok(()) => {
            println!(
                "{} -> {}: ok",
                config.source.display(),
                config.target.display()
            );
            Ok(())
        }
        Err(problems) => {
            for problem in &problems {
                println!("  - {}", problem);
            }
            anyhow::bail!("{} problem(s) found", problems.len());
        }
    }
}

fn create_dirs(config: &MirrorConfig) -> Result<()> {
    for dir in [&config.source, &config.target] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            info!("Created {}", dir.display());
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
async fn mount_filesystem(config: MirrorConfig) -> Result<()> {
    use mirrorfs_core::Pipeline;
    use mirrorfs_linux::{spawn_mount, MirrorFs};

    create_dirs(&config)?;
    let fs = MirrorFs::from_config(&config, Pipeline::clone_pipeline())?;

    info!("Mounting {} to {}", config.source.display(), config.target.display());
    let session = spawn_mount(fs, &config)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    info!("Unmounting {}", config.target.display());
    drop(session);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn mount_filesystem(config: MirrorConfig) -> Result<()> {
    create_dirs(&config)?;
    anyhow::bail!("Mounting is only supported on Linux");
}
