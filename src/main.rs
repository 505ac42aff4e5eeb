//! tristripe - Three-member striping with rotating parity
//!
//! Usage:
//!   tristripe split <input>           - Split a file into a member set
//!   tristripe merge <base> <output>   - Reconstruct a file from its member set
//!   tristripe verify <base>           - Check members against their metadata
//!   tristripe inspect <base>          - Print the metadata record
//!   tristripe config-init <path>      - Write a default configuration

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tristripe::{
    config::Config,
    crypto::CipherKey,
    fs,
    raid::ArrayStatus,
    Error,
};
use zeroize::Zeroizing;

/// Exit status for failures that carry no library error code
const EXIT_FAILURE: u8 = 1;

#[derive(Parser)]
#[command(name = "tristripe")]
#[command(author = "tristripe Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Split files across three members with rotating parity")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/tristripe/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct KeyArgs {
    /// Encryption key
    #[arg(long, conflicts_with_all = ["key_file", "prompt_key"])]
    key: Option<String>,

    /// Read the encryption key from a file
    #[arg(long, conflicts_with = "prompt_key")]
    key_file: Option<PathBuf>,

    /// Prompt for the encryption key
    #[arg(long)]
    prompt_key: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into a new member set
    Split {
        /// File to split
        input: PathBuf,

        /// Logical name of the set (defaults to the input file name)
        #[arg(long)]
        name: Option<String>,

        /// Member directory (overrides the configuration)
        #[arg(long)]
        dir: Option<PathBuf>,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Reconstruct a file from its member set
    Merge {
        /// Base name printed by split
        base: String,

        /// Output file
        output: PathBuf,

        /// Member directory (overrides the configuration)
        #[arg(long)]
        dir: Option<PathBuf>,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Check members against their metadata record
    Verify {
        /// Base name printed by split
        base: String,

        /// Member directory (overrides the configuration)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the metadata record of a member set
    Inspect {
        /// Base name printed by split
        base: String,

        /// Member directory (overrides the configuration)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Write a default configuration file
    ConfigInit {
        /// Destination (.json, .yaml or .yml)
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);
    let config = Config::load_or_default(Some(&config_path));

    // Setup logging
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let result = config
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))
        .and_then(|config| run_command(cli.command, config));

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(exit_code(&e).into());
    }
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }
}

/// Status code of the underlying library error, if any
fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::code)
        .unwrap_or(EXIT_FAILURE)
}

fn run_command(command: Commands, mut config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Split {
            input,
            name,
            dir,
            key,
        } => {
            override_dir(&mut config, dir);
            cmd_split(&config, &input, name.as_deref(), &key)
        }

        Commands::Merge {
            base,
            output,
            dir,
            key,
        } => {
            override_dir(&mut config, dir);
            cmd_merge(&config, &base, &output, &key)
        }

        Commands::Verify { base, dir, json } => {
            override_dir(&mut config, dir);
            cmd_verify(&config, &base, json)
        }

        Commands::Inspect { base, dir } => {
            override_dir(&mut config, dir);
            cmd_inspect(&config, &base)
        }

        Commands::ConfigInit { path } => cmd_config_init(&path),
    }
}

fn override_dir(config: &mut Config, dir: Option<PathBuf>) {
    if let Some(dir) = dir {
        config.storage.member_dir = expand_tilde(&dir);
    }
}

/// Resolve the key options into a cipher key
fn read_key(args: &KeyArgs) -> anyhow::Result<Option<CipherKey>> {
    let secret: Zeroizing<Vec<u8>> = if let Some(key) = &args.key {
        Zeroizing::new(key.as_bytes().to_vec())
    } else if let Some(path) = &args.key_file {
        let content = Zeroizing::new(
            std::fs::read(path)
                .with_context(|| format!("Failed to read key file {}", path.display()))?,
        );
        let trimmed = content
            .strip_suffix(b"\n")
            .map(|c| c.strip_suffix(b"\r").unwrap_or(c))
            .unwrap_or(&content[..]);
        Zeroizing::new(trimmed.to_vec())
    } else if args.prompt_key {
        let entered = Zeroizing::new(
            rpassword::prompt_password("Enter encryption key: ")
                .context("Failed to read encryption key")?,
        );
        Zeroizing::new(entered.as_bytes().to_vec())
    } else {
        return Ok(None);
    };

    let key = CipherKey::from_passphrase(&secret);
    if key.is_none() {
        warn!("Empty key supplied, data will not be encrypted");
    }
    Ok(key)
}

fn cmd_split(
    config: &Config,
    input: &Path,
    name: Option<&str>,
    key_args: &KeyArgs,
) -> anyhow::Result<()> {
    let key = read_key(key_args)?;
    info!("Splitting {}...", input.display());

    let (set, record) = fs::split_file(config, input, name, key.as_ref())
        .with_context(|| format!("Failed to split {}", input.display()))?;

    info!(
        "Members written to {} (missing {})",
        set.dir().display(),
        record.missing
    );
    println!("{}", set.base());
    Ok(())
}

fn cmd_merge(config: &Config, base: &str, output: &Path, key_args: &KeyArgs) -> anyhow::Result<()> {
    let key = read_key(key_args)?;
    info!("Merging {} into {}...", base, output.display());

    let report = fs::merge_file(config, base, output, key.as_ref())
        .with_context(|| format!("Failed to merge {}", base))?;

    match report.failed_member {
        Some(member) => println!(
            "Reconstructed {} bytes without {} ({} rounds)",
            report.bytes_written, member, report.rounds
        ),
        None => println!(
            "Merged {} bytes ({} rounds)",
            report.bytes_written, report.rounds
        ),
    }
    Ok(())
}

fn cmd_verify(config: &Config, base: &str, json: bool) -> anyhow::Result<()> {
    let health = fs::verify(config, base).with_context(|| format!("Failed to verify {}", base))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!("Member Set Status");
    println!("=================");
    println!();
    println!("Base: {}", base);
    println!("Status: {:?}", health.status);
    match health.status {
        ArrayStatus::Healthy => println!("  All members intact, full redundancy."),
        ArrayStatus::Degraded => println!("  WARNING: One member lost, no redundancy left!"),
        ArrayStatus::Failed => println!("  CRITICAL: Data cannot be reconstructed!"),
    }
    if let Some(reason) = &health.reason {
        println!("  Reason: {}", reason);
    }

    println!();
    println!("Members:");
    for member in &health.members {
        match member.length {
            Some(length) => println!("  [{}] {:?} - {} bytes", member.member, member.status, length),
            None => println!("  [{}] {:?}", member.member, member.status),
        }
    }
    Ok(())
}

fn cmd_inspect(config: &Config, base: &str) -> anyhow::Result<()> {
    let record = fs::inspect(config, base).with_context(|| format!("Failed to inspect {}", base))?;
    println!("{}", record);
    Ok(())
}

fn cmd_config_init(path: &Path) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    Config::default().save(&path)?;
    println!("Configuration written to {}", path.display());
    Ok(())
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
