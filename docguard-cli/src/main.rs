use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use docguard_core::config::Config;
use docguard_core::logging::{init_logging_with_config, LogConfig};
use docguard_core::metrics::init_metrics;
use docguard_core::{DatabaseOptions, PermissionPolicy, Provisioner};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "docguard")]
#[command(author, version, about = "Provision per-database permissions in CouchDB", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML configuration file; DOCGUARD_* environment variables are used otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct Target {
    /// Store username of the database owner
    owner: String,

    /// Database to provision
    database: String,

    /// Application namespace DIDs are scoped to
    app: String,

    /// Permission policy as JSON, or @path to a JSON file
    #[arg(long)]
    policy: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a database and install its permissions
    Provision(Target),

    /// Reinstall the permissions of an existing database
    Update(Target),

    /// Destroy a database
    Deprovision { database: String },

    /// Print the permission documents a policy compiles to
    Compile {
        owner: String,

        app: String,

        /// Permission policy as JSON, or @path to a JSON file
        #[arg(long)]
        policy: Option<String>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.normalize();
    config.validate()?;

    Ok(config)
}

fn parse_options(policy: Option<&str>) -> Result<DatabaseOptions> {
    let Some(raw) = policy else {
        return Ok(DatabaseOptions::default());
    };

    let json = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path))?,
        None => raw.to_string(),
    };
    let policy: PermissionPolicy =
        serde_json::from_str(&json).context("Policy is not a valid permission policy")?;

    Ok(DatabaseOptions::with_permissions(policy))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    init_metrics();
    debug!(?config, "Loaded configuration");

    let provisioner = Provisioner::from_config(&config)?;

    match args.command {
        Command::Provision(target) => {
            let options = parse_options(target.policy.as_deref())?;
            let report = provisioner
                .provision(&target.owner, &target.database, &target.app, &options)
                .await?;
            info!("Provisioned {}", target.database);
            print_json(&report)?;
        }
        Command::Update(target) => {
            let options = parse_options(target.policy.as_deref())?;
            let report = provisioner
                .update(&target.owner, &target.database, &target.app, &options)
                .await?;
            print_json(&report)?;
        }
        Command::Deprovision { database } => {
            let outcome = provisioner.deprovision(&database).await?;
            print_json(&outcome)?;
        }
        Command::Compile { owner, app, policy } => {
            let options = parse_options(policy.as_deref())?;
            let artifacts = provisioner.compile(&owner, &app, &options)?;
            let documents: Map<String, Value> = artifacts
                .documents()
                .into_iter()
                .map(|(id, body)| (id.to_string(), body))
                .collect();
            print_json(&documents)?;
        }
    }

    Ok(())
}
