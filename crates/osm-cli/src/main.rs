mod config;
mod error;
mod store;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use osm_driver::{DriverConfig, DriverOptions, MachineDriver, OpenStackDriver};
use tracing_subscriber::EnvFilter;

use crate::config::DriverFlags;
use crate::error::{CliError, Result};
use crate::store::{MachineRecord, Store};

#[derive(Parser)]
#[command(name = "openstack-machine")]
#[command(about = "Provision and manage machines on OpenStack")]
#[command(version)]
struct Cli {
    /// Where machine records and keys are kept (default: ~/.openstack-machine)
    #[arg(long, global = true, env = "OSM_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a machine
    Create {
        name: String,

        #[command(flatten)]
        flags: Box<DriverFlags>,
    },
    /// Start a stopped machine
    Start { name: String },
    /// Stop a machine
    Stop { name: String },
    /// Soft-reboot a machine
    Restart { name: String },
    /// Stop a machine (no forced power-off)
    Kill { name: String },
    /// Delete the instance, its key pair and the local record
    Rm { name: String },
    /// Print the machine state
    Status { name: String },
    /// Print the machine IP address
    Ip { name: String },
    /// Print the engine URL
    Url { name: String },
    /// Print the stored machine record
    Inspect { name: String },
}

fn default_storage_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".openstack-machine"),
        None => PathBuf::from(".openstack-machine"),
    }
}

fn record_of(name: &str, driver: &OpenStackDriver) -> MachineRecord {
    MachineRecord {
        name: name.to_string(),
        driver: driver.driver_name().to_string(),
        config: driver.config().clone(),
        state: driver.driver_state().clone(),
    }
}

async fn create(store: &Store, name: &str, flags: DriverFlags) -> Result<()> {
    if store.exists(name).await {
        return Err(CliError::AlreadyExists(name.to_string()));
    }

    let opts = DriverOptions::from(flags);
    let config = DriverConfig::from_options(name, store.key_path(name), &opts)?;
    store.prepare(name).await?;

    let mut driver = OpenStackDriver::new(config);
    let created = driver.create().await;
    let saved = store.save(&record_of(name, &driver)).await;
    created?;
    saved?;

    let ip = driver.ip().await?;
    tracing::info!(name, ip = %ip, "machine is ready");
    Ok(())
}

async fn load(store: &Store, name: &str) -> Result<OpenStackDriver> {
    let record = store.load(name).await?;
    Ok(OpenStackDriver::new(record.config).with_state(record.state))
}

async fn remove(store: &Store, name: &str) -> Result<()> {
    let mut driver = load(store, name).await?;
    if let Err(e) = driver.remove().await {
        store.save(&record_of(name, &driver)).await?;
        return Err(e.into());
    }
    store.delete(name).await?;
    tracing::info!(name, "machine removed");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let store = Store::new(cli.storage_path.unwrap_or_else(default_storage_path));

    match cli.command {
        Commands::Create { name, flags } => create(&store, &name, *flags).await,
        Commands::Start { name } => load(&store, &name).await?.start().await.map_err(Into::into),
        Commands::Stop { name } => load(&store, &name).await?.stop().await.map_err(Into::into),
        Commands::Restart { name } => load(&store, &name).await?.restart().await.map_err(Into::into),
        Commands::Kill { name } => load(&store, &name).await?.kill().await.map_err(Into::into),
        Commands::Rm { name } => remove(&store, &name).await,
        Commands::Status { name } => {
            let state = load(&store, &name).await?.state().await?;
            println!("{state:?}");
            Ok(())
        }
        Commands::Ip { name } => {
            println!("{}", load(&store, &name).await?.ip().await?);
            Ok(())
        }
        Commands::Url { name } => {
            println!("{}", load(&store, &name).await?.url().await?);
            Ok(())
        }
        Commands::Inspect { name } => {
            let record = store.load(&name).await?;
            let raw = serde_json::to_string_pretty(&record).map_err(|source| CliError::Record {
                path: store.machine_dir(&name),
                source,
            })?;
            println!("{raw}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so ip/url/status output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
