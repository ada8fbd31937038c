//! Shared command line for `db_connect` and `ssh_connect`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::{debug, warn};

use crate::client::HttpInventoryClient;
use crate::commands;
use crate::config::{self, FlagOverrides, LogLevel};
use crate::credentials;
use crate::dispatch::{ConnectionKind, Dispatcher, SystemRunner};
use crate::domain::inventory::Inventory;
use crate::error::ConnectError;
use crate::logging;

#[derive(Parser, Debug)]
#[command(version, about = "Connect to PMM-managed nodes and databases")]
pub struct Cli {
    /// The address for PMM Server
    #[arg(long)]
    pub server_address: Option<String>,

    /// Disable TLS security checks
    #[arg(long)]
    pub tls_insecure: bool,

    /// Force requests to PMM
    #[arg(long)]
    pub force: bool,

    /// Timeout seconds for a connection
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// List all connections
    #[arg(long)]
    pub list: bool,

    /// Standardise naming of connections to use the node name
    #[arg(long)]
    pub standardise: bool,

    /// Logging verbosity
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Use an alternative netrc file
    #[arg(long)]
    pub netrc_file: Option<PathBuf>,

    /// Load overrides from a config file
    #[arg(long, default_value_os_t = config::default_config_path())]
    pub config: PathBuf,

    /// Generate a sample config
    #[arg(long)]
    pub sample_config: bool,

    /// Target name followed by extra arguments for the client
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub connection_options: Vec<String>,
}

impl Cli {
    /// Flags present on the command line; everything else defers to the
    /// config file.
    pub fn flag_overrides(&self) -> FlagOverrides {
        FlagOverrides {
            server_address: self.server_address.clone(),
            tls_insecure: self.tls_insecure.then_some(true),
            connect_timeout: self.connect_timeout,
            log_level: self.log_level,
            netrc_file: self.netrc_file.clone(),
            standardise: self.standardise.then_some(true),
        }
    }
}

/// Entry point for the connection binaries.
pub fn main(kind: ConnectionKind) -> ExitCode {
    let cli = Cli::parse();
    match run(kind, &cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "reason");
            eprintln!("{} {:#}", "!!".red().bold(), err);
            let code = err
                .downcast_ref::<ConnectError>()
                .map_or(1, ConnectError::exit_code);
            ExitCode::from(code)
        }
    }
}

pub fn run(kind: ConnectionKind, cli: &Cli) -> Result<()> {
    if cli.sample_config {
        println!("{}", serde_json::to_string_pretty(&config::sample_config())?);
        return Ok(());
    }

    let (settings, ignored) = config::load(&cli.config, &cli.flag_overrides())?;
    logging::init(settings.log_level, settings.log_format);
    if let Some(e) = ignored {
        warn!(path = %cli.config.display(), error = %e, "ignoring unreadable config file");
    }

    let (target, extra_args) = match cli.connection_options.split_first() {
        Some((target, rest)) => (Some(target.as_str()), rest),
        None => (None, &[][..]),
    };

    if !cli.list && target.is_none() {
        debug!("no target and no --list, nothing to do");
        return Ok(());
    }
    if !cli.list && target.is_some_and(str::is_empty) {
        return Err(ConnectError::fatal(format!("Unable to use an empty target for {kind} connections")).into());
    }

    let creds = credentials::for_server(&settings.netrc_file, &settings.server_address)?;
    let client = HttpInventoryClient::new(
        &settings.server_address,
        &creds.token,
        !settings.tls_insecure,
        Duration::from_secs(settings.connect_timeout),
    )?;
    let inventory = Inventory::new(client, &settings.inventory).with_force_requests(cli.force);
    let mut dispatcher = Dispatcher::new(inventory, SystemRunner, &settings.server_node_name)
        .with_standardised_naming(settings.standardise);

    if cli.list {
        commands::list::run(&mut dispatcher, kind)
    } else {
        commands::connect::run(&mut dispatcher, kind, target, extra_args)
    }
}
