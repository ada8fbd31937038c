//! Connection dispatch: list eligible targets or launch a client for one.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::process::Command;

use tracing::{debug, error, info};

use crate::client::InventoryClient;
use crate::domain::builder::DefaultTables;
use crate::domain::inventory::Inventory;
use crate::domain::types::{Node, Service, ServiceType};
use crate::error::{ConnectError, ConnectResult};

/// Which kind of target a tool connects to. Chosen once, by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Database,
    Ssh,
}

impl ConnectionKind {
    /// Map an executable name (`db_connect`, `ssh_connect`, with or without
    /// a directory or a `.py`/`.exe` suffix) to its kind.
    pub fn from_program_name(program: &str) -> ConnectResult<Self> {
        let stem = Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let stem = stem
            .strip_suffix(".py")
            .or_else(|| stem.strip_suffix(".exe"))
            .unwrap_or(stem);

        match stem {
            "db_connect" => Ok(ConnectionKind::Database),
            "ssh_connect" => Ok(ConnectionKind::Ssh),
            _ => Err(ConnectError::fatal("unknown connection type")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Database => "dbc",
            ConnectionKind::Ssh => "ssh",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Connect,
}

/// One listed connection, rendered as `name key=value ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub fields: Vec<(&'static str, String)>,
}

impl Descriptor {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    fn field(mut self, key: &'static str, value: impl ToString) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    fn optional(self, key: &'static str, value: Option<&str>) -> Self {
        self.field(key, value.unwrap_or("-"))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.fields {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

/// A finished client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub target: String,
    pub argv: Vec<String>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Listed(Vec<Descriptor>),
    Connected(Connection),
}

/// Runs the external client and waits for it.
pub trait CommandRunner {
    fn run(&self, argv: &[String]) -> ConnectResult<Option<i32>>;
}

/// Inherits the terminal; the exit status is returned, not interpreted.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> ConnectResult<Option<i32>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ConnectError::Command("empty command".into()))?;

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| ConnectError::Spawn {
                program: program.clone(),
                source,
            })?;
        Ok(status.code())
    }
}

pub struct Dispatcher<C, R> {
    inventory: Inventory<C>,
    runner: R,
    standardise: bool,
    server_node_name: String,
}

impl<C: InventoryClient, R: CommandRunner> Dispatcher<C, R> {
    pub fn new(inventory: Inventory<C>, runner: R, server_node_name: &str) -> Self {
        Self {
            inventory,
            runner,
            standardise: false,
            server_node_name: server_node_name.to_string(),
        }
    }

    /// List services under their owning node's name.
    pub fn with_standardised_naming(mut self, standardise: bool) -> Self {
        self.standardise = standardise;
        self
    }

    pub fn inventory(&self) -> &Inventory<C> {
        &self.inventory
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// List every eligible target, or connect to the first one named
    /// `target`.
    ///
    /// `extra_args` are appended to the command line as-is; each token must
    /// already be shell-quoted (see [`quote_args`]).
    pub fn resolve(
        &mut self,
        kind: ConnectionKind,
        target: Option<&str>,
        action: Action,
        extra_args: &[String],
    ) -> ConnectResult<Resolution> {
        match action {
            Action::List => self.list(kind).map(Resolution::Listed),
            Action::Connect => self
                .connect(kind, target, extra_args)
                .map(Resolution::Connected),
        }
    }

    pub fn list(&mut self, kind: ConnectionKind) -> ConnectResult<Vec<Descriptor>> {
        match kind {
            ConnectionKind::Ssh => self.list_nodes(),
            ConnectionKind::Database => self.list_services(),
        }
    }

    /// Launch a client for the first entity named `target` and wait for it.
    /// An empty target fails before the inventory is touched.
    pub fn connect(
        &mut self,
        kind: ConnectionKind,
        target: Option<&str>,
        extra_args: &[String],
    ) -> ConnectResult<Connection> {
        let Some(target) = target.filter(|t| !t.is_empty()) else {
            return Err(ConnectError::fatal(format!(
                "Unable to use an empty target for {kind} connections"
            )));
        };
        let command = match kind {
            ConnectionKind::Ssh => self.node_command(target)?,
            ConnectionKind::Database => self.service_command(target)?,
        };
        self.launch(target, command, extra_args)
    }

    fn is_excluded_node(&self, node: &Node) -> bool {
        !node.node_type.is_ssh_addressable() || node.name == self.server_node_name
    }

    fn is_excluded_service(&self, service: &Service) -> bool {
        service.name.starts_with(&self.server_node_name)
    }

    fn list_nodes(&mut self) -> ConnectResult<Vec<Descriptor>> {
        let nodes = self.inventory.nodes()?;
        let mut listed = Vec::new();
        for node in nodes.values() {
            debug!(node = %node.name, id = %node.id, "processing node");
            if self.is_excluded_node(node) {
                info!(node = %node.name, node_type = %node.node_type, "ignoring node");
                continue;
            }
            listed.push(
                Descriptor::new(&node.name)
                    .field("address", &node.address)
                    .field("port", node.port)
                    .optional("distro", node.distro.as_deref())
                    .optional("environment", node.environment.as_deref()),
            );
        }
        Ok(listed)
    }

    fn list_services(&mut self) -> ConnectResult<Vec<Descriptor>> {
        let services = self.inventory.services()?;
        let mut listed = Vec::new();
        for service in services.values() {
            debug!(service = %service.name, id = %service.id, "processing service");
            if self.is_excluded_service(service) {
                info!(service = %service.name, service_type = %service.service_type, "ignoring service");
                continue;
            }
            match self.service_descriptor(service) {
                Ok(descriptor) => listed.push(descriptor),
                Err(e) => error!(service = %service.name, error = %e, "unexpected data for service"),
            }
        }
        Ok(listed)
    }

    fn service_descriptor(&self, service: &Service) -> ConnectResult<Descriptor> {
        let node = service.node()?;
        let name = if self.standardise { &node.name } else { &service.name };
        Ok(Descriptor::new(name)
            .field("address", service.address()?)
            .field("port", service.port)
            .optional("distro", node.distro.as_deref())
            .optional("environment", node.environment.as_deref())
            .field("service", &service.service_type)
            .optional("cluster", service.cluster.as_deref()))
    }

    fn node_command(&mut self, target: &str) -> ConnectResult<String> {
        let nodes = self.inventory.nodes()?;
        let node = nodes
            .values()
            .filter(|node| !self.is_excluded_node(node))
            .find(|node| node.name == target)
            .ok_or_else(|| ConnectError::TargetNotFound(target.to_string()))?;
        ssh_command(node)
    }

    fn service_command(&mut self, target: &str) -> ConnectResult<String> {
        let services = self.inventory.services()?;
        let service = services
            .values()
            .filter(|service| !self.is_excluded_service(service))
            .find(|service| {
                service.name == target || service.host_name().is_ok_and(|host| host == target)
            })
            .ok_or_else(|| ConnectError::TargetNotFound(target.to_string()))?;
        database_command(service, self.inventory.defaults())
    }

    fn launch(
        &self,
        target: &str,
        mut command: String,
        extra_args: &[String],
    ) -> ConnectResult<Connection> {
        if !extra_args.is_empty() {
            command.push(' ');
            command.push_str(&extra_args.join(" "));
        }
        debug!(command = %command, "connecting");

        let argv = shlex::split(&command)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| ConnectError::Command(command.clone()))?;
        let exit_code = self.runner.run(&argv)?;
        debug!(?exit_code, "client exited");

        Ok(Connection {
            target: target.to_string(),
            argv,
            exit_code,
        })
    }
}

fn quote(value: &str) -> ConnectResult<Cow<'_, str>> {
    shlex::try_quote(value).map_err(|e| ConnectError::Command(format!("{value:?}: {e}")))
}

/// Shell-quote each user-supplied token so it survives as exactly one
/// argument when appended to a command line.
pub fn quote_args(args: &[String]) -> ConnectResult<Vec<String>> {
    args.iter()
        .map(|arg| -> ConnectResult<String> {
            let quoted = quote(arg)?.into_owned();
            debug!(input = %arg, sanitised = %quoted, "sanitised argument");
            Ok(quoted)
        })
        .collect()
}

pub fn ssh_command(node: &Node) -> ConnectResult<String> {
    Ok(format!("ssh {} -p {}", quote(&node.address)?, node.port))
}

/// The command line for a joined Service: `connect_cmd` when set (with
/// `{address}`, `{port}` and `{name}` filled in), otherwise the type's
/// default client with its connection flags.
pub fn database_command(service: &Service, defaults: &DefaultTables) -> ConnectResult<String> {
    let address = quote(service.address()?)?;
    let name = service.host_name()?;
    let port = service.port;

    if let Some(template) = &service.connect_cmd {
        return Ok(template
            .replace("{address}", &address)
            .replace("{port}", &port.to_string())
            .replace("{name}", &quote(name)?));
    }

    let program = defaults
        .command(service.service_type.as_str())
        .ok_or_else(|| ConnectError::UnsupportedService(service.service_type.to_string()))?;
    let program = quote(program)?;

    match service.service_type {
        ServiceType::Mysql => Ok(format!(
            "{program} --host={address} --port={port} --skip-auto-rehash --comments \
             --safe-updates --connect-timeout=10 --prompt={}",
            quote(&format!("{name} \\d> "))?
        )),
        ServiceType::Postgresql => Ok(format!(
            "{program} --host={address} --port={port} --set=PROMPT1={}",
            quote(&format!("{name} %/%R%# "))?
        )),
        ServiceType::Mongodb => Ok(format!("{program} --host {address} --port {port}")),
        ServiceType::Ssh => Ok(format!("{program} {address} -p {port}")),
        ServiceType::Other(ref other) => Err(ConnectError::UnsupportedService(other.clone())),
    }
}
