//! Connect mode: open an interactive session on one target.

use anyhow::Result;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::dispatch::{quote_args, CommandRunner, ConnectionKind, Dispatcher};
use crate::logging;

pub fn run<C, R>(
    dispatcher: &mut Dispatcher<C, R>,
    kind: ConnectionKind,
    target: Option<&str>,
    extra_args: &[String],
) -> Result<()>
where
    C: InventoryClient,
    R: CommandRunner,
{
    let extra_args = quote_args(extra_args)?;
    let user = logging::invoking_user();
    let host = logging::local_hostname();
    let name = target.unwrap_or_default();

    info!(target: logging::AUDIT_TARGET, %user, %host, connection = %name, %kind, "User {user} connecting to {name} ({kind})");
    let connection = dispatcher.connect(kind, target, &extra_args)?;
    info!(target: logging::AUDIT_TARGET, %user, %host, connection = %name, %kind, "User {user} disconnected from {name} ({kind})");

    debug!(exit_code = ?connection.exit_code, argv = ?connection.argv, "session finished");
    Ok(())
}
