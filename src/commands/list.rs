//! `--list`: print every eligible connection for this tool.

use anyhow::Result;
use colored::Colorize;

use crate::client::InventoryClient;
use crate::dispatch::{CommandRunner, ConnectionKind, Dispatcher};

pub fn run<C, R>(dispatcher: &mut Dispatcher<C, R>, kind: ConnectionKind) -> Result<()>
where
    C: InventoryClient,
    R: CommandRunner,
{
    let connections = dispatcher.list(kind)?;

    println!("{}", "Available connections:".bold());
    for connection in &connections {
        println!("{connection}");
    }
    Ok(())
}
