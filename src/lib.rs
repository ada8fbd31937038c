//! Resolve PMM-managed inventory into ssh and database client invocations.

pub mod blob_cache;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod logging;

pub use client::{HttpInventoryClient, InventoryClient};
pub use dispatch::{ConnectionKind, Dispatcher};
pub use domain::inventory::Inventory;
pub use error::{ConnectError, ConnectResult};
