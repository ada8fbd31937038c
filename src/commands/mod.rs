pub mod connect;
pub mod list;
