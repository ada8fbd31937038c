pub mod builder;
pub mod inventory;
pub mod overrides;
pub mod relation;
pub mod types;
