pub mod configuration;
pub mod execution;
pub mod user;
