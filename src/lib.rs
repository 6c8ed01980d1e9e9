pub mod agents;
pub mod cli;
pub mod config;
pub mod doctor;
pub mod driver;
pub mod error;
pub mod message;
pub mod presets;
pub mod profiles;
pub mod relay;
pub mod server;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod tests;
