pub mod api;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod server;

#[cfg(test)]
mod relay_props;

pub use server::GatewayServer;
