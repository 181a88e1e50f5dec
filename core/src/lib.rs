//! arrwatch core: Sonarr/Radarr queue polling, snapshot aggregation, rendering and Discord
//! channel reconciliation. No process bootstrap; the bot crate wires it up.

pub mod backends;
pub mod chat;
pub mod config;
pub mod instance;
pub mod monitor;
pub mod poller;
pub mod queue;
pub mod reconcile;
pub mod render;
pub mod snapshot;
