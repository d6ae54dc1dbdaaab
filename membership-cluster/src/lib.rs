pub const CLUSTER_CONFIG: &'static str = include_str!("../cluster.toml");

pub mod auto_down;
pub mod cluster;
pub mod cluster_event;
pub mod cluster_heartbeat;
pub mod config;
pub mod downing_provider;
pub mod member;
pub mod membership;
