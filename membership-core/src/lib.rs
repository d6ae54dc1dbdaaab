pub const CORE_CONFIG: &'static str = include_str!("../core.toml");

pub mod address;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod ext;
pub mod scheduler;

pub use error::{Error, Result};
