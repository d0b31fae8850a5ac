pub mod buffer;
pub mod config;
pub mod context;
pub mod humanize;
pub mod model;
pub mod observability;
pub mod search;
pub mod store;

pub use context::{LogBox, LogBoxError, Logger};
