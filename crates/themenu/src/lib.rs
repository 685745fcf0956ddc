pub mod condition;
pub mod config;
pub mod duration;
pub mod entity;
pub mod error;
pub mod poller;
pub mod runner;
pub mod sanitize;
pub mod tree;
pub mod ui;

pub use error::{Error, Result};
