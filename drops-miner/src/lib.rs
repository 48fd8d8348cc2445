//! drops-miner library crate.
//!
//! A campaign scheduler that keeps exactly one reward drop progressing on a
//! live stream at a time. The remote API client and the page driver are
//! supplied by the caller through the traits in [`adapter`].

pub mod adapter;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod utils;

pub use config::MinerConfig;
pub use error::{Error, Result};
pub use scheduler::{Scheduler, SchedulerEvent};
