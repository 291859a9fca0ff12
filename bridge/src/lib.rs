#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod storage;

pub use controller::{Controller, ControllerConfig, Drift};
pub use error::{ApplyPhase, BridgeError, Result};
