pub mod adapter;
pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod signal;
pub mod table;
pub mod telemetry;
pub mod tls;

pub use error::{Result, SdError};
