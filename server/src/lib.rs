// settlement/server/src/lib.rs

//! HTTP surface of the settlement core: checkout, the provider webhook and
//! operator order endpoints, wired over actix-web.

pub mod config;
pub mod db;
pub mod errors;
pub mod services;
pub mod state;
pub mod web;

pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use state::AppState;
