//! Fleet monitor for AxeOS miners (Bitaxe and NerdAxe).
//!
//! Polls every configured device, folds its status into one canonical
//! shape, and keeps the fleet's all-time best difficulty on disk.

pub mod alert;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod monitor;
pub mod normalize;
pub mod record;
pub mod tracing;
pub mod types;
