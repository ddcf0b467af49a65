// Library exports for Kawan
// The binary and integration tests both go through these modules

pub mod accounts;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod places;
pub mod seeds;
pub mod timeline;
pub mod validation;

pub use error::{ModelError, ModelResult};
