#[macro_use]
extern crate tracing;

pub mod config;
pub mod controller;
pub mod error;
pub mod layouts;
pub mod listing;
pub mod models;
pub mod processor;
pub mod routes;
pub mod storage;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

pub use controller::ImageController;
pub use error::{ImageError, Result};
pub use storage::StorageBackend;
