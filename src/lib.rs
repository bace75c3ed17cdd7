//! URL shortener backed by a key-value record store, with a JSON file
//! mirror kept convergent by a background synchronizer.

pub mod config;
pub mod database;
pub mod error;
pub mod generator;
pub mod handler;
pub mod mirror;
pub mod model;
pub mod redirect;
pub mod route;
pub mod service;
pub mod state;
pub mod store;
pub mod sync;
