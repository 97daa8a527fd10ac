pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod library;
pub mod model;
pub mod tracker;
