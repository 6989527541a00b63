pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod session;
pub mod store;
pub mod viewer;
