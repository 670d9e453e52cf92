pub mod api;
pub mod bus;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod errors;
pub mod inventory;
pub mod orchestrator;
pub mod runner;
pub mod server;
pub mod state;
