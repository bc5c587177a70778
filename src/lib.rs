pub mod config;
pub mod error;
pub mod git;
pub mod launcher;
pub mod models;
pub mod orchestrator;
pub mod plan;
pub mod store;
