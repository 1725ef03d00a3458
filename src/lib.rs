pub mod agent;
pub mod autofix;
pub mod cli;
pub mod comment;
pub mod config;
pub mod error;
pub mod gitio;
pub mod markers;
pub mod report;
pub mod review;
pub mod severity;
