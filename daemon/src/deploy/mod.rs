//! Deployment engine

pub mod command;
pub mod context;
pub mod git;
pub mod log_file;
pub mod pipeline;
