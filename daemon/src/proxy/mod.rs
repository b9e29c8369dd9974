//! Reverse-proxy and process-supervisor lifecycle

pub mod nginx;
pub mod sudo;
pub mod supervisor;
