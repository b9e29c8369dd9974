//! HTTP server

pub mod handlers;
pub mod serve;
