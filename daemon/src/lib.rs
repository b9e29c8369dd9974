//! Quayd Library
//!
//! Core modules for the quayd continuous-deployment daemon.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod proxy;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod utils;
pub mod webhook;
pub mod workers;
