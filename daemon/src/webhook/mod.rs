//! Webhook ingestion: verification, payload resolution, branch filtering

pub mod payload;
pub mod verify;
