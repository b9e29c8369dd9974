//! Persistent storage: directory layout, settings, application registry,
//! deployment records

pub mod apps;
pub mod layout;
pub mod records;
pub mod settings;
