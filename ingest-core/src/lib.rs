#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod policy;
pub mod stats;

pub mod util {
    pub mod hash_forward;
    pub mod sanitize;
}

pub mod store;
pub mod tracking;

pub mod checksum;
pub mod classify;
pub mod inventory;
pub mod manifest;

pub mod orchestrator;
pub mod relocate;
pub mod trigger;

// Re-exports: stable API surface
pub use domain::{Package, PackageKey, Status};
pub use orchestrator::{Orchestrator, Validation, validate_package};
pub use trigger::{ASSET_VALIDATION_CHECK, handle_trigger};
