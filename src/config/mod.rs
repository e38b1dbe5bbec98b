//! Device configuration: settings structs, defaults and TOML persistence.
//!
//! Everything the control core consumes but does not produce — server URLs,
//! media paths, the SD mount point, upload PCM format, button bindings — is
//! injected from here. [`AppConfig::load`] returns defaults when no settings
//! file exists yet so first boot never needs special-casing.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, ButtonConfig, DetectConfig, MediaConfig, UploadConfig,
};
