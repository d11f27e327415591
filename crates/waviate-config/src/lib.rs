//! Engine settings and patch files for waviate.
//!
//! - **Engine settings**: sample rate, block size, log filter, and noise seed
//!   from a TOML file, with defaults for anything missing
//! - **Patches**: a persisted graph plus its output node and graph-input
//!   values, stored as TOML
//! - **Validation**: record-level checks against an operator catalog, all
//!   problems reported together
//! - **Paths**: platform-specific config and patch directories
//!
//! # Example
//!
//! ```rust,no_run
//! use waviate_config::{EngineConfig, Patch, engine_config_path};
//!
//! let engine = EngineConfig::load_or_default(engine_config_path()).unwrap();
//! let patch = Patch::load("tone.toml").unwrap();
//! let (graph, output) = patch.build(&waviate_ops::builtin_catalog()).unwrap();
//! # let _ = (engine, graph, output);
//! ```

mod engine;
mod error;
mod patch;

/// Platform-specific paths for patches and settings.
pub mod paths;

/// Patch validation.
pub mod validation;

pub use engine::EngineConfig;
pub use error::ConfigError;
pub use patch::Patch;
pub use paths::{
    engine_config_path, ensure_user_patches_dir, find_patch, list_patches_in,
    patch_name_from_path, user_config_dir, user_patches_dir,
};
pub use validation::{
    ValidationError, ValidationResult, document_errors, validate_document, validate_patch,
};
