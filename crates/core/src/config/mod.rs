//! Configuration.
//!
//! An explicit immutable configuration value threaded through each
//! component's constructor. Loaded from TOML with environment overrides,
//! validated at startup; validation failures are fatal.

mod loader;
mod types;
mod validate;

pub use loader::{load_config, load_config_from_str};
pub use types::*;
pub use validate::validate_config;
