//! Configuration for the hdlrun toolchain runner.
//!
//! [`ConfigSnapshot`] is the immutable bag of options a compile or run reads.
//! [`ConfigLoader`] finds `hdlrun.toml` next to the sources (or above them) and
//! falls back to defaults when there is none.

pub mod loader;
pub mod snapshot;

pub use loader::{
    CONFIG_FILE_NAME, CONFIG_PATH_ENV, ConfigLoader, find_config_file, parse_config,
    render_config,
};
pub use snapshot::{AltPathScope, ConfigSnapshot};
