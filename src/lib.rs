//! Realtime Hub - Main Library
//!
//! Composition root for the realtime subscription stack.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners, logging)
//! - **livewire**: Connection manager, performance optimizer, transports and
//!   bindings (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use realtime_hub::bin_common::{load_config_from_env, ConfigType};
//! use realtime_hub::livewire::{ConnectionManager, PerformanceOptimizer};
//! ```

// Re-export workspace libraries for convenience
pub use livewire;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use logging::init_tracing;
    pub use runner::{BinaryRunner, RunConfig, ShutdownSignal};
}
