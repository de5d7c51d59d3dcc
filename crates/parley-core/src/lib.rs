//! Parley core: shared types, configuration, cancellation and helpers used
//! by every other crate in the workspace.

pub mod cancel;
pub mod config;
pub mod types;
pub mod utils;

pub use cancel::CancellationToken;
pub use config::Config;
