//! Chat persistence for Parley.
//!
//! - [`backend::ChatBackend`]: row-level storage seam
//! - [`rest::RestBackend`]: hosted backend (PostgREST + password auth)
//! - [`memory::MemoryBackend`]: in-process mirror
//! - [`store::ChatStore`]: quota, titles, validation and fallback on top

pub mod backend;
pub mod error;
pub mod memory;
pub mod rest;
pub mod store;

pub use backend::ChatBackend;
pub use error::StoreError;
pub use memory::MemoryBackend;
pub use rest::{AuthSession, RestBackend};
pub use store::{ChatStore, StoreOptions};
