//! LLM provider layer for Parley.
//!
//! # Architecture
//!
//! - [`traits::ChatProvider`]: trait that all providers implement
//! - [`registry`]: static specs and model catalogs for Azure OpenAI, OpenAI and Gemini
//! - [`resolver`]: turns the loaded config into connection settings (or "use the mock")
//! - [`azure`], [`openai`], [`gemini`]: HTTP adapters
//! - [`stream`]: incremental SSE/NDJSON decoding into [`DeltaStream`]s
//! - [`mock::MockProvider`]: canned answers when nothing is configured
//! - [`factory::create_provider`]: picks the right one

pub mod azure;
pub mod error;
pub mod factory;
pub mod gemini;
mod http;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod resolver;
pub mod stream;
pub mod traits;

pub use error::ProviderError;
pub use factory::{create_provider, create_provider_for};
pub use mock::MockProvider;
pub use registry::{find_provider_for_model, ProviderSpec, PROVIDERS};
pub use resolver::{resolve, resolve_for, ProviderSettings, ResolvedProvider};
pub use stream::DeltaStream;
pub use traits::ChatProvider;
