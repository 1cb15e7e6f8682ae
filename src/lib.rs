//! Routing layer in front of one or more OpenAI-compatible APIs.
//!
//! The [`gateway`] module keeps an ordered registry of upstream backends, merges
//! their model and assistant catalogs, routes each request to the backend that
//! owns the requested model, and caches synthesized speech on disk.

pub mod gateway;
pub mod utils;

pub use gateway::{
    Backend, BackendRegistry, Caller, Catalog, CatalogEntry, CatalogKind, Gateway, GatewayConfig,
    GatewayError, IdentityResolver, ModelFilterConfig, Role, SpeechCache, StaticIdentities,
};
