//! Client-side workflows for the `tripwire` binary.

pub mod api_client;
pub mod workflow;

pub use api_client::ApiClient;
pub use workflow::{TagOutcome, TagRequest, Tagger, resolve_username};
