// Adapters layer: concrete implementations of the domain ports over HTTP and the local disk.

pub mod airtable;
pub mod assistant;
pub mod posthog;
pub mod storage;

pub use airtable::AirtableClient;
pub use assistant::{OllamaClient, OpenClawRelay};
pub use posthog::PosthogClient;
pub use storage::LocalStorage;
