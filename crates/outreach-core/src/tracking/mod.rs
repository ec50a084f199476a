//! Open, click, unsubscribe, bounce and reply ingestion

mod ingester;
mod token;

pub use ingester::{BounceEvent, BounceKind, TrackingIngester};
pub use token::{verify_webhook_signature, TokenSigner};
