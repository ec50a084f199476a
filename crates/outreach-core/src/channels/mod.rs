//! Channel senders: the `Send(action) -> outcome` capability the engine calls

mod driver;
mod smtp;

pub use driver::HttpChannelDriver;
pub use smtp::SmtpSender;

use async_trait::async_trait;
use outreach_common::types::{Channel, ChannelAction};
use outreach_common::Result;
use outreach_storage::models::{Contact, SendingAccount};
use std::collections::HashMap;
use std::sync::Arc;

/// Recipient of an outbound action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTarget {
    pub email: String,
    pub name: Option<String>,
    pub profile_url: Option<String>,
}

impl SendTarget {
    pub fn from_contact(contact: &Contact) -> Self {
        let name = contact.full_name();
        Self {
            email: contact.email.clone(),
            name: (!name.is_empty()).then_some(name),
            profile_url: contact.linkedin_url.clone(),
        }
    }
}

/// One outbound action
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub channel: Channel,
    pub action: ChannelAction,
    pub account: SendingAccount,
    pub target: SendTarget,
    pub subject: Option<String>,
    /// Plain text content
    pub body: String,
    /// HTML alternative, carrying tracking links when present
    pub html_body: Option<String>,
}

/// Result of an outbound action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    /// The recipient was rejected permanently (hard bounce at send time)
    pub bounced: bool,
}

impl SendOutcome {
    pub fn sent(provider_message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
            bounced: false,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
            bounced: false,
        }
    }

    pub fn bounced(error: impl Into<String>) -> Self {
        Self {
            bounced: true,
            ..Self::failed(error)
        }
    }
}

/// Transport for one or more channels
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Never returns an error: transport problems are reported in the outcome
    async fn send(&self, request: &SendRequest) -> SendOutcome;
}

/// Yes/no questions answered by a channel driver, e.g. "linkedin_connected"
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn has_capability(&self, contact: &Contact, capability: &str) -> Result<bool>;
}

/// Probe used when no driver is configured: every capability is absent
pub struct NoCapabilities;

#[async_trait]
impl CapabilityProbe for NoCapabilities {
    async fn has_capability(&self, _contact: &Contact, _capability: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Dispatches each request to the sender registered for its channel
#[derive(Default, Clone)]
pub struct ChannelRouter {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.senders.contains_key(&channel)
    }
}

#[async_trait]
impl ChannelSender for ChannelRouter {
    async fn send(&self, request: &SendRequest) -> SendOutcome {
        match self.senders.get(&request.channel) {
            Some(sender) => sender.send(request).await,
            None => SendOutcome::failed(format!("No sender configured for {}", request.channel)),
        }
    }
}
