//! HTTP client for an external browser-automation driver (LinkedIn actions)

use super::{CapabilityProbe, ChannelSender, SendOutcome, SendRequest};
use async_trait::async_trait;
use outreach_common::{Error, Result};
use outreach_storage::models::Contact;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionBody<'a> {
    account_id: uuid::Uuid,
    account: &'a str,
    action: String,
    target_url: Option<&'a str>,
    subject: Option<&'a str>,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionResponse {
    success: bool,
    #[serde(default)]
    provider_message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityBody<'a> {
    contact_id: uuid::Uuid,
    target_url: Option<&'a str>,
    capability: &'a str,
}

#[derive(Debug, Deserialize)]
struct CapabilityResponse {
    result: bool,
}

/// Channel driver reached over HTTP
pub struct HttpChannelDriver {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChannelDriver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build driver client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ChannelSender for HttpChannelDriver {
    async fn send(&self, request: &SendRequest) -> SendOutcome {
        let body = ActionBody {
            account_id: request.account.id,
            account: &request.account.email,
            action: request.action.to_string(),
            target_url: request.target.profile_url.as_deref(),
            subject: request.subject.as_deref(),
            content: &request.body,
        };

        let response = match self
            .client
            .post(format!("{}/v1/actions", self.base_url))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SendOutcome::failed(format!("Driver request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, action = %request.action, "Channel driver rejected action");
            return SendOutcome::failed(format!("Driver returned {}", status));
        }

        match response.json::<ActionResponse>().await {
            Ok(ActionResponse {
                success: true,
                provider_message_id,
                ..
            }) => {
                debug!(action = %request.action, "Channel driver action completed");
                SendOutcome {
                    success: true,
                    provider_message_id,
                    error: None,
                    bounced: false,
                }
            }
            Ok(ActionResponse { error, .. }) => {
                SendOutcome::failed(error.unwrap_or_else(|| "Driver reported failure".to_string()))
            }
            Err(e) => SendOutcome::failed(format!("Invalid driver response: {}", e)),
        }
    }
}

#[async_trait]
impl CapabilityProbe for HttpChannelDriver {
    async fn has_capability(&self, contact: &Contact, capability: &str) -> Result<bool> {
        let body = CapabilityBody {
            contact_id: contact.id,
            target_url: contact.linkedin_url.as_deref(),
            capability,
        };

        let response = self
            .client
            .post(format!("{}/v1/capabilities", self.base_url))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Channel(format!("Capability check failed: {}", e)))?;

        let parsed: CapabilityResponse = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Invalid capability response: {}", e)))?;

        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::SendTarget;
    use crate::testing::{account_row, contact_row};
    use outreach_common::types::{Channel, ChannelAction};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connect_request() -> SendRequest {
        SendRequest {
            channel: Channel::Linkedin,
            action: ChannelAction::Connect,
            account: account_row(Channel::Linkedin, 20, 0),
            target: SendTarget {
                email: "lead@example.org".to_string(),
                name: None,
                profile_url: Some("https://www.linkedin.com/in/lead".to_string()),
            },
            subject: None,
            body: "Would love to connect".to_string(),
            html_body: None,
        }
    }

    #[tokio::test]
    async fn test_send_action_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/actions"))
            .and(body_partial_json(serde_json::json!({
                "action": "connect",
                "targetUrl": "https://www.linkedin.com/in/lead"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "providerMessageId": "li-123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let driver = HttpChannelDriver::new(server.uri(), Duration::from_secs(5)).unwrap();
        let outcome = driver.send(&connect_request()).await;

        assert!(outcome.success);
        assert_eq!(outcome.provider_message_id.as_deref(), Some("li-123"));
    }

    #[tokio::test]
    async fn test_send_action_driver_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/actions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let driver = HttpChannelDriver::new(server.uri(), Duration::from_secs(5)).unwrap();
        let outcome = driver.send(&connect_request()).await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_send_action_reported_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/actions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "weekly invitation limit"
            })))
            .mount(&server)
            .await;

        let driver = HttpChannelDriver::new(server.uri(), Duration::from_secs(5)).unwrap();
        let outcome = driver.send(&connect_request()).await;

        assert_eq!(outcome.error.as_deref(), Some("weekly invitation limit"));
    }

    #[tokio::test]
    async fn test_capability_probe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/capabilities"))
            .and(body_partial_json(serde_json::json!({"capability": "linkedin_connected"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": true})))
            .mount(&server)
            .await;

        let driver = HttpChannelDriver::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        let contact = contact_row("lead@example.org");

        assert!(driver
            .has_capability(&contact, "linkedin_connected")
            .await
            .unwrap());
    }
}
