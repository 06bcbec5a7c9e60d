use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::RouterError;
use crate::kernel::decision::{DecisionPayload, RouterResponse};
use crate::voice::DecisionRouter;

/// Posts approved decisions as JSON to an external executor.
#[derive(Clone)]
pub struct HttpDecisionRouter {
    client: Client,
    url: String,
}

impl HttpDecisionRouter {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, RouterError> {
        Ok(Self {
            client: Client::builder().timeout(request_timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DecisionRouter for HttpDecisionRouter {
    async fn route(&self, payload: &DecisionPayload) -> Result<RouterResponse, RouterError> {
        debug!(action = ?payload.action, "Routing decision");
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(RouterError::Status(response.status()));
        }
        Ok(response.json::<RouterResponse>().await?)
    }
}

/// Executes nothing. Says what would have happened.
#[derive(Debug, Clone, Default)]
pub struct DryRunRouter;

#[async_trait]
impl DecisionRouter for DryRunRouter {
    async fn route(&self, payload: &DecisionPayload) -> Result<RouterResponse, RouterError> {
        if let Some(reply) = payload.parameters.get("reply") {
            return Ok(RouterResponse::ok(reply.clone()));
        }

        let action = payload.action.as_deref().unwrap_or("UNKNOWN").to_lowercase().replace('_', " ");
        let message = match &payload.target {
            Some(target) => format!("Would {action} {target}."),
            None => format!("Would {action}."),
        };
        info!(confirmed = payload.confirmed, "{}", message);
        Ok(RouterResponse::ok(message))
    }
}
