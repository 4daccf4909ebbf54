use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::MetricsService;
use crate::error::{MonitorError, MonitorResult};
use crate::storage::{EndpointId, StorageError};

const ISSUE_ATTEMPTS: usize = 3;

/// An endpoint's active agent token
#[derive(Debug, Clone, Serialize)]
pub struct AgentCredential {
    pub endpoint_id: EndpointId,
    pub endpoint_name: String,
    pub agent_token: String,
}

/// Fresh token: two v4 UUIDs as 64 lowercase hex characters
///
/// Each half carries the fixed UUID version and variant nibbles, which leaves
/// 244 random bits in total.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

impl MetricsService {
    /// Create a token for the endpoint, replacing any existing one
    ///
    /// The old token stops working the moment the new one is stored.
    #[instrument(skip(self))]
    pub async fn issue_token(&self, id: EndpointId) -> MonitorResult<AgentCredential> {
        let endpoint = self.require_endpoint(id).await?;

        for _ in 0..ISSUE_ATTEMPTS {
            let token = generate_token();
            match self.storage.set_agent_token(id, Some(token.clone())).await {
                Ok(true) => {
                    info!("issued agent token for endpoint {id}");
                    return Ok(AgentCredential {
                        endpoint_id: endpoint.id,
                        endpoint_name: endpoint.name,
                        agent_token: token,
                    });
                }
                Ok(false) => {
                    return Err(MonitorError::NotFound(format!("endpoint {id} not found")));
                }
                Err(StorageError::Conflict(_)) => {
                    warn!("generated token collided, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(MonitorError::Storage(StorageError::Conflict(format!(
            "could not generate a unique token in {ISSUE_ATTEMPTS} attempts"
        ))))
    }

    /// Same as [`issue_token`](Self::issue_token)
    pub async fn rotate_token(&self, id: EndpointId) -> MonitorResult<AgentCredential> {
        self.issue_token(id).await
    }

    pub async fn fetch_token(&self, id: EndpointId) -> MonitorResult<AgentCredential> {
        let endpoint = self.require_endpoint(id).await?;

        let agent_token = endpoint.agent_token.ok_or_else(|| {
            MonitorError::NotConfigured(
                "no agent token configured, generate one first".to_string(),
            )
        })?;

        Ok(AgentCredential {
            endpoint_id: endpoint.id,
            endpoint_name: endpoint.name,
            agent_token,
        })
    }

    /// Clear the endpoint's token; revoking an absent token is not an error
    #[instrument(skip(self))]
    pub async fn revoke_token(&self, id: EndpointId) -> MonitorResult<()> {
        if !self.storage.set_agent_token(id, None).await? {
            return Err(MonitorError::NotFound(format!("endpoint {id} not found")));
        }
        info!("revoked agent token for endpoint {id}");
        Ok(())
    }
}
