//! # quorix-relay
//!
//! Request/response client for the relay's HTTP surface.
//!
//! The relay assigns party identities, manages groups, and reports group
//! membership; everything protocol-critical travels over the socket
//! instead (see `quorix-transport`). The client is a stateless façade
//! apart from the bearer token and party id it stores after
//! [`RelayClient::register`].

use serde::{Deserialize, Serialize};
use url::Url;

use quorix_types::{GroupId, GroupInfo, Party, PartyId};

/// Error types for relay calls.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The HTTP request itself failed (DNS, connect, read).
    #[error("relay network error: {0}")]
    Network(String),

    /// The relay answered with a non-success status.
    #[error("relay rejected request ({status}): {reason}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason, or the raw body when unparseable.
        reason: String,
    },

    /// A call that requires authentication was made before `register`.
    #[error("no bearer token; register first")]
    MissingToken,

    /// The response body did not match the expected shape.
    #[error("invalid relay response: {0}")]
    InvalidResponse(String),

    /// A URL could not be constructed from the base.
    #[error("invalid relay URL: {0}")]
    Url(String),
}

/// Convenience result type for relay calls.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Response to `POST /party/register`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// The relay-assigned party id.
    pub party_id: PartyId,
    /// Bearer token for subsequent calls.
    pub token: String,
    /// Human-readable status message.
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct CreateGroupResponse {
    group: GroupInfo,
    #[serde(default)]
    #[allow(dead_code)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct CreateGroupRequest<'a> {
    group_id: &'a str,
    n: u16,
    t: u16,
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct GroupIdRequest<'a> {
    group_id: &'a str,
}

/// Client for the relay HTTP endpoints.
pub struct RelayClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    party_id: Option<PartyId>,
}

impl RelayClient {
    /// Create a client against the given base URL.
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            token: None,
            party_id: None,
        }
    }

    /// The bearer token, once registered.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The relay-assigned party id, once registered.
    pub fn party_id(&self) -> Option<&PartyId> {
        self.party_id.as_ref()
    }

    /// Install previously persisted credentials instead of registering.
    pub fn set_credentials(&mut self, party_id: PartyId, token: String) {
        self.party_id = Some(party_id);
        self.token = Some(token);
    }

    /// Register a new party; the relay assigns the id and bearer token.
    pub async fn register(&mut self) -> Result<RegisterResponse> {
        let url = self.endpoint("party/register")?;
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;
        let registered: RegisterResponse = decode(response).await?;

        tracing::info!(party_id = %registered.party_id, "registered with relay");
        self.token = Some(registered.token.clone());
        self.party_id = Some(registered.party_id.clone());
        Ok(registered)
    }

    /// Create a group with a freshly generated 64-hex-character id.
    pub async fn create_group(&self, n: u16, t: u16, timeout_minutes: u64) -> Result<GroupInfo> {
        let group_id = generate_group_id();
        let url = self.endpoint("group/create")?;
        let body = CreateGroupRequest {
            group_id: group_id.as_str(),
            n,
            t,
            timeout: timeout_minutes,
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;
        let created: CreateGroupResponse = decode(response).await?;

        tracing::info!(group_id = %created.group.group_id, n, t, "group created");
        Ok(created.group)
    }

    /// Join an existing group; callers re-fetch [`GroupInfo`] afterwards.
    pub async fn join_group(&self, group_id: &GroupId) -> Result<()> {
        let url = self.endpoint("group/join")?;
        let body = GroupIdRequest {
            group_id: group_id.as_str(),
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;
        check_status(response).await?;

        tracing::info!(%group_id, "joined group");
        Ok(())
    }

    /// Fetch the current group record.
    pub async fn group_info(&self, group_id: &GroupId) -> Result<GroupInfo> {
        let url = self.endpoint("group/info")?;
        let body = GroupIdRequest {
            group_id: group_id.as_str(),
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;
        decode(response).await
    }

    /// Fetch this party's record.
    pub async fn party_info(&self) -> Result<Party> {
        let url = self.endpoint("party/info")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;
        decode(response).await
    }

    /// Probe the relay's health endpoint.
    pub async fn health(&self) -> Result<bool> {
        let url = self.endpoint("health")?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }

    fn bearer(&self) -> Result<&str> {
        self.token.as_deref().ok_or(RelayError::MissingToken)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RelayError::Url("base cannot be a base URL".to_string()))?;
            segments.pop_if_empty();
            for segment in path.split('/') {
                segments.push(segment);
            }
        }
        Ok(url)
    }
}

/// Generate a fresh random 64-hex-character group id.
pub fn generate_group_id() -> GroupId {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    GroupId::new(hex::encode(bytes))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| RelayError::Network(e.to_string()))?;
    let reason = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(RelayError::Rejected {
        status: status.as_u16(),
        reason,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| RelayError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RelayClient {
        RelayClient::new(Url::parse("http://relay.local:8000").expect("url"))
    }

    #[test]
    fn test_generated_group_ids_are_valid_and_unique() {
        let a = generate_group_id();
        let b = generate_group_id();
        assert!(a.validate().is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_endpoint_paths() {
        let c = client();
        let url = c.endpoint("party/register").expect("endpoint");
        assert_eq!(url.as_str(), "http://relay.local:8000/party/register");
        let url = c.endpoint("health").expect("endpoint");
        assert_eq!(url.as_str(), "http://relay.local:8000/health");
    }

    #[test]
    fn test_bearer_missing_before_register() {
        let c = client();
        assert!(matches!(c.bearer(), Err(RelayError::MissingToken)));
    }

    #[test]
    fn test_set_credentials_installs_bearer() {
        let mut c = client();
        c.set_credentials(PartyId::new("02ab"), "tok".to_string());
        assert_eq!(c.bearer().expect("token"), "tok");
        assert_eq!(c.party_id().map(PartyId::as_str), Some("02ab"));
    }
}
