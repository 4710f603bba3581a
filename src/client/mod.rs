//! Remote service client.
//!
//! Thin wrapper over the Bluesky XRPC endpoints the workers need:
//! authenticate, resolve a profile, create a follow record, and list
//! followers/following with cursor pagination. Pure request/response;
//! retry and backoff live in the services that call this.

mod error;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub use error::{classify_error, ClientError, XrpcErrorBody};

const USER_AGENT: &str = concat!("skyfollow/", env!("CARGO_PKG_VERSION"));

/// Page size for follower/following listings.
const PAGE_LIMIT: u32 = 100;

/// Authenticated session returned by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
}

/// Resolved account profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One entry in a follower/following listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowerEntry {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowersPage {
    followers: Vec<FollowerEntry>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowsPage {
    follows: Vec<FollowerEntry>,
    #[serde(default)]
    cursor: Option<String>,
}

/// The remote operations workers depend on.
///
/// Implemented by [`BlueskyClient`]; mocked in service tests.
#[async_trait]
pub trait FollowApi: Send + Sync {
    /// Resolve a handle to its profile.
    async fn resolve_profile(&self, handle: &str) -> Result<Profile, ClientError>;
    /// Create a follow record for a stable id.
    async fn follow(&self, did: &str) -> Result<(), ClientError>;
    /// Full follower list for an actor (all pages).
    async fn list_followers(&self, actor: &str) -> Result<Vec<FollowerEntry>, ClientError>;
    /// Stable id of the authenticated account, if logged in.
    async fn session_did(&self) -> Option<String>;
}

/// XRPC client holding one authenticated session.
pub struct BlueskyClient {
    http: Client,
    base_url: String,
    session: RwLock<Option<Session>>,
}

impl BlueskyClient {
    /// Create a client for a service endpoint.
    pub fn new(service_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            base_url: service_url.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        })
    }

    fn xrpc_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, nsid)
    }

    async fn access_jwt(&self) -> Result<String, ClientError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_jwt.clone())
            .ok_or_else(|| ClientError::Auth("not logged in".to_string()))
    }

    /// Authenticate and store the session on the client.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session, ClientError> {
        debug!("logging in as {}", identifier);
        let response = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let session: Session = response.json().await?;
        info!("logged in as @{}", session.handle);
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn get_authed(
        &self,
        nsid: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, ClientError> {
        let jwt = self.access_jwt().await?;
        let response = self
            .http
            .get(self.xrpc_url(nsid))
            .bearer_auth(jwt)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }

    /// List all accounts an actor follows (all pages).
    pub async fn list_following(&self, actor: &str) -> Result<Vec<FollowerEntry>, ClientError> {
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;
        let limit = PAGE_LIMIT.to_string();

        loop {
            let mut query = vec![("actor", actor), ("limit", limit.as_str())];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.as_str()));
            }
            let page: FollowsPage = self
                .get_authed("app.bsky.graph.getFollows", &query)
                .await?
                .json()
                .await?;

            entries.extend(page.follows);
            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        debug!("{} is following {} accounts", actor, entries.len());
        Ok(entries)
    }
}

#[async_trait]
impl FollowApi for BlueskyClient {
    async fn resolve_profile(&self, handle: &str) -> Result<Profile, ClientError> {
        let response = self
            .get_authed("app.bsky.actor.getProfile", &[("actor", handle)])
            .await?;
        let profile: Profile = response.json().await?;
        debug!("resolved @{} to {}", profile.handle, profile.did);
        Ok(profile)
    }

    async fn follow(&self, did: &str) -> Result<(), ClientError> {
        let jwt = self.access_jwt().await?;
        let repo = self
            .session_did()
            .await
            .ok_or_else(|| ClientError::Auth("not logged in".to_string()))?;

        let body = json!({
            "repo": repo,
            "collection": "app.bsky.graph.follow",
            "record": {
                "$type": "app.bsky.graph.follow",
                "subject": did,
                "createdAt": Utc::now().to_rfc3339(),
            },
        });

        let response = self
            .http
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(jwt)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn list_followers(&self, actor: &str) -> Result<Vec<FollowerEntry>, ClientError> {
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;
        let limit = PAGE_LIMIT.to_string();

        loop {
            let mut query = vec![("actor", actor), ("limit", limit.as_str())];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.as_str()));
            }
            let page: FollowersPage = self
                .get_authed("app.bsky.graph.getFollowers", &query)
                .await?
                .json()
                .await?;

            entries.extend(page.followers);
            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        debug!("{} has {} followers", actor, entries.len());
        Ok(entries)
    }

    async fn session_did(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.did.clone())
    }
}

/// Turn a non-success response into a classified error.
async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body: XrpcErrorBody = response.json().await.unwrap_or_default();
    classify_error(status, &body, retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrpc_url_strips_trailing_slash() {
        let client = BlueskyClient::new("https://bsky.social/", Duration::from_secs(30)).unwrap();
        assert_eq!(
            client.xrpc_url("app.bsky.actor.getProfile"),
            "https://bsky.social/xrpc/app.bsky.actor.getProfile"
        );
    }

    #[tokio::test]
    async fn test_operations_require_login() {
        let client = BlueskyClient::new("https://bsky.social", Duration::from_secs(30)).unwrap();
        let err = client.resolve_profile("alice.test").await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
        assert!(client.session_did().await.is_none());
    }

    #[test]
    fn test_followers_page_parses_without_cursor() {
        let page: FollowersPage = serde_json::from_str(
            r#"{"followers":[{"did":"did:plc:abc","handle":"alice.test","displayName":"Alice"}]}"#,
        )
        .unwrap();
        assert_eq!(page.followers.len(), 1);
        assert!(page.cursor.is_none());
        assert_eq!(page.followers[0].display_name.as_deref(), Some("Alice"));
    }
}
