//! Supabase REST API client for the family domain.
//!
//! This module provides a client for interacting with Supabase's REST API to:
//! - Fetch the memberships view for an identity
//! - Fetch member rows and family rosters
//! - Invoke the invite Edge Functions (status, accept, reject)

use crate::error::{BackendError, BackendResult};
use crate::types::{AcceptedInvite, InviteStatus, Member, Membership};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Supabase REST API client for family-domain operations.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
}

/// Request body for the invite Edge Functions.
#[derive(Debug, Serialize)]
struct InviteRequest<'a> {
    token: &'a str,
}

/// Response body of the invite-status function.
#[derive(Debug, Deserialize)]
struct InviteStatusResponse {
    status: InviteStatus,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    ///
    /// # Arguments
    /// * `api_url` - The Supabase project API URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - The Supabase publishable API key
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Build the REST API URL for a table or view.
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    /// Build the Edge Function URL for a function name.
    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.api_url, name)
    }

    /// Bearer value for calls made before a session exists (Supabase accepts
    /// the publishable key as an anonymous bearer).
    pub fn anon_bearer(&self) -> &str {
        &self.anon_key
    }

    /// Fetch the ordered memberships for an identity.
    ///
    /// Order comes from the backend (`joined_at`) and carries no meaning
    /// beyond display stability.
    pub async fn list_memberships(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> BackendResult<Vec<Membership>> {
        let url = format!(
            "{}?user_id=eq.{}&select=family_id,family_name,family_code&order=joined_at.asc",
            self.rest_url("family_memberships"),
            user_id
        );

        tracing::debug!(user_id = %user_id, "Fetching memberships");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to fetch memberships");
            return Err(BackendError::Api(format!(
                "Failed to fetch memberships: {} ({})",
                status, body_summary
            )));
        }

        let memberships: Vec<Membership> = response.json().await?;
        tracing::debug!("Fetched {} memberships", memberships.len());
        Ok(memberships)
    }

    /// Fetch the identity's own member row within a family.
    ///
    /// Returns `Ok(None)` when the identity has no member row in that family.
    pub async fn fetch_member(
        &self,
        family_id: &str,
        user_id: &str,
        access_token: &str,
    ) -> BackendResult<Option<Member>> {
        let url = format!(
            "{}?family_id=eq.{}&user_id=eq.{}&select=id,family_id,user_id,role,nickname,color&limit=1",
            self.rest_url("members"),
            family_id,
            user_id
        );

        tracing::debug!(family_id = %family_id, user_id = %user_id, "Fetching member row");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to fetch member");
            return Err(BackendError::Api(format!(
                "Failed to fetch member: {} ({})",
                status, body_summary
            )));
        }

        let members: Vec<Member> = response.json().await?;
        Ok(members.into_iter().next())
    }

    /// Fetch the full member roster for a family, in backend order.
    pub async fn list_family_members(
        &self,
        family_id: &str,
        access_token: &str,
    ) -> BackendResult<Vec<Member>> {
        let url = format!(
            "{}?family_id=eq.{}&select=id,family_id,user_id,role,nickname,color&order=created_at.asc",
            self.rest_url("members"),
            family_id
        );

        tracing::debug!(family_id = %family_id, "Fetching family roster");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to fetch roster");
            return Err(BackendError::Api(format!(
                "Failed to fetch roster: {} ({})",
                status, body_summary
            )));
        }

        let members: Vec<Member> = response.json().await?;
        tracing::debug!("Fetched {} roster members", members.len());
        Ok(members)
    }

    /// Check the server-side status of an invite token.
    pub async fn invite_status(
        &self,
        invite_token: &str,
        access_token: &str,
    ) -> BackendResult<InviteStatus> {
        let url = self.function_url("invite-status");

        tracing::debug!("Checking invite status");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&InviteRequest {
                token: invite_token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to check invite status");
            return Err(BackendError::Api(format!(
                "Failed to check invite status: {} ({})",
                status, body_summary
            )));
        }

        let data: InviteStatusResponse = response.json().await?;
        tracing::debug!(status = ?data.status, "Invite status resolved");
        Ok(data.status)
    }

    /// Accept an invite, joining its family.
    ///
    /// Membership creation and role assignment happen server-side; the
    /// response only names the joined family.
    pub async fn accept_invite(
        &self,
        invite_token: &str,
        access_token: &str,
    ) -> BackendResult<AcceptedInvite> {
        let url = self.function_url("invite-accept");

        tracing::debug!("Accepting invite");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&InviteRequest {
                token: invite_token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to accept invite");
            return Err(BackendError::Api(format!(
                "Failed to accept invite: {} ({})",
                status, body_summary
            )));
        }

        let accepted: AcceptedInvite = response.json().await?;
        tracing::info!(family_id = %accepted.family_id, "Invite accepted");
        Ok(accepted)
    }

    /// Reject an invite.
    pub async fn reject_invite(
        &self,
        invite_token: &str,
        access_token: &str,
    ) -> BackendResult<()> {
        let url = self.function_url("invite-reject");

        tracing::debug!("Rejecting invite");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&InviteRequest {
                token: invite_token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to reject invite");
            return Err(BackendError::Api(format!(
                "Failed to reject invite: {} ({})",
                status, body_summary
            )));
        }

        tracing::info!("Invite rejected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_client_creation() {
        let client = SupabaseClient::new("https://test.supabase.co", "test-key");
        assert_eq!(client.api_url, "https://test.supabase.co");
        assert_eq!(client.anon_key, "test-key");
    }

    #[test]
    fn test_rest_url() {
        let client = SupabaseClient::new("https://test.supabase.co", "test-key");
        assert_eq!(
            client.rest_url("members"),
            "https://test.supabase.co/rest/v1/members"
        );
    }

    #[test]
    fn test_function_url() {
        let client = SupabaseClient::new("https://test.supabase.co", "test-key");
        assert_eq!(
            client.function_url("invite-accept"),
            "https://test.supabase.co/functions/v1/invite-accept"
        );
    }

    #[test]
    fn test_invite_request_serialization() {
        let request = InviteRequest { token: "tok-123" };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"token":"tok-123"}"#);
    }

    #[test]
    fn test_summarize_response_body_hides_content() {
        let summary = summarize_response_body("secret payload");
        assert!(summary.starts_with("len=14,digest="));
        assert!(!summary.contains("secret"));
    }

    #[tokio::test]
    async fn test_list_memberships_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/family_memberships")
            .match_query(mockito::Matcher::Any)
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer token-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"family_id":"fam-1","family_name":"The Lees","family_code":"LEE123"}]"#,
            )
            .create_async()
            .await;

        let client = SupabaseClient::new(server.url(), "anon");
        let memberships = client.list_memberships("user-1", "token-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].family_id, "fam-1");
    }

    #[tokio::test]
    async fn test_fetch_member_none_for_empty_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/members")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let client = SupabaseClient::new(server.url(), "anon");
        let member = client.fetch_member("fam-1", "user-1", "t").await.unwrap();
        assert!(member.is_none());
    }

    #[tokio::test]
    async fn test_list_family_members_http() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/members")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"id":"mem-a","family_id":"fam-1","user_id":"user-1","role":"MOM","nickname":"Ana"},
                    {"id":"mem-b","family_id":"fam-1","user_id":null,"role":"CHILD","nickname":"Bo"}
                ]"#,
            )
            .create_async()
            .await;

        let client = SupabaseClient::new(server.url(), "anon");
        let roster = client.list_family_members("fam-1", "t").await.unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].role, Role::Mom);
        assert_eq!(roster[1].user_id, None);
    }

    #[tokio::test]
    async fn test_invite_status_pending() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/functions/v1/invite-status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"pending"}"#)
            .create_async()
            .await;

        let client = SupabaseClient::new(server.url(), "anon");
        let status = client.invite_status("tok", "t").await.unwrap();
        assert!(status.is_pending());
    }

    #[tokio::test]
    async fn test_invite_status_error_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/functions/v1/invite-status")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = SupabaseClient::new(server.url(), "anon");
        let result = client.invite_status("tok", "t").await;
        assert!(matches!(result, Err(BackendError::Api(_))));
    }

    #[tokio::test]
    async fn test_accept_invite_returns_family_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/functions/v1/invite-accept")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"family_id":"fam-7"}"#)
            .create_async()
            .await;

        let client = SupabaseClient::new(server.url(), "anon");
        let accepted = client.accept_invite("tok", "t").await.unwrap();
        assert_eq!(accepted.family_id, "fam-7");
    }

    #[tokio::test]
    async fn test_reject_invite_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/functions/v1/invite-reject")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = SupabaseClient::new(server.url(), "anon");
        client.reject_invite("tok", "t").await.unwrap();
    }
}
