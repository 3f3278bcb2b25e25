//! Share-side token endpoints.
//!
//! Two exchanges keep the share API usable:
//!
//! - the account token endpoint turns the shared refresh token into a bearer
//!   access token (and usually a rotated refresh token);
//! - the share token endpoint turns a share id (plus password) into the
//!   short-lived `x-share-token`.
//!
//! Both endpoints answer errors with a `{code, message}` body.

use crate::error::{AuthError, Result};
use crate::types::{ApiErrorBody, ShareTokenResponse, TokenResponse};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const ACCOUNT_TOKEN_URL: &str = "https://auth.aliyundrive.com/v2/account/token";
pub const SHARE_TOKEN_URL: &str = "https://api.aliyundrive.com/v2/share_link/get_share_token";

/// Endpoint locations, overridable for tests and mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpoints {
    pub account_token_url: String,
    pub share_token_url: String,
}

impl Default for TokenEndpoints {
    fn default() -> Self {
        Self {
            account_token_url: ACCOUNT_TOKEN_URL.to_string(),
            share_token_url: SHARE_TOKEN_URL.to_string(),
        }
    }
}

pub struct TokenClient {
    http_client: Arc<dyn HttpClient>,
    endpoints: TokenEndpoints,
}

impl TokenClient {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_endpoints(http_client, TokenEndpoints::default())
    }

    pub fn with_endpoints(http_client: Arc<dyn HttpClient>, endpoints: TokenEndpoints) -> Self {
        Self {
            http_client,
            endpoints,
        }
    }

    /// Exchange a refresh token for a new access token.
    #[instrument(skip_all)]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        if refresh_token.is_empty() {
            return Err(AuthError::NoRefreshToken);
        }

        let request = HttpRequest::post_json(
            self.endpoints.account_token_url.clone(),
            &json!({
                "refresh_token": refresh_token,
                "grant_type": "refresh_token",
            }),
        )?;

        let response = self.http_client.execute(request).await?;
        if let Some(message) = Self::error_message(&response) {
            warn!(status = response.status, "Token endpoint rejected refresh");
            return Err(AuthError::TokenRefreshFailed(message));
        }

        let tokens: TokenResponse = response
            .json()
            .map_err(|e| AuthError::TokenRefreshFailed(format!("Malformed token response: {}", e)))?;
        if tokens.access_token.is_empty() {
            return Err(AuthError::TokenRefreshFailed(
                "Token response carried no access token".to_string(),
            ));
        }

        debug!(expires_in = ?tokens.expires_in, "Access token exchanged");
        Ok(tokens)
    }

    /// Acquire a share token for `share_id`, sending the password only when set.
    #[instrument(skip(self, share_pwd))]
    pub async fn get_share_token(
        &self,
        share_id: &str,
        share_pwd: Option<&str>,
    ) -> Result<ShareTokenResponse> {
        let mut body = json!({ "share_id": share_id });
        if let Some(pwd) = share_pwd.filter(|p| !p.is_empty()) {
            body["share_pwd"] = json!(pwd);
        }

        let request = HttpRequest::post_json(self.endpoints.share_token_url.clone(), &body)?;
        let response = self.http_client.execute(request).await?;
        if let Some(message) = Self::error_message(&response) {
            warn!(status = response.status, "Share token endpoint rejected request");
            return Err(AuthError::ShareTokenFailed(message));
        }

        let token: ShareTokenResponse = response
            .json()
            .map_err(|e| AuthError::ShareTokenFailed(format!("Malformed share token response: {}", e)))?;
        if token.share_token.is_empty() {
            return Err(AuthError::ShareTokenFailed(
                "Share token response carried no token".to_string(),
            ));
        }

        debug!(expires_in = ?token.expires_in, "Share token acquired");
        Ok(token)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        if let Some(error) = ApiErrorBody::parse(&response.body) {
            return Some(format!("{}: {}", error.code, error.message));
        }
        if !response.is_success() {
            return Some(format!("HTTP {}: {}", response.status, response.text_lossy()));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClientImpl {}

        #[async_trait]
        impl HttpClient for HttpClientImpl {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn body_of(request: &HttpRequest) -> serde_json::Value {
        serde_json::from_slice(request.body.as_ref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_access_token_sends_grant() {
        let mut http = MockHttpClientImpl::new();
        http.expect_execute()
            .withf(|req| {
                let body = body_of(req);
                req.url == ACCOUNT_TOKEN_URL
                    && body["grant_type"] == "refresh_token"
                    && body["refresh_token"] == "rt-1"
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    serde_json::json!({"access_token": "at-2", "refresh_token": "rt-2", "expires_in": 7200}),
                ))
            });

        let client = TokenClient::new(Arc::new(http));
        let tokens = client.refresh_access_token("rt-1").await.unwrap();

        assert_eq!(tokens.access_token, "at-2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-2"));
    }

    #[tokio::test]
    async fn test_refresh_surfaces_error_code() {
        let mut http = MockHttpClientImpl::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(response(
                400,
                serde_json::json!({"code": "InvalidParameter.RefreshToken", "message": "refresh token is invalid"}),
            ))
        });

        let client = TokenClient::new(Arc::new(http));
        let err = client.refresh_access_token("rt-1").await.unwrap_err();

        assert!(
            matches!(err, AuthError::TokenRefreshFailed(msg) if msg == "InvalidParameter.RefreshToken: refresh token is invalid")
        );
    }

    #[tokio::test]
    async fn test_refresh_without_token_makes_no_call() {
        let http = MockHttpClientImpl::new();
        let client = TokenClient::new(Arc::new(http));

        assert!(matches!(
            client.refresh_access_token("").await,
            Err(AuthError::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_share_token_includes_password_only_when_set() {
        let mut http = MockHttpClientImpl::new();
        http.expect_execute()
            .withf(|req| body_of(req).get("share_pwd").is_none())
            .times(1)
            .returning(|_| Ok(response(200, serde_json::json!({"share_token": "st-1", "expires_in": 7200}))));
        http.expect_execute()
            .withf(|req| body_of(req)["share_pwd"] == "1234")
            .times(1)
            .returning(|_| Ok(response(200, serde_json::json!({"share_token": "st-2"}))));

        let client = TokenClient::new(Arc::new(http));
        let open = client.get_share_token("share-a", None).await.unwrap();
        let protected = client.get_share_token("share-a", Some("1234")).await.unwrap();

        assert_eq!(open.share_token, "st-1");
        assert_eq!(protected.share_token, "st-2");
    }

    #[tokio::test]
    async fn test_share_token_wrong_password() {
        let mut http = MockHttpClientImpl::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(response(
                400,
                serde_json::json!({"code": "ShareLinkTokenInvalid", "message": "share pwd is not valid"}),
            ))
        });

        let client = TokenClient::new(Arc::new(http));
        let err = client.get_share_token("share-a", Some("bad")).await.unwrap_err();
        assert!(matches!(err, AuthError::ShareTokenFailed(_)));
    }
}
