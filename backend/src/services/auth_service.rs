use anyhow::Result;
use log::{error, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::config::GoogleOAuthConfig;
use crate::error::{PipelineError, PipelineResult};

pub const USER_COOKIE: &str = "user";
pub const STATE_COOKIE: &str = "oauth_state";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google OpenID Connect authorization-code flow. The profile comes from the
/// userinfo endpoint; id tokens are not inspected.
pub struct GoogleAuth {
    client: Client,
    config: GoogleOAuthConfig,
}

impl GoogleAuth {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    pub fn authorize_url(&self, state: &str) -> PipelineResult<String> {
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
        .map_err(|e| PipelineError::internal(format!("Invalid authorize URL: {e}")))?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> PipelineResult<Value> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Google token exchange failed: {status} {body}");
            return Err(PipelineError::invalid_input("Authorization code was rejected"));
        }
        let token: TokenResponse = response.json().await?;

        let user: Value = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(
            "Fetched userinfo for {}",
            user["email"].as_str().unwrap_or("<no email>")
        );
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_for(server: &MockServer) -> GoogleAuth {
        GoogleAuth::new(GoogleOAuthConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost:8000/auth/google/callback".to_string(),
            authorize_url: format!("{}/o/oauth2/v2/auth", server.uri()),
            token_url: format!("{}/token", server.uri()),
            userinfo_url: format!("{}/v1/userinfo", server.uri()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn authorize_url_carries_client_and_state() {
        let server = MockServer::start().await;
        let url = Url::parse(&auth_for(&server).authorize_url("xyz").unwrap()).unwrap();
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(params.contains(&("client_id".into(), "client-id".into())));
        assert!(params.contains(&("state".into(), "xyz".into())));
        assert!(params.contains(&("scope".into(), "openid email profile".into())));
    }

    #[tokio::test]
    async fn code_exchange_fetches_userinfo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "email": "someone@example.com",
                "name": "Someone"
            })))
            .mount(&server)
            .await;

        let user = auth_for(&server).exchange_code("abc").await.unwrap();
        assert_eq!(user["email"], "someone@example.com");
    }

    #[tokio::test]
    async fn rejected_code_is_a_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let err = auth_for(&server).exchange_code("abc").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
