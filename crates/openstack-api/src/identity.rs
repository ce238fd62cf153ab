use crate::types::{AuthRequest, Token, TokenResponse};
use crate::{Error, Result, check};

/// Client for the Keystone v3 token API.
#[derive(Clone)]
pub struct IdentityClient {
    auth_url: String,
    http: reqwest::Client,
}

impl IdentityClient {
    pub fn new(http: reqwest::Client, auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            http,
        }
    }

    /// `auth_url` may be given with or without the `/v3` suffix.
    fn tokens_url(&self) -> String {
        let base = self.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            format!("{base}/auth/tokens")
        } else {
            format!("{base}/v3/auth/tokens")
        }
    }

    /// Issue a token. The token id comes back in the `X-Subject-Token` header.
    pub async fn authenticate(&self, req: &AuthRequest) -> Result<Token> {
        let resp = self.http.post(self.tokens_url()).json(req).send().await?;
        let resp = check(resp, "authenticate").await?;

        let id = resp
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or(Error::MissingToken)?;

        let body: TokenResponse = resp.json().await?;

        Ok(Token {
            id,
            expires_at: body.token.expires_at,
            catalog: body.token.catalog,
        })
    }
}
