use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::auth::dto::{AuthResponse, PublicUser};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Identity endpoints as seen from the browser side.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// `Ok(None)` when there is no valid session.
    async fn me(&self) -> Result<Option<PublicUser>, ClientError>;
    async fn login(&self, email: &str, password: &str) -> Result<PublicUser, ClientError>;
    async fn register(&self, email: &str, password: &str, name: &str) -> Result<PublicUser, ClientError>;
    async fn logout(&self) -> Result<(), ClientError>;
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// `reqwest` client with a cookie jar, so the session cookie set by login
/// is replayed on later calls.
pub struct HttpIdentityApi {
    http: Client,
    base_url: String,
}

impl HttpIdentityApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ClientError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<T>().await?);
        }
        let message = res
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| status.to_string());
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl IdentityApi for HttpIdentityApi {
    async fn me(&self) -> Result<Option<PublicUser>, ClientError> {
        let res = self.http.get(self.url("/api/auth/me")).send().await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        Ok(Some(Self::parse::<AuthResponse>(res).await?.user))
    }

    async fn login(&self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let body = Credentials {
            email,
            password,
            name: None,
        };
        let res = self.http.post(self.url("/api/auth/login")).json(&body).send().await?;
        Ok(Self::parse::<AuthResponse>(res).await?.user)
    }

    async fn register(&self, email: &str, password: &str, name: &str) -> Result<PublicUser, ClientError> {
        let body = Credentials {
            email,
            password,
            name: Some(name),
        };
        let res = self.http.post(self.url("/api/auth/register")).json(&body).send().await?;
        Ok(Self::parse::<AuthResponse>(res).await?.user)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let res = self.http.post(self.url("/api/auth/logout")).send().await?;
        Self::parse::<serde_json::Value>(res).await?;
        Ok(())
    }
}
