//! HTTP backend for the parking API.

use super::{Park, ParkingApi};
use crate::{Error, Result};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storage::{Config, StatusEntry, StatusMap, User};
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Debug, Deserialize)]
struct ConfigEnvelope {
    config: Config,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: StatusEntry,
}

#[derive(Debug, Serialize)]
struct NewUserBody<'a> {
    name: &'a str,
    key: &'a str,
}

/// Parking API over HTTP.
///
/// The key travels as the `key` query parameter. No per-call timeout is set:
/// a hung call stalls only its own sync tick.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
}

impl HttpApi {
    /// Create a backend for the server at `server_url` (including any base path).
    pub fn new(server_url: &str) -> Result<Self> {
        let base = Url::parse(server_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{server_url} cannot be a base URL")));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    fn url(&self, segments: &[&str], key: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        url.query_pairs_mut().append_pair("key", key);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            error!("access denied: invalid key");
            return Err(Error::Unauthorized);
        }
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_default();
            return Err(Error::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

impl ParkingApi for HttpApi {
    async fn get_config(&self, key: &str) -> Result<Config> {
        let url = self.url(&["config"], key)?;
        debug!(path = url.path(), "GET");
        self.send(self.client.get(url)).await
    }

    async fn get_status(&self, key: &str) -> Result<StatusMap> {
        let url = self.url(&["status"], key)?;
        debug!(path = url.path(), "GET");
        self.send(self.client.get(url)).await
    }

    async fn set_config(&self, key: &str, config: &Config) -> Result<Config> {
        let url = self.url(&["config"], key)?;
        let envelope: ConfigEnvelope = self.send(self.client.post(url).json(config)).await?;
        Ok(envelope.config)
    }

    async fn record_park(&self, key: &str, park: &Park) -> Result<StatusEntry> {
        let url = self.url(&["park"], key)?;
        let envelope: StatusEnvelope = self.send(self.client.post(url).json(park)).await?;
        Ok(envelope.status)
    }

    async fn list_users(&self, key: &str) -> Result<Vec<User>> {
        let url = self.url(&["users"], key)?;
        self.send(self.client.get(url)).await
    }

    async fn create_user(&self, key: &str, name: &str, user_key: &str) -> Result<User> {
        let url = self.url(&["users"], key)?;
        let body = NewUserBody {
            name,
            key: user_key,
        };
        let envelope: UserEnvelope = self.send(self.client.post(url).json(&body)).await?;
        Ok(envelope.user)
    }

    async fn delete_user(&self, key: &str, user_key: &str) -> Result<()> {
        let url = self.url(&["users", user_key], key)?;
        let _: serde_json::Value = self.send(self.client.delete(url)).await?;
        Ok(())
    }
}
