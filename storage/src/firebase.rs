//! Firebase Realtime Database adapter over the REST API.
//!
//! Paths map to `{base_url}/{collection}/{key}.json`, with every segment
//! percent-encoded and the token sent as the `auth` query pair. Subscriptions
//! poll the collection on a fixed interval and fire the callback whenever the
//! value changes, after one immediate delivery.

use std::time::Duration;

use async_trait::async_trait;
use config::RemoteConfig;
use errors::RemoteError;
use pr_core::{ChangeCallback, Collection, RemoteStore, RemoteTree, Subscription};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FirebaseRemote {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    poll_interval: Duration
}

impl FirebaseRemote {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = parse_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            auth_token,
            poll_interval
        })
    }

    pub fn from_config(config: &RemoteConfig, poll_interval: Duration) -> Result<Self, RemoteError> {
        Self::new(
            config.base_url.clone(),
            config.auth_token.clone(),
            Duration::from_secs(config.timeout_seconds),
            poll_interval,
        )
    }

    /// `{base_url}/{segments..}.json?auth=..`; no segments addresses the root.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| RemoteError::InvalidEndpoint {
                url: self.base_url.to_string(),
                reason: "cannot carry a path".to_string()
            })?;
            path.pop_if_empty();
            match segments.split_last() {
                Some((last, parents)) => {
                    path.extend(parents);
                    path.push(&format!("{last}.json"));
                }
                None => {
                    path.push(".json");
                }
            }
        }
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    fn checked_key(key: &str) -> Result<&str, RemoteError> {
        if utils::is_valid_remote_key(key) {
            Ok(key)
        } else {
            Err(RemoteError::InvalidKey {
                key: key.to_string()
            })
        }
    }

    async fn get_value(&self, segments: &[&str]) -> Result<Value, RemoteError> {
        let label = segments.join("/");
        let response = self
            .client
            .get(self.endpoint(segments)?)
            .send()
            .await
            .map_err(|e| RemoteError::unavailable(e.to_string()))?;
        let response = check_status(&label, response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::MalformedDocument {
                path: label,
                reason: e.to_string()
            })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, RemoteError> {
    let url = Url::parse(raw).map_err(|e| RemoteError::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string()
    })?;
    if url.cannot_be_a_base() || url.query().is_some() {
        return Err(RemoteError::InvalidEndpoint {
            url: raw.to_string(),
            reason: "expected a database root such as https://<db>.firebaseio.com".to_string()
        });
    }
    Ok(url)
}

/// Auth failures count as unavailability; other non-success statuses are
/// rejections.
async fn check_status(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        || status.is_server_error()
    {
        return Err(RemoteError::unavailable(format!(
            "{path} answered {}: {body}",
            status.as_u16()
        )));
    }
    Err(RemoteError::Rejected {
        path: path.to_string(),
        status: status.as_u16(),
        body
    })
}

#[async_trait]
impl RemoteStore for FirebaseRemote {
    async fn fetch_all(&self) -> Result<RemoteTree, RemoteError> {
        let root = self.get_value(&[]).await?;
        Ok(RemoteTree::from_json(&root))
    }

    async fn put_entity(
        &self,
        collection: Collection,
        key: &str,
        value: &Value,
    ) -> Result<(), RemoteError> {
        let key = Self::checked_key(key)?;
        let path = format!("{}/{key}", collection.as_str());
        // A null body deletes the document on this store.
        if value.is_null() {
            return Err(RemoteError::MalformedDocument {
                path,
                reason: "refusing to write null over a document".to_string()
            });
        }
        let response = self
            .client
            .put(self.endpoint(&[collection.as_str(), key])?)
            .json(value)
            .send()
            .await
            .map_err(|e| RemoteError::unavailable(e.to_string()))?;
        check_status(&path, response).await?;
        debug!(path = %path, "Document written");
        Ok(())
    }

    async fn remove_entity(&self, collection: Collection, key: &str) -> Result<(), RemoteError> {
        let key = Self::checked_key(key)?;
        let path = format!("{}/{key}", collection.as_str());
        let response = self
            .client
            .delete(self.endpoint(&[collection.as_str(), key])?)
            .send()
            .await
            .map_err(|e| RemoteError::unavailable(e.to_string()))?;
        check_status(&path, response).await?;
        debug!(path = %path, "Document removed");
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        callback: ChangeCallback,
    ) -> Result<Subscription, RemoteError> {
        let path = collection.as_str();
        let initial = self.get_value(&[path]).await?;
        callback(initial.clone());

        let remote = self.clone();
        let handle = tokio::spawn(async move {
            let mut last = initial;
            let mut ticker = tokio::time::interval(remote.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match remote.get_value(&[path]).await {
                    Ok(value) if value != last => {
                        last = value.clone();
                        callback(value);
                    }
                    Ok(_) => {}
                    Err(err) => warn!(collection = %collection, error = %err, "Subscription poll failed")
                }
            }
        });

        Ok(Subscription::new(collection, move || handle.abort()))
    }
}
