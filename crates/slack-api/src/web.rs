//! `reqwest`-backed [`SlackApi`] implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{ApiError, ApiResult, ChannelId, ChannelInfo, ChannelSummary, SlackApi, UserInfo};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Single shared Web API client. Construct once at startup and hand out
/// by `Arc`; per-call construction is deliberately not supported.
#[derive(Debug, Clone)]
pub struct WebApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl WebApiClient {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the client at a non-default endpoint (tests).
    #[must_use]
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        method: &'static str,
        query: &[(&str, &str)],
    ) -> ApiResult<T> {
        let url = format!("{}/{method}", self.base_url);
        debug!(method, "slack web api call");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport { method, source })?;
        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::Transport { method, source })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        method: &'static str,
        body: &serde_json::Value,
    ) -> ApiResult<T> {
        let url = format!("{}/{method}", self.base_url);
        debug!(method, "slack web api call");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport { method, source })?;
        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::Transport { method, source })
    }

    /// Identify the bot's own user; used to keep the bot from reacting to
    /// itself.
    pub async fn auth_test(&self) -> ApiResult<AuthInfo> {
        let method = "auth.test";
        let response: AuthTestResponse = self.post(method, &serde_json::Value::Null).await?;
        if response.envelope.ok {
            Ok(AuthInfo {
                user_id: response.user_id,
            })
        } else {
            Err(not_ok(method, response.envelope.error))
        }
    }

    /// Open a Socket Mode connection and return the websocket URL.
    /// Requires an app-level token, not the bot token used elsewhere.
    pub async fn connections_open(&self, app_token: &str) -> ApiResult<String> {
        let method = "apps.connections.open";
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(app_token)
            .send()
            .await
            .map_err(|source| ApiError::Transport { method, source })?;
        let open: ConnectionsOpenResponse = response
            .json()
            .await
            .map_err(|source| ApiError::Transport { method, source })?;
        if open.envelope.ok {
            Ok(open.url.unwrap_or_default())
        } else {
            Err(not_ok(method, open.envelope.error))
        }
    }
}

/// Shared `{ok, error}` envelope every Web API response carries.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn not_ok(method: &'static str, error: Option<String>) -> ApiError {
    ApiError::NotOk {
        method,
        code: error.unwrap_or_else(|| "unknown_error".to_owned()),
    }
}

#[derive(Debug, Deserialize)]
struct ListChannelsResponse {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(default)]
    channels: Vec<ChannelSummary>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfoResponse {
    #[serde(flatten)]
    envelope: Envelope,
    channel: Option<ChannelInfo>,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    #[serde(flatten)]
    envelope: Envelope,
    permalink: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(flatten)]
    envelope: Envelope,
    user: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    #[serde(flatten)]
    envelope: Envelope,
}

/// Identity of the authenticated bot user.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    #[serde(flatten)]
    envelope: Envelope,
    url: Option<String>,
}

#[async_trait]
impl SlackApi for WebApiClient {
    async fn list_channels(&self) -> ApiResult<Vec<ChannelSummary>> {
        let method = "conversations.list";
        let response: ListChannelsResponse = self.get(method, &[("limit", "1000")]).await?;
        if response.envelope.ok {
            Ok(response.channels)
        } else {
            Err(not_ok(method, response.envelope.error))
        }
    }

    async fn channel_info(&self, channel: &ChannelId) -> ApiResult<ChannelInfo> {
        let method = "conversations.info";
        let response: ChannelInfoResponse =
            self.get(method, &[("channel", channel.as_str())]).await?;
        match (response.envelope.ok, response.channel) {
            (true, Some(info)) => Ok(info),
            (true, None) => Err(not_ok(method, Some("missing_channel".to_owned()))),
            (false, Some(_) | None) => Err(not_ok(method, response.envelope.error)),
        }
    }

    async fn permalink(&self, channel: &ChannelId, ts: &str) -> ApiResult<String> {
        let method = "chat.getPermalink";
        let response: PermalinkResponse = self
            .get(method, &[("channel", channel.as_str()), ("message_ts", ts)])
            .await?;
        match (response.envelope.ok, response.permalink) {
            (true, Some(url)) => Ok(url),
            (true, None) => Err(not_ok(method, Some("missing_permalink".to_owned()))),
            (false, Some(_) | None) => Err(not_ok(method, response.envelope.error)),
        }
    }

    async fn user_info(&self, user: &str) -> ApiResult<UserInfo> {
        let method = "users.info";
        let response: UserInfoResponse = self.get(method, &[("user", user)]).await?;
        match (response.envelope.ok, response.user) {
            (true, Some(info)) => Ok(info),
            (true, None) => Err(not_ok(method, Some("missing_user".to_owned()))),
            (false, Some(_) | None) => Err(not_ok(method, response.envelope.error)),
        }
    }

    async fn post_message(&self, channel: &ChannelId, text: &str) -> ApiResult<()> {
        let method = "chat.postMessage";
        let body = json!({ "channel": channel.as_str(), "text": text });
        let response: AckResponse = self.post(method, &body).await?;
        if response.envelope.ok {
            Ok(())
        } else {
            Err(not_ok(method, response.envelope.error))
        }
    }

    async fn add_reaction(&self, channel: &ChannelId, ts: &str, name: &str) -> ApiResult<()> {
        let method = "reactions.add";
        let body = json!({ "channel": channel.as_str(), "timestamp": ts, "name": name });
        let response: AckResponse = self.post(method, &body).await?;
        if response.envelope.ok {
            Ok(())
        } else {
            Err(not_ok(method, response.envelope.error))
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::WebApiClient;
    use crate::{ApiError, ChannelId, SlackApi as _};

    #[tokio::test]
    async fn permalink_decodes_ok_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat.getPermalink"))
            .and(query_param("channel", "C0123ABCDE"))
            .and(query_param("message_ts", "123.456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "permalink": "https://example.slack.com/archives/C0123ABCDE/p123456"
            })))
            .mount(&server)
            .await;

        let client = WebApiClient::with_base_url("xoxb-test", server.uri());
        let url = client
            .permalink(&ChannelId::from("C0123ABCDE"), "123.456")
            .await
            .unwrap();
        assert!(url.ends_with("p123456"));
    }

    #[tokio::test]
    async fn not_ok_envelope_surfaces_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error": "channel_not_found"
            })))
            .mount(&server)
            .await;

        let client = WebApiClient::with_base_url("xoxb-test", server.uri());
        let err = client
            .channel_info(&ChannelId::from("C0123ABCDE"))
            .await
            .unwrap_err();
        match err {
            ApiError::NotOk { method, code } => {
                assert_eq!(method, "conversations.info");
                assert_eq!(code, "channel_not_found");
            }
            ApiError::Transport { .. } => panic!("expected NotOk, got transport error"),
        }
    }

    #[tokio::test]
    async fn list_channels_returns_directory_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "channels": [
                    { "id": "C000000001", "name": "general", "is_archived": false },
                    { "id": "C000000002", "name": "graveyard", "is_archived": true }
                ]
            })))
            .mount(&server)
            .await;

        let client = WebApiClient::with_base_url("xoxb-test", server.uri());
        let channels = client.list_channels().await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "general");
        assert!(channels[1].is_archived);
    }
}
