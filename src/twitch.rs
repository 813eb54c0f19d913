use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TwitchCredentials;
use crate::error::{Error, Result};

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";

/// Helix accepts at most this many `user_login` parameters per request.
pub const MAX_LOGINS_PER_REQUEST: usize = 100;

/// Live status for every channel checked during a run.
#[derive(Debug, Clone, Default)]
pub struct LiveStatus {
    checked: HashSet<String>,
    live: HashSet<String>,
}

impl LiveStatus {
    /// Live names are always counted as checked.
    pub fn new<C, L>(checked: C, live: L) -> Self
    where
        C: IntoIterator<Item = String>,
        L: IntoIterator<Item = String>,
    {
        let live: HashSet<String> = live.into_iter().collect();
        let mut checked: HashSet<String> = checked.into_iter().collect();
        checked.extend(live.iter().cloned());
        Self { checked, live }
    }

    /// `None` when the channel was never checked.
    pub fn is_live(&self, channel: &str) -> Option<bool> {
        if !self.checked.contains(channel) {
            return None;
        }
        Some(self.live.contains(channel))
    }

    pub fn live(&self) -> &HashSet<String> {
        &self.live
    }

    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }
}

/// Result of one batched streams query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamsQuery {
    /// Logins (as reported by Twitch) that are currently broadcasting.
    Live(HashSet<String>),
    /// Rate limited until the given unix timestamp.
    RateLimited { reset_at: i64 },
}

#[async_trait]
pub trait StreamApi {
    /// Queries at most [`MAX_LOGINS_PER_REQUEST`] logins in one request.
    async fn live_logins(&self, logins: &[String]) -> Result<StreamsQuery>;
}

/// How long to wait for a rate limit that resets at `reset_at`, never negative.
pub fn backoff_delay(reset_at: i64, now: i64) -> Duration {
    Duration::from_secs(reset_at.saturating_sub(now).max(0) as u64)
}

/// Returns which of `names` are currently live.
///
/// Names are queried in chunks of [`MAX_LOGINS_PER_REQUEST`]. A rate-limited chunk is
/// retried after sleeping until the reset time, for as long as Twitch keeps limiting.
/// Any other failure aborts the whole resolution.
pub async fn resolve_live<A>(api: &A, names: &HashSet<String>) -> Result<LiveStatus>
where
    A: StreamApi + ?Sized,
{
    let mut by_login: HashMap<String, Vec<&String>> = HashMap::new();
    for name in names {
        by_login.entry(name.to_lowercase()).or_default().push(name);
    }

    let mut ordered: Vec<String> = names.iter().cloned().collect();
    ordered.sort();

    let mut live = HashSet::new();
    for chunk in ordered.chunks(MAX_LOGINS_PER_REQUEST) {
        let logins = loop {
            match api.live_logins(chunk).await? {
                StreamsQuery::Live(logins) => break logins,
                StreamsQuery::RateLimited { reset_at } => {
                    let delay = backoff_delay(reset_at, Utc::now().timestamp());
                    info!(
                        "Hit ratelimit, waiting for {:.2} seconds before retry.",
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        for login in logins {
            if let Some(requested) = by_login.get(&login.to_lowercase()) {
                live.extend(requested.iter().map(|name| (*name).clone()));
            }
        }
    }

    info!(
        "Loaded stream information for {} streams, {} live.",
        names.len(),
        live.len()
    );
    Ok(LiveStatus::new(names.iter().cloned(), live))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    data: Vec<StreamData>,
}

#[derive(Debug, Deserialize)]
struct StreamData {
    user_login: String,
    #[serde(rename = "type")]
    type_field: String,
}

/// Helix client holding an app access token.
pub struct HelixClient {
    http: Client,
    client_id: String,
    bearer_token: String,
}

impl HelixClient {
    /// Obtains an app access token via the client-credentials grant.
    pub async fn connect(credentials: &TwitchCredentials) -> Result<Self> {
        let http = Client::new();
        let response = http
            .post(TOKEN_URL)
            .query(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "twitch token exchange: HTTP {} => {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        debug!("Obtained Twitch app access token.");

        Ok(Self {
            http,
            client_id: credentials.client_id.clone(),
            bearer_token: token.access_token,
        })
    }
}

#[async_trait]
impl StreamApi for HelixClient {
    async fn live_logins(&self, logins: &[String]) -> Result<StreamsQuery> {
        let mut query: Vec<(&str, &str)> = vec![("first", "100")];
        query.extend(logins.iter().map(|login| ("user_login", login.as_str())));

        let response = self
            .http
            .get(STREAMS_URL)
            .query(&query)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return match rate_limit_reset(response.headers()) {
                Some(reset_at) => Ok(StreamsQuery::RateLimited { reset_at }),
                None => Err(Error::Api {
                    context: "get streams",
                    status: status.as_u16(),
                    body: "rate limited without a valid Ratelimit-Reset header".into(),
                }),
            };
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                context: "get streams",
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(StreamsQuery::Live(parse_live_logins(&body)?))
    }
}

/// Unix time at which the rate limit resets, rounded up to the next second.
fn rate_limit_reset(headers: &HeaderMap) -> Option<i64> {
    let reset_at = headers
        .get("Ratelimit-Reset")?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()?;
    reset_at.is_finite().then(|| reset_at.ceil() as i64)
}

fn parse_live_logins(body: &str) -> Result<HashSet<String>> {
    let streams: StreamsResponse = serde_json::from_str(body)?;
    Ok(streams
        .data
        .into_iter()
        .filter(|stream| stream.type_field == "live")
        .map(|stream| stream.user_login)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backoff_is_floored_at_zero() {
        assert_eq!(backoff_delay(1_000, 990), Duration::from_secs(10));
        assert_eq!(backoff_delay(1_000, 1_000), Duration::ZERO);
        assert_eq!(backoff_delay(990, 1_000), Duration::ZERO);
    }

    fn reset_header(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Ratelimit-Reset", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn reads_rate_limit_reset_header() {
        assert_eq!(rate_limit_reset(&reset_header("1700000000")), Some(1_700_000_000));
        assert_eq!(rate_limit_reset(&reset_header(" 1700000000 ")), Some(1_700_000_000));
    }

    #[test]
    fn fractional_reset_rounds_up() {
        assert_eq!(rate_limit_reset(&reset_header("1700000000.25")), Some(1_700_000_001));
    }

    #[test]
    fn missing_or_garbled_reset_header_is_none() {
        assert_eq!(rate_limit_reset(&HeaderMap::new()), None);
        assert_eq!(rate_limit_reset(&reset_header("soon")), None);
        assert_eq!(rate_limit_reset(&reset_header("NaN")), None);
        assert_eq!(rate_limit_reset(&reset_header("")), None);
    }

    #[test]
    fn parses_only_live_entries() {
        let body = r#"{
            "data": [
                {"id": "1", "user_login": "alice", "type": "live", "title": "hi"},
                {"id": "2", "user_login": "bob", "type": ""}
            ],
            "pagination": {}
        }"#;
        let live = parse_live_logins(body).unwrap();
        assert_eq!(live, HashSet::from(["alice".to_string()]));
    }

    #[test]
    fn empty_payload_means_nobody_is_live() {
        let live = parse_live_logins(r#"{"data": [], "pagination": {}}"#).unwrap();
        assert!(live.is_empty());
    }

    #[test]
    fn live_status_distinguishes_unchecked_channels() {
        let status = LiveStatus::new(vec!["a".to_string()], vec!["b".to_string()]);
        assert_eq!(status.is_live("a"), Some(false));
        assert_eq!(status.is_live("b"), Some(true));
        assert_eq!(status.is_live("c"), None);
        assert_eq!(status.checked_count(), 2);
    }
}
