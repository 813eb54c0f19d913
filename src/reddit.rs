use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::RedditCredentials;
use crate::error::{Error, Result};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// Short name of the sidebar text area that receives the widget template.
pub const STREAMS_WIDGET_NAME: &str = "Streams";

/// A sidebar text-area widget.
#[derive(Debug, Clone, PartialEq)]
pub struct TextArea {
    pub id: String,
    pub short_name: String,
    pub text: String,
    pub styles: Option<Value>,
}

/// The content platform operations a publish needs.
#[async_trait]
pub trait ContentPlatform {
    /// Current sidebar description, empty if unset. `Ok(None)` when the settings are not found.
    async fn description(&self, subreddit: &str) -> Result<Option<String>>;

    async fn update_description(&self, subreddit: &str, text: &str) -> Result<()>;

    /// Text areas in the subreddit's sidebar, in display order.
    async fn text_areas(&self, subreddit: &str) -> Result<Vec<TextArea>>;

    async fn update_text_area(&self, subreddit: &str, widget: &TextArea, text: &str)
        -> Result<()>;
}

pub fn build_user_agent(username: &str) -> String {
    format!(
        "{}:{}:{} (by /u/{})",
        std::env::consts::OS,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        username
    )
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WidgetsResponse {
    items: Map<String, Value>,
    layout: Layout,
}

#[derive(Debug, Deserialize)]
struct Layout {
    sidebar: SidebarLayout,
}

#[derive(Debug, Deserialize)]
struct SidebarLayout {
    order: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SiteAdminResponse {
    json: SiteAdminJson,
}

#[derive(Debug, Deserialize)]
struct SiteAdminJson {
    #[serde(default)]
    errors: Vec<Value>,
}

/// Reddit OAuth client authenticated with a script app's password grant.
pub struct RedditClient {
    http: Client,
}

impl RedditClient {
    pub async fn connect(credentials: &RedditCredentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&build_user_agent(&credentials.username))
            .map_err(|e| Error::Platform(format!("invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, user_agent);

        let response = Client::new()
            .post(TOKEN_URL)
            .headers(headers.clone())
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "reddit token exchange: HTTP {} => {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let access_token = match (token.access_token, token.error) {
            (Some(access_token), None) => access_token,
            (_, error) => {
                return Err(Error::Auth(format!(
                    "reddit token exchange failed: {}",
                    error.unwrap_or_else(|| "no access token".into())
                )))
            }
        };

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|e| Error::Auth(format!("invalid access token: {}", e)))?;
        bearer.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let http = Client::builder().default_headers(headers).build()?;
        debug!("Authenticated to Reddit as /u/{}.", credentials.username);
        Ok(Self { http })
    }

    async fn settings(&self, subreddit: &str) -> Result<Option<Map<String, Value>>> {
        let url = format!("{API_BASE}/r/{subreddit}/about/edit");
        let response = self
            .http
            .get(url)
            .query(&[("raw_json", "1")])
            .send()
            .await?;

        match check_status(response, "read subreddit settings", subreddit).await {
            Ok(response) => {
                let thing: Thing = response.json().await?;
                Ok(Some(thing.data))
            }
            Err(Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ContentPlatform for RedditClient {
    async fn description(&self, subreddit: &str) -> Result<Option<String>> {
        let settings = self.settings(subreddit).await?;
        Ok(settings.map(|data| settings_description(&data)))
    }

    async fn update_description(&self, subreddit: &str, text: &str) -> Result<()> {
        let settings = self
            .settings(subreddit)
            .await?
            .ok_or_else(|| Error::NotFound(format!("settings for /r/{}", subreddit)))?;

        let form = site_admin_form(settings, text);
        let response = self
            .http
            .post(format!("{API_BASE}/api/site_admin"))
            .form(&form)
            .send()
            .await?;
        let response = check_status(response, "update description", subreddit).await?;

        let result: SiteAdminResponse = response.json().await?;
        if !result.json.errors.is_empty() {
            return Err(Error::Platform(format!(
                "update description on /r/{}: {}",
                subreddit,
                Value::Array(result.json.errors)
            )));
        }
        Ok(())
    }

    async fn text_areas(&self, subreddit: &str) -> Result<Vec<TextArea>> {
        let response = self
            .http
            .get(format!("{API_BASE}/r/{subreddit}/api/widgets"))
            .query(&[("progressive_images", "true"), ("raw_json", "1")])
            .send()
            .await?;
        let response = check_status(response, "list widgets", subreddit).await?;
        let widgets: WidgetsResponse = response.json().await?;
        Ok(sidebar_text_areas(widgets))
    }

    async fn update_text_area(
        &self,
        subreddit: &str,
        widget: &TextArea,
        text: &str,
    ) -> Result<()> {
        let mut body = json!({
            "kind": "textarea",
            "shortName": widget.short_name,
            "text": text,
        });
        if let Some(styles) = &widget.styles {
            body["styles"] = styles.clone();
        }

        let response = self
            .http
            .put(format!("{API_BASE}/r/{subreddit}/api/widget/{}", widget.id))
            .query(&[("raw_json", "1")])
            .json(&body)
            .send()
            .await?;
        check_status(response, "update widget", subreddit).await?;
        Ok(())
    }
}

async fn check_status(
    response: Response,
    context: &'static str,
    subreddit: &str,
) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::FORBIDDEN => Err(Error::Forbidden(format!(
            "{} on /r/{}",
            context, subreddit
        ))),
        StatusCode::NOT_FOUND => Err(Error::NotFound(format!(
            "{} on /r/{}",
            context, subreddit
        ))),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Api {
                context,
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// A null or absent description is an empty sidebar, not missing settings.
fn settings_description(settings: &Map<String, Value>) -> String {
    match settings.get("description") {
        Some(Value::String(description)) => description.clone(),
        _ => String::new(),
    }
}

/// Builds the `site_admin` form from the current settings with a new description.
///
/// The settings endpoint and `site_admin` disagree on a few key names.
fn site_admin_form(
    mut settings: Map<String, Value>,
    description: &str,
) -> Vec<(String, String)> {
    const RENAMES: [(&str, &str); 4] = [
        ("default_set", "allow_top"),
        ("language", "lang"),
        ("content_options", "link_type"),
        ("subreddit_id", "sr"),
    ];
    for (from, to) in RENAMES {
        if let Some(value) = settings.remove(from) {
            settings.insert(to.to_string(), value);
        }
    }
    settings.insert("description".into(), Value::String(description.to_string()));
    settings.insert("api_type".into(), Value::String("json".into()));

    settings
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key, value))
        })
        .collect()
}

fn sidebar_text_areas(mut widgets: WidgetsResponse) -> Vec<TextArea> {
    widgets
        .layout
        .sidebar
        .order
        .iter()
        .filter_map(|id| widgets.items.remove(id))
        .filter(|item| item["kind"] == "textarea")
        .filter_map(|item| {
            Some(TextArea {
                id: item["id"].as_str()?.to_string(),
                short_name: item["shortName"].as_str().unwrap_or_default().to_string(),
                text: item["text"].as_str().unwrap_or_default().to_string(),
                styles: item.get("styles").filter(|s| !s.is_null()).cloned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_the_operator() {
        let ua = build_user_agent("modbot");
        assert!(ua.contains(":twitchup:"));
        assert!(ua.ends_with("(by /u/modbot)"));
    }

    #[test]
    fn null_or_absent_description_reads_as_empty() {
        let Value::Object(null) = json!({"description": null, "title": "t"}) else {
            unreachable!()
        };
        let Value::Object(absent) = json!({"title": "t"}) else {
            unreachable!()
        };
        let Value::Object(set) = json!({"description": "## Streams"}) else {
            unreachable!()
        };

        assert_eq!(settings_description(&null), "");
        assert_eq!(settings_description(&absent), "");
        assert_eq!(settings_description(&set), "## Streams");
    }

    #[test]
    fn site_admin_form_renames_keys_and_sets_description() {
        let settings = json!({
            "subreddit_id": "t5_abc",
            "language": "en",
            "default_set": true,
            "content_options": "any",
            "description": "old",
            "title": "Example",
            "wiki_edit_age": 0,
            "welcome_message_text": null,
            "comment_contribution_settings": {"allowed_media_types": null},
        });
        let Value::Object(settings) = settings else {
            unreachable!()
        };

        let form: std::collections::HashMap<_, _> =
            site_admin_form(settings, "new text").into_iter().collect();

        assert_eq!(form["sr"], "t5_abc");
        assert_eq!(form["lang"], "en");
        assert_eq!(form["allow_top"], "true");
        assert_eq!(form["link_type"], "any");
        assert_eq!(form["description"], "new text");
        assert_eq!(form["api_type"], "json");
        assert_eq!(form["wiki_edit_age"], "0");
        assert!(!form.contains_key("subreddit_id"));
        assert!(!form.contains_key("welcome_message_text"));
        assert!(!form.contains_key("comment_contribution_settings"));
    }

    #[test]
    fn keeps_only_sidebar_text_areas_in_order() {
        let widgets: WidgetsResponse = serde_json::from_value(json!({
            "items": {
                "w1": {"id": "w1", "kind": "textarea", "shortName": "Rules", "text": "be nice"},
                "w2": {"id": "w2", "kind": "community-list", "shortName": "Friends"},
                "w3": {"id": "w3", "kind": "textarea", "shortName": "Streams", "text": "",
                       "styles": {"headerColor": "#000000"}},
                "w4": {"id": "w4", "kind": "id-card", "shortName": "About"},
                "w5": {"id": "w5", "kind": "textarea", "shortName": "Topbar only", "text": ""}
            },
            "layout": {
                "idCardWidget": "w4",
                "sidebar": {"order": ["w3", "w2", "w1"]},
                "topbar": {"order": ["w5"]}
            }
        }))
        .unwrap();

        let areas = sidebar_text_areas(widgets);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].short_name, "Streams");
        assert_eq!(areas[0].styles, Some(json!({"headerColor": "#000000"})));
        assert_eq!(areas[1].id, "w1");
        assert_eq!(areas[1].text, "be nice");
    }
}
