use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::twitch::LiveStatus;

lazy_static! {
    pub static ref PLACEHOLDER: Regex = Regex::new(r"tool\((\w+)\)").unwrap();
}

pub const ONLINE_TITLE: &str = "twitch-online";
pub const OFFLINE_TITLE: &str = "twitch-offline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Sidebar,
    Widget,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 2] = [TemplateKind::Sidebar, TemplateKind::Widget];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Sidebar => "sidebar",
            TemplateKind::Widget => "widget",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            TemplateKind::Sidebar => "sidebar.md",
            TemplateKind::Widget => "widget.md",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    pub subreddit: String,
    pub kind: TemplateKind,
    pub text: String,
}

/// Reads `<dir>/<subreddit>/{sidebar,widget}.md`. Missing files are not an error.
pub async fn load_templates(dir: &Path) -> Result<Vec<Template>> {
    let mut subreddits = vec![];
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        subreddits.push(entry.file_name().to_string_lossy().into_owned());
    }
    subreddits.sort();

    let mut templates = vec![];
    for subreddit in subreddits {
        for kind in TemplateKind::ALL {
            let path = dir.join(&subreddit).join(kind.file_name());
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    info!("Obtained {} template for /r/{}.", kind, subreddit);
                    templates.push(Template {
                        subreddit: subreddit.clone(),
                        kind,
                        text,
                    });
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(templates)
}

/// Every distinct channel referenced by a placeholder in any template.
pub fn channel_names<'a, I>(templates: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a Template>,
{
    templates
        .into_iter()
        .flat_map(|template| PLACEHOLDER.captures_iter(&template.text))
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn markdown_link(channel: &str, live: bool) -> String {
    let title = if live { ONLINE_TITLE } else { OFFLINE_TITLE };
    format!("[{channel}](https://twitch.tv/{channel} '{title}')")
}

/// Replaces every `tool(<name>)` placeholder with a status-tagged Markdown link.
///
/// The output is rebuilt in one pass from the match spans, so generated links are
/// never scanned again. Fails if a placeholder names a channel absent from `live`.
pub fn render(template: &str, live: &LiveStatus) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let channel = &caps[1];
        let is_live = live
            .is_live(channel)
            .ok_or_else(|| Error::UnresolvedChannel(channel.to_string()))?;

        let link = markdown_link(channel, is_live);
        debug!("Replaced {:?} with {:?}.", whole.as_str(), link);

        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&link);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);

    Ok(rendered.trim().to_string())
}
