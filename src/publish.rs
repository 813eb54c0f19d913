use tracing::{error, info, warn};

use crate::cache::RenderCache;
use crate::error::{Error, Result};
use crate::reddit::{ContentPlatform, STREAMS_WIDGET_NAME};
use crate::template::{render, Template, TemplateKind};
use crate::twitch::LiveStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// At least one remote write happened.
    Updated,
    /// The remote (or the cache) already holds the rendered text.
    Unchanged,
    /// Some `Streams` widgets were updated while others failed.
    Partial,
    /// Nothing could be written, e.g. no settings or no `Streams` widget.
    Skipped,
}

/// Renders templates and writes them only where the text actually changed.
pub struct Publisher<'a, P: ContentPlatform + ?Sized> {
    platform: &'a P,
    cache: Option<&'a RenderCache>,
}

impl<'a, P: ContentPlatform + ?Sized> Publisher<'a, P> {
    pub fn new(platform: &'a P, cache: Option<&'a RenderCache>) -> Self {
        Self { platform, cache }
    }

    /// Publishes every template, isolating per-template platform failures.
    ///
    /// Only an unresolved placeholder aborts the loop.
    pub async fn publish_all(&self, templates: &[Template], live: &LiveStatus) -> Result<()> {
        for template in templates {
            match self.publish(template, live).await {
                Ok(_) => {}
                Err(err @ Error::UnresolvedChannel(_)) => return Err(err),
                Err(err) if err.is_permission_or_missing() => {
                    warn!(
                        "Skipping {} on /r/{}: {}",
                        template.kind, template.subreddit, err
                    );
                }
                Err(err) => {
                    error!(
                        "Unable to publish {} on /r/{}: {}",
                        template.kind, template.subreddit, err
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn publish(&self, template: &Template, live: &LiveStatus) -> Result<PublishOutcome> {
        let rendered = render(&template.text, live)?;
        let rendered = rendered.as_str();
        let subreddit = template.subreddit.as_str();

        if let Some(cache) = self.cache {
            if cache.load(subreddit, template.kind).await?.as_deref() == Some(rendered) {
                info!(
                    "Omitting {} update on {:?} as the cached render is identical.",
                    template.kind, subreddit
                );
                return Ok(PublishOutcome::Unchanged);
            }
        }

        let outcome = match template.kind {
            TemplateKind::Sidebar => self.publish_sidebar(subreddit, rendered).await?,
            TemplateKind::Widget => self.publish_widget(subreddit, rendered).await?,
        };

        if matches!(outcome, PublishOutcome::Updated | PublishOutcome::Unchanged) {
            if let Some(cache) = self.cache {
                cache.store(subreddit, template.kind, rendered).await?;
            }
        }
        Ok(outcome)
    }

    async fn publish_sidebar(&self, subreddit: &str, rendered: &str) -> Result<PublishOutcome> {
        let Some(current) = self.platform.description(subreddit).await? else {
            warn!(
                "No subreddit settings found for {:?}, skipping sidebar.",
                subreddit
            );
            return Ok(PublishOutcome::Skipped);
        };

        if current == rendered {
            info!(
                "Omitting sidebar update on {:?} as no changes would be done.",
                subreddit
            );
            return Ok(PublishOutcome::Unchanged);
        }

        self.platform.update_description(subreddit, rendered).await?;
        info!("Updated sidebar on {:?} with new stream data.", subreddit);
        Ok(PublishOutcome::Updated)
    }

    async fn publish_widget(&self, subreddit: &str, rendered: &str) -> Result<PublishOutcome> {
        let mut matched = 0;
        let mut current = 0;
        let mut updated = 0;

        for widget in self.platform.text_areas(subreddit).await? {
            if widget.short_name != STREAMS_WIDGET_NAME {
                info!(
                    "Skipping non-stream text area {:?} on {:?}.",
                    widget.short_name, subreddit
                );
                continue;
            }
            matched += 1;

            if widget.text == rendered {
                info!(
                    "Omitting widget update on {:?} as no changes would be done.",
                    subreddit
                );
                current += 1;
                continue;
            }

            match self
                .platform
                .update_text_area(subreddit, &widget, rendered)
                .await
            {
                Ok(()) => {
                    info!("Rendered sidebar widget update on {:?}.", subreddit);
                    updated += 1;
                    current += 1;
                }
                Err(err) if err.is_permission_or_missing() => {
                    warn!(
                        "Not allowed to update widget {} on {:?}: {}",
                        widget.id, subreddit, err
                    );
                }
                Err(err) => {
                    error!(
                        "Unable to update sidebar widget {} on {:?}: {:?}",
                        widget.id, subreddit, err
                    );
                }
            }
        }

        Ok(match (matched, updated) {
            (0, _) => {
                warn!(
                    "No {:?} text area found on {:?}.",
                    STREAMS_WIDGET_NAME, subreddit
                );
                PublishOutcome::Skipped
            }
            (_, 0) if current < matched => PublishOutcome::Skipped,
            _ if current < matched => PublishOutcome::Partial,
            (_, 0) => PublishOutcome::Unchanged,
            _ => PublishOutcome::Updated,
        })
    }
}
