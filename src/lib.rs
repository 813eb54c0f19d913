use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod publish;
pub mod reddit;
pub mod template;
pub mod twitch;

use cache::RenderCache;
use config::Config;
pub use error::{Error, Result};
use publish::Publisher;
use reddit::RedditClient;
use twitch::HelixClient;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(about, version)]
pub struct Args {
    /// Level to emit logging output at.
    #[clap(short, long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Where to find templates.
    #[clap(short, long, default_value = "templates")]
    pub template_directory: PathBuf,

    /// SQLite file remembering the last rendered text, to skip unchanged updates.
    #[clap(short, long)]
    pub cache_path: Option<String>,
}

/// One full refresh: load templates, check streams, publish what changed.
pub async fn run(args: &Args, config: &Config) -> Result<()> {
    let templates = template::load_templates(&args.template_directory).await?;
    let channels = template::channel_names(&templates);

    let helix = HelixClient::connect(&config.twitch).await?;
    let live = twitch::resolve_live(&helix, &channels).await?;

    let reddit = RedditClient::connect(&config.reddit).await?;
    let cache = match &args.cache_path {
        Some(path) => Some(RenderCache::open(path).await?),
        None => None,
    };

    Publisher::new(&reddit, cache.as_ref())
        .publish_all(&templates, &live)
        .await?;

    if let Some(cache) = cache {
        cache.close().await?;
    }
    info!("Done.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let args = Args::parse_from(["twitchup"]);
        assert_eq!(args.log_level, LogLevel::Info);
        assert_eq!(args.template_directory, PathBuf::from("templates"));
        assert_eq!(args.cache_path, None);
    }

    #[test]
    fn parses_short_flags_case_insensitively() {
        let args = Args::parse_from(["twitchup", "-l", "DEBUG", "-t", "tpl", "-c", "c.sqlite"]);
        assert_eq!(args.log_level, LogLevel::Debug);
        assert_eq!(args.template_directory, PathBuf::from("tpl"));
        assert_eq!(args.cache_path.as_deref(), Some("c.sqlite"));
    }
}
