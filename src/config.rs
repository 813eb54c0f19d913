use crate::error::{Error, Result};

pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

pub struct TwitchCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Credentials for both platforms, read from the environment.
pub struct Config {
    pub reddit: RedditCredentials,
    pub twitch: TwitchCredentials,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(Error::MissingEnv(key))
        };

        Ok(Self {
            reddit: RedditCredentials {
                client_id: require("REDDIT_CLIENT_ID")?,
                client_secret: require("REDDIT_CLIENT_SECRET")?,
                username: require("REDDIT_USERNAME")?,
                password: require("REDDIT_PASSWORD")?,
            },
            twitch: TwitchCredentials {
                client_id: require("TWITCH_CLIENT_ID")?,
                client_secret: require("TWITCH_CLIENT_SECRET")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        [
            ("REDDIT_CLIENT_ID", "rid"),
            ("REDDIT_CLIENT_SECRET", "rsecret"),
            ("REDDIT_USERNAME", "modbot"),
            ("REDDIT_PASSWORD", "hunter2"),
            ("TWITCH_CLIENT_ID", "tid"),
            ("TWITCH_CLIENT_SECRET", "tsecret"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    #[test]
    fn reads_all_credentials() {
        let env = full_env();
        let config = Config::from_lookup(|key| env.get(key).cloned()).unwrap();
        assert_eq!(config.reddit.username, "modbot");
        assert_eq!(config.twitch.client_secret, "tsecret");
    }

    #[test]
    fn missing_or_blank_value_is_fatal() {
        let mut env = full_env();
        env.remove("TWITCH_CLIENT_ID");
        let err = Config::from_lookup(|key| env.get(key).cloned()).err().unwrap();
        assert!(matches!(err, Error::MissingEnv("TWITCH_CLIENT_ID")));

        let mut env = full_env();
        env.insert("REDDIT_PASSWORD", "  ".into());
        let err = Config::from_lookup(|key| env.get(key).cloned()).err().unwrap();
        assert!(matches!(err, Error::MissingEnv("REDDIT_PASSWORD")));
    }
}
