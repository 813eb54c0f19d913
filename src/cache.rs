use chrono::Utc;
use tokio_rusqlite::{params, Connection};

use crate::database;
use crate::error::Result;
use crate::template::TemplateKind;

/// Last rendered text per (subreddit, kind), kept between runs.
pub struct RenderCache {
    conn: Connection,
}

impl RenderCache {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = database::init_db(db_path).await?;
        Ok(Self { conn })
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = database::init_memory_db().await?;
        Ok(Self { conn })
    }

    pub async fn load(&self, subreddit: &str, kind: TemplateKind) -> Result<Option<String>> {
        let subreddit = subreddit.to_string();
        let body = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT body FROM rendered WHERE subreddit = ? AND kind = ?")?;
                let body = stmt.query_row(params![subreddit, kind.as_str()], |row| {
                    row.get::<_, String>(0)
                });
                match body {
                    Ok(body) => Ok(Some(body)),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            })
            .await?;
        Ok(body)
    }

    pub async fn store(&self, subreddit: &str, kind: TemplateKind, body: &str) -> Result<()> {
        let subreddit = subreddit.to_string();
        let body = body.to_string();
        let rendered_at = Utc::now().timestamp();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO rendered (subreddit, kind, body, rendered_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT (subreddit, kind)
                    DO UPDATE SET body = excluded.body, rendered_at = excluded.rendered_at",
                    params![subreddit, kind.as_str(), body, rendered_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_entry_loads_as_none() {
        let cache = RenderCache::in_memory().await.unwrap();
        let body = cache.load("rust", TemplateKind::Sidebar).await.unwrap();
        assert_eq!(body, None);
    }

    #[tokio::test]
    async fn store_overwrites_per_subreddit_and_kind() {
        let cache = RenderCache::in_memory().await.unwrap();
        cache.store("rust", TemplateKind::Sidebar, "one").await.unwrap();
        cache.store("rust", TemplateKind::Widget, "widget").await.unwrap();
        cache.store("rust", TemplateKind::Sidebar, "two").await.unwrap();

        let sidebar = cache.load("rust", TemplateKind::Sidebar).await.unwrap();
        let widget = cache.load("rust", TemplateKind::Widget).await.unwrap();
        let other = cache.load("golang", TemplateKind::Sidebar).await.unwrap();
        assert_eq!(sidebar.as_deref(), Some("two"));
        assert_eq!(widget.as_deref(), Some("widget"));
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let path = path.to_str().unwrap();

        let cache = RenderCache::open(path).await.unwrap();
        cache.store("rust", TemplateKind::Widget, "body").await.unwrap();
        cache.close().await.unwrap();

        let cache = RenderCache::open(path).await.unwrap();
        let body = cache.load("rust", TemplateKind::Widget).await.unwrap();
        assert_eq!(body.as_deref(), Some("body"));
    }
}
