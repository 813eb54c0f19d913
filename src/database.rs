use tokio_rusqlite::{Connection, Result};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS rendered (
    subreddit TEXT NOT NULL,
    kind TEXT NOT NULL,
    body TEXT NOT NULL,
    rendered_at INTEGER NOT NULL,
    PRIMARY KEY (subreddit, kind)
    )";

pub async fn init_db(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path).await?;
    create_schema(&conn).await?;
    Ok(conn)
}

pub async fn init_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory().await?;
    create_schema(&conn).await?;
    Ok(conn)
}

async fn create_schema(conn: &Connection) -> Result<()> {
    conn.call(|conn| {
        conn.execute(SCHEMA, [])?;
        Ok(())
    })
    .await
}
