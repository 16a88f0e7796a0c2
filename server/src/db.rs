//! Leaderboard persistence in Postgres.
//!
//! Retirement records are produced on the game executor and must never block
//! it, so they are pushed onto an unbounded channel and written by a
//! dedicated worker task. A failed write is kept and retried when the next
//! record arrives; leaderboard trouble is an operational concern, never a
//! game-client error.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use game::RetiredPlayer;

/// Environment variable holding the Postgres connection URL.
pub const DB_URL_ENV: &str = "GAME_DB_URL";

/// One leaderboard row.
#[derive(Debug, sqlx::FromRow)]
pub struct RecordRow {
    pub name: String,
    /// Seconds.
    pub total_time: f64,
    pub score: i32,
}

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect using `GAME_DB_URL`; a missing variable is fatal at startup.
    pub async fn connect_from_env() -> anyhow::Result<Self> {
        let url = std::env::var(DB_URL_ENV)
            .with_context(|| format!("{DB_URL_ENV} environment variable not found"))?;
        let capacity = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        let pool = PgPoolOptions::new()
            .max_connections(capacity)
            .connect(&url)
            .await
            .context("cannot connect to the database")?;
        Ok(Self { pool })
    }

    /// Pool handle that defers connecting until first use. Router tests run
    /// against this without a live database.
    #[cfg(test)]
    pub(crate) fn connect_lazy(url: &str) -> Self {
        let pool = PgPoolOptions::new()
            .connect_lazy(url)
            .expect("invalid database url");
        Self { pool }
    }

    pub async fn init_schema(&self) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS retired_players (
                id SERIAL PRIMARY KEY,
                name varchar(100) NOT NULL,
                total_time double precision NOT NULL,
                score int NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_retired_players_score_time_name
            ON retired_players (score DESC, total_time ASC, name ASC);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_player(&self, record: &RetiredPlayer) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retired_players (name, total_time, score)
            VALUES ($1, $2, $3);
            "#,
        )
        .bind(&record.name)
        .bind(record.play_time)
        .bind(record.score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Leaderboard page ordered by score, then time in game, then name.
    pub async fn records(&self, start: i64, max_items: i64) -> sqlx::Result<Vec<RecordRow>> {
        sqlx::query_as(
            r#"
            SELECT name, total_time, score
            FROM retired_players
            ORDER BY score DESC, total_time ASC, name ASC
            OFFSET $1 LIMIT $2;
            "#,
        )
        .bind(start)
        .bind(max_items)
        .fetch_all(&self.pool)
        .await
    }
}

/// Consume retirement records until every sender is dropped, then flush.
pub fn spawn_retirement_worker(
    db: Db,
    mut records: UnboundedReceiver<RetiredPlayer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: Vec<RetiredPlayer> = Vec::new();
        while let Some(record) = records.recv().await {
            pending.push(record);
            let mut unsaved = Vec::new();
            for record in pending.drain(..) {
                match db.save_player(&record).await {
                    Ok(()) => {
                        info!(name = %record.name, score = record.score, "retired player saved")
                    }
                    Err(err) => {
                        warn!(%err, name = %record.name, "leaderboard write failed, will retry");
                        unsaved.push(record);
                    }
                }
            }
            pending = unsaved;
        }
        for record in pending {
            if let Err(err) = db.save_player(&record).await {
                error!(%err, name = %record.name, "dropping unsaved leaderboard record");
            }
        }
    })
}
