use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the lock keeps its
// connection out of the pool until released. Guards against two processes
// refreshing the same database at once.
const REFRESH_LOCK_KEY: i64 = 0x4444_5253_4341_4E; // "DDRSCAN"

pub struct RefreshLock {
    conn: PoolConnection<Postgres>,
}

impl std::fmt::Debug for RefreshLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshLock")
            .field("key", &REFRESH_LOCK_KEY)
            .finish_non_exhaustive()
    }
}

pub async fn try_acquire_refresh_lock(pool: &sqlx::PgPool) -> anyhow::Result<Option<RefreshLock>> {
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for refresh lock")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(REFRESH_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={REFRESH_LOCK_KEY})"))?;

    Ok(acquired.0.then_some(RefreshLock { conn }))
}

impl RefreshLock {
    pub async fn release(self) -> anyhow::Result<()> {
        let mut conn = self.conn;
        let res = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(REFRESH_LOCK_KEY)
            .execute(&mut *conn)
            .await;

        if let Err(e) = res {
            // Ending the session drops the lock with it.
            drop(conn.detach());
            return Err(e).with_context(|| format!("failed to release advisory lock (key={REFRESH_LOCK_KEY})"));
        }
        Ok(())
    }
}
