use anyhow::{Context, Result};
use diesel::connection::Connection;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

/// One checked-out connection held for the lifetime of a single `AccountService`
/// entry point. Every store call inside `authorize`/`attach_account`/`resolve_conflict`
/// runs against this same connection so the merge decision and its mutations are
/// atomic against concurrent logins (see §5).
#[derive(Clone)]
pub struct DbConn {
    pool: PgPool,
}

impl DbConn {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn checkout(&self) -> Result<PgPooled> {
        self.pool
            .get()
            .context("failed to check out a database connection")
    }

    /// Runs `f` inside a single Diesel transaction on a blocking thread.
    /// `f` returning `Err` rolls the transaction back whole; this is the only
    /// place Diesel work happens off the async runtime's own threads.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().context("failed to check out a database connection")?;
            conn.transaction(|conn| f(conn))
        })
        .await
        .context("database task panicked")?
    }
}

#[tracing::instrument(skip_all)]
pub fn establish_pool(database_url: &str) -> Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .context("failed to build the database connection pool")
}
