//! `PostgreSQL` implementation of [`RequestStore`].
//!
//! Conditional writes are enforced in SQL so the guarantees hold across
//! processes sharing the database:
//!
//! - `close` is a single `UPDATE ... WHERE status <> 'closed'`
//! - `create_reopened` runs in a transaction holding a row lock on the
//!   original, so two exclusive reopens of the same record serialise and the
//!   second one sees the first one's successor

use crate::config::PostgresConfig;
use chrono::{DateTime, Utc};
use requestdesk_core::request::{NewRequest, Request, RequestClosure, RequestId, RequestStatus};
use requestdesk_core::request_store::{RequestStore, RequestStoreError, StoreFuture};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SELECT_REQUESTS: &str = "SELECT id, staff_username, description, admin_action, status, \
     submitted_at, closed_by_admin, original_closed_request_id FROM requests";

/// PostgreSQL-backed request store.
///
/// # Example
///
/// ```no_run
/// use requestdesk_postgres::{PostgresConfig, PostgresRequestStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresRequestStore::connect(&PostgresConfig::from_env()).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresRequestStore {
    pool: PgPool,
}

impl PostgresRequestStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestStoreError::Unavailable`] if the database cannot be
    /// reached.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, RequestStoreError> {
        let pool = config
            .connect()
            .await
            .map_err(|e| RequestStoreError::Unavailable(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`RequestStoreError::DatabaseError`] if migrations fail.
    pub async fn migrate(&self) -> Result<(), RequestStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RequestStoreError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select(
        &self,
        filter: &str,
        bind: Option<i64>,
    ) -> Result<Vec<Request>, RequestStoreError> {
        let sql = format!("{SELECT_REQUESTS} {filter}");
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(store_error)?;
        rows.iter().map(row_to_request).collect()
    }
}

impl RequestStore for PostgresRequestStore {
    fn create(&self, request: NewRequest) -> StoreFuture<'_, RequestId> {
        Box::pin(async move {
            let (id,): (i64,) = sqlx::query_as(
                r"
                INSERT INTO requests (staff_username, description, status, submitted_at)
                VALUES ($1, $2, 'pending', $3)
                RETURNING id
                ",
            )
            .bind(&request.staff_username)
            .bind(&request.description)
            .bind(request.timestamp)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

            tracing::debug!(request_id = id, "Inserted pending request");
            Ok(RequestId::new(id))
        })
    }

    fn create_reopened(
        &self,
        request: NewRequest,
        original: RequestId,
        exclusive: bool,
    ) -> StoreFuture<'_, Option<RequestId>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(store_error)?;

            let status: Option<(String,)> =
                sqlx::query_as("SELECT status FROM requests WHERE id = $1 FOR UPDATE")
                    .bind(original.value())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_error)?;

            // Dropping `tx` without commit rolls back and releases the lock
            if status.as_ref().map(|(s,)| s.as_str()) != Some(RequestStatus::Closed.as_str()) {
                rejected_write("create_reopened");
                return Ok(None);
            }

            if exclusive {
                let (has_successor,): (bool,) = sqlx::query_as(
                    "SELECT EXISTS (SELECT 1 FROM requests WHERE original_closed_request_id = $1)",
                )
                .bind(original.value())
                .fetch_one(&mut *tx)
                .await
                .map_err(store_error)?;

                if has_successor {
                    rejected_write("create_reopened");
                    return Ok(None);
                }
            }

            let (id,): (i64,) = sqlx::query_as(
                r"
                INSERT INTO requests
                    (staff_username, description, status, submitted_at, original_closed_request_id)
                VALUES ($1, $2, 'reopened', $3, $4)
                RETURNING id
                ",
            )
            .bind(&request.staff_username)
            .bind(&request.description)
            .bind(request.timestamp)
            .bind(original.value())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;

            tx.commit().await.map_err(store_error)?;

            tracing::debug!(
                request_id = id,
                original_id = original.value(),
                "Inserted reopened request"
            );
            Ok(Some(RequestId::new(id)))
        })
    }

    fn close(
        &self,
        id: RequestId,
        admin_action: String,
        admin_username: String,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE requests
                SET status = 'closed', admin_action = $2, closed_by_admin = $3
                WHERE id = $1 AND status <> 'closed'
                ",
            )
            .bind(id.value())
            .bind(admin_action)
            .bind(admin_username)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

            let closed = result.rows_affected() == 1;
            if !closed {
                rejected_write("close");
            }
            Ok(closed)
        })
    }

    fn get_by_id(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move {
            let sql = format!("{SELECT_REQUESTS} WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

            row.as_ref().map(row_to_request).transpose()
        })
    }

    fn get_active(&self) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(self.select(
            "WHERE status IN ('pending', 'reopened') ORDER BY submitted_at ASC, id ASC",
            None,
        ))
    }

    fn get_closed(&self) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(self.select(
            "WHERE status = 'closed' ORDER BY submitted_at DESC, id DESC",
            None,
        ))
    }

    fn get_reopens(&self, original: RequestId) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(self.select(
            "WHERE original_closed_request_id = $1 ORDER BY submitted_at ASC, id ASC",
            Some(original.value()),
        ))
    }
}

/// Classify a sqlx error: connection-level failures are `Unavailable`,
/// everything else is a `DatabaseError`.
fn store_error(error: sqlx::Error) -> RequestStoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => RequestStoreError::Unavailable(error.to_string()),
        other => RequestStoreError::DatabaseError(other.to_string()),
    }
}

fn rejected_write(operation: &'static str) {
    tracing::debug!(operation, "Conditional write matched no row");
    metrics::counter!("request_store_conditional_write_rejected_total", "operation" => operation)
        .increment(1);
}

fn row_to_request(row: &PgRow) -> Result<Request, RequestStoreError> {
    let id: i64 = row.try_get("id").map_err(store_error)?;
    let corrupt = |reason: String| RequestStoreError::CorruptRecord { id, reason };

    let status: String = row.try_get("status").map_err(store_error)?;
    let status = RequestStatus::parse(&status).map_err(|e| corrupt(e.to_string()))?;

    let admin_action: Option<String> = row.try_get("admin_action").map_err(store_error)?;
    let closed_by_admin: Option<String> = row.try_get("closed_by_admin").map_err(store_error)?;
    let closure = match (admin_action, closed_by_admin) {
        (Some(admin_action), Some(closed_by_admin)) => Some(RequestClosure {
            admin_action,
            closed_by_admin,
        }),
        (None, None) => None,
        _ => return Err(corrupt("only one closure column is set".to_string())),
    };

    let timestamp: DateTime<Utc> = row.try_get("submitted_at").map_err(store_error)?;
    let original: Option<i64> = row
        .try_get("original_closed_request_id")
        .map_err(store_error)?;

    let request = Request {
        id: RequestId::new(id),
        staff_username: row.try_get("staff_username").map_err(store_error)?,
        description: row.try_get("description").map_err(store_error)?,
        status,
        timestamp,
        closure,
        original_closed_request_id: RequestId::from_reference(original),
    };

    request.check_consistency().map_err(corrupt)?;
    Ok(request)
}
