//! Commented database connection wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    AccessMode, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    ExecResult, IsolationLevel, QueryResult, Statement, StreamTrait, TransactionError,
    TransactionTrait,
};

use crate::comment;
use crate::config::CommenterConfig;
use crate::context;
use crate::tags::{names, TagMap, TagSource};

/// A commenting wrapper around SeaORM's `DatabaseConnection`.
///
/// This wrapper implements `ConnectionTrait`, `StreamTrait`, and
/// `TransactionTrait`, making it a drop-in replacement for
/// `DatabaseConnection`. Every statement dispatched through it gets a
/// sqlcommenter trailing comment assembled from the ambient
/// [`QueryContext`](crate::QueryContext) (if one is established), the
/// backend's `db_driver` tag, and the static tags of its
/// [`CommenterConfig`].
///
/// Comment construction never fails a query: if the codec rejects the tag
/// mapping, the failure is logged and the statement is issued unannotated.
///
/// Share a wrapper between tasks by putting it in an `Arc`;
/// `DatabaseConnection` itself is not `Clone` under every sea-orm feature
/// set, so the wrapper does not derive it.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use sea_orm_commenter::{with_context, CommentedConnection, QueryContext};
///
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let db = CommentedConnection::from(db);
///
/// let ctx = QueryContext::new().with_traceparent(traceparent);
/// with_context(ctx, async {
///     // Issued as: SELECT ... /* db_driver='postgresql',traceparent='...' */
///     Users::find().all(&db).await
/// })
/// .await?;
/// ```
#[derive(Debug)]
pub struct CommentedConnection {
    inner: DatabaseConnection,
    config: Arc<CommenterConfig>,
}

impl CommentedConnection {
    /// Create a new commented connection with the given configuration.
    pub fn new(connection: DatabaseConnection, config: CommenterConfig) -> Self {
        Self {
            inner: connection,
            config: Arc::new(config),
        }
    }

    /// Create a new commented connection with default configuration.
    pub fn wrap(connection: DatabaseConnection) -> Self {
        Self::new(connection, CommenterConfig::default())
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    /// Get the commenter configuration.
    pub fn config(&self) -> &CommenterConfig {
        &self.config
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    pub fn into_inner(self) -> DatabaseConnection {
        self.inner
    }

    /// The `db_driver` tag value for this backend.
    fn db_driver(&self) -> &'static str {
        match self.inner.get_database_backend() {
            DbBackend::Postgres => "postgresql",
            DbBackend::MySql => "mysql",
            DbBackend::Sqlite => "sqlite",
        }
    }

    /// Assemble the tag mapping for one outgoing statement.
    fn comment_tags(&self) -> TagMap {
        let mut tags = match context::current_context() {
            Some(ctx) => ctx.tags(),
            None => TagMap::new(),
        };
        tags.set(names::DB_DRIVER, self.db_driver());
        self.config.apply(tags)
    }

    /// Append the comment, or return the SQL unchanged if the codec refuses.
    pub(crate) fn annotated_sql(&self, sql: &str) -> String {
        let tags = self.comment_tags();
        match comment::annotate(sql, &tags) {
            Ok(annotated) => {
                if annotated.len() > sql.len() {
                    tracing::trace!(tag_count = tags.len(), "appended query comment");
                }
                annotated
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "failed to build query comment; issuing unannotated statement"
                );
                sql.to_owned()
            }
        }
    }

    fn annotated_statement(&self, stmt: Statement) -> Statement {
        Statement {
            sql: self.annotated_sql(&stmt.sql),
            values: stmt.values,
            db_backend: stmt.db_backend,
        }
    }
}

impl From<DatabaseConnection> for CommentedConnection {
    fn from(connection: DatabaseConnection) -> Self {
        Self::wrap(connection)
    }
}

impl AsRef<DatabaseConnection> for CommentedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

#[async_trait]
impl ConnectionTrait for CommentedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        self.inner.execute(self.annotated_statement(stmt)).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        let sql = self.annotated_sql(sql);
        self.inner.execute_unprepared(&sql).await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        self.inner.query_one(self.annotated_statement(stmt)).await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        self.inner.query_all(self.annotated_statement(stmt)).await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

impl StreamTrait for CommentedConnection {
    type Stream<'a> = <DatabaseConnection as StreamTrait>::Stream<'a>;

    fn stream<'a>(
        &'a self,
        stmt: Statement,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Stream<'a>, DbErr>> + 'a + Send>> {
        self.inner.stream(self.annotated_statement(stmt))
    }
}

// Statements issued inside a `DatabaseTransaction` go through SeaORM
// directly and are not annotated; the transaction boundary itself carries
// no comment.
#[async_trait]
impl TransactionTrait for CommentedConnection {
    async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        self.inner.begin().await
    }

    async fn begin_with_config(
        &self,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<DatabaseTransaction, DbErr> {
        self.inner
            .begin_with_config(isolation_level, access_mode)
            .await
    }

    async fn transaction<F, T, E>(&self, callback: F) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        self.inner.transaction(callback).await
    }

    async fn transaction_with_config<F, T, E>(
        &self,
        callback: F,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        self.inner
            .transaction_with_config(callback, isolation_level, access_mode)
            .await
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait CommenterExt {
    /// Wrap this connection with query commenting.
    fn with_commenter(self) -> CommentedConnection;

    /// Wrap this connection with a custom commenter configuration.
    fn with_commenter_config(self, config: CommenterConfig) -> CommentedConnection;
}

impl CommenterExt for DatabaseConnection {
    fn with_commenter(self) -> CommentedConnection {
        CommentedConnection::wrap(self)
    }

    fn with_commenter_config(self, config: CommenterConfig) -> CommentedConnection {
        CommentedConnection::new(self, config)
    }
}
