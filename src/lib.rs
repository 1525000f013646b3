//! # sea-orm-commenter
//!
//! sqlcommenter-style query tagging for SeaORM database operations.
//!
//! This crate appends a machine-parseable trailing comment to every SQL
//! statement issued through a [`CommentedConnection`], so database server
//! logs (slow-query logs, `pg_stat_activity`, audit logs) can be correlated
//! with the application request or trace that issued the query:
//!
//! ```sql
//! SELECT "orders".* FROM "orders" /* action='create',controller='orders',db_driver='postgresql',traceparent='00-5bd66ef5095369c7b0d1f8f4bd33716a-c532cb4098ac3dd2-01' */
//! ```
//!
//! ## Features
//!
//! - **Ambient Context**: Establish a [`QueryContext`] once per request with
//!   [`with_context`]; every query inside the request observes it, with no
//!   parameter threading
//! - **Async-Safe**: Context follows the asynchronous call chain and never
//!   leaks between concurrent requests; [`propagate`] carries it across
//!   `tokio::spawn` boundaries
//! - **Deterministic Output**: Tags are emitted sorted and percent-encoded,
//!   so equal tag sets always produce byte-identical comments
//! - **Injection-Safe**: Values are encoded over a conservative allowlist; a
//!   value containing `*/` or quotes cannot terminate the comment early
//! - **Operator Control**: Per-tag opt-out and a size bound with
//!   priority-based truncation via [`CommenterConfig`]
//! - **Drop-In**: [`CommentedConnection`] implements `ConnectionTrait`,
//!   `StreamTrait`, and `TransactionTrait`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sea_orm::Database;
//! use sea_orm_commenter::prelude::*;
//!
//! let db = Database::connect("postgres://localhost/mydb").await?;
//! let db = db.with_commenter();
//!
//! let ctx = QueryContext::new()
//!     .with_traceparent(QueryContext::w3c_traceparent(trace_id, span_id, true))
//!     .with_controller("orders")
//!     .with_action("create");
//!
//! with_context(ctx, async {
//!     // Every query in here carries the comment
//!     Orders::find().all(&db).await
//! })
//! .await?;
//! ```
//!
//! ## Emitted Tags
//!
//! | Tag | Source |
//! |-----|--------|
//! | `traceparent` | [`QueryContext`], opaque W3C trace context |
//! | `tracestate` | [`QueryContext`] |
//! | `controller`, `action`, `route` | [`QueryContext`] |
//! | `framework`, `application` | [`QueryContext`] or static [`CommenterConfig`] tags |
//! | `db_driver` | The wrapped connection's backend |
//!
//! Any tag can be disabled by name through
//! [`CommenterConfig::with_tag_enabled`]; high-cardinality tags like `route`
//! are the usual candidates.

mod comment;
mod config;
mod connection;
mod context;
mod error;
mod tags;

pub use comment::{annotate, serialize};
pub use config::CommenterConfig;
pub use connection::{CommentedConnection, CommenterExt};
pub use context::{
    active_contexts, current_context, propagate, set_context, with_context, QueryContext,
};
pub use error::CommentError;
pub use tags::{names, TagMap, TagSource, TagValue};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        current_context, propagate, with_context, CommentedConnection, CommenterConfig,
        CommenterExt, QueryContext, TagMap, TagSource, TagValue,
    };
}
