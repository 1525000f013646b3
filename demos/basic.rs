//! Basic example showing how to use sea-orm-commenter.
//!
//! Uses a mock connection so it runs without a database:
//! cargo run --example basic

use sea_orm::{ConnectionTrait, DbBackend, MockDatabase, MockExecResult, Statement};
use sea_orm_commenter::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sea_orm_commenter=trace".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = MockDatabase::new(DbBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 1,
            rows_affected: 1,
        }])
        .into_connection()
        .with_commenter_config(CommenterConfig::default().with_application("demo"));

    // In a real service this comes from your HTTP middleware, with the
    // traceparent of the active request span.
    let ctx = QueryContext::new()
        .with_traceparent(QueryContext::w3c_traceparent(
            "5bd66ef5095369c7b0d1f8f4bd33716a",
            "c532cb4098ac3dd2",
            true,
        ))
        .with_controller("orders")
        .with_action("create");

    with_context(ctx, async {
        db.execute(Statement::from_string(
            DbBackend::Postgres,
            "INSERT INTO orders (total) VALUES (42)",
        ))
        .await
    })
    .await?;

    // The mock records what would have reached the server.
    for entry in db.into_inner().into_transaction_log() {
        tracing::info!("statement issued: {entry:?}");
    }

    Ok(())
}
