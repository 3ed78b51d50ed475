//! Intake API.
//!
//! Three endpoints: submit a share, poll a job, health check. Responses
//! carry job status and the recorded error history, never raw internals.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;

use crate::queue::Dispatcher;
use crate::repository::DbContext;

/// Shared state for the intake API.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub ctx: DbContext,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, ctx: DbContext) -> Self {
        Self { dispatcher, ctx }
    }
}

/// Start the intake API server.
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr: SocketAddr = bind_addr.parse()?;
    tracing::info!("intake API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
