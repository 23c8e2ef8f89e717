// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::sync::Arc;

use backend_common::{
    api::router,
    auth::{
        AuthCaches, AuthPipeline, FirebaseVerifier, PrincipalResolver, PrincipalStore, Verifiers,
    },
    config::Settings,
    logging::{init_tracing, install_panic_hook},
    state::AppState,
    store::{InMemoryPrincipalStore, PgPrincipalStore},
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_env()?;
    init_tracing(settings.log_format)?;
    install_panic_hook();

    let consumer = FirebaseVerifier::new(settings.identity.consumer())?;
    let backoffice = FirebaseVerifier::new(settings.identity.backoffice())?;

    let store: Arc<dyn PrincipalStore> = match &settings.database.url {
        Some(url) => Arc::new(PgPrincipalStore::connect_lazy(
            url,
            settings.database.max_connections,
            settings.auth.upstream_timeout,
        )?),
        None => {
            warn!("DATABASE_URL not set, using an empty in-memory principal store");
            Arc::new(InMemoryPrincipalStore::new())
        }
    };

    let resolver = PrincipalResolver::new(store).with_tables(
        settings.database.consumer_table.clone(),
        settings.database.backoffice_table.clone(),
    );

    let pipeline = AuthPipeline::new(
        AuthCaches::initialize(&settings.auth.caches),
        Verifiers::new(Arc::new(consumer), Arc::new(backoffice)),
        resolver,
    )
    .with_upstream_timeout(settings.auth.upstream_timeout)
    .with_public_paths(settings.auth.public_paths.clone());

    let state = AppState::new(pipeline, settings.service.clone());
    let app = router(state, settings.server.request_timeout);

    let addr = settings.server.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        service = %settings.service.name,
        env = %settings.service.environment,
        "listening (docs at /docs)"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
