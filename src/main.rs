//src/main.rs

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod policy;
mod services;

use crate::common::db_utils::{install_declarative_policy, verify_role_separation};
use crate::config::{AppState, Settings};
use crate::db::PgStore;
use crate::docs::ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Inicializa o logger (RUST_LOG controla o nível; padrão "info").
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let settings = Settings::from_env()?;

    let pool = settings.connect(&settings.database_url).await?;
    let privileged_pool = settings.connect(&settings.privileged_database_url).await?;
    tracing::info!("✅ Conexões com o banco de dados estabelecidas!");

    // Migrações e política rodam com o papel dono das tabelas.
    sqlx::migrate!().run(&privileged_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    install_declarative_policy(&privileged_pool).await?;
    // Um papel sujeito que ignora a política anularia o caminho declarativo.
    verify_role_separation(&pool, &privileged_pool).await?;

    let geography = Arc::new(settings.load_geography(&privileged_pool).await?);
    tracing::info!("🗺️ Geografia de referência carregada: {} unidades", geography.len());

    let store = Arc::new(PgStore::new(pool, privileged_pool));
    let app_state = AppState::new(
        store,
        geography,
        settings.jwt_secret.clone(),
        settings.propagation_chunk_size,
    );
    let shutdown = app_state.shutdown.clone();

    let app = handlers::router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Inicia o servidor
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Falha ao escutar o sinal de desligamento: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Desligando: cancelando diagnósticos em andamento");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
