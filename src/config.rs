// src/config.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, path::PathBuf, str::FromStr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{GeographyRepository, RegistryStore},
    models::geography::GeoUnit,
    services::{AccessService, DiagnosticService, GeographyService, PropagationService, ReportService},
};

/// Configuração lida do ambiente (e do `.env`, se existir).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Papel sujeito à política de linha.
    pub database_url: String,
    /// Papel que ignora a política de linha (caminho privilegiado, migrações).
    pub privileged_database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub propagation_chunk_size: usize,
    pub geography_seed_path: Option<PathBuf>,
}

fn var_or<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} inválida: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Os dois caminhos precisam de papéis diferentes; sem a URL privilegiada a
/// aplicação não sobe.
fn privileged_url(database_url: &str, privileged: Option<String>) -> anyhow::Result<String> {
    let url = privileged.context("PRIVILEGED_DATABASE_URL deve ser definida (papel com BYPASSRLS)")?;
    if url.trim() == database_url.trim() {
        anyhow::bail!("PRIVILEGED_DATABASE_URL deve usar um papel diferente do de DATABASE_URL");
    }
    Ok(url)
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let privileged_database_url =
            privileged_url(&database_url, env::var("PRIVILEGED_DATABASE_URL").ok())?;

        Ok(Self {
            database_url,
            privileged_database_url,
            jwt_secret,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000".to_string())?,
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 5)?,
            db_acquire_timeout: Duration::from_secs(var_or("DB_ACQUIRE_TIMEOUT_SECS", 3)?),
            propagation_chunk_size: var_or("PROPAGATION_CHUNK_SIZE", 500usize)?.max(1),
            geography_seed_path: env::var("GEOGRAPHY_SEED_PATH").ok().map(PathBuf::from),
        })
    }

    pub async fn connect(&self, url: &str) -> anyhow::Result<PgPool> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let pool = PgPoolOptions::new()
            .max_connections(self.db_max_connections)
            .acquire_timeout(self.db_acquire_timeout)
            .connect(url)
            .await?;
        Ok(pool)
    }

    /// Geografia de referência: o arquivo de carga (gravado na tabela antes)
    /// ou a tabela `geo_units` como está.
    pub async fn load_geography(&self, pool: &PgPool) -> anyhow::Result<GeographyService> {
        if let Some(path) = &self.geography_seed_path {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("não foi possível ler {}", path.display()))?;
            let units: Vec<GeoUnit> =
                serde_json::from_str(&raw).with_context(|| format!("JSON inválido em {}", path.display()))?;

            let mut tx = pool.begin().await?;
            let written = GeographyRepository::upsert_all(&mut tx, &units).await?;
            tx.commit().await?;
            tracing::info!("🗺️ {} unidades geográficas gravadas a partir de {}", written, path.display());
        }

        let units = GeographyRepository::load_all(pool).await?;
        Ok(GeographyService::from_units(units))
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub geography: Arc<GeographyService>,
    pub jwt_secret: String,
    /// Cancelado no desligamento; diagnósticos em andamento param.
    pub shutdown: CancellationToken,

    pub access_service: AccessService,
    pub propagation_service: PropagationService,
    pub report_service: ReportService,
    pub diagnostic_service: DiagnosticService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        geography: Arc<GeographyService>,
        jwt_secret: String,
        propagation_chunk_size: usize,
    ) -> Self {
        // --- Monta o gráfico de dependências ---
        Self {
            access_service: AccessService::new(store.clone()),
            propagation_service: PropagationService::new(store.clone(), geography.clone(), propagation_chunk_size),
            report_service: ReportService::new(store.clone()),
            diagnostic_service: DiagnosticService::new(store, geography.clone()),
            geography,
            jwt_secret,
            shutdown: CancellationToken::new(),
        }
    }
}
