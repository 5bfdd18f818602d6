use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use karani_core::config::{AppConfig, ConfigError, LoadOptions};
use karani_db::repositories::{
    SqlClientRepository, SqlDocumentRepository, SqlExpenseRepository, SqlMembershipRepository,
    SqlTenantRepository,
};
use karani_db::{connect_with_settings, migrations, DbPool};
use karani_transport::sender::MessageSender;
use karani_transport::{TwilioSender, WhatsappSender};

use crate::dispatch::Dispatcher;
use crate::engine::{Deps, Engine};
use crate::renderer::{DocumentRenderer, RenderError, TeraRenderer};
use crate::webhooks::AppState;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("renderer initialization failed: {0}")]
    Renderer(#[from] RenderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let deps = Deps {
        tenants: Arc::new(SqlTenantRepository::new(db_pool.clone())),
        memberships: Arc::new(SqlMembershipRepository::new(db_pool.clone())),
        clients: Arc::new(SqlClientRepository::new(db_pool.clone())),
        documents: Arc::new(SqlDocumentRepository::new(db_pool.clone())),
        expenses: Arc::new(SqlExpenseRepository::new(db_pool.clone())),
        country_code: config.dialog.default_country_code.clone(),
        trial_days: config.dialog.trial_days,
    };

    let renderer: Arc<dyn DocumentRenderer> = match TeraRenderer::new(
        &config.render.template_dir,
        &config.render.output_dir,
        &config.server.public_base_url,
    ) {
        Ok(renderer) => Arc::new(renderer),
        Err(error) => {
            warn!(error = %error, "template directory unusable; using the embedded template");
            Arc::new(TeraRenderer::with_embedded_template(
                &config.render.output_dir,
                &config.server.public_base_url,
            )?)
        }
    };

    let twilio: Option<Arc<dyn MessageSender>> = config
        .twilio
        .enabled
        .then(|| Arc::new(TwilioSender::new(&config.twilio)) as Arc<dyn MessageSender>);
    let whatsapp: Option<Arc<dyn MessageSender>> = config
        .whatsapp
        .enabled
        .then(|| Arc::new(WhatsappSender::new(&config.whatsapp)) as Arc<dyn MessageSender>);

    info!(
        event_name = "system.bootstrap.transports",
        twilio = config.twilio.enabled,
        whatsapp = config.whatsapp.enabled,
        "transport senders initialized"
    );

    let config = Arc::new(config);
    let state = AppState {
        engine: Arc::new(Engine::new(deps)),
        dispatcher: Arc::new(Dispatcher::new(twilio, whatsapp, renderer)),
        config: Arc::clone(&config),
    };

    Ok(Application { config, db_pool, state })
}
