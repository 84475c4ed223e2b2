use actix_web::{web, App, HttpServer};
use chat_service::{
    config, db, error, logging, routes,
    services::{HttpMediaClient, HttpProfileClient, JwtIdentityResolver},
    state::{AppState, Backends},
    storage::{ConversationStore, MemoryStore, MessageLog, PostgresStore},
};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

async fn storage_backends(
    cfg: &config::Config,
) -> Result<(Arc<dyn ConversationStore>, Arc<dyn MessageLog>), error::AppError> {
    match &cfg.database {
        Some(database) => {
            let pool = db::init_pool(database)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            let store = Arc::new(PostgresStore::new(pool));
            let conversations: Arc<dyn ConversationStore> = store.clone();
            let messages: Arc<dyn MessageLog> = store;
            Ok((conversations, messages))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-process store; data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            let conversations: Arc<dyn ConversationStore> = store.clone();
            let messages: Arc<dyn MessageLog> = store;
            Ok((conversations, messages))
        }
    }
}

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let (conversations, messages) = storage_backends(&cfg).await?;
    let identity = Arc::new(JwtIdentityResolver::from_rsa_pem(&cfg.jwt_public_key_pem)?);
    let media = Arc::new(HttpMediaClient::new(
        &cfg.media_service_url,
        cfg.http_client_timeout,
    )?);
    let profiles = Arc::new(HttpProfileClient::new(
        &cfg.user_service_url,
        cfg.http_client_timeout,
    )?);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let state = AppState::new(
        cfg,
        Backends {
            conversations,
            messages,
            media,
            profiles,
            identity,
        },
    );
    let registry = state.registry.clone();

    tracing::info!(%bind_addr, "starting chat-service");

    let server_state = state.clone();
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(server_state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind REST: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("REST server: {e}")))?;

    registry.close_all("server shutting down").await;
    tracing::info!("chat-service stopped");
    Ok(())
}
