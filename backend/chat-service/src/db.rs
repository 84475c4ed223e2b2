use crate::config::DatabaseConfig;
use crate::error::AppError;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

// Embedded at compile time; each file is idempotent
const MIG_0001: &str = include_str!("../migrations/0001_create_conversations.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_messages.sql");

pub async fn init_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
    let pg_config: tokio_postgres::Config = config
        .url
        .parse()
        .map_err(|e| AppError::Config(format!("invalid DATABASE_URL: {e}")))?;

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(manager)
        .max_size(config.max_connections)
        .build()
        .map_err(|e| AppError::Config(format!("database pool: {e}")))?;

    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;
    for (i, sql) in [MIG_0001, MIG_0002].into_iter().enumerate() {
        client.batch_execute(sql).await?;
        tracing::info!(migration = i + 1, "chat-service migration applied");
    }
    Ok(())
}
