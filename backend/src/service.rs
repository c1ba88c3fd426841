// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use sqlx::{Executor, PgPool};
use thiserror::Error;

use crate::{
    errors::StorageError,
    settings::{DatabaseSettings, Settings},
};

#[derive(Debug, Error)]
pub enum ServiceCreationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Service initialization failed: {0}")]
    InitializationFailed(Box<dyn std::error::Error + Send + Sync>),
}

impl From<sqlx::Error> for ServiceCreationError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(StorageError::from(e))
    }
}

impl From<sqlx::migrate::MigrateError> for ServiceCreationError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(StorageError::from(e))
    }
}

/// Bootstrap shared by the backend services: create the database if it does
/// not exist yet, run the migrations, then initialize the service itself.
#[async_trait]
pub trait BackendService: Sized {
    async fn new(settings: &Settings) -> Result<Self, ServiceCreationError> {
        let db_pool = prepare_database(&settings.database).await?;
        Self::new_from_pool(db_pool, settings).await
    }

    async fn new_from_pool(db_pool: PgPool, settings: &Settings) -> Result<Self, ServiceCreationError> {
        tracing::info!("Running database migration");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Database migration successful");

        Self::initialize(db_pool, settings).await
    }

    async fn initialize(db_pool: PgPool, settings: &Settings)
        -> Result<Self, ServiceCreationError>;
}

async fn prepare_database(
    database_settings: &DatabaseSettings,
) -> Result<PgPool, ServiceCreationError> {
    let connection =
        PgPool::connect(&database_settings.connection_string_without_database()).await?;

    let db_name = database_settings.name.as_str();
    let db_exists: bool = sqlx::query_scalar(
        "select exists (
            SELECT datname FROM pg_catalog.pg_database WHERE datname = $1
        )",
    )
    .bind(db_name)
    .fetch_one(&connection)
    .await?;

    if !db_exists {
        connection
            .execute(format!(r#"CREATE DATABASE "{}";"#, db_name).as_str())
            .await?;
        tracing::info!("Successfully created database {}", db_name);
    }

    let db_pool = PgPool::connect(&database_settings.connection_string()).await?;
    Ok(db_pool)
}
