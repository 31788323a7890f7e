use crate::{
    config::RuntimeConfiguration,
    error::{GetDatabaseConnectionSnafu, MigrateSnafu, OpenDatabaseSnafu, StagehandResult},
    uploads::UploadStore,
};
use snafu::ResultExt;
use sqlx::{Pool, Postgres, Transaction, pool::PoolConnection, postgres::PgPoolOptions};
use std::ops::Deref;

/// Everything a handler needs, built once in `main` and cloned into each request.
#[derive(Clone, Debug)]
pub struct StagehandState {
    pool: Pool<Postgres>,
    config: RuntimeConfiguration,
    uploads: UploadStore,
}

impl StagehandState {
    pub async fn new(config: RuntimeConfiguration) -> StagehandResult<Self> {
        let db_config = config.db_config();
        let pool = PgPoolOptions::new()
            .max_connections(db_config.max_connections())
            .connect(&db_config.get_db_path())
            .await
            .context(OpenDatabaseSnafu)?;

        sqlx::migrate!().run(&pool).await.context(MigrateSnafu)?;

        let uploads = UploadStore::new(config.upload_config()).await?;

        Ok(Self {
            pool,
            config,
            uploads,
        })
    }

    pub const fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub const fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub async fn get_connection(&self) -> StagehandResult<PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .context(GetDatabaseConnectionSnafu)
    }

    pub async fn get_transaction(&self) -> StagehandResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.context(GetDatabaseConnectionSnafu)
    }

    pub async fn sensible_shutdown(&self) {
        self.pool.close().await;
    }
}

impl Deref for StagehandState {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
