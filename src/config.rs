use crate::error::{
    BadEnvVarSnafu, ParseBoolEnvVarSnafu, ParseNumberEnvVarSnafu, StagehandError,
    StagehandResult,
};
use dotenvy::var;
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use std::{env::VarError, path::PathBuf, sync::Arc};

pub mod auth;

use auth::AuthConfig;

#[derive(Clone, Debug)]
pub struct RuntimeConfiguration {
    db_config: Arc<DbConfig>,
    auth_config: Arc<AuthConfig>,
    upload_config: Arc<UploadConfig>,
    import_config: ImportConfig,
}

impl RuntimeConfiguration {
    pub fn new() -> StagehandResult<Self> {
        Ok(Self {
            db_config: Arc::new(DbConfig::new()?),
            auth_config: Arc::new(AuthConfig::new()?),
            upload_config: Arc::new(UploadConfig::new()?),
            import_config: ImportConfig::new()?,
        })
    }

    pub fn db_config(&self) -> Arc<DbConfig> {
        self.db_config.clone()
    }

    pub fn auth_config(&self) -> Arc<AuthConfig> {
        self.auth_config.clone()
    }

    pub fn upload_config(&self) -> Arc<UploadConfig> {
        self.upload_config.clone()
    }

    pub const fn import_config(&self) -> ImportConfig {
        self.import_config
    }
}

pub(crate) fn optional_var(name: &'static str) -> StagehandResult<Option<String>> {
    match var(name) {
        Ok(value) => Ok(Some(value)),
        Err(dotenvy::Error::EnvVar(VarError::NotPresent)) => Ok(None),
        Err(source) => Err(StagehandError::BadEnvVar { source, name }),
    }
}

pub(crate) fn number_var_or(name: &'static str, default: u64) -> StagehandResult<u64> {
    optional_var(name)?.map_or(Ok(default), |value| {
        value.trim().parse().context(ParseNumberEnvVarSnafu { name })
    })
}

pub(crate) fn bool_var_or(name: &'static str, default: bool) -> StagehandResult<bool> {
    optional_var(name)?.map_or(Ok(default), |value| {
        value
            .trim()
            .to_ascii_lowercase()
            .parse()
            .context(ParseBoolEnvVarSnafu { name })
    })
}

#[derive(Debug)]
pub struct DbConfig {
    user: String,
    password: SecretString,
    path: String,
    port: u16,
    database: String,
    max_connections: u32,
}

impl DbConfig {
    pub fn new() -> StagehandResult<Self> {
        let get_env_var = |name| var(name).context(BadEnvVarSnafu { name });

        Ok(Self {
            user: get_env_var("DB_USER")?,
            password: SecretString::from(get_env_var("DB_PASSWORD")?),
            path: get_env_var("DB_PATH")?,
            port: get_env_var("DB_PORT")?
                .parse()
                .context(ParseNumberEnvVarSnafu { name: "DB_PORT" })?,
            database: get_env_var("DB_NAME")?,
            max_connections: u32::try_from(number_var_or("DB_MAX_CONNECTIONS", 15)?)
                .unwrap_or(u32::MAX),
        })
    }

    pub fn get_db_path(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.path,
            self.port,
            self.database
        )
    }

    pub const fn max_connections(&self) -> u32 {
        self.max_connections
    }
}

/// How the roster importer treats identities and failures.
#[derive(Debug, Clone, Copy)]
pub struct ImportConfig {
    /// Compare (and store) emails lower-cased. IDs are always case-sensitive.
    pub email_case_insensitive: bool,
    /// Run the whole batch in one transaction instead of committing row by row.
    pub transactional: bool,
}

impl ImportConfig {
    pub fn new() -> StagehandResult<Self> {
        let default = Self::default();
        Ok(Self {
            email_case_insensitive: bool_var_or(
                "IMPORT_EMAIL_CASE_INSENSITIVE",
                default.email_case_insensitive,
            )?,
            transactional: bool_var_or("IMPORT_TRANSACTIONAL", default.transactional)?,
        })
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            email_case_insensitive: true,
            transactional: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub directory: PathBuf,
    pub max_bytes: usize,
}

impl UploadConfig {
    pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

    pub fn new() -> StagehandResult<Self> {
        let directory = optional_var("UPLOADS_DIR")?.map_or_else(|| PathBuf::from("uploads"), PathBuf::from);
        let max_bytes = number_var_or("MAX_UPLOAD_BYTES", Self::DEFAULT_MAX_BYTES as u64)?;

        Ok(Self {
            directory,
            max_bytes: usize::try_from(max_bytes).unwrap_or(usize::MAX),
        })
    }
}
