use std::{env, path::PathBuf};

use crate::error::AppError;

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_root: PathBuf,
    pub log_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid SERVER_PORT: {err}")))?;

        let storage_root =
            PathBuf::from(env::var("STASHD_STORAGE_ROOT").unwrap_or_else(|_| "./uploads".into()));

        let log_dir = PathBuf::from(env::var("STASHD_LOG_DIR").unwrap_or_else(|_| "./log".into()));

        let max_upload_bytes = match env::var("STASHD_MAX_UPLOAD_BYTES") {
            Ok(value) => value
                .parse::<u64>()
                .map_err(|err| AppError::Config(format!("invalid STASHD_MAX_UPLOAD_BYTES: {err}")))?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            host,
            port,
            storage_root,
            log_dir,
            max_upload_bytes,
        })
    }
}
