pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod storage;

use storage::Storage;

pub struct AppState {
    pub storage: Storage,
}
