pub mod folders;
pub mod ignore_store;
pub mod settings;
pub mod workspaces;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use settings::Storage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub window_size: (f64, f64),
    pub window_position: (f64, f64),
    /// Reopen the last opened folder when the application starts.
    pub restore_last_folder: bool,
}

impl AppConfig {
    pub fn load(storage: &Storage) -> Result<Self> {
        settings::load_config(storage)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_size: (1200.0, 800.0),
            window_position: (100.0, 100.0),
            restore_last_folder: true,
        }
    }
}
