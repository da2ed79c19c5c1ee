pub mod db;
pub mod settings;

pub use settings::{get_settings, AppEnv, LogFormat, Secret, Settings};
