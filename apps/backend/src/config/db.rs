use db_infra::EngineConfig;

use crate::config::settings::Settings;

/// Engine options derived from settings. Statement echo follows `DEBUG`;
/// the testing pool policy follows `APP_ENV=testing`.
pub fn engine_config(settings: &Settings) -> EngineConfig {
    EngineConfig::new(settings.database_url.clone())
        .with_pool(settings.database_pool_size, settings.database_max_overflow)
        .with_echo(settings.debug)
        .with_testing(settings.is_testing())
        .with_application_name(settings.app_name.clone())
}
