use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::settings::{LogFormat, Settings};
use crate::error::AppError;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber: stdout in `LOG_FORMAT`, plus an appending
/// JSON file when `LOG_FILE_PATH` is set. `RUST_LOG` overrides the level
/// derived from settings.
pub fn init_tracing(settings: &Settings) -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(settings)))
        .map_err(|e| AppError::config(format!("invalid log filter: {e}")))?;

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer(settings.log_format)];
    if let Some(path) = settings.log_file_path.as_deref() {
        layers.push(file_layer(Path::new(path))?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| AppError::internal(format!("failed to install tracing subscriber: {e}")))
}

/// `LOG_LEVEL` as a filter directive. Driver chatter is held at `warn` unless
/// `DEBUG` asks for statement echo.
pub fn default_directives(settings: &Settings) -> String {
    let level = match settings.log_level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    };

    if settings.debug {
        format!("{level},actix_web=info,sqlx::query=debug")
    } else {
        format!("{level},actix_web=info,sqlx=warn,sea_orm=warn")
    }
}

fn stdout_layer(format: LogFormat) -> BoxedLayer {
    let layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    match format {
        LogFormat::Json => layer.with_ansi(false).json().boxed(),
        LogFormat::Console => layer.boxed(),
    }
}

fn file_layer(path: &Path) -> Result<BoxedLayer, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(fmt::layer()
        .with_ansi(false)
        .json()
        .with_writer(Mutex::new(file))
        .boxed())
}
