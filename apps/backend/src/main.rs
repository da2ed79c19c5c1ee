use actix_web::{web, App, HttpServer};
use scribe_backend::infra::state::build_state;
use scribe_backend::{cors_middleware, get_settings, health, telemetry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = match get_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Failed to load settings: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = telemetry::init_tracing(settings) {
        eprintln!("❌ Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    tracing::info!(
        app = %settings.app_name,
        env = settings.app_env.as_str(),
        host = %settings.api_host,
        port = settings.api_port,
        "server=starting"
    );

    let app_state = match build_state()
        .with_settings(settings.clone())
        .with_schema()
        .build()
        .await
    {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "server=state_build_failed");
            eprintln!("❌ Failed to build application state: {e}");
            std::process::exit(1);
        }
    };

    if let Some(engine) = app_state.db() {
        if !scribe_backend::test_connection(engine).await {
            tracing::warn!("server=starting_without_database");
        }
    }

    let data = web::Data::new(app_state);
    let prefix = settings.api_prefix.clone();
    let origins = settings.cors_origins.clone();
    let allow_credentials = settings.cors_allow_credentials;

    HttpServer::new(move || {
        App::new()
            .wrap(cors_middleware(&origins, allow_credentials))
            .app_data(data.clone())
            .service(web::scope(&prefix).configure(health::configure))
    })
    .bind((settings.api_host.as_str(), settings.api_port))?
    .run()
    .await
}
