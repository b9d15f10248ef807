use dotenvy::dotenv;
use payment_proxy::config::Config;
use payment_proxy::{build_server, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    env_logger::init_from_env(
        env_logger::Env::default().default_filter_or(config.server.log_level.as_str()),
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    log::info!(
        "Source store {}, processing store {} ({})",
        config.source.base_url,
        config.processing.base_url,
        config.server.environment.as_str()
    );

    let state = AppState::from_config(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    log::info!("Starting server at http://{}:{}", host, port);

    build_server(state, &host, port)?.await
}
