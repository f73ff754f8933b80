use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};

use taskrelay::broker::{declare_topology, establish};
use taskrelay::store::PgStore;
use taskrelay::{AppState, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let store = PgStore::connect(&config.database_url).await.map_err(|e| {
        log::error!("Failed to connect to database: {}", e);
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e.to_string())
    })?;
    store.migrate().await.map_err(|e| {
        log::error!("{}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let broker = establish(&config.broker_url, &config.broker_retry).await;
    if let Err(e) = declare_topology(broker.as_ref(), &config.services).await {
        log::warn!("Queue topology incomplete: {}", e);
    }

    let state = AppState::new(&config, Arc::new(store), Arc::clone(&broker));

    log::info!(
        "Starting taskrelay ({:?}) at {}",
        config.services,
        config.server_url()
    );
    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(|cfg| state.mount(cfg))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run();

    let result = server.await;

    if let Err(e) = broker.close().await {
        log::warn!("Error while closing broker connection: {}", e);
    }
    result
}
