use actix_web::{middleware, web, App, HttpServer};
use residents_api::{audit, routes, AppState, Settings, Store};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let settings = Settings::from_env().expect("Invalid configuration");
    audit::init_logging(&settings)?;

    log::info!("residents-api {} starting", residents_api::VERSION);

    // ========================================================================
    // Database Setup
    // ========================================================================

    log::info!("Connecting to {}", settings.database_url);
    let store = Store::connect(&settings.database_url, settings.db_max_connections)
        .await
        .expect("Failed to open database");
    store.migrate().await.expect("Failed to run migrations");

    // ========================================================================
    // Server Configuration
    // ========================================================================

    let bind_address = settings.bind_address();
    if settings.tokens.is_empty() {
        log::warn!("API_TOKENS is empty; every /api request will be rejected");
    }
    let app_state = web::Data::new(AppState::new(store, settings));

    log::info!("Starting server at http://{}", bind_address);
    log::info!("Endpoints: GET /health, GET|POST /api/data/, GET|PUT|DELETE /api/data/{{id}}/");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
