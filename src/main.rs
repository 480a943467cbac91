mod clients;
mod database;
mod handlers;
mod models;
mod reviews;
mod settings;
mod subscriptions;
mod tracking;
mod visitor;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::env;
use std::sync::Arc;

use crate::clients::suggestions::SuggestionsClient;
use crate::database::Database;
use crate::handlers::PublicBaseUrl;
use crate::settings::SettingsService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "8082".to_string());
    let bind_address = format!("{}:{}", host, port);
    let public_base_url =
        env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000/r".to_string());

    let database_url = env::var("DATABASE_URL").map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "DATABASE_URL must be set in environment",
        )
    })?;

    let db = Database::connect(&database_url).await.map_err(|err| {
        log::error!("Failed to initialize database: {err:?}");
        std::io::Error::new(std::io::ErrorKind::Other, err)
    })?;

    let settings = SettingsService::new(Arc::new(db.clone()));
    let suggestions_client = SuggestionsClient::new(
        env::var("SUGGESTIONS_API_URL").ok(),
        env::var("OPENAI_API_KEY").ok(),
    );

    let db_data = web::Data::new(db);
    let settings_data = web::Data::new(settings);
    let suggestions_data = web::Data::new(suggestions_client);
    let base_url_data = web::Data::new(PublicBaseUrl(public_base_url));

    log::info!("🚀 Starting Review SAAS Service on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(db_data.clone())
            .app_data(settings_data.clone())
            .app_data(suggestions_data.clone())
            .app_data(base_url_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(
                web::scope("/api/v1")
                    // Health
                    .service(handlers::health_check)
                    // Public review pages
                    .service(handlers::get_public_settings)
                    .service(handlers::list_platforms)
                    .service(handlers::list_plans)
                    .service(handlers::get_qr_target)
                    .service(handlers::list_public_reviews)
                    .service(handlers::submit_review)
                    .service(handlers::get_review_suggestions)
                    .service(handlers::redirect_to_platform)
                    // Business management
                    .service(handlers::create_business)
                    .service(handlers::list_my_businesses)
                    .service(handlers::update_business)
                    .service(handlers::delete_business)
                    .service(handlers::upsert_business_platforms)
                    .service(handlers::get_business_analytics)
                    // Subscriptions
                    .service(handlers::get_current_subscription)
                    .service(handlers::create_subscription)
                    .service(handlers::activate_subscription)
                    .service(handlers::cancel_subscription)
                    .service(handlers::renew_subscription)
                    // Moderation & maintenance
                    .service(handlers::list_all_reviews)
                    .service(handlers::approve_review)
                    .service(handlers::disapprove_review)
                    .service(handlers::toggle_featured_review)
                    .service(handlers::delete_review)
                    .service(handlers::update_setting)
                    .service(handlers::sweep_subscriptions)
                    .service(handlers::purge_analytics)
                    // Catch-all slug route registered last
                    .service(handlers::get_review_page),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
