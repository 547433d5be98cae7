use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use secrecy::Secret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

use crate::config::{DatabaseSettings, Settings};
use crate::email_client::EmailClient;
use crate::routes::{
    handle_inbound_webhook, handle_send_weekly, handle_signup, health_check, method_not_allowed,
};

/// Webhook signing secret shared with the email provider, injected into the
/// inbound endpoint instead of being read from process-wide state.
pub struct WebhookSecret(pub Secret<String>);

/// Token required to trigger a manual weekly send.
pub struct ManualSendSecret(pub Secret<String>);

pub struct Application {
    pub port: u16,
    pub server: Server,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, std::io::Error> {
        let db_pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(2))
            .connect_lazy_with(config.get_db_options());
        let sender_email = config
            .get_email_client_sender()
            .expect("Sender email is not valid");
        let email_client = EmailClient::new(
            config.get_email_client_base_url(),
            sender_email,
            config.get_email_client_api(),
            None,
        );

        let listener =
            TcpListener::bind(config.get_address()).expect("Failed to bind the address.");
        let port = listener.local_addr().unwrap().port();
        let server = run(
            listener,
            db_pool,
            email_client,
            config.get_webhook_secret(),
            config.get_manual_send_secret(),
        )?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    db_pool: PgPool,
    email_client: EmailClient,
    webhook_secret: Secret<String>,
    manual_send_secret: Secret<String>,
) -> Result<Server, std::io::Error> {
    let db_pool = web::Data::new(db_pool);
    let email_client = web::Data::new(email_client);
    let webhook_secret = web::Data::new(WebhookSecret(webhook_secret));
    let manual_send_secret = web::Data::new(ManualSendSecret(manual_send_secret));

    let server = HttpServer::new(move || {
        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .service(
                web::resource("/health_check")
                    .route(web::get().to(health_check))
                    .default_service(web::route().to(|| async { method_not_allowed("GET") })),
            )
            .service(
                web::resource("/signup")
                    .route(web::post().to(handle_signup))
                    .default_service(web::route().to(|| async { method_not_allowed("POST") })),
            )
            .service(
                web::resource("/prompts/send-weekly")
                    .route(web::post().to(handle_send_weekly))
                    .default_service(web::route().to(|| async { method_not_allowed("POST") })),
            )
            .service(
                web::resource("/webhooks/resend/inbound")
                    .route(web::post().to(handle_inbound_webhook))
                    .default_service(web::route().to(|| async { method_not_allowed("POST") })),
            )
            .app_data(db_pool.clone())
            .app_data(email_client.clone())
            .app_data(webhook_secret.clone())
            .app_data(manual_send_secret.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
