#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::single_match_else, clippy::missing_errors_doc)]

use crate::{
    auth::session_store::SessionStore,
    config::RuntimeConfiguration,
    data::admin::Admin,
    routes::{
        admin::{delete_clear_database, get_statistics},
        conventions::{
            get_all_conventions, get_convention_download, get_generate_convention,
            get_my_conventions, post_upload_convention, put_convention_status,
        },
        import_export::{get_export, post_import},
        index::get_index_route,
        login::{post_login, post_logout, post_register, post_verify},
        profile::get_profile,
        students::{delete_student, get_students, post_student, put_student},
    },
    state::StagehandState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[macro_use]
extern crate tracing;

mod auth;
mod config;
mod convention_document;
mod data;
mod error;
mod roster;
mod routes;
mod state;
mod uploads;

/// Room for the multipart framing around a maximum-size file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

async fn shutdown_signal(state: StagehandState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!("signal received, starting graceful shutdown");
    state.sensible_shutdown().await;
}

fn spawn_session_purge(state: StagehandState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if state.is_closed() {
                break;
            }

            let purged = match state.get_connection().await {
                Ok(mut conn) => SessionStore::delete_expired(&mut conn).await,
                Err(e) => Err(e),
            };
            match purged {
                Ok(0) => {}
                Ok(count) => info!(count, "Purged expired sessions"),
                Err(e) => warn!(?e, "Unable to purge expired sessions"),
            }
        }
    });
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("not loading .env: {e}");
    }

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .expect("unable to set tracing subscriber");

    info!("`tracing` online");

    let config = RuntimeConfiguration::new().expect("unable to create config");
    let state = StagehandState::new(config.clone())
        .await
        .expect("unable to create state");

    {
        let mut conn = state
            .get_connection()
            .await
            .expect("unable to get connection for bootstrap");
        let auth_config = config.auth_config();
        let default_admin = &auth_config.default_admin;
        if let Some(password) = Admin::ensure_default(default_admin, &mut conn)
            .await
            .expect("unable to create default admin")
        {
            // stderr only, never through the log pipeline
            eprintln!(
                "default admin {} created with password {}",
                default_admin.email,
                password.expose_secret()
            );
        }
    }

    spawn_session_purge(state.clone());

    let body_limit = state.uploads().max_bytes() + MULTIPART_OVERHEAD;

    let api = Router::new()
        .route("/", get(get_index_route))
        .route("/auth/login", post(post_login))
        .route("/auth/register", post(post_register))
        .route("/auth/verify", post(post_verify))
        .route("/auth/logout", post(post_logout))
        .route("/admin/students", get(get_students).post(post_student))
        .route(
            "/admin/students/{id}",
            put(put_student).delete(delete_student),
        )
        .route("/admin/clear-database", delete(delete_clear_database))
        .route("/admin/import", post(post_import))
        .route("/admin/export", get(get_export))
        .route("/admin/statistics", get(get_statistics))
        .route("/admin/conventions", get(get_all_conventions))
        .route("/admin/conventions/{id}/status", put(put_convention_status))
        .route(
            "/admin/convention/{id}/download",
            get(get_convention_download),
        )
        .route("/student/profile", get(get_profile))
        .route("/student/conventions", get(get_my_conventions))
        .route(
            "/student/convention/generate",
            get(get_generate_convention),
        )
        .route(
            "/student/convention/{id}/upload",
            post(post_upload_convention),
        );

    let app = Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let server_ip = config::optional_var("STAGEHAND_SERVER_IP")
        .ok()
        .flatten()
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let listener = TcpListener::bind(&server_ip)
        .await
        .expect("unable to listen on server ip");

    info!(?server_ip, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("unable to serve app");
}
