use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod handlers;

#[cfg(test)]
mod fuzz;

use error::Error;
use extractors::AppState;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(Debug, StructOpt)]
#[structopt(name = "postbook-server")]
struct Opt {
    /// Address to listen on
    #[structopt(long, env = "POSTBOOK_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, default_value = "10")]
    max_db_connections: u32,

    /// Seconds to wait for a free database connection before failing the request
    #[structopt(long, default_value = "30")]
    db_acquire_timeout: u64,
}

async fn create_sqlx_pool(opt: &Opt) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(opt.max_db_connections)
        .acquire_timeout(std::time::Duration::from_secs(opt.db_acquire_timeout))
        .connect(&opt.database_url)
        .await
        .with_context(|| format!("Error opening database {:?}", opt.database_url))
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/users", post(handlers::register))
        .route("/auth", get(handlers::whoami).post(handlers::auth))
        .route("/unauth", post(handlers::unauth))
        .route("/profile", put(handlers::update_profile))
        .route("/profile/me", get(handlers::whoami))
        .route("/profile/user/:id", get(handlers::fetch_profile))
        .route(
            "/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/posts/:id",
            get(handlers::get_post).delete(handlers::delete_post),
        )
        .route("/posts/like/:id", put(handlers::like_post))
        .route("/posts/unlike/:id", put(handlers::unlike_post))
        .route("/posts/comment/:id", post(handlers::add_comment))
        .route(
            "/posts/comment/:id/:comment_id",
            delete(handlers::delete_comment),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();

    let db = create_sqlx_pool(&opt).await?;
    MIGRATOR
        .run(&db)
        .await
        .context("running database migrations")?;

    let app = app(AppState { pool: db });

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
