use anyhow::{Context, Result};
use clap::Parser;
use kvscheme::api::{ApiNode, Dispatcher, Request, Response, hash_list};
use kvscheme::schema::{fields, hash, range, set};
use kvscheme::{Client, ContainerOps, Cx, Schema, StoreConfig};
use serde_json::{Value as JsonValue, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kvscheme")]
#[command(about = "Demo API serving rooms and stories from the key-value store")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "KVSCHEME_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Database (keyspace) to serve
    #[arg(long, env = "KVSCHEME_DATABASE")]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.database {
        Some(database) => StoreConfig::new().database(database),
        None => StoreConfig::from_env(),
    };
    let client = Client::connect(config)
        .await
        .context("failed to open store")?;

    let dispatcher = Arc::new(Dispatcher::new(demo_api(client.cx())?));
    let app = kvscheme::web::router(dispatcher)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(bind_addr = %cli.bind, database = %client.config().database, "kvscheme started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// `rooms/[room]/stories` as a hash list, plus a room index
fn demo_api(cx: Cx) -> Result<ApiNode> {
    let schema = Arc::new(Schema::define(fields([(
        "rooms",
        set([fields([("stories", range([hash([])]))])]),
    )]))?);

    let stories = {
        let schema = Arc::clone(&schema);
        hash_list(
            cx.clone(),
            move |req: &Request| {
                let room = req.require_param("room")?;
                let rooms = schema.field("rooms")?.into_set()?;
                Ok(rooms.item(room).field("stories")?.into_range()?)
            },
            "[story]",
        )?
    };

    let rooms = move |_req: Request, res: Response| {
        let cx = cx.clone();
        let schema = Arc::clone(&schema);
        async move {
            let rooms = schema.field("rooms")?.into_set()?;
            let names: Vec<JsonValue> = rooms.members(&cx).await?.into_iter().map(JsonValue::from).collect();
            res.json(&json!({ "rooms": names }))?;
            Ok(())
        }
    };

    Ok(ApiNode::new().route(
        "rooms",
        ApiNode::new()
            .get(rooms)
            .route("[room]", ApiNode::new().route("stories", stories)),
    ))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kvscheme=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
