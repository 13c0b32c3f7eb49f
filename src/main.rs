use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use clap::Parser;
use movierec::{init_tracing, AppState, Config, RawId, Recommendation, RecommenderError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve movie recommendations from a trained checkpoint", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

fn error_response<T>(e: RecommenderError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match e {
        RecommenderError::UnknownUser(_) | RecommenderError::UnknownMovie(_) => StatusCode::NOT_FOUND,
        _ => {
            tracing::error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

#[derive(Debug, Serialize, Deserialize)]
struct ScoreResponse {
    user_id: RawId,
    movie_id: RawId,
    score: f32,
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, serde_json::Value>>> {
    let mut status = state.serving.health_check();
    status.insert("status".to_string(), "healthy".into());
    status.insert("service".to_string(), "movierec".into());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").into());

    Json(ApiResponse::success(status))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<RawId>,
) -> ApiResult<Vec<Recommendation>> {
    state
        .serving
        .top_k(user_id)
        .await
        .map(|recs| Json(ApiResponse::success(recs)))
        .map_err(error_response)
}

async fn get_score(
    State(state): State<AppState>,
    Path((user_id, movie_id)): Path<(RawId, RawId)>,
) -> ApiResult<ScoreResponse> {
    state
        .serving
        .score(user_id, movie_id)
        .await
        .map(|score| {
            Json(ApiResponse::success(ScoreResponse {
                user_id,
                movie_id,
                score,
            }))
        })
        .map_err(error_response)
}

async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, u64>>> {
    Json(ApiResponse::success(state.serving.get_serving_stats()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommend/:user_id", get(get_recommendations))
        .route("/score/:user_id/:movie_id", get(get_score))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    info!("Starting movierec server with config: {:?}", config.server);

    let addr = config.server.socket_addr()?;
    let state = AppState::new(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
