use crate::{
    errors::AppError,
    semantic::{
        query::QueryResult, IndexSnapshot, IndexStorage, QueryEngine, QueryError, ScoringMode,
    },
    tags::{self, TagList},
    thumbnails::ThumbnailResolver,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tokio::signal;

/// Everything a request handler needs. The index itself sits behind the
/// snapshot so `/reload` can swap it.
pub struct SharedState {
    pub snapshot: Arc<IndexSnapshot>,
    pub engine: QueryEngine,
    pub storage: IndexStorage,
    pub thumbnails: ThumbnailResolver,
    pub tags_path: PathBuf,
    pub static_images_dir: PathBuf,
    pub api_top_k: usize,
    pub similar_top_k: usize,
}

pub fn router(state: Arc<SharedState>) -> Router {
    let images = tower_http::services::ServeDir::new(&state.static_images_dir);

    Router::new()
        .nest_service("/images", images)
        .route("/search", post(search))
        .route("/similar", post(similar))
        .route("/tags", get(curated_tags))
        .route("/health", get(health))
        .route("/reload", post(reload))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
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

    log::warn!("shutting down");
}

async fn start_app(state: SharedState, addr: &str) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(state: SharedState, addr: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(state, addr).await })
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::Query(QueryError::EmptyQuery | QueryError::EmptyStyleCode) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Query(QueryError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Query(QueryError::Provider(_) | QueryError::DimensionMismatch { .. })
            | AppError::Storage(_)
            | AppError::Tags(_)
            | AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<QueryResult>,
    pub total_found: usize,
}

impl SharedState {
    fn with_thumbnails(&self, mut results: Vec<QueryResult>) -> Vec<QueryResult> {
        for result in results.iter_mut() {
            result.thumbnails = Some(self.thumbnails.resolve(&result.sref_code));
        }
        results
    }
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let query = payload.query.trim().to_string();
        let top_k = payload.top_k.unwrap_or(state.api_top_k);

        let index = state.snapshot.current();
        let results = state.engine.search(&index, &query, top_k)?;
        let results = state.with_thumbnails(results);

        Ok(SearchResponse {
            query,
            total_found: results.len(),
            results,
        }
        .into())
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimilarRequest {
    #[serde(default)]
    pub sref_code: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarResponse {
    pub reference_sref: String,
    pub results: Vec<QueryResult>,
    pub total_found: usize,
}

async fn similar(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SimilarRequest>,
) -> Result<Json<SimilarResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let sref_code = payload.sref_code.trim().to_string();
        let top_k = payload.top_k.unwrap_or(state.similar_top_k);

        let index = state.snapshot.current();
        let results = state.engine.find_similar(&index, &sref_code, top_k)?;
        let results = state.with_thumbnails(results);

        Ok(SimilarResponse {
            reference_sref: sref_code,
            total_found: results.len(),
            results,
        }
        .into())
    })
}

async fn curated_tags(State(state): State<Arc<SharedState>>) -> Result<Json<TagList>, HttpError> {
    tokio::task::block_in_place(move || Ok(tags::load_tags(&state.tags_path)?.into()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub index_loaded: bool,
    pub sref_count: usize,
    pub scoring: ScoringMode,
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    let sref_count = state.snapshot.current().len();

    HealthResponse {
        status: "healthy".to_string(),
        index_loaded: state.snapshot.is_loaded(),
        sref_count,
        scoring: state.engine.mode(),
    }
    .into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub sref_count: usize,
}

async fn reload(State(state): State<Arc<SharedState>>) -> Result<Json<ReloadResponse>, HttpError> {
    tokio::task::block_in_place(move || {
        let sref_count = state.snapshot.reload(&state.storage)?;
        log::info!("reloaded search index with {sref_count} SREF codes");
        Ok(ReloadResponse { sref_count }.into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{index::SearchIndexEntry, SearchIndex};
    use crate::thumbnails::PlaceholderSource;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn entry(code: &str, vector: Vec<f32>, captions: &str) -> SearchIndexEntry {
        SearchIndexEntry {
            style_code: code.to_string(),
            vector,
            summary: "Visual style analysis completed".to_string(),
            image_count: 2,
            combined_captions: captions.to_string(),
        }
    }

    fn sample_index() -> SearchIndex {
        let mut index = SearchIndex::new();
        index.insert(entry("1001", vec![1.0, 0.0], "a red flower")).unwrap();
        index.insert(entry("2002", vec![0.8, 0.2], "a misty forest")).unwrap();
        index.insert(entry("3003", vec![0.0, 1.0], "neon city at night")).unwrap();
        index
    }

    fn state_fields(dir: &std::path::Path, engine: QueryEngine) -> SharedState {
        SharedState {
            snapshot: Arc::new(IndexSnapshot::unloaded()),
            engine,
            storage: IndexStorage::new(dir.join("sref_search_index.json")),
            thumbnails: ThumbnailResolver::new(vec![Box::new(PlaceholderSource)], 2),
            tags_path: dir.join("curated_tags.json"),
            static_images_dir: dir.join("images"),
            api_top_k: 50,
            similar_top_k: 20,
        }
    }

    fn state(dir: &std::path::Path, index: SearchIndex) -> Arc<SharedState> {
        Arc::new(SharedState {
            snapshot: Arc::new(IndexSnapshot::new(index)),
            ..state_fields(dir, QueryEngine::keyword())
        })
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_returns_ranked_results_with_thumbnails() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(state(tmp.path(), sample_index()));

        let response = app
            .oneshot(post_json("/search", json!({"query": "  red flower "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["query"], "red flower");
        assert_eq!(body["total_found"], 3);
        assert_eq!(body["results"][0]["sref_code"], "1001");
        assert_eq!(
            body["results"][0]["thumbnails"],
            json!(["1001_01.jpg", "1001_02.jpg"])
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_blank_query_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(state(tmp.path(), sample_index()));

        let response = app
            .oneshot(post_json("/search", json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Query is required");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_similar_excludes_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(state(tmp.path(), sample_index()));

        let response = app
            .oneshot(post_json("/similar", json!({"sref_code": "1001"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["reference_sref"], "1001");
        assert_eq!(body["total_found"], 2);
        assert_eq!(body["results"][0]["sref_code"], "2002");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_similar_unknown_and_blank_codes() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path(), sample_index());

        let response = router(state.clone())
            .oneshot(post_json("/similar", json!({"sref_code": "9999"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "SREF code 9999 not found");

        let response = router(state)
            .oneshot(post_json("/similar", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_reports_index_state() {
        let tmp = tempfile::tempdir().unwrap();

        let response = router(state(tmp.path(), sample_index()))
            .oneshot(get("/health"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["index_loaded"], true);
        assert_eq!(body["sref_count"], 3);
        assert_eq!(body["scoring"], "keyword");

        // an empty document is still a loaded index
        let response = router(state(tmp.path(), SearchIndex::new()))
            .oneshot(get("/health"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["index_loaded"], true);
        assert_eq!(body["sref_count"], 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_before_first_load() {
        let tmp = tempfile::tempdir().unwrap();
        let state = Arc::new(SharedState {
            snapshot: Arc::new(IndexSnapshot::unloaded()),
            ..state_fields(tmp.path(), QueryEngine::keyword())
        });

        let body = body_json(router(state).oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(body["index_loaded"], false);
        assert_eq!(body["sref_count"], 0);
    }

    struct OtherModel;

    impl crate::semantic::EmbeddingProvider for OtherModel {
        fn embed_image(
            &self,
            _path: &std::path::Path,
        ) -> Result<Vec<f32>, crate::semantic::ProviderError> {
            Ok(vec![0.0, 0.0, 1.0])
        }

        fn embed_text(&self, _text: &str) -> Result<Vec<f32>, crate::semantic::ProviderError> {
            Ok(vec![0.0, 0.0, 1.0])
        }

        fn caption(&self, _path: &std::path::Path) -> Result<String, crate::semantic::ProviderError> {
            Err(crate::semantic::ProviderError::CaptionDisabled)
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_with_mismatched_model_is_server_error() {
        let tmp = tempfile::tempdir().unwrap();
        let state = Arc::new(SharedState {
            snapshot: Arc::new(IndexSnapshot::new(sample_index())),
            ..state_fields(tmp.path(), QueryEngine::vector(Arc::new(OtherModel)))
        });

        let response = router(state)
            .oneshot(post_json("/search", json!({"query": "red flower"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("re-run `analyze`"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tags_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let response = router(state(tmp.path(), sample_index()))
            .oneshot(get("/tags"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["tags"][0], "painting");
        assert_eq!(body["categories"], json!({}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reload_swaps_index() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path(), SearchIndex::new());

        // nothing on disk yet: old snapshot stays
        let response = router(state.clone())
            .oneshot(post_json("/reload", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.snapshot.current().is_empty());

        state.storage.save(&sample_index()).unwrap();
        let response = router(state.clone())
            .oneshot(post_json("/reload", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["sref_count"], 3);
        assert_eq!(state.snapshot.current().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_static_images_served() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("images")).unwrap();
        std::fs::write(tmp.path().join("images").join("1001_01.jpg"), b"jpeg").unwrap();

        let response = router(state(tmp.path(), sample_index()))
            .oneshot(get("/images/1001_01.jpg"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"jpeg");
    }
}
