//! Web server for the corner-mapping editor API

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{Config, MediaConfig, MeshConfig};
use crate::error::{SettingsError, TransformError, UpdateError};
use crate::geometry::{Corner, Point2D};
use crate::live::{LiveTransform, Rejected, Snapshot};
use crate::settings::TransformSettings;
use crate::transform::{AffineApprox, HomographyMatrix, Mesh};

/// Shared application state
pub struct AppState {
    pub live: LiveTransform,
    mesh: MeshConfig,
    allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, UpdateError> {
        Ok(Self {
            live: LiveTransform::new(config.media, config.defaults)?,
            mesh: config.mesh,
            allowed_origins: config.server.allowed_origins.clone(),
        })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Update refused; the previous transform is still in effect
    #[error("Update rejected: {}", .0.error)]
    Rejected(Box<Rejected>),
}

impl From<UpdateError> for ApiError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::Settings(e) => ApiError::Settings(e),
            UpdateError::Transform(e) => ApiError::Transform(e),
        }
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Settings(_) => StatusCode::BAD_REQUEST,
            ApiError::Transform(
                TransformError::EmptyMesh | TransformError::MeshTooLarge { .. },
            ) => StatusCode::BAD_REQUEST,
            ApiError::Transform(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected(rejected) => match rejected.error {
                UpdateError::Settings(_) => StatusCode::BAD_REQUEST,
                UpdateError::Transform(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    /// The transform still in effect after a rejected update
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<TransformResponse>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.to_string();
        let current = match self {
            ApiError::Rejected(rejected) => {
                Some(TransformResponse::from(rejected.current.as_ref()))
            }
            _ => None,
        };

        (status, Json(ErrorResponse { detail, current })).into_response()
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/api/settings", get(get_settings).post(set_settings))
        .route("/api/settings/reset", post(reset_settings))
        .route("/api/settings/corner", post(drag_corner))
        .route("/api/solve", post(solve))
        .route("/api/mesh", get(get_mesh))
        .route("/api/info", get(get_info))
        .layer(cors)
        .with_state(state)
}

/// Run the web server
pub async fn run_server(addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Settings together with everything derived from them
#[derive(Serialize)]
struct TransformResponse {
    revision: u64,
    settings: TransformSettings,
    matrix: HomographyMatrix,
    composed: HomographyMatrix,
    affine: AffineApprox,
}

impl From<&Snapshot> for TransformResponse {
    fn from(s: &Snapshot) -> Self {
        Self {
            revision: s.revision,
            settings: s.settings,
            matrix: s.matrix,
            composed: s.composed,
            affine: s.affine,
        }
    }
}

/// Get the current settings and transform
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<TransformResponse> {
    Json(TransformResponse::from(state.live.current().as_ref()))
}

/// Replace the settings
async fn set_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<TransformSettings>,
) -> ApiResult<Json<TransformResponse>> {
    let snapshot = state
        .live
        .update(settings)
        .map_err(|rejected| ApiError::Rejected(Box::new(rejected)))?;
    Ok(Json(TransformResponse::from(snapshot.as_ref())))
}

#[derive(Deserialize)]
struct DragRequest {
    corner: Corner,
    x: f64,
    y: f64,
}

/// Move a single corner, keeping everything else
async fn drag_corner(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DragRequest>,
) -> ApiResult<Json<TransformResponse>> {
    let snapshot = state
        .live
        .drag(req.corner, Point2D::new(req.x, req.y))
        .map_err(|rejected| ApiError::Rejected(Box::new(rejected)))?;
    Ok(Json(TransformResponse::from(snapshot.as_ref())))
}

/// Reset to configured defaults
async fn reset_settings(State(state): State<Arc<AppState>>) -> Json<TransformResponse> {
    let snapshot = state.live.reset();
    Json(TransformResponse::from(snapshot.as_ref()))
}

#[derive(Deserialize)]
struct SolveRequest {
    /// Defaults to the configured media size
    #[serde(default)]
    source: Option<MediaConfig>,
    settings: TransformSettings,
}

#[derive(Serialize)]
struct SolveResponse {
    matrix: HomographyMatrix,
    inverse: HomographyMatrix,
    composed: HomographyMatrix,
    affine: AffineApprox,
}

/// Stateless solve; the live transform is not touched
async fn solve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SolveRequest>,
) -> ApiResult<Json<SolveResponse>> {
    let media = req.source.unwrap_or_else(|| state.live.media());
    if media.width == 0 || media.height == 0 {
        return Err(ApiError::BadRequest("source size must be non-zero".to_string()));
    }

    let snapshot = Snapshot::compute(media, req.settings, 0)?;
    let inverse = snapshot.matrix.inverse()?;

    Ok(Json(SolveResponse {
        matrix: snapshot.matrix,
        inverse,
        composed: snapshot.composed,
        affine: snapshot.affine,
    }))
}

#[derive(Deserialize)]
struct MeshQuery {
    cols: Option<u32>,
    rows: Option<u32>,
}

/// Projective mesh for the current transform
async fn get_mesh(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MeshQuery>,
) -> ApiResult<Json<Mesh>> {
    let cols = query.cols.unwrap_or(state.mesh.cols);
    let rows = query.rows.unwrap_or(state.mesh.rows);
    let mesh = state.live.current().mesh(cols, rows)?;
    Ok(Json(mesh))
}

/// System information response
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    width: u32,
    height: u32,
    revision: u64,
}

/// Get system information
async fn get_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let media = state.live.media();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        width: media.width,
        height: media.height,
        revision: state.live.current().revision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let mut config = Config::default();
        config.media = MediaConfig {
            width: 400,
            height: 300,
        };
        router(Arc::new(AppState::new(&config).unwrap()))
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn settings_json(tr: (f64, f64)) -> Value {
        json!({
            "topLeft": {"x": 50, "y": 50},
            "topRight": {"x": tr.0, "y": tr.1},
            "bottomRight": {"x": 350, "y": 250},
            "bottomLeft": {"x": 50, "y": 250},
            "brightness": 100,
            "contrast": 100,
            "saturation": 100,
            "rotation": 0
        })
    }

    #[tokio::test]
    async fn test_get_settings() {
        let (status, body) = send(test_router(), "GET", "/api/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revision"], 0);
        assert_eq!(body["settings"]["topLeft"]["x"], 50.0);
        assert_eq!(body["matrix"].as_array().unwrap().len(), 9);
        assert_eq!(body["matrix"][8], 1.0);
    }

    #[tokio::test]
    async fn test_post_settings_updates_transform() {
        let app = test_router();
        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/settings",
            Some(settings_json((360.0, 40.0))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revision"], 1);

        let (_, body) = send(app, "GET", "/api/settings", None).await;
        assert_eq!(body["settings"]["topRight"]["x"], 360.0);
    }

    #[tokio::test]
    async fn test_singular_settings_return_previous_matrix() {
        let app = test_router();
        let collinear = json!({
            "topLeft": {"x": 0, "y": 0},
            "topRight": {"x": 100, "y": 100},
            "bottomRight": {"x": 200, "y": 200},
            "bottomLeft": {"x": 300, "y": 300},
            "brightness": 100,
            "contrast": 100,
            "saturation": 100,
            "rotation": 0
        });

        let (status, body) = send(app, "POST", "/api/settings", Some(collinear)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("singular"));
        assert_eq!(body["current"]["revision"], 0);
    }

    #[tokio::test]
    async fn test_out_of_range_settings_rejected() {
        let mut settings = settings_json((350.0, 50.0));
        settings["contrast"] = json!(500);

        let (status, body) = send(test_router(), "POST", "/api/settings", Some(settings)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("contrast"));
    }

    #[tokio::test]
    async fn test_drag_corner() {
        let app = test_router();
        let (status, body) = send(
            app,
            "POST",
            "/api/settings/corner",
            Some(json!({"corner": "bottomLeft", "x": 40, "y": 260})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["bottomLeft"]["x"], 40.0);
        assert_eq!(body["settings"]["topLeft"]["x"], 50.0);
    }

    #[tokio::test]
    async fn test_reset() {
        let app = test_router();
        send(
            app.clone(),
            "POST",
            "/api/settings",
            Some(settings_json((390.0, 10.0))),
        )
        .await;

        let (status, body) = send(app, "POST", "/api/settings/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["topRight"]["x"], 350.0);
    }

    #[tokio::test]
    async fn test_stateless_solve_translation() {
        let request = json!({
            "source": {"width": 100, "height": 100},
            "settings": {
                "topLeft": {"x": 20, "y": 30},
                "topRight": {"x": 120, "y": 30},
                "bottomRight": {"x": 120, "y": 130},
                "bottomLeft": {"x": 20, "y": 130},
                "brightness": 100,
                "contrast": 100,
                "saturation": 100,
                "rotation": 0
            }
        });

        let app = test_router();
        let (status, body) = send(app.clone(), "POST", "/api/solve", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        let h2 = body["matrix"][2].as_f64().unwrap();
        let h5 = body["matrix"][5].as_f64().unwrap();
        assert!((h2 - 20.0).abs() < 1e-9);
        assert!((h5 - 30.0).abs() < 1e-9);
        let inv_h2 = body["inverse"][2].as_f64().unwrap();
        assert!((inv_h2 + 20.0).abs() < 1e-9);

        // Live state untouched
        let (_, body) = send(app, "GET", "/api/info", None).await;
        assert_eq!(body["revision"], 0);
    }

    #[tokio::test]
    async fn test_mesh_endpoint() {
        let (status, body) = send(test_router(), "GET", "/api/mesh?cols=2&rows=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vertices"].as_array().unwrap().len(), 6);
        assert_eq!(body["indices"].as_array().unwrap().len(), 12);

        let (status, _) = send(test_router(), "GET", "/api/mesh?cols=0&rows=1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(test_router(), "GET", "/api/mesh?cols=1000", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_info() {
        let (status, body) = send(test_router(), "GET", "/api/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["width"], 400);
        assert_eq!(body["height"], 300);
    }
}
