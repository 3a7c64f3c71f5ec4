//! REST API for the load planner.
//!
//! Provides HTTP endpoints for packing requests and their documentation.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use log::{error, info};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::model::{ContainerSpec, ItemType, ValidationError};
use crate::optimizer::{
    PackEvent, PackingConfig, instance_count, pack_items_with_config, pack_items_with_progress,
};
use crate::report::{LoadDiagnostics, PlacementEntry, PlacementResult, RejectedCount};

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>load-planner API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the packing endpoints.
#[derive(Deserialize, Clone, ToSchema)]
#[schema(
    example = json!({
        "container": {
            "name": "20ft",
            "width": 5.9,
            "height": 2.39,
            "depth": 2.35,
            "max_weight": 21000.0
        },
        "items": [
            { "name": "pallet", "width": 1.2, "height": 1.0, "depth": 0.8, "weight": 400.0, "quantity": 6 }
        ],
        "allow_rotations": true
    })
)]
pub struct PackRequest {
    pub container: ContainerSpec,
    pub items: Vec<ItemType>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub allow_rotations: Option<bool>,
    /// Overrides the configured minimum support ratio for this request.
    #[serde(default)]
    #[schema(nullable = true)]
    pub min_support_ratio: Option<f64>,
}

#[derive(Debug)]
struct ValidatedPackRequest {
    container: ContainerSpec,
    items: Vec<ItemType>,
    allow_rotations: Option<bool>,
    min_support_ratio: Option<f64>,
}

impl ValidatedPackRequest {
    /// Applies the request-level overrides to the configured engine settings.
    fn packing_config(&self, base: PackingConfig) -> PackingConfig {
        let mut config = base;
        if let Some(allow_rotations) = self.allow_rotations {
            config.allow_item_rotation = allow_rotations;
        }
        if let Some(ratio) = self.min_support_ratio {
            config.support_ratio = ratio;
        }
        config
    }
}

#[derive(Debug)]
enum PackRequestValidationError {
    MissingItems,
    InvalidContainer(ValidationError),
    InvalidItem(ValidationError),
    InvalidSupportRatio(f64),
    TooManyInstances { requested: u64, limit: u64 },
}

impl PackRequest {
    fn into_validated(
        self,
        max_instances: u64,
    ) -> Result<ValidatedPackRequest, PackRequestValidationError> {
        if self.items.is_empty() {
            return Err(PackRequestValidationError::MissingItems);
        }

        self.container
            .validate()
            .map_err(PackRequestValidationError::InvalidContainer)?;

        for item in &self.items {
            item.validate()
                .map_err(PackRequestValidationError::InvalidItem)?;
        }

        if let Some(ratio) = self.min_support_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(PackRequestValidationError::InvalidSupportRatio(ratio));
            }
        }

        let requested = instance_count(&self.items);
        if requested > max_instances {
            return Err(PackRequestValidationError::TooManyInstances {
                requested,
                limit: max_instances,
            });
        }

        Ok(ValidatedPackRequest {
            container: self.container,
            items: self.items,
            allow_rotations: self.allow_rotations,
            min_support_ratio: self.min_support_ratio,
        })
    }
}

/// Response structure of a finished packing run.
#[derive(Serialize, ToSchema)]
pub struct PackResponse {
    pub container: ContainerSpec,
    pub placed: Vec<PlacementEntry>,
    pub rejected: Vec<RejectedEntry>,
    pub rejected_summary: Vec<RejectedCount>,
    pub is_complete: bool,
    pub total_weight: f64,
    /// Fraction of the container volume in use (0.0 to 1.0).
    pub volume_utilization: f64,
    /// Fraction of the weight capacity in use (0.0 to 1.0).
    pub weight_utilization: f64,
    pub diagnostics: LoadDiagnostics,
}

/// Single instance that could not be loaded.
#[derive(Serialize, ToSchema)]
pub struct RejectedEntry {
    pub label: String,
    pub name: String,
    pub type_index: usize,
    pub weight: f64,
    #[schema(value_type = [f64; 3], example = json!([1.2, 1.0, 0.8]))]
    pub dims: (f64, f64, f64),
    pub reason_code: String,
    pub reason: String,
}

impl PackResponse {
    pub fn from_placement_result(result: &PlacementResult) -> Self {
        Self {
            container: result.container.clone(),
            placed: result.entries(),
            rejected: result
                .rejected
                .iter()
                .map(|entry| RejectedEntry {
                    label: entry.instance.label(),
                    name: entry.instance.name.clone(),
                    type_index: entry.instance.type_index,
                    weight: entry.instance.weight,
                    dims: entry.instance.extents.as_tuple(),
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.reason.to_string(),
                })
                .collect(),
            rejected_summary: result.rejected_summary(),
            is_complete: result.is_complete(),
            total_weight: result.placed_weight,
            volume_utilization: result.volume_utilization(),
            weight_utilization: result.weight_utilization(),
            diagnostics: result.diagnostics(),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn container_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid container configuration",
        details,
    )
}

fn parse_pack_request(
    payload: Result<Json<PackRequest>, JsonRejection>,
    max_instances: u64,
) -> Result<ValidatedPackRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated(max_instances) {
        Ok(validated) => Ok(validated),
        Err(PackRequestValidationError::MissingItems) => {
            Err(validation_error("At least one item must be specified"))
        }
        Err(PackRequestValidationError::InvalidContainer(err)) => {
            Err(container_config_error(err.to_string()))
        }
        Err(PackRequestValidationError::InvalidItem(err)) => {
            Err(validation_error(err.to_string()))
        }
        Err(PackRequestValidationError::InvalidSupportRatio(ratio)) => Err(validation_error(
            format!("min_support_ratio must be between 0 and 1, got: {}", ratio),
        )),
        Err(PackRequestValidationError::TooManyInstances { requested, limit }) => {
            Err(validation_error(format!(
                "Items expand to {} instances, at most {} are allowed per request",
                requested, limit
            )))
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_stream),
    components(
        schemas(
            PackRequest,
            PackResponse,
            RejectedEntry,
            ErrorResponse,
            ContainerSpec,
            ItemType,
            PlacementEntry,
            RejectedCount,
            LoadDiagnostics
        )
    ),
    tags((name = "packing", description = "Endpoints for container load planning"))
)]
struct ApiDoc;

fn router(optimizer_config: OptimizerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { optimizer_config };

    Router::new()
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests.
/// Blocks until the server is terminated.
pub async fn start_api_server(
    config: ApiConfig,
    optimizer_config: OptimizerConfig,
) -> std::io::Result<()> {
    let app = router(optimizer_config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        error!("❌ Could not bind API server to {}: {}", addr, err);
        err
    })?;

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints: POST /pack, POST /pack_stream");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /pack endpoint.
///
/// Loads the requested items into the container in a fresh session.
///
/// # Returns
/// JSON response with placed and rejected instances
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Packing finished", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        ),
        (status = INTERNAL_SERVER_ERROR, description = "Packing aborted", body = ErrorResponse)
    ),
    tag = "packing"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let base = state.optimizer_config.packing_config();
    let request = match parse_pack_request(payload, base.max_instances) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        "📥 New pack request: {} instances of {} item types",
        instance_count(&request.items),
        request.items.len()
    );
    let packing_config = request.packing_config(base);
    let ValidatedPackRequest {
        container, items, ..
    } = request;

    let outcome = tokio::task::spawn_blocking(move || {
        pack_items_with_config(container, &items, packing_config)
    })
    .await;

    match outcome {
        Ok(Ok(result)) => {
            info!(
                "📦 Result: {} placed, {} rejected",
                result.placed.len(),
                result.rejected.len()
            );
            let response = PackResponse::from_placement_result(&result);
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(err)) => {
            error!("❌ Packing aborted: {}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Packing aborted",
                err.to_string(),
            )
        }
        Err(err) => {
            error!("❌ Packing task failed: {}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Packing aborted",
                err.to_string(),
            )
        }
    }
}

/// Handler for POST /pack_stream endpoint (SSE).
///
/// Streams pack events in real-time as Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams pack events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let base = state.optimizer_config.packing_config();
    let request = match parse_pack_request(payload, base.max_instances) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let packing_config = request.packing_config(base);
    let ValidatedPackRequest {
        container, items, ..
    } = request;

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        // A closed receiver only means the client went away.
        let send = |evt: &PackEvent| {
            if let Ok(json) = serde_json::to_string(evt) {
                let _ = tx.blocking_send(json);
            }
        };
        let outcome = pack_items_with_progress(container, &items, packing_config, &send);
        if let Err(err) = outcome {
            error!("❌ Streamed packing aborted: {}", err);
            send(&PackEvent::Aborted {
                reason: err.to_string(),
            });
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn state() -> ApiState {
        ApiState {
            optimizer_config: OptimizerConfig::new(PackingConfig::default()),
        }
    }

    fn request_json(body: &str) -> PackRequest {
        serde_json::from_str(body).expect("Should parse valid JSON")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body is readable");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    const SMALL_REQUEST: &str = r#"{
        "container": {"name": "box", "width": 2.0, "height": 1.0, "depth": 1.0, "max_weight": 100.0},
        "items": [{"name": "cube", "width": 1.0, "height": 1.0, "depth": 1.0, "weight": 10.0, "quantity": 3}]
    }"#;

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        assert!(
            paths.contains_key("/pack"),
            "OpenAPI documentation is missing the /pack path"
        );
        assert!(
            paths.contains_key("/pack_stream"),
            "OpenAPI documentation is missing the /pack_stream path"
        );
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["PackRequest", "PackResponse", "ErrorResponse", "LoadDiagnostics"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn pack_request_parses_optional_overrides() {
        let request = request_json(
            r#"{
            "container": {"width": 1.0, "height": 1.0, "depth": 1.0, "max_weight": 1.0},
            "items": [{"name": "a", "width": 1.0, "height": 1.0, "depth": 1.0, "weight": 1.0, "quantity": 1}],
            "allow_rotations": false,
            "min_support_ratio": null
        }"#,
        );
        assert_eq!(request.allow_rotations, Some(false));
        assert_eq!(request.min_support_ratio, None);
        assert_eq!(request.container.name, ContainerSpec::DEFAULT_NAME);
    }

    #[test]
    fn request_overrides_replace_configured_values() {
        let mut request = request_json(SMALL_REQUEST);
        request.allow_rotations = Some(false);
        request.min_support_ratio = Some(0.5);
        let validated = request
            .into_validated(PackingConfig::DEFAULT_MAX_INSTANCES)
            .expect("Should validate successfully");

        let config = validated.packing_config(PackingConfig::default());
        assert!(!config.allow_item_rotation);
        assert_eq!(config.support_ratio, 0.5);

        let untouched = request_json(SMALL_REQUEST)
            .into_validated(PackingConfig::DEFAULT_MAX_INSTANCES)
            .expect("Should validate successfully")
            .packing_config(PackingConfig::builder().allow_item_rotation(false).build());
        assert!(
            !untouched.allow_item_rotation,
            "When allow_rotations is None, config setting should be preserved"
        );
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let mut empty = request_json(SMALL_REQUEST);
        empty.items.clear();
        assert!(matches!(
            empty.into_validated(PackingConfig::DEFAULT_MAX_INSTANCES),
            Err(PackRequestValidationError::MissingItems)
        ));

        let mut bad_container = request_json(SMALL_REQUEST);
        bad_container.container.width = -1.0;
        assert!(matches!(
            bad_container.into_validated(PackingConfig::DEFAULT_MAX_INSTANCES),
            Err(PackRequestValidationError::InvalidContainer(_))
        ));

        let mut bad_ratio = request_json(SMALL_REQUEST);
        bad_ratio.min_support_ratio = Some(1.2);
        assert!(matches!(
            bad_ratio.into_validated(PackingConfig::DEFAULT_MAX_INSTANCES),
            Err(PackRequestValidationError::InvalidSupportRatio(_))
        ));
    }

    #[tokio::test]
    async fn pack_handler_returns_placements() {
        let response = handle_pack(State(state()), Ok(Json(request_json(SMALL_REQUEST))))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["placed"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["rejected"][0]["reason_code"], "no_stable_position");
        assert_eq!(body["rejected_summary"][0]["count"], 1);
        assert_eq!(body["is_complete"], false);
        assert_eq!(body["volume_utilization"], 1.0);
    }

    #[tokio::test]
    async fn pack_handler_rejects_invalid_items_with_422() {
        let mut request = request_json(SMALL_REQUEST);
        request.items[0].quantity = 0;

        let response = handle_pack(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid input data");
    }

    #[tokio::test]
    async fn huge_quantity_is_rejected_with_422() {
        let mut request = request_json(SMALL_REQUEST);
        request.items[0].quantity = 4_000_000_000;

        let response = handle_pack(State(state()), Ok(Json(request.clone())))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid input data");
        assert!(body["details"].as_str().unwrap().contains("4000000000"));

        let response = handle_pack_stream(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn stream_ends_with_aborted_event_on_engine_error() {
        let broken = PackingConfig::builder().general_epsilon(0.0).build();
        let state = ApiState {
            optimizer_config: OptimizerConfig::new(broken),
        };

        let response = handle_pack_stream(State(state), Ok(Json(request_json(SMALL_REQUEST))))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("stream is readable");
        let text = String::from_utf8(bytes.to_vec()).expect("stream is UTF-8");
        let events: Vec<serde_json::Value> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).expect("event is JSON"))
            .collect();

        assert_eq!(events.len(), 1, "{text}");
        assert_eq!(events[0]["type"], "Aborted");
        assert!(
            events[0]["reason"]
                .as_str()
                .unwrap()
                .contains("general epsilon")
        );
    }

    #[tokio::test]
    async fn openapi_endpoint_serves_document() {
        let response = serve_openapi_json(State(state())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["paths"]["/pack"].is_object());
    }
}
