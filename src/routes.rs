use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::hooks::{DeleteHook, InsertHook, QueryHook, UpdateHook};
use crate::models::{
    CreateTestRecord, ImageGenerationParams, TestRecord, UpdateTestRecord, IMAGE_MODELS,
    STYLE_PRESETS,
};
use crate::openai::{ChatError, ChatMessage, OpenAiClient};
use crate::store::{StoreClient, StoreError};
use crate::venice::{VeniceClient, VeniceError};

#[derive(Clone)]
pub struct AppState {
    pub venice: Arc<VeniceClient>,
    pub openai: Arc<OpenAiClient>,
    pub records: RecordHooks,
}

/// The four data-access hooks over the `test` collection, shared across
/// requests. The query reads newest-first, matching what the UI shows.
#[derive(Clone)]
pub struct RecordHooks {
    pub query: QueryHook<TestRecord, StoreClient>,
    pub insert: InsertHook<TestRecord, StoreClient>,
    pub update: UpdateHook<TestRecord, StoreClient>,
    pub delete: DeleteHook<StoreClient>,
}

impl RecordHooks {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self {
            query: QueryHook::new(Arc::clone(&store), "test", |q| {
                q.select("*").order("created_at", false)
            }),
            insert: InsertHook::new(Arc::clone(&store), "test"),
            update: UpdateHook::new(Arc::clone(&store), "test"),
            delete: DeleteHook::new(store, "test"),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/images/generate", post(generate_image))
        .route("/api/images/models", get(list_image_models))
        .route("/api/chat", post(chat))
        .route("/api/records", get(list_records).post(create_record))
        .route("/api/records/:id", axum::routing::patch(update_record).delete(delete_record))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

fn error_response(
    status: StatusCode,
    error: &str,
    provider_status: Option<u16>,
    details: Option<Value>,
) -> Response {
    let mut body = json!({ "error": error });
    if let Some(provider_status) = provider_status {
        body["status"] = json!(provider_status);
    }
    if provider_status.is_some() {
        body["details"] = details.unwrap_or(Value::Null);
    }
    (status, Json(body)).into_response()
}

fn non_empty_string(body: &Value, key: &str) -> bool {
    body.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty())
}

/// Proxies image generation to Venice: validate, forward verbatim with our
/// credential, normalize the images for direct display. Provider failures
/// keep their status; anything unexpected degrades to a generic 500.
pub async fn generate_image(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    // validated before any outbound call is made
    if !non_empty_string(&body, "model") || !non_empty_string(&body, "prompt") {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: model and prompt",
            None,
            None,
        );
    }

    let params: ImageGenerationParams = match serde_json::from_value(body) {
        Ok(params) => params,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid request body: {e}"),
                None,
                None,
            )
        }
    };

    match state.venice.generate(&params).await {
        Ok(data) => Json(data).into_response(),
        Err(VeniceError::Api { status, details }) => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            error_response(code, "Venice API error", Some(status), details)
        }
        Err(err) => {
            tracing::error!("image generation failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None, None)
        }
    }
}

pub async fn list_image_models() -> Json<Value> {
    let models: Vec<Value> = IMAGE_MODELS
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    Json(json!({ "models": models, "style_presets": STYLE_PRESETS }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_chat_model")]
    pub model: String,
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequestBody>) -> Response {
    if body.messages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing required field: messages", None, None);
    }

    match state.openai.complete(&body.model, &body.messages).await {
        Ok(message) => Json(json!({ "message": message })).into_response(),
        Err(ChatError::Api { status, message }) => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            error_response(code, "OpenAI API error", Some(status), Some(Value::String(message)))
        }
        Err(err) => {
            tracing::error!("chat completion failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None, None)
        }
    }
}

fn store_error_response(error: Option<StoreError>) -> Response {
    let error = error.unwrap_or_else(|| StoreError::transport("unknown store failure"));
    let status = if error.code == "not_found" {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(json!({ "error": error.message, "code": error.code }))).into_response()
}

pub async fn list_records(State(state): State<AppState>) -> Response {
    state.records.query.refetch().await;
    if let Some(error) = state.records.query.error() {
        return store_error_response(Some(error));
    }
    Json(state.records.query.data().unwrap_or_default()).into_response()
}

pub async fn create_record(
    State(state): State<AppState>,
    Json(body): Json<CreateTestRecord>,
) -> Response {
    match state.records.insert.insert_one(&body).await {
        Some(created) => (StatusCode::CREATED, Json(created)).into_response(),
        None => store_error_response(state.records.insert.error()),
    }
}

pub async fn update_record(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(patch): Json<UpdateTestRecord>,
) -> Response {
    match state.records.update.update(&id, &patch).await {
        Some(updated) if updated.is_empty() => store_error_response(Some(StoreError::not_found(
            format!("no row in 'test' with id {id}"),
        ))),
        Some(updated) => Json(updated).into_response(),
        None => store_error_response(state.records.update.error()),
    }
}

pub async fn delete_record(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    if state.records.delete.remove(&id).await {
        Json(json!({ "deleted": true })).into_response()
    } else {
        store_error_response(state.records.delete.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Venice double that counts how often it is hit.
    fn stub_venice(hits: Arc<AtomicUsize>, status: StatusCode, body: Value) -> Router {
        Router::new().route(
            "/image/generate",
            post(move || {
                let hits = Arc::clone(&hits);
                let body = body.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (status, Json(body))
                }
            }),
        )
    }

    fn stub_postgrest() -> Router {
        Router::new()
            .route(
                "/rest/v1/test",
                get(|| async {
                    Json(json!([{
                        "id": "7f1fbb2a-9f40-4f72-9b53-0dc42b9aa111",
                        "created_at": "2025-03-12T09:30:00Z",
                        "name": "first",
                        "description": null,
                        "is_active": true,
                    }]))
                })
                .post(|Json(rows): Json<Vec<Value>>| async move {
                    let created: Vec<Value> = rows
                        .into_iter()
                        .map(|mut row| {
                            let obj = row.as_object_mut().unwrap();
                            obj.insert("id".into(), json!("7f1fbb2a-9f40-4f72-9b53-0dc42b9aa222"));
                            obj.insert("created_at".into(), json!("2025-03-12T10:00:00Z"));
                            row
                        })
                        .collect();
                    (StatusCode::CREATED, Json(created))
                })
                .patch(|| async { Json(Vec::<Value>::new()) })
                .delete(|| async { Json(Vec::<Value>::new()) }),
            )
    }

    async fn test_app(venice: Router, store: Router) -> String {
        let venice_base = spawn(venice).await;
        let store_base = spawn(store).await;
        let state = AppState {
            venice: Arc::new(VeniceClient::with_base_url("key".into(), venice_base)),
            openai: Arc::new(OpenAiClient::with_base_url("key".into(), "http://127.0.0.1:9".into())),
            records: RecordHooks::new(Arc::new(StoreClient::new(store_base, "anon".into()))),
        };
        spawn(app(state)).await
    }

    #[tokio::test]
    async fn missing_prompt_is_rejected_without_an_outbound_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let venice = stub_venice(Arc::clone(&hits), StatusCode::OK, json!({}));
        let base = test_app(venice, stub_postgrest()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/images/generate"))
            .json(&json!({ "model": "fluently-xl" }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], json!("Missing required fields: model and prompt"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failure_status_is_mirrored_with_details() {
        let hits = Arc::new(AtomicUsize::new(0));
        let venice = stub_venice(
            hits,
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"message": "model is overloaded"}),
        );
        let base = test_app(venice, stub_postgrest()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/images/generate"))
            .json(&json!({ "model": "fluently-xl", "prompt": "a lighthouse" }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 503);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], json!("Venice API error"));
        assert_eq!(body["status"], json!(503));
        assert_eq!(body["details"], json!({"message": "model is overloaded"}));
    }

    #[tokio::test]
    async fn successful_generation_returns_normalized_images() {
        let hits = Arc::new(AtomicUsize::new(0));
        let venice = stub_venice(
            hits,
            StatusCode::OK,
            json!({
                "id": "gen-1",
                "images": ["aGVsbG8="],
                "timing": {"total": 900.0},
            }),
        );
        let base = test_app(venice, stub_postgrest()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/images/generate"))
            .json(&json!({ "model": "fluently-xl", "prompt": "a lighthouse", "format": "jpg" }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["images"], json!(["data:image/jpg;base64,aGVsbG8="]));
    }

    #[tokio::test]
    async fn records_crud_round_trip_through_the_hooks() {
        let venice = stub_venice(Arc::new(AtomicUsize::new(0)), StatusCode::OK, json!({}));
        let base = test_app(venice, stub_postgrest()).await;
        let client = reqwest::Client::new();

        let listed: Vec<TestRecord> =
            client.get(format!("{base}/api/records")).send().await.unwrap().json().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "first");

        let created = client
            .post(format!("{base}/api/records"))
            .json(&json!({ "name": "A", "description": null, "is_active": true }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status().as_u16(), 201);
        let created: Vec<TestRecord> = created.json().await.unwrap();
        assert_eq!(created[0].name, "A");

        // stub reports no matching row for updates and deletes
        let updated = client
            .patch(format!("{base}/api/records/7f1fbb2a-9f40-4f72-9b53-0dc42b9aa999"))
            .json(&json!({ "name": "B" }))
            .send()
            .await
            .unwrap();
        assert_eq!(updated.status().as_u16(), 404);

        let deleted = client
            .delete(format!("{base}/api/records/7f1fbb2a-9f40-4f72-9b53-0dc42b9aa999"))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status().as_u16(), 404);
        let body: Value = deleted.json().await.unwrap();
        assert_eq!(body["code"], json!("not_found"));
    }

    #[tokio::test]
    async fn image_model_catalog_is_served() {
        let venice = stub_venice(Arc::new(AtomicUsize::new(0)), StatusCode::OK, json!({}));
        let base = test_app(venice, stub_postgrest()).await;

        let body: Value = reqwest::get(format!("{base}/api/images/models"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["models"][0]["id"], json!("fluently-xl"));
        assert_eq!(body["style_presets"].as_array().unwrap().len(), 17);
    }
}
