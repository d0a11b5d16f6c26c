use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::services::ServeDir;

use crate::{
    config::{AudioFormat, Settings, SettingsUpdate, Theme},
    error::{SendOutcome, SessionError},
    models::{ChatMessage, ProviderConfig, ProviderId, PROVIDERS},
    session::{user_copy, Session},
    telemetry,
};

/**
 * \brief 路由共享状态；锁在发送期间一直持有，同一时刻仅允许一个请求在途。
 */
pub type SharedSession = Arc<Mutex<Session>>;

/**
 * \brief 启动本地 HTTP 服务，提供静态前端与 API。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str, session: Session) -> Result<()> {
    let ui_root = std::env::var("VOICECHAT_UI_DIR").unwrap_or_else(|_| "web".to_string());
    let static_service =
        get_service(ServeDir::new(ui_root).append_index_html_on_directories(true));

    let app = router(Arc::new(Mutex::new(session))).fallback_service(static_service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    telemetry::log_event("server", &format!("listening on {}", addr));
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 构建 API 路由（不含静态资源）。
 */
pub fn router(state: SharedSession) -> Router {
    Router::new()
        .route("/api/providers", get(get_providers))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/chat", post(chat))
        .route("/api/transcript", get(get_transcript).delete(clear_transcript))
        .route("/api/transcript/export", get(export_transcript))
        .route("/api/transcript/{index}", get(get_message))
        .route("/api/health", get(health_check))
        .with_state(state)
}

#[derive(Serialize, Debug)]
struct ProvidersResponse {
    providers: &'static [ProviderConfig],
}

/**
 * \brief 对外展示的设置；API Key 只暴露是否已配置。
 */
#[derive(Serialize, Debug)]
struct SettingsView {
    configured: ConfiguredKeys,
    language: String,
    audio_format: AudioFormat,
    sample_rate: u32,
    theme: Theme,
    telemetry_enabled: bool,
}

#[derive(Serialize, Debug)]
struct ConfiguredKeys {
    openai: bool,
    perplexity: bool,
    anthropic: bool,
}

impl From<&Settings> for SettingsView {
    fn from(s: &Settings) -> Self {
        Self {
            configured: ConfiguredKeys {
                openai: s.api_keys.is_configured(ProviderId::OpenAI),
                perplexity: s.api_keys.is_configured(ProviderId::Perplexity),
                anthropic: s.api_keys.is_configured(ProviderId::Anthropic),
            },
            language: s.language.clone(),
            audio_format: s.audio_format,
            sample_rate: s.sample_rate,
            theme: s.theme,
            telemetry_enabled: s.telemetry_enabled,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChatRequest {
    /** \brief 目标 Provider */
    provider: ProviderId,
    /** \brief 用户消息 */
    text: String,
}

#[derive(Serialize, Debug)]
struct ChatResponse {
    outcome: SendOutcome,
    /** \brief 失败时的界面提示 */
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize, Debug)]
struct TranscriptResponse {
    messages: Vec<ChatMessage>,
}

async fn get_providers() -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: &PROVIDERS,
    })
}

async fn get_settings(State(state): State<SharedSession>) -> Json<SettingsView> {
    let session = state.lock().await;
    Json(SettingsView::from(session.settings()))
}

/**
 * \brief 局部更新设置；未提交的 API Key 保持原值。
 */
async fn put_settings(
    State(state): State<SharedSession>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>, (StatusCode, String)> {
    let mut session = state.lock().await;
    session.apply_update(update).map_err(bad_request)?;
    Ok(Json(SettingsView::from(session.settings())))
}

/**
 * \brief 发送一条消息：POST /api/chat {provider, text}
 */
async fn chat(
    State(state): State<SharedSession>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let mut session = state.lock().await;
    let outcome = session
        .submit(req.provider, &req.text)
        .await
        .map_err(bad_request)?;
    let message = match &outcome {
        SendOutcome::Success { .. } => None,
        SendOutcome::Failure { kind, detail } => {
            telemetry::log_error(
                "server.chat",
                &format!("provider={} kind={:?}", req.provider, kind),
            );
            Some(user_copy(*kind, req.provider, detail))
        }
    };
    Ok(Json(ChatResponse { outcome, message }))
}

async fn get_transcript(State(state): State<SharedSession>) -> Json<TranscriptResponse> {
    let session = state.lock().await;
    Json(TranscriptResponse {
        messages: session.transcript().messages().to_vec(),
    })
}

/**
 * \brief 获取单条消息，供“复制消息”使用。
 */
async fn get_message(
    State(state): State<SharedSession>,
    Path(index): Path<usize>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    let session = state.lock().await;
    session
        .transcript()
        .get(index)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("no message at index {}", index)))
}

async fn clear_transcript(State(state): State<SharedSession>) -> StatusCode {
    state.lock().await.clear_transcript();
    StatusCode::NO_CONTENT
}

/**
 * \brief 以附件形式导出会话记录。
 */
async fn export_transcript(
    State(state): State<SharedSession>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let export = state
        .lock()
        .await
        .export()
        .ok_or((StatusCode::NOT_FOUND, "No conversation to export.".to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.file_name),
            ),
        ],
        export.content,
    ))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "providers": PROVIDERS.len()}))
}

fn bad_request(e: SessionError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::orchestrator::testing::*;

    fn app(steps: Vec<Step>, settings: Settings) -> Router {
        let orch = orchestrator(
            ScriptedTransport::new(steps),
            Arc::new(RecordingClock::default()),
        );
        router(Arc::new(Mutex::new(Session::new(settings, orch))))
    }

    fn keyed() -> Settings {
        let mut s = Settings::default();
        s.api_keys.set(ProviderId::OpenAI, "sk-test");
        s
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_success_then_transcript() {
        let app = app(
            vec![ok(r#"{"choices":[{"message":{"content":"Hi there"}}]}"#)],
            keyed(),
        );
        let resp = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/chat",
                json!({"provider": "openai", "text": "Hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["outcome"]["status"], "success");
        assert_eq!(v["outcome"]["text"], "Hi there");
        assert!(v.get("message").is_none());

        let resp = app
            .oneshot(Request::get("/api/transcript").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["messages"].as_array().unwrap().len(), 2);
        assert_eq!(v["messages"][1]["provider_id"], "openai");
    }

    #[tokio::test]
    async fn test_chat_missing_key_reports_copy() {
        let app = app(vec![], Settings::default());
        let resp = app
            .oneshot(json_request(
                Method::POST,
                "/api/chat",
                json!({"provider": "perplexity", "text": "Hello"}),
            ))
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["outcome"]["kind"], "missing_credential");
        assert_eq!(
            v["message"],
            "Please configure your Perplexity AI API key in settings."
        );
    }

    #[tokio::test]
    async fn test_chat_blank_text_is_bad_request() {
        let app = app(vec![], keyed());
        let resp = app
            .oneshot(json_request(
                Method::POST,
                "/api/chat",
                json!({"provider": "openai", "text": "   "}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_empty_is_not_found() {
        let app = app(vec![], keyed());
        let resp = app
            .oneshot(
                Request::get("/api/transcript/export")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_hide_keys() {
        let app = app(vec![], keyed());
        let resp = app
            .clone()
            .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["configured"]["openai"], true);
        assert_eq!(v["configured"]["anthropic"], false);
        assert!(!v.to_string().contains("sk-test"));
    }

    #[tokio::test]
    async fn test_settings_round_trip_keeps_keys() {
        let app = app(vec![], keyed());
        let resp = app
            .clone()
            .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut v = body_json(resp).await;
        v["language"] = json!("fr-FR");

        let resp = app
            .clone()
            .oneshot(json_request(Method::PUT, "/api/settings", v))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["language"], "fr-FR");
        assert_eq!(v["configured"]["openai"], true);

        let resp = app
            .oneshot(json_request(
                Method::PUT,
                "/api/settings",
                json!({"api_keys": {"anthropic": "sk-ant", "openai": ""}, "theme": "dark"}),
            ))
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["configured"]["openai"], false);
        assert_eq!(v["configured"]["anthropic"], true);
        assert_eq!(v["theme"], "dark");
        assert_eq!(v["language"], "fr-FR");
    }

    #[tokio::test]
    async fn test_settings_rejects_invalid_update() {
        let resp = app(vec![], keyed())
            .oneshot(json_request(
                Method::PUT,
                "/api/settings",
                json!({"sample_rate": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_single_message() {
        let app = app(
            vec![ok(r#"{"choices":[{"message":{"content":"Hi there"}}]}"#)],
            keyed(),
        );
        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/api/chat",
                json!({"provider": "openai", "text": "Hello"}),
            ))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(Request::get("/api/transcript/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["content"], "Hi there");
        assert_eq!(v["role"], "assistant");

        let resp = app
            .oneshot(Request::get("/api/transcript/2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_providers_listing() {
        let resp = app(vec![], keyed())
            .oneshot(Request::get("/api/providers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = body_json(resp).await;
        let providers = v["providers"].as_array().unwrap();
        assert_eq!(providers.len(), 3);
        assert_eq!(providers[2]["id"], "anthropic");
        assert_eq!(providers[2]["model_name"], "claude-3-sonnet-20240229");
    }
}
