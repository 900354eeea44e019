//! HTTP surface of the chat backend.

use std::error::Error;
use std::fmt;

use actix_web::http::{header, StatusCode};
use actix_web::{error, get, middleware, post, web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::json;
use tracing::{info, warn};

use crate::api::{ChatPrompt, FunctionDefinition};
use crate::core::chat_stream::{build_chat_request, open_upstream, ChatStreamError, ReframedStream};
use crate::core::config::data::AssistantConfig;
use crate::core::config::{Config, UpstreamSettings};
use crate::core::functions::declared_functions;

/// Shared, read-only state. Everything mutable lives in the per-request stream.
pub struct AppState {
    pub client: reqwest::Client,
    pub upstream: UpstreamSettings,
    pub system_prompt: String,
    pub functions: Vec<FunctionDefinition>,
}

impl AppState {
    pub fn new(
        client: reqwest::Client,
        upstream: UpstreamSettings,
        assistant: &AssistantConfig,
    ) -> Self {
        let functions = if assistant.functions {
            declared_functions()
        } else {
            Vec::new()
        };
        Self {
            client,
            upstream,
            system_prompt: assistant.system_prompt.clone(),
            functions,
        }
    }
}

#[derive(Debug)]
pub enum ChatProxyError {
    BadRequest(String),
    Upstream(ChatStreamError),
}

impl fmt::Display for ChatProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatProxyError::BadRequest(message) => write!(f, "{message}"),
            ChatProxyError::Upstream(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ChatProxyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChatProxyError::BadRequest(_) => None,
            ChatProxyError::Upstream(err) => Some(err),
        }
    }
}

impl error::ResponseError for ChatProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ChatProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ChatProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

#[post("/api/chat")]
pub async fn chat(
    body: web::Json<ChatPrompt>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ChatProxyError> {
    let prompt = body.into_inner();
    if prompt.prompt.trim().is_empty() {
        return Err(ChatProxyError::BadRequest(
            "prompt must not be empty".to_string(),
        ));
    }

    let request = build_chat_request(
        prompt,
        &state.upstream.model,
        &state.system_prompt,
        state.functions.clone(),
    );
    let upstream = open_upstream(&state.client, &state.upstream, &request)
        .await
        .map_err(|err| {
            warn!(error = %err, "Upstream completion request failed");
            ChatProxyError::Upstream(err)
        })?;

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(ReframedStream::new(upstream)))
}

async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": format!("No route for {}", req.path()) }))
}

fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ChatProxyError::BadRequest(err.to_string()).into()
}

/// Routes and extractor config, shared by [`run`] and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(health)
        .service(chat)
        .default_service(web::to(not_found));
}

pub async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let upstream = config.upstream_settings()?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("chatfolio/", env!("CARGO_PKG_VERSION")))
        .build()?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %upstream.model,
        functions = config.assistant.functions,
        "Starting chat server"
    );

    let app_state = web::Data::new(AppState::new(client, upstream, &config.assistant));

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
