//! HTTP implementation of the interview backend

use super::backend::{AnalysisStatus, AnswerOutcome, InterviewBackend};
use super::error::{ApiError, ApiResult};
use super::types::{
    AnalysisStatusResponse, CreateSessionRequest, CreateSessionResponse, ErrorBody,
    QuestionListResponse, SessionStatusResponse, SubmitAnswerResponse, TriggerAnalysisRequest,
    TriggerAnalysisResponse, TtsResponse, UploadVideoResponse,
};
use crate::config::ApiConfig;
use crate::interview::types::{InterviewSession, Question, SessionRequest, SessionStatus};
use crate::recorder::MediaBlob;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

const SESSIONS_ENDPOINT: &str = "/api/interviews/sessions";
const ANSWER_ENDPOINT: &str = "/api/voice/answer/complete";

/// reqwest-backed client for the interview server
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn from_config(config: &ApiConfig) -> ApiResult<Self> {
        Self::new(
            config.base_url.clone(),
            config.bearer_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and return the raw body of a 2xx response
    async fn send(&self, builder: RequestBuilder, label: &str) -> ApiResult<String> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("{} failed: {}", label, e);
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        tracing::debug!("{} -> {}", label, status);
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if status.is_success() {
            return Ok(body);
        }

        let reason = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::reason)
            .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

        tracing::error!("{} returned {}: {}", label, status, reason);
        Err(ApiError::Server {
            status: status.as_u16(),
            reason,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, label: &str) -> ApiResult<T> {
        let body = self.send(builder, label).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("{} returned an unexpected payload: {}", label, e);
            ApiError::MalformedResponse(format!("{}: {}", label, e))
        })
    }
}

fn media_part(blob: &MediaBlob, stem: &str) -> ApiResult<Part> {
    Part::bytes(blob.data.to_vec())
        .file_name(blob.file_name(stem))
        .mime_str(&blob.mime_type)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid MIME type {}: {}", blob.mime_type, e)))
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[async_trait]
impl InterviewBackend for HttpBackend {
    async fn create_session(&self, request: &SessionRequest) -> ApiResult<InterviewSession> {
        let builder = self.request(Method::POST, SESSIONS_ENDPOINT);
        let builder = match &request.job_posting_url {
            Some(url) => {
                let mut form = Form::new().text("job_posting_url", url.clone());
                if let Some(id) = &request.job_posting_id {
                    form = form.text("job_posting_id", id.clone());
                }
                builder.multipart(form)
            }
            None => builder.json(&CreateSessionRequest {
                job_posting_id: request.job_posting_id.clone(),
            }),
        };

        let response: CreateSessionResponse = self.send_json(builder, "create session").await?;
        let session = response.into_session(request.job_posting_id.clone())?;
        tracing::info!("Created interview session {}", session.session_id);
        Ok(session)
    }

    async fn list_questions(&self, session_id: &str) -> ApiResult<Vec<Question>> {
        let path = format!("{}/{}/questions", SESSIONS_ENDPOINT, encode(session_id));
        let response: QuestionListResponse = self
            .send_json(self.request(Method::GET, &path), "list questions")
            .await?;
        let questions = response.into_questions();
        tracing::info!("Fetched {} questions for session {}", questions.len(), session_id);
        Ok(questions)
    }

    async fn submit_answer(
        &self,
        session: &InterviewSession,
        question: &Question,
        audio: &MediaBlob,
    ) -> ApiResult<AnswerOutcome> {
        let form = Form::new()
            .text("session_id", session.session_id.clone())
            .text("question_id", question.id.to_string())
            .text("turn_type", question.kind.as_str())
            .part("audio_file", media_part(audio, "answer")?);

        tracing::info!(
            "Submitting answer for {} ({} bytes, {})",
            question.id,
            audio.len(),
            audio.mime_type
        );
        let response: SubmitAnswerResponse = self
            .send_json(
                self.request(Method::POST, ANSWER_ENDPOINT).multipart(form),
                "submit answer",
            )
            .await?;
        Ok(AnswerOutcome::from_response(question, response))
    }

    async fn upload_video(&self, session_id: &str, video: &MediaBlob) -> ApiResult<String> {
        let path = format!("{}/{}/videos", SESSIONS_ENDPOINT, encode(session_id));
        let form = Form::new()
            .text("session_id", session_id.to_string())
            .part("video_file", media_part(video, "interview")?);

        tracing::info!("Uploading session video ({} bytes)", video.len());
        let response: UploadVideoResponse = self
            .send_json(self.request(Method::POST, &path).multipart(form), "upload video")
            .await?;

        let video_id = response.video_id.to_string();
        if video_id.trim().is_empty() {
            return Err(ApiError::MalformedResponse("video id is empty".to_string()));
        }
        tracing::info!("Session video stored as {}", video_id);
        Ok(video_id)
    }

    async fn trigger_analysis(&self, video_id: &str) -> ApiResult<bool> {
        let path = format!("/api/interviews/videos/{}/analyze", encode(video_id));
        let response: TriggerAnalysisResponse = self
            .send_json(
                self.request(Method::POST, &path)
                    .json(&TriggerAnalysisRequest { video_id }),
                "trigger analysis",
            )
            .await?;
        Ok(response.accepted)
    }

    async fn analysis_status(&self, video_id: &str) -> ApiResult<AnalysisStatus> {
        let path = format!("/api/interviews/videos/{}/analysis", encode(video_id));
        let response: AnalysisStatusResponse = self
            .send_json(self.request(Method::GET, &path), "analysis status")
            .await?;
        Ok(response.into())
    }

    async fn complete_session(&self, session_id: &str) -> ApiResult<()> {
        let path = format!("{}/{}/complete", SESSIONS_ENDPOINT, encode(session_id));
        self.send(self.request(Method::PATCH, &path), "complete session")
            .await?;
        Ok(())
    }

    async fn session_status(&self, session_id: &str) -> ApiResult<SessionStatus> {
        let path = format!("/api/voice/session/{}/status", encode(session_id));
        let response: SessionStatusResponse = self
            .send_json(self.request(Method::GET, &path), "session status")
            .await?;
        Ok(response.into())
    }

    async fn question_audio(&self, question_id: &str) -> ApiResult<String> {
        let path = format!("/api/interviews/questions/{}/tts", encode(question_id));
        let response: TtsResponse = self
            .send_json(self.request(Method::GET, &path), "question audio")
            .await?;
        Ok(response.audio_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::backend::NextStep;
    use crate::interview::types::QuestionKind;
    use axum::body::Bytes;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> HttpBackend {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        HttpBackend::new(
            format!("http://{}/", addr),
            Some("secret-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn session() -> InterviewSession {
        InterviewSession {
            session_id: "s1".to_string(),
            job_posting_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_session_and_list_questions() {
        let app = Router::new()
            .route(
                "/api/interviews/sessions",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(headers["authorization"], "Bearer secret-token");
                    assert_eq!(body["job_posting_id"], "jp-7");
                    Json(json!({"id": 41, "status": "in_progress", "job_posting_id": "jp-7"}))
                }),
            )
            .route(
                "/api/interviews/sessions/:id/questions",
                get(|Path(id): Path<String>| async move {
                    assert_eq!(id, "41");
                    Json(json!([
                        {"id": "q2", "text": "Why this role?", "order": 1, "type": "main"},
                        {"id": "q1", "text": "Tell me about yourself", "order": 0, "type": "main"}
                    ]))
                }),
            );
        let backend = serve(app).await;

        let session = backend
            .create_session(&SessionRequest::from_job_posting("jp-7"))
            .await
            .unwrap();
        assert_eq!(session.session_id, "41");
        assert_eq!(session.job_posting_id.as_deref(), Some("jp-7"));

        let questions = backend.list_questions(&session.session_id).await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "Why this role?");
    }

    #[tokio::test]
    async fn test_create_session_from_url_uses_multipart() {
        let app = Router::new().route(
            "/api/interviews/sessions",
            post(|headers: HeaderMap, body: Bytes| async move {
                let content_type = headers["content-type"].to_str().unwrap().to_string();
                assert!(content_type.starts_with("multipart/form-data"));
                let body = String::from_utf8_lossy(&body);
                assert!(body.contains("name=\"job_posting_url\""));
                assert!(body.contains("https://jobs.example.com/123"));
                Json(json!({"id": "s1", "status": "in_progress"}))
            }),
        );
        let backend = serve(app).await;

        let session = backend
            .create_session(&SessionRequest::from_url("https://jobs.example.com/123"))
            .await
            .unwrap();
        assert_eq!(session.session_id, "s1");
    }

    #[tokio::test]
    async fn test_submit_answer_sends_turn_and_audio() {
        let app = Router::new().route(
            "/api/voice/answer/complete",
            post(|body: Bytes| async move {
                let body = String::from_utf8_lossy(&body);
                assert!(body.contains("name=\"turn_type\""));
                assert!(body.contains("followup"));
                assert!(body.contains("name=\"question_id\""));
                assert!(body.contains("filename=\"answer.webm\""));
                assert!(body.contains("opus-bytes"));
                Json(json!({"is_final": true, "answer_text": "I like hard problems"}))
            }),
        );
        let backend = serve(app).await;

        let mut question = Question::new("q1", 0, "Tell me about yourself");
        question.kind = QuestionKind::Followup;
        let blob = MediaBlob::new(&b"opus-bytes"[..], "audio/webm");

        let outcome = backend.submit_answer(&session(), &question, &blob).await.unwrap();
        assert_eq!(outcome.next, NextStep::Final);
        assert_eq!(outcome.receipt.answer_text.as_deref(), Some("I like hard problems"));
    }

    #[tokio::test]
    async fn test_upload_video_accepts_id_alias() {
        let app = Router::new().route(
            "/api/interviews/sessions/:id/videos",
            post(|Path(id): Path<String>, body: Bytes| async move {
                assert_eq!(id, "s1");
                assert!(String::from_utf8_lossy(&body).contains("name=\"video_file\""));
                Json(json!({"id": 9}))
            }),
        );
        let backend = serve(app).await;

        let blob = MediaBlob::new(&b"frames"[..], "video/webm");
        assert_eq!(backend.upload_video("s1", &blob).await.unwrap(), "9");
    }

    #[tokio::test]
    async fn test_server_error_reason_is_extracted() {
        let app = Router::new().route(
            "/api/interviews/videos/:id/analysis",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({"detail": "Video not found"})),
                )
            }),
        );
        let backend = serve(app).await;

        let err = backend.analysis_status("v404").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Server {
                status: 404,
                reason: "Video not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let app = Router::new().route(
            "/api/interviews/questions/:id/tts",
            get(|| async { "not json" }),
        );
        let backend = serve(app).await;

        let err = backend.question_audio("q1").await.unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_analysis_flow_endpoints() {
        let app = Router::new()
            .route(
                "/api/interviews/videos/:id/analyze",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["video_id"], "v1");
                    Json(json!({"accepted": true}))
                }),
            )
            .route(
                "/api/interviews/videos/:id/analysis",
                get(|| async {
                    Json(json!({
                        "status": "completed",
                        "capabilities": [{"skill": "Communication", "value": 85}],
                        "suggestions": []
                    }))
                }),
            )
            .route(
                "/api/interviews/sessions/:id/complete",
                patch(|| async { Json(json!({"status": "completed"})) }),
            )
            .route(
                "/api/voice/session/:id/status",
                get(|Path(id): Path<String>| async move {
                    Json(json!({"session_id": id, "status": "completed", "total_questions": 3, "answered_questions": 3}))
                }),
            );
        let backend = serve(app).await;

        assert!(backend.trigger_analysis("v1").await.unwrap());
        match backend.analysis_status("v1").await.unwrap() {
            AnalysisStatus::Completed(result) => assert_eq!(result.capabilities[0].value, 85.0),
            other => panic!("unexpected status {:?}", other),
        }
        backend.complete_session("s1").await.unwrap();
        let status = backend.session_status("s1").await.unwrap();
        assert_eq!(status.answered_questions, 3);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(format!("http://{}", addr), None, Duration::from_secs(2)).unwrap();
        let err = backend.session_status("s1").await.unwrap_err();
        assert!(err.is_network());
    }
}
