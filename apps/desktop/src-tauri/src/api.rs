use std::path::Path;

use reqwest::{multipart, Client};
use serde::Deserialize;

use crate::debug_log;
use crate::trace::Span;

/// How an endpoint call failed. The flows translate `kind` into the
/// user-visible status line; `code`/`message` feed the trace log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The request never completed (connect/send/read failure).
    Transport,
    /// The response arrived but was not the JSON shape the backend speaks.
    Protocol,
    /// The backend answered with an `error` field; message is verbatim.
    Application,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

fn err(kind: ApiErrorKind, code: &str, message: impl Into<String>) -> ApiError {
    ApiError {
        kind,
        code: code.to_string(),
        message: message.into(),
    }
}

impl ApiError {
    fn trace_kind(&self) -> &'static str {
        match self.kind {
            ApiErrorKind::Transport => "http",
            ApiErrorKind::Protocol => "parse",
            ApiErrorKind::Application => "app",
        }
    }
}

/// Fallback surfaced when the backend answers with neither the success
/// field nor an `error` field.
pub const FALLBACK_ERROR: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct AudioTranslation {
    pub transcribed_text: String,
    pub translated_text: String,
    pub audio_url: Option<String>,
    pub detected_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslateTextResp {
    translated_text: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpeechResp {
    audio_url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslateAudioResp {
    transcribed_text: Option<String>,
    translated_text: Option<String>,
    audio_url: Option<String>,
    detected_language: Option<String>,
    error: Option<String>,
}

/// HTTP client for the translation backend. One instance per command
/// invocation; the underlying `reqwest::Client` is shared and cheap to clone.
#[derive(Clone)]
pub struct TranslateApi {
    client: Client,
    base_url: String,
}

impl TranslateApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Resolve a server-relative audio reference against the base URL.
    pub fn resolve_audio_url(&self, audio_url: &str) -> String {
        if audio_url.starts_with("http://") || audio_url.starts_with("https://") {
            return audio_url.to_string();
        }
        if audio_url.starts_with('/') {
            format!("{}{}", self.base_url, audio_url)
        } else {
            format!("{}/{}", self.base_url, audio_url)
        }
    }

    pub async fn translate_text(
        &self,
        data_dir: &Path,
        task_id: &str,
        text: &str,
        language: &str,
    ) -> Result<String, ApiError> {
        let span = Span::start(
            data_dir,
            Some(task_id),
            "Api",
            "API.translate_text",
            Some(serde_json::json!({"text_chars": text.len(), "language": language})),
        );
        let out = self
            .post_json_endpoint(
                data_dir,
                task_id,
                "/api/translate_text",
                &serde_json::json!({"text": text, "language": language}),
            )
            .await
            .and_then(|body| {
                let resp: TranslateTextResp = parse_body(&body)?;
                if let Some(e) = non_empty(resp.error) {
                    return Err(err(ApiErrorKind::Application, "E_API_TRANSLATE", e));
                }
                non_empty(resp.translated_text).ok_or_else(|| {
                    err(ApiErrorKind::Application, "E_API_TRANSLATE", FALLBACK_ERROR)
                })
            });
        match &out {
            Ok(v) => span.ok(Some(serde_json::json!({"translated_chars": v.len()}))),
            Err(e) => span.err(e.trace_kind(), &e.code, &e.message, None),
        }
        out
    }

    pub async fn synthesize_speech(
        &self,
        data_dir: &Path,
        task_id: &str,
        text: &str,
    ) -> Result<String, ApiError> {
        let span = Span::start(
            data_dir,
            Some(task_id),
            "Api",
            "API.synthesize_speech",
            Some(serde_json::json!({"text_chars": text.len()})),
        );
        let out = self
            .post_json_endpoint(
                data_dir,
                task_id,
                "/api/play_text_audio",
                &serde_json::json!({"text": text}),
            )
            .await
            .and_then(|body| {
                let resp: SpeechResp = parse_body(&body)?;
                if let Some(e) = non_empty(resp.error) {
                    return Err(err(ApiErrorKind::Application, "E_API_SPEECH", e));
                }
                non_empty(resp.audio_url)
                    .ok_or_else(|| err(ApiErrorKind::Application, "E_API_SPEECH", FALLBACK_ERROR))
            });
        match &out {
            Ok(v) => span.ok(Some(serde_json::json!({"audio_url": v}))),
            Err(e) => span.err(e.trace_kind(), &e.code, &e.message, None),
        }
        out
    }

    pub async fn translate_audio(
        &self,
        data_dir: &Path,
        task_id: &str,
        clip_bytes: Vec<u8>,
        clip_content_type: &str,
        clip_file_name: &str,
        language: &str,
    ) -> Result<AudioTranslation, ApiError> {
        let span = Span::start(
            data_dir,
            Some(task_id),
            "Api",
            "API.translate_audio",
            Some(serde_json::json!({
                "clip_bytes": clip_bytes.len(),
                "content_type": clip_content_type,
                "language": language,
            })),
        );

        let out = self
            .translate_audio_inner(
                data_dir,
                task_id,
                clip_bytes,
                clip_content_type,
                clip_file_name,
                language,
            )
            .await;
        match &out {
            Ok(v) => span.ok(Some(serde_json::json!({
                "transcribed_chars": v.transcribed_text.len(),
                "translated_chars": v.translated_text.len(),
                "has_audio_url": v.audio_url.is_some(),
                "detected_language": v.detected_language,
            }))),
            Err(e) => span.err(e.trace_kind(), &e.code, &e.message, None),
        }
        out
    }

    async fn translate_audio_inner(
        &self,
        data_dir: &Path,
        task_id: &str,
        clip_bytes: Vec<u8>,
        clip_content_type: &str,
        clip_file_name: &str,
        language: &str,
    ) -> Result<AudioTranslation, ApiError> {
        let part = multipart::Part::bytes(clip_bytes)
            .file_name(clip_file_name.to_string())
            .mime_str(clip_content_type)
            .map_err(|e| {
                err(
                    ApiErrorKind::Protocol,
                    "E_API_MULTIPART",
                    format!("invalid mime: {e}"),
                )
            })?;
        let form = multipart::Form::new()
            .part("audio", part)
            .text("language", language.to_string());

        let resp = self
            .client
            .post(self.endpoint("/api/translate_audio"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                err(
                    ApiErrorKind::Transport,
                    "E_API_HTTP_SEND",
                    format!("request failed: {e}"),
                )
            })?;
        let body = read_body(data_dir, task_id, "translate_audio_response.json", resp).await?;

        let parsed: TranslateAudioResp = parse_body(&body)?;
        if let Some(e) = non_empty(parsed.error) {
            return Err(err(ApiErrorKind::Application, "E_API_TRANSLATE_AUDIO", e));
        }
        match (
            non_empty(parsed.transcribed_text),
            non_empty(parsed.translated_text),
        ) {
            (Some(transcribed_text), Some(translated_text)) => Ok(AudioTranslation {
                transcribed_text,
                translated_text,
                audio_url: non_empty(parsed.audio_url),
                detected_language: non_empty(parsed.detected_language),
            }),
            _ => Err(err(
                ApiErrorKind::Application,
                "E_API_TRANSLATE_AUDIO",
                FALLBACK_ERROR,
            )),
        }
    }

    /// Download a server-hosted audio resource for playback.
    pub async fn fetch_audio(
        &self,
        data_dir: &Path,
        task_id: &str,
        audio_url: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let url = self.resolve_audio_url(audio_url);
        let span = Span::start(
            data_dir,
            Some(task_id),
            "Api",
            "API.fetch_audio",
            Some(serde_json::json!({"url": url})),
        );
        let out = async {
            let resp = self.client.get(&url).send().await.map_err(|e| {
                err(
                    ApiErrorKind::Transport,
                    "E_API_HTTP_SEND",
                    format!("request failed: {e}"),
                )
            })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(err(
                    ApiErrorKind::Protocol,
                    &format!("E_API_HTTP_STATUS_{}", status.as_u16()),
                    "audio fetch failed",
                ));
            }
            let bytes = resp.bytes().await.map_err(|e| {
                err(
                    ApiErrorKind::Transport,
                    "E_API_HTTP_READ",
                    format!("read response failed: {e}"),
                )
            })?;
            Ok(bytes.to_vec())
        }
        .await;
        match &out {
            Ok(v) => span.ok(Some(serde_json::json!({"bytes": v.len()}))),
            Err(e) => span.err(e.trace_kind(), &e.code, &e.message, None),
        }
        out
    }

    async fn post_json_endpoint(
        &self,
        data_dir: &Path,
        task_id: &str,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                err(
                    ApiErrorKind::Transport,
                    "E_API_HTTP_SEND",
                    format!("request failed: {e}"),
                )
            })?;
        let dump_name = format!(
            "{}_response.json",
            path.trim_start_matches("/api/").replace('/', "_")
        );
        read_body(data_dir, task_id, &dump_name, resp).await
    }
}

/// The backend attaches JSON `{error}` bodies to 4xx/5xx responses, so the
/// body is read and parsed regardless of HTTP status.
async fn read_body(
    data_dir: &Path,
    task_id: &str,
    dump_name: &str,
    resp: reqwest::Response,
) -> Result<String, ApiError> {
    let body = resp.text().await.map_err(|e| {
        err(
            ApiErrorKind::Transport,
            "E_API_HTTP_READ",
            format!("read response failed: {e}"),
        )
    })?;
    if let Some(info) =
        debug_log::write_payload_best_effort(data_dir, task_id, dump_name, body.clone().into_bytes())
    {
        debug_log::emit_debug_event_best_effort(data_dir, "api_response", task_id, &info, None);
    }
    Ok(body)
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        err(
            ApiErrorKind::Protocol,
            "E_API_PARSE",
            format!("invalid json response: {e}"),
        )
    })
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{ApiErrorKind, TranslateApi, FALLBACK_ERROR};

    fn api(base: &str) -> TranslateApi {
        TranslateApi::new(reqwest::Client::new(), base)
    }

    #[tokio::test]
    async fn translate_text_returns_translated_field() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/translate_text")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"translated_text":"hola"}"#)
            .create_async()
            .await;

        let td = tempfile::tempdir().expect("tempdir");
        let out = api(&server.url())
            .translate_text(td.path(), "t1", "hello", "es")
            .await
            .expect("translate");
        assert_eq!(out, "hola");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn error_body_is_surfaced_verbatim_even_on_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/translate_text")
            .with_status(500)
            .with_body(r#"{"error":"rate limited"}"#)
            .create_async()
            .await;

        let td = tempfile::tempdir().expect("tempdir");
        let e = api(&server.url())
            .translate_text(td.path(), "t1", "hello", "es")
            .await
            .expect_err("must fail");
        assert_eq!(e.kind, ApiErrorKind::Application);
        assert_eq!(e.message, "rate limited");
    }

    #[tokio::test]
    async fn missing_success_field_falls_back_to_literal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/play_text_audio")
            .with_status(200)
            .with_body(r#"{}"#)
            .create_async()
            .await;

        let td = tempfile::tempdir().expect("tempdir");
        let e = api(&server.url())
            .synthesize_speech(td.path(), "t1", "hola")
            .await
            .expect_err("must fail");
        assert_eq!(e.kind, ApiErrorKind::Application);
        assert_eq!(e.message, FALLBACK_ERROR);
    }

    #[tokio::test]
    async fn non_json_body_is_a_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/translate_text")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let td = tempfile::tempdir().expect("tempdir");
        let e = api(&server.url())
            .translate_text(td.path(), "t1", "hello", "es")
            .await
            .expect_err("must fail");
        assert_eq!(e.kind, ApiErrorKind::Protocol);
        assert_eq!(e.code, "E_API_PARSE");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) is a safe bet for a refused connection.
        let td = tempfile::tempdir().expect("tempdir");
        let e = api("http://127.0.0.1:9")
            .translate_text(td.path(), "t1", "hello", "es")
            .await
            .expect_err("must fail");
        assert_eq!(e.kind, ApiErrorKind::Transport);
        assert_eq!(e.code, "E_API_HTTP_SEND");
    }

    #[tokio::test]
    async fn translate_audio_posts_multipart_and_parses_all_fields() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/translate_audio")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data.*".to_string()),
            )
            .with_status(200)
            .with_body(
                r#"{"transcribed_text":"hello there","translated_text":"hola","audio_url":"/generated/x.mp3","detected_language":"en"}"#,
            )
            .create_async()
            .await;

        let td = tempfile::tempdir().expect("tempdir");
        let out = api(&server.url())
            .translate_audio(
                td.path(),
                "t1",
                vec![0u8; 64],
                "audio/wav",
                "audio.wav",
                "Hindi",
            )
            .await
            .expect("translate");
        assert_eq!(out.transcribed_text, "hello there");
        assert_eq!(out.translated_text, "hola");
        assert_eq!(out.audio_url.as_deref(), Some("/generated/x.mp3"));
        assert_eq!(out.detected_language.as_deref(), Some("en"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn translate_audio_without_transcript_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/translate_audio")
            .with_status(200)
            .with_body(r#"{"translated_text":"hola"}"#)
            .create_async()
            .await;

        let td = tempfile::tempdir().expect("tempdir");
        let e = api(&server.url())
            .translate_audio(td.path(), "t1", vec![0u8; 8], "audio/wav", "audio.wav", "Hindi")
            .await
            .expect_err("must fail");
        assert_eq!(e.kind, ApiErrorKind::Application);
        assert_eq!(e.message, FALLBACK_ERROR);
    }

    #[test]
    fn audio_urls_resolve_against_base() {
        let api = api("http://host:5000/");
        assert_eq!(
            api.resolve_audio_url("/generated/a.mp3"),
            "http://host:5000/generated/a.mp3"
        );
        assert_eq!(
            api.resolve_audio_url("generated/a.mp3"),
            "http://host:5000/generated/a.mp3"
        );
        assert_eq!(
            api.resolve_audio_url("https://cdn/a.mp3"),
            "https://cdn/a.mp3"
        );
    }
}
