//! Antigravity gateway client
//!
//! Implements the Cloud Code `v1internal` API that multiplexes Gemini and
//! Claude models:
//! - Quota-family endpoint and header selection
//! - One-shot warmup to prime a thought signature before tool use
//! - Streaming responses with cooperative cancellation

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use super::conversion::{convert, BackendPayload};
use super::model_resolver::{resolve, QuotaFamily, ResolvedModel};
use super::signature::{SessionState, SignatureFamily};
use super::stream::StreamReassembler;
use super::translator::{translate, unwrap_response, ThoughtState};
use super::{ChatRequest, ChatResponse, LlmClient, LlmError, StreamEvent};
use crate::auth::TokenProvider;
use crate::config::BridgeConfig;
use crate::models::{GenerationOptions, Message};

const ANTIGRAVITY_USER_AGENT_PREFIX: &str = "antigravity/1.11.5";
const GEMINI_CLI_USER_AGENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";
const ANTIGRAVITY_API_CLIENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";
const GEMINI_CLI_API_CLIENT: &str = "gl-node/22.17.0";
const CLIENT_METADATA: &str =
    r#"{"ideType":"IDE_UNSPECIFIED","platform":"PLATFORM_UNSPECIFIED","pluginType":"GEMINI"}"#;
const WARMUP_PROMPT: &str = "Warmup request for thinking signature.";
const CANCELLED: &str = "cancelled";

static ANTIGRAVITY_USER_AGENT: LazyLock<String> = LazyLock::new(|| {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{} {}/{}", ANTIGRAVITY_USER_AGENT_PREFIX, os, arch)
});

/// Antigravity gateway client
pub struct AntigravityClient {
    config: BridgeConfig,
    tokens: Arc<dyn TokenProvider>,
    client: Client,
    session: Arc<Mutex<SessionState>>,
}

impl AntigravityClient {
    pub fn new(config: BridgeConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            config,
            tokens,
            client: builder.build()?,
            session: Arc::new(Mutex::new(SessionState::new())),
        })
    }

    /// Signature state shared by every request made through this client
    pub fn session(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.session)
    }

    fn base_url(&self, family: QuotaFamily) -> &str {
        match family {
            QuotaFamily::Antigravity => &self.config.antigravity_endpoint,
            QuotaFamily::GeminiCli => &self.config.gemini_cli_endpoint,
        }
    }

    fn resolve_request(&self, request: &ChatRequest) -> ResolvedModel {
        let requested = if request.model.trim().is_empty() {
            self.config.default_model.as_str()
        } else {
            request.model.as_str()
        };
        resolve(requested)
    }

    /// Resolve, authenticate, warm up if needed and build the envelope
    async fn prepare(&self, request: &ChatRequest) -> Result<(ResolvedModel, String, Value), LlmError> {
        let resolved = self.resolve_request(request);
        let token = self.tokens.get_valid_bearer_token(true).await?;

        let mut payload = self.build_payload(request, &resolved).await;
        let wants_warmup = {
            let session = self.session.lock().await;
            needs_warmup(&resolved, &payload, &session)
        };
        if wants_warmup && self.config.warmup_enabled {
            self.warmup(&resolved, &token).await;
            payload = self.build_payload(request, &resolved).await;
        }

        let envelope = build_envelope(&self.config.project_id, &resolved, payload.into_request());
        Ok((resolved, token, envelope))
    }

    async fn build_payload(&self, request: &ChatRequest, resolved: &ResolvedModel) -> BackendPayload {
        let session = self.session.lock().await;
        convert(
            &request.messages,
            &request.tools,
            &request.options,
            resolved,
            &session,
        )
    }

    /// Non-streaming call that only primes the session's signature cache
    ///
    /// Failures are logged and ignored; the main request goes ahead either way.
    async fn warmup(&self, resolved: &ResolvedModel, token: &str) {
        log::info!("[Antigravity] warmup for {}", resolved.actual_model);
        let payload = {
            let session = self.session.lock().await;
            convert(
                &[Message::user(WARMUP_PROMPT)],
                &[],
                &GenerationOptions::default(),
                resolved,
                &session,
            )
        };
        let envelope = build_envelope(&self.config.project_id, resolved, payload.into_request());

        let body = match self.post(resolved.quota_preference, &envelope, token, false).await {
            Ok(response) => read_body(response).await,
            Err(e) => Err(e),
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                log::warn!("[Antigravity] warmup failed: {}", e);
                return;
            }
        };

        let family = SignatureFamily::of(resolved);
        let mut session = self.session.lock().await;
        let mut thoughts = ThoughtState::new(family);
        if let Err(e) = translate(unwrap_response(&body), &mut thoughts, &mut session) {
            log::warn!("[Antigravity] warmup returned an error: {}", e);
        } else if session.last_thought(family).is_none() {
            log::warn!("[Antigravity] warmup returned no thought signature");
        }
    }

    async fn post(
        &self,
        family: QuotaFamily,
        envelope: &Value,
        token: &str,
        streaming: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let url = endpoint_url(self.base_url(family), streaming);
        log::info!(
            "[Antigravity] request: url={}, model={}",
            url,
            envelope["model"].as_str().unwrap_or_default()
        );

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Content-Type", "application/json");
        if streaming {
            builder = builder.header("Accept", "text/event-stream");
        }
        for (name, value) in family_headers(family) {
            builder = builder.header(name, value);
        }

        let response = builder.json(envelope).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            log::warn!("[Antigravity] API error {}: {}", status, error_text);
            return Err(LlmError::ApiError {
                status,
                message: error_text,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmClient for AntigravityClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let (resolved, token, envelope) = self.prepare(&request).await?;
        let response = self
            .post(resolved.quota_preference, &envelope, &token, false)
            .await?;
        let body = read_body(response).await?;

        let mut session = self.session.lock().await;
        let mut thoughts = ThoughtState::new(SignatureFamily::of(&resolved));
        let chunk = translate(unwrap_response(&body), &mut thoughts, &mut session)?;

        Ok(ChatResponse {
            parts: chunk.parts,
            finish_reason: chunk.finish_reason,
            usage: chunk.usage,
        })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, LlmError> {
        let (tx, rx) = mpsc::channel(100);

        if request.is_cancelled() {
            let _ = tx
                .send(StreamEvent::Done {
                    finish_reason: CANCELLED.to_string(),
                })
                .await;
            return Ok(rx);
        }

        let connect = async {
            let (resolved, token, envelope) = self.prepare(&request).await?;
            let response = self
                .post(resolved.quota_preference, &envelope, &token, true)
                .await?;
            Ok::<_, LlmError>((resolved, response))
        };
        // Warmup and connection setup can be slow; a cancel aborts them too
        let (resolved, response) = tokio::select! {
            biased;
            _ = cancellation(request.cancel.clone()) => {
                log::info!("[Antigravity] stream cancelled before the response arrived");
                let _ = tx
                    .send(StreamEvent::Done {
                        finish_reason: CANCELLED.to_string(),
                    })
                    .await;
                return Ok(rx);
            }
            result = connect => result?,
        };

        let session = Arc::clone(&self.session);
        let mut cancel = request.cancel.clone();
        let mut stream = response.bytes_stream();
        let family = SignatureFamily::of(&resolved);

        tokio::spawn(async move {
            let mut reassembler = StreamReassembler::new(family);

            loop {
                if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                    log::info!("[Antigravity] stream cancelled");
                    let _ = tx
                        .send(StreamEvent::Done {
                            finish_reason: CANCELLED.to_string(),
                        })
                        .await;
                    // Dropping the byte stream aborts the request
                    return;
                }

                let mut sender_gone = false;
                let next = match cancel.as_mut() {
                    Some(rx) => tokio::select! {
                        changed = rx.changed() => {
                            sender_gone = changed.is_err();
                            None
                        }
                        chunk = stream.next() => Some(chunk),
                    },
                    None => Some(stream.next().await),
                };
                if sender_gone {
                    cancel = None;
                }
                let Some(chunk) = next else {
                    continue;
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        let events = {
                            let mut session = session.lock().await;
                            reassembler.feed(&bytes, &mut session)
                        };
                        for event in events {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx
                            .send(StreamEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        return;
                    }
                    None => break,
                }
            }

            let events = {
                let mut session = session.lock().await;
                reassembler.finish(&mut session)
            };
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }

            if let Some(usage) = reassembler.usage() {
                let _ = tx
                    .send(StreamEvent::Usage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                    })
                    .await;
            }
            let _ = tx
                .send(StreamEvent::Done {
                    finish_reason: reassembler.finish_reason().unwrap_or("STOP").to_string(),
                })
                .await;
        });

        Ok(rx)
    }
}

/// Resolves once `cancel` flips to `true`; never if there is no sender
async fn cancellation(cancel: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel {
        if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Read a non-streaming reply body as JSON
async fn read_body(response: reqwest::Response) -> Result<Value, LlmError> {
    let text = response.text().await?;
    parse_body(&text)
}

fn parse_body(text: &str) -> Result<Value, LlmError> {
    serde_json::from_str(text).map_err(|e| {
        log::warn!("[Antigravity] unreadable response body: {}", e);
        LlmError::InvalidResponse(e.to_string())
    })
}

/// Full URL for a generate call against `base`
pub fn endpoint_url(base: &str, streaming: bool) -> String {
    let base = base.trim_end_matches('/');
    if streaming {
        format!("{}/v1internal:streamGenerateContent?alt=sse", base)
    } else {
        format!("{}/v1internal:generateContent", base)
    }
}

/// `User-Agent`, `X-Goog-Api-Client` and `Client-Metadata` for a family
pub fn family_headers(family: QuotaFamily) -> [(&'static str, String); 3] {
    let (user_agent, api_client) = match family {
        QuotaFamily::Antigravity => (ANTIGRAVITY_USER_AGENT.clone(), ANTIGRAVITY_API_CLIENT),
        QuotaFamily::GeminiCli => (GEMINI_CLI_USER_AGENT.to_string(), GEMINI_CLI_API_CLIENT),
    };
    [
        ("User-Agent", user_agent),
        ("X-Goog-Api-Client", api_client.to_string()),
        ("Client-Metadata", CLIENT_METADATA.to_string()),
    ]
}

pub fn request_id() -> String {
    format!("agent-{}", Uuid::new_v4())
}

/// Outer request envelope
pub fn build_envelope(project_id: &str, resolved: &ResolvedModel, request: Value) -> Value {
    json!({
        "project": project_id,
        "model": resolved.actual_model,
        "request": request,
        "requestType": "agent",
        "userAgent": "antigravity",
        "requestId": request_id(),
    })
}

/// Gemini 3 rejects tool history without a signature it issued
pub fn needs_warmup(resolved: &ResolvedModel, payload: &BackendPayload, session: &SessionState) -> bool {
    resolved.is_gemini3()
        && payload.has_tool_calls()
        && session.last_thought(SignatureFamily::of(resolved)).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, StaticTokenProvider};
    use crate::models::Part;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    fn client_with_token(token: &str) -> AntigravityClient {
        AntigravityClient::new(BridgeConfig::default(), Arc::new(StaticTokenProvider::new(token)))
            .unwrap()
    }

    fn tool_history() -> Vec<Message> {
        vec![
            Message::user("list files"),
            Message::new(
                crate::models::Role::Assistant,
                vec![Part::tool_call("c1", "ls", json!({}))],
            ),
            Message::new(crate::models::Role::User, vec![Part::tool_result("c1", "a.txt")]),
        ]
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://cloudcode-pa.googleapis.com/", false),
            "https://cloudcode-pa.googleapis.com/v1internal:generateContent"
        );
        assert_eq!(
            endpoint_url("https://daily-cloudcode-pa.sandbox.googleapis.com", true),
            "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_family_headers() {
        let antigravity = family_headers(QuotaFamily::Antigravity);
        assert_eq!(antigravity[0].0, "User-Agent");
        assert!(antigravity[0].1.starts_with("antigravity/1.11.5 "));
        assert_eq!(antigravity[1].1, "google-cloud-sdk vscode_cloudshelleditor/0.1");
        assert_eq!(antigravity[2].1, CLIENT_METADATA);

        let cli = family_headers(QuotaFamily::GeminiCli);
        assert_eq!(cli[0].1, "google-cloud-sdk vscode_cloudshelleditor/0.1");
        assert_eq!(cli[1].1, "gl-node/22.17.0");
    }

    #[test]
    fn test_envelope_shape() {
        let resolved = resolve("antigravity-claude-sonnet-4-5");
        let envelope = build_envelope("proj-1", &resolved, json!({"contents": []}));

        assert_eq!(envelope["project"], "proj-1");
        assert_eq!(envelope["model"], json!(resolved.actual_model));
        assert_eq!(envelope["request"], json!({"contents": []}));
        assert_eq!(envelope["requestType"], "agent");
        assert_eq!(envelope["userAgent"], "antigravity");
        let id = envelope["requestId"].as_str().unwrap();
        assert!(id.starts_with("agent-"));
        assert!(Uuid::parse_str(&id["agent-".len()..]).is_ok());
        assert_ne!(request_id(), request_id());
    }

    #[test]
    fn test_needs_warmup() {
        let mut session = SessionState::new();
        let gemini3 = resolve("antigravity-gemini-3-pro-high");
        let flash25 = resolve("gemini-2.5-flash");
        let options = GenerationOptions::default();

        let with_tools = convert(&tool_history(), &[], &options, &gemini3, &session);
        let plain = convert(&[Message::user("hi")], &[], &options, &gemini3, &session);
        assert!(needs_warmup(&gemini3, &with_tools, &session));
        assert!(!needs_warmup(&gemini3, &plain, &session));

        let older = convert(&tool_history(), &[], &options, &flash25, &session);
        assert!(!needs_warmup(&flash25, &older, &session));

        session.record_thought(SignatureFamily::Claude, "plan", "claude-sig");
        assert!(needs_warmup(&gemini3, &with_tools, &session));
        session.record_thought(SignatureFamily::Gemini, "plan", "sig");
        assert!(!needs_warmup(&gemini3, &with_tools, &session));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_sending() {
        let client = client_with_token("");
        let result = client
            .chat(ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]))
            .await;
        assert!(matches!(result, Err(LlmError::Auth(AuthError::MissingCredential))));
    }

    #[tokio::test]
    async fn test_cancelled_stream_finishes_immediately() {
        let client = client_with_token("");
        let (cancel_tx, cancel_rx) = watch::channel(true);
        let mut request = ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]);
        request.cancel = Some(cancel_rx);

        let mut rx = client.chat_stream(request).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Done {
                finish_reason: "cancelled".to_string(),
            })
        );
        assert_eq!(rx.recv().await, None);
        drop(cancel_tx);
    }

    /// Serves one canned raw reply per connection and hands back each request body
    fn serve(replies: Vec<String>) -> (String, std::sync::mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (bodies_tx, bodies_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            for reply in replies {
                let (mut conn, _) = listener.accept().unwrap();
                let _ = bodies_tx.send(read_request_body(&mut conn));
                conn.write_all(reply.as_bytes()).unwrap();
                conn.flush().unwrap();
            }
        });
        (base, bodies_rx)
    }

    fn read_request_body(conn: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = conn.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).into_owned();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn http_reply(status: u16, body: &str) -> String {
        format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    fn client_for(base: &str) -> AntigravityClient {
        let config = BridgeConfig {
            antigravity_endpoint: base.to_string(),
            gemini_cli_endpoint: base.to_string(),
            warmup_enabled: true,
            ..Default::default()
        };
        AntigravityClient::new(config, Arc::new(StaticTokenProvider::new("t"))).unwrap()
    }

    #[tokio::test]
    async fn test_failed_warmup_does_not_block_request() {
        let reply = r#"{"response":{"candidates":[{"content":{"parts":[{"text":"done"}]},"finishReason":"STOP"}]}}"#;
        let (base, bodies) = serve(vec![
            http_reply(500, r#"{"error":{"message":"warmup refused"}}"#),
            http_reply(200, reply),
        ]);
        let client = client_for(&base);

        let response = client
            .chat(ChatRequest::new("antigravity-gemini-3-pro-high", tool_history()))
            .await
            .unwrap();
        assert_eq!(response.text(), "done");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));

        let warmup = bodies.recv().unwrap();
        let main = bodies.recv().unwrap();
        assert!(warmup.contains(WARMUP_PROMPT));
        assert!(main.contains("\"c1\""));
        assert!(!main.contains(WARMUP_PROMPT));
    }

    #[tokio::test]
    async fn test_stream_cut_mid_body_reports_error() {
        let line = "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}}\n";
        let truncated = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            line.len() + 500,
            line
        );
        let (base, _bodies) = serve(vec![truncated]);
        let client = client_for(&base);

        let mut rx = client
            .chat_stream(ChatRequest::new("antigravity-claude-sonnet-4-5", vec![Message::user("hi")]))
            .await
            .unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events[0], StreamEvent::Content { delta: "Hel".to_string() });
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            // Accept and never answer
            let held = listener.accept();
            std::thread::sleep(Duration::from_secs(10));
            drop(held);
        });
        let client = client_for(&base);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut request = ChatRequest::new("antigravity-claude-sonnet-4-5", vec![Message::user("hi")]);
        request.cancel = Some(cancel_rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = cancel_tx.send(true);
        });

        let mut rx = tokio::time::timeout(Duration::from_secs(5), client.chat_stream(request))
            .await
            .expect("cancel did not interrupt the pending request")
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Done {
                finish_reason: "cancelled".to_string(),
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_invalid_response() {
        let (base, _bodies) = serve(vec![http_reply(200, "<html>gateway</html>")]);
        let client = client_for(&base);

        let result = client
            .chat(ChatRequest::new("antigravity-claude-sonnet-4-5", vec![Message::user("hi")]))
            .await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(parse_body(""), Err(LlmError::InvalidResponse(_))));
        assert!(matches!(parse_body("data: {}"), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_empty_model_uses_default() {
        let client = client_with_token("t");
        let resolved = client.resolve_request(&ChatRequest::default());
        assert_eq!(resolved, resolve(crate::config::DEFAULT_MODEL));
    }
}
