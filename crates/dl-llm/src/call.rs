//! Timed, cancellable provider calls.

use std::time::Duration;

use dl_core::ProviderConfig;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CallError, CancelReason};
use crate::fence::strip_code_fence;
use crate::request::{GenerationParams, Prompt, build_request};
use crate::response::{completion_text, error_message};
use crate::transport::{HttpRequest, HttpResponse, Transport};

pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Instruction sent ahead of every description.
pub const SYSTEM_PROMPT: &str = "You are a Mermaid diagram expert. Turn the user's description into Mermaid \
flowchart or sequenceDiagram source.
Return only the Mermaid source: no markdown code fences, no explanation, no extra text.
Prefer `flowchart LR` or `flowchart TB`. Use ASCII node identifiers; labels may be in any language.";

const PROBE_SYSTEM: &str = "Reply with the single word OK.";
const PROBE_USER: &str = "ping";
const PROBE_MAX_TOKENS: u32 = 8;

/// Per-call timing, cancellation and sampling.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub timeout: Duration,
    pub cancel: Option<CancelToken>,
    pub params: GenerationParams,
}

impl CallOptions {
    #[must_use]
    pub fn generation() -> Self {
        Self {
            timeout: GENERATION_TIMEOUT,
            cancel: None,
            params: GenerationParams::default(),
        }
    }

    #[must_use]
    pub fn probe() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
            cancel: None,
            params: GenerationParams {
                max_tokens: PROBE_MAX_TOKENS,
                ..GenerationParams::default()
            },
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::generation()
    }
}

/// Fires the paired [`CancelToken`]s.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Resolves once the paired [`CancelHandle`] fires.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits for cancellation. A dropped handle can no longer cancel, so the
    /// future then stays pending.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Diagram source with any code fence removed.
    pub text: String,
    /// 1, or 2 when the first completion came back empty.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub model: String,
    pub elapsed: Duration,
    /// The provider answered but produced no text.
    pub empty_completion: bool,
}

/// One request/response round trip under `options.timeout`.
///
/// The timer and the caller's token race the request; whichever finishes
/// first decides the result and the others are dropped with it.
///
/// # Errors
///
/// Any [`CallError`]; [`CallError::EmptyCompletion`] is left to the caller
/// to retry.
pub async fn call_once<T: Transport>(
    transport: &T,
    config: &ProviderConfig,
    prompt: &Prompt<'_>,
    options: &CallOptions,
) -> Result<String, CallError> {
    let request = build_request(config, prompt, &options.params)?;
    debug!(
        "Calling {} model {} (timeout {}s)",
        config.provider.display_name(),
        config.effective_model(),
        options.timeout.as_secs()
    );

    let response = send_within(transport, request, options).await?;

    classify(config, &response)
}

/// Send `request`, giving up when `options.timeout` passes or the caller's
/// token fires first.
pub(crate) async fn send_within<T: Transport>(
    transport: &T,
    request: HttpRequest,
    options: &CallOptions,
) -> Result<HttpResponse, CallError> {
    let started = Instant::now();
    let caller_cancel = async {
        match &options.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        () = caller_cancel => {
            Err(CallError::Cancelled { elapsed: started.elapsed(), reason: CancelReason::Caller })
        }
        result = transport.send(request) => Ok(result?),
        () = tokio::time::sleep(options.timeout) => {
            Err(CallError::Cancelled { elapsed: started.elapsed(), reason: CancelReason::Timeout })
        }
    }
}

/// Map a provider response to completion text or a classified failure.
///
/// # Errors
///
/// [`CallError::ServerTimeout`] for 408/504, [`CallError::Http`] for other
/// non-success statuses, [`CallError::EmptyCompletion`] for success bodies
/// without usable text.
pub fn classify(config: &ProviderConfig, response: &HttpResponse) -> Result<String, CallError> {
    if !response.is_success() {
        if matches!(response.status, 408 | 504) {
            return Err(CallError::ServerTimeout {
                status: response.status,
            });
        }
        let message = error_message(&response.body)
            .unwrap_or_else(|| format!("API error: {}", response.status));
        return Err(CallError::Http {
            status: response.status,
            message,
        });
    }

    let text = completion_text(config.provider.wire_format(), &response.body)
        .ok_or(CallError::EmptyCompletion)?;
    let source = strip_code_fence(&text);
    if source.is_empty() {
        return Err(CallError::EmptyCompletion);
    }
    Ok(source.to_string())
}

/// Turn `description` into diagram source.
///
/// An empty completion is retried once with identical parameters; a second
/// empty completion is returned as the error.
///
/// # Errors
///
/// See [`call_once`].
pub async fn generate<T: Transport>(
    transport: &T,
    config: &ProviderConfig,
    description: &str,
    options: &CallOptions,
) -> Result<CallOutcome, CallError> {
    let prompt = Prompt {
        system: SYSTEM_PROMPT,
        user: description,
    };
    let started = Instant::now();

    let mut attempts = 1;
    let text = match call_once(transport, config, &prompt, options).await {
        Err(CallError::EmptyCompletion) => {
            warn!(
                "{} returned an empty completion, retrying once",
                config.provider.display_name()
            );
            attempts += 1;
            call_once(transport, config, &prompt, options).await?
        }
        other => other?,
    };

    let elapsed = started.elapsed();
    info!(
        "Generated {} bytes of diagram source with {} in {:.1}s ({attempts} attempt(s))",
        text.len(),
        config.effective_model(),
        elapsed.as_secs_f64()
    );
    Ok(CallOutcome {
        text,
        attempts,
        elapsed,
    })
}

/// Check that the provider is reachable with these settings.
///
/// Any successful exchange counts, including one with no completion text.
///
/// # Errors
///
/// Every [`CallError`] except [`CallError::EmptyCompletion`].
pub async fn probe<T: Transport>(
    transport: &T,
    config: &ProviderConfig,
    options: &CallOptions,
) -> Result<ProbeReport, CallError> {
    let prompt = Prompt {
        system: PROBE_SYSTEM,
        user: PROBE_USER,
    };
    let started = Instant::now();
    let empty_completion = match call_once(transport, config, &prompt, options).await {
        Ok(_) => false,
        Err(CallError::EmptyCompletion) => true,
        Err(err) => return Err(err),
    };
    let report = ProbeReport {
        model: config.effective_model().to_string(),
        elapsed: started.elapsed(),
        empty_completion,
    };
    info!(
        "{} reachable in {}ms",
        config.provider.display_name(),
        report.elapsed.as_millis()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, chat_body};
    use dl_core::{FailureKind, ProviderKind};

    fn openai() -> ProviderConfig {
        ProviderConfig::new(ProviderKind::OpenAi, "sk-test")
    }

    #[tokio::test]
    async fn fenced_completion_is_unwrapped() {
        let transport = ScriptedTransport::new().respond(200, &chat_body("```mermaid\nflowchart TB\n  A-->B\n```"));
        let outcome = generate(&transport, &openai(), "two boxes", &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.text, "flowchart TB\n  A-->B");
        assert_eq!(outcome.attempts, 1);

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        let body = sent[0].json_body().unwrap();
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["content"], "two boxes");
    }

    #[tokio::test]
    async fn empty_completion_is_retried_once() {
        let transport = ScriptedTransport::new()
            .respond(200, &chat_body(""))
            .respond(200, &chat_body("flowchart LR\n  A-->B"));
        let outcome = generate(&transport, &openai(), "x", &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.text, "flowchart LR\n  A-->B");
        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn second_empty_completion_is_surfaced() {
        let transport = ScriptedTransport::new()
            .respond(200, &chat_body(" "))
            .respond(200, r#"{"choices":[]}"#)
            .respond(200, &chat_body("never reached"));
        let err = generate(&transport, &openai(), "x", &CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, CallError::EmptyCompletion);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let transport = ScriptedTransport::new()
            .respond(500, r#"{"error":{"message":"upstream exploded"}}"#)
            .respond(200, &chat_body("flowchart LR"));
        let err = generate(&transport, &openai(), "x", &CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallError::Http {
                status: 500,
                message: "upstream exploded".into()
            }
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn gateway_timeouts_are_classified() {
        for status in [408, 504] {
            let transport = ScriptedTransport::new().respond(status, "<html>Gateway Timeout</html>");
            let err = generate(&transport, &openai(), "x", &CallOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err, CallError::ServerTimeout { status });
            assert_eq!(err.kind(), FailureKind::ServerTimeout);
        }
    }

    #[tokio::test]
    async fn unparsable_error_body_gets_generic_message() {
        let transport = ScriptedTransport::new().respond(502, "Bad Gateway");
        let err = generate(&transport, &openai(), "x", &CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API error: 502");
    }

    #[tokio::test]
    async fn transport_failures_are_network_errors() {
        let transport =
            ScriptedTransport::new().fail(crate::TransportError::Connect("connection refused".into()));
        let err = generate(&transport, &openai(), "x", &CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Network);
    }

    #[tokio::test]
    async fn config_errors_send_nothing() {
        let transport = ScriptedTransport::new();
        let config = ProviderConfig::new(ProviderKind::Custom, "k");
        let err = generate(&transport, &config, "x", &CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Configuration);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let transport = ScriptedTransport::new()
            .with_delay(Duration::from_secs(300))
            .respond(200, &chat_body("flowchart LR"));
        let err = generate(&transport, &openai(), "x", &CallOptions::default())
            .await
            .unwrap_err();
        let CallError::Cancelled { elapsed, reason } = err.clone() else {
            panic!("expected cancellation, got {err:?}");
        };
        assert_eq!(reason, CancelReason::Timeout);
        assert!(elapsed >= GENERATION_TIMEOUT);
        assert!(err.to_string().starts_with("request timed out after 120s"));
    }

    #[tokio::test(start_paused = true)]
    async fn response_inside_timeout_wins() {
        let transport = ScriptedTransport::new()
            .with_delay(Duration::from_secs(29))
            .respond(200, &chat_body("flowchart LR"));
        let report = probe(&transport, &openai(), &CallOptions::probe()).await.unwrap();
        assert!(!report.empty_completion);
        assert_eq!(report.model, "gpt-4o-mini");
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_caller_cancel_reads_as_preflight_problem() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let transport = ScriptedTransport::new()
            .with_delay(Duration::from_secs(5))
            .respond(200, &chat_body("flowchart LR"));
        let options = CallOptions::default().with_cancel(token);
        let err = generate(&transport, &openai(), "x", &options).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Cancelled {
                reason: CancelReason::Caller,
                ..
            }
        ));
        assert!(err.to_string().contains("check the API key"));
    }

    #[tokio::test(start_paused = true)]
    async fn late_caller_cancel() {
        let (handle, token) = cancel_pair();
        let transport = ScriptedTransport::new()
            .with_delay(Duration::from_secs(60))
            .respond(200, &chat_body("flowchart LR"));
        let options = CallOptions::default().with_cancel(token);

        let provider = openai();
        let call = generate(&transport, &provider, "x", &options);
        let cancel_later = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(call, cancel_later);
        assert_eq!(result.unwrap_err().to_string(), "request cancelled after 10s");
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (handle, token) = cancel_pair();
        drop(handle);
        assert!(!token.is_cancelled());
        let transport = ScriptedTransport::new().respond(200, &chat_body("flowchart LR"));
        let options = CallOptions::default().with_cancel(token);
        assert!(generate(&transport, &openai(), "x", &options).await.is_ok());
    }

    #[tokio::test]
    async fn probe_accepts_empty_completion_without_retry() {
        let transport = ScriptedTransport::new().respond(200, &chat_body(""));
        let report = probe(&transport, &openai(), &CallOptions::probe()).await.unwrap();
        assert!(report.empty_completion);

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].json_body().unwrap()["max_tokens"], PROBE_MAX_TOKENS);
    }

    #[tokio::test]
    async fn gemini_round_trip() {
        let transport = ScriptedTransport::new().respond(
            200,
            r#"{"candidates":[{"content":{"parts":[{"text":"```\nsequenceDiagram\n  A->>B: hi\n```"}]}}]}"#,
        );
        let config = ProviderConfig::new(ProviderKind::Gemini, "g").with_model("gemini-1.5-pro");
        let outcome = generate(&transport, &config, "greeting", &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.text, "sequenceDiagram\n  A->>B: hi");
        assert!(transport.requests()[0].url.contains("/gemini-1.5-pro:generateContent?key=g"));
    }
}
