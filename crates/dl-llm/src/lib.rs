#![forbid(unsafe_code)]

//! Provider calls that turn a plain-language description into Mermaid
//! source.
//!
//! Four providers sit behind one contract: OpenAI, OpenRouter and custom
//! endpoints speak chat completions, Gemini speaks generate-content. Every
//! call runs under a timeout and an optional caller cancel token, failures
//! are classified by [`dl_core::FailureKind`], and an empty completion is
//! retried exactly once.

pub mod call;
pub mod error;
mod fence;
pub mod models;
pub mod request;
pub mod response;
pub mod transport;

pub use call::{
    CallOptions, CallOutcome, CancelHandle, CancelToken, GENERATION_TIMEOUT, PROBE_TIMEOUT, ProbeReport,
    SYSTEM_PROMPT, call_once, cancel_pair, generate, probe,
};
pub use error::{CallError, CancelReason, PREFLIGHT_THRESHOLD, TransportError};
pub use fence::strip_code_fence;
pub use models::{MODEL_LIST_LIMIT, ModelInfo, filter_models, fuzzy_match, list_openrouter_models};
pub use request::{GenerationParams, Prompt, build_request};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
