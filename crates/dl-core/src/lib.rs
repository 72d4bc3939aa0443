#![forbid(unsafe_code)]

mod provider;
mod sanitize_config;

pub use provider::{ParseProviderKindError, ProviderConfig, ProviderKind, WireFormat};
pub use sanitize_config::SanitizeConfig;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Namespace every host-bound SVG root must declare.
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Namespace bound to the `xlink:` prefix.
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// Node identifier to display label, as declared in diagram source.
///
/// Insertion keeps the first label seen for an identifier; later
/// declarations of the same node never replace it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct LabelMap {
    labels: BTreeMap<String, String>,
}

impl LabelMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `label` for `id` unless the id already has one.
    ///
    /// Blank labels are ignored. Returns whether the label was stored.
    pub fn insert_first(&mut self, id: &str, label: &str) -> bool {
        let label = label.trim();
        if id.is_empty() || label.is_empty() || self.labels.contains_key(id) {
            return false;
        }
        self.labels.insert(id.to_string(), label.to_string());
        true
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.labels.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Failure taxonomy shared by the sanitizer and the provider orchestrator.
///
/// Callers branch on the kind for automated recovery (retry, fallback)
/// before choosing any user-facing wording.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport failed before any response arrived.
    Network,
    /// The request was cancelled, by the timeout or by the caller.
    Cancelled,
    /// Non-success HTTP status carrying the provider message.
    Http,
    /// 408/504 reported by the server or a gateway.
    ServerTimeout,
    /// Success response without usable completion text.
    EmptyCompletion,
    /// The SVG could not be made acceptable to the host.
    Sanitization,
    /// Settings rejected before any request was attempted.
    Configuration,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "diagram/error/network",
            Self::Cancelled => "diagram/error/cancelled",
            Self::Http => "diagram/error/http",
            Self::ServerTimeout => "diagram/error/server-timeout",
            Self::EmptyCompletion => "diagram/error/empty-completion",
            Self::Sanitization => "diagram/error/sanitization",
            Self::Configuration => "diagram/error/configuration",
        }
    }

    /// Whether an automatic recovery path exists upstream of the caller.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::EmptyCompletion | Self::Sanitization)
    }
}

/// Which transform produced a document the host accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    /// Full pipeline: styles inlined, labels injected.
    #[default]
    Full,
    /// Minimal sanitizer: parseable, reduced visual fidelity.
    Minimal,
}

impl Fidelity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Minimal => "minimal",
        }
    }
}
