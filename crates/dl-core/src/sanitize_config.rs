//! Fixed paints and sizes the sanitizer writes into host-bound SVG.

use serde::{Deserialize, Serialize};

/// Configuration for SVG sanitization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Fill given to `<text>` elements that declare none.
    pub text_fill: String,
    /// Replacement for the symbolic `currentColor` paint.
    pub current_color_fallback: String,
    /// Fill of injected node labels.
    pub label_fill: String,
    /// Font size of injected node labels, in pixels.
    pub label_font_size: f32,
    /// Id fragment marking a per-node group (`flowchart-<node>-<n>`).
    pub node_group_marker: String,
    /// Minimal sanitizer: fill for `<path>` elements without one.
    pub minimal_path_fill: String,
    /// Minimal sanitizer: fill for basic shapes without one.
    pub minimal_shape_fill: String,
    /// Minimal sanitizer: stroke for paths and basic shapes without one.
    pub minimal_stroke: String,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            text_fill: String::from("#333333"),
            current_color_fallback: String::from("#333333"),
            label_fill: String::from("#333333"),
            label_font_size: 14.0,
            node_group_marker: String::from("flowchart-"),
            minimal_path_fill: String::from("none"),
            minimal_shape_fill: String::from("#f4f4f4"),
            minimal_stroke: String::from("#333333"),
        }
    }
}
