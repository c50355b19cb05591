// SPDX-License-Identifier: MIT OR Apache-2.0

//! Installation and recording settings.
//!
//! Every field has a default, so a configuration file only needs the keys it changes:
//!
//! ```rust
//! use zonewise::config::{Config, InlineHandlerStrategy};
//!
//! let config = Config::from_toml_str(r#"
//!     history_capacity = 50
//!     inline_handlers = "capture"
//! "#).unwrap();
//! assert_eq!(config.history_capacity, 50);
//! assert_eq!(config.inline_handlers, InlineHandlerStrategy::Capture);
//! assert!(config.patch_promises);
//! ```

use crate::error::Error;
use serde::Deserialize;

/// Event names whose `on*` handler properties are intercepted by default.
pub const DEFAULT_EVENT_NAMES: &[&str] = &[
    "copy", "cut", "paste", "abort", "blur", "focus", "canplay", "canplaythrough", "change",
    "click", "contextmenu", "dblclick", "drag", "dragend", "dragenter", "dragleave", "dragover",
    "dragstart", "drop", "durationchange", "emptied", "ended", "input", "invalid", "keydown",
    "keypress", "keyup", "load", "loadeddata", "loadedmetadata", "loadstart", "mousedown",
    "mouseenter", "mouseleave", "mousemove", "mouseout", "mouseover", "mouseup", "pause", "play",
    "playing", "progress", "ratechange", "reset", "scroll", "seeked", "seeking", "select", "show",
    "stalled", "submit", "suspend", "timeupdate", "volumechange", "waiting",
    "mozfullscreenchange", "mozfullscreenerror", "mozpointerlockchange", "mozpointerlockerror",
    "error", "webglcontextrestored", "webglcontextlost", "webglcontextcreationerror",
];

/// How inline `on*` handler properties are intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineHandlerStrategy {
    /// Replace the properties with accessors if the host allows it, otherwise capture.
    #[default]
    Auto,
    /// Always replace the properties with tracking accessors.
    Descriptor,
    /// Always bind handlers lazily from capture-phase listeners at the document root.
    Capture,
}

/// Settings for interception and history.
///
/// Every field has a default, so a partial TOML document is enough.
///
/// ```rust
/// use zonewise::config::{Config, InlineHandlerStrategy};
///
/// let config = Config::from_toml_str("inline_handlers = \"capture\"").unwrap();
/// assert_eq!(config.inline_handlers, InlineHandlerStrategy::Capture);
/// assert_eq!(config.history_capacity, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of serialized occurrences the history ring buffer keeps.
    pub history_capacity: usize,
    /// How `on*` handler properties are intercepted.
    pub inline_handlers: InlineHandlerStrategy,
    /// Event names, without the `on` prefix.
    pub event_names: Vec<String>,
    /// Whether promise `then`/`catch` callbacks are bound.
    pub patch_promises: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            history_capacity: 1000,
            inline_handlers: InlineHandlerStrategy::default(),
            event_names: DEFAULT_EVENT_NAMES.iter().map(|name| name.to_string()).collect(),
            patch_promises: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Config, Error> {
        Ok(toml::from_str(content)?)
    }

    /// The handler property names, such as `onclick`.
    pub fn handler_properties(&self) -> impl Iterator<Item = String> + '_ {
        self.event_names.iter().map(|name| format!("on{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn event_names_override() {
        let config = Config::from_toml_str(r#"event_names = ["click", "keyup"]"#).unwrap();
        let props: Vec<String> = config.handler_properties().collect();
        assert_eq!(props, vec!["onclick", "onkeyup"]);
        assert_eq!(config.history_capacity, 1000);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let err = Config::from_toml_str(r#"inline_handlers = "sometimes""#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn default_names_include_click() {
        assert!(Config::default().event_names.iter().any(|n| n == "click"));
    }
}
