// SPDX-License-Identifier: MIT OR Apache-2.0

//! Occurrence records and the trees they form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where an occurrence came from, for linking back to source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub label: String,
    pub url: String,
}

impl SourceLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        SourceLink {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// A description of something that happened, before it is placed in a tree.
///
/// ```rust
/// use zonewise::history::OccurrenceSpec;
/// use serde_json::json;
///
/// let spec = OccurrenceSpec::new("save")
///     .subtitle("draft")
///     .class("Node--action")
///     .arg(json!({"id": 3}));
/// assert_eq!(spec.title, "save");
/// assert_eq!(spec.args.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OccurrenceSpec {
    pub title: String,
    pub subtitle: Option<String>,
    pub class: Option<String>,
    pub source_link: Option<SourceLink>,
    pub args: Vec<Value>,
}

impl OccurrenceSpec {
    pub fn new(title: impl Into<String>) -> Self {
        OccurrenceSpec {
            title: title.into(),
            ..OccurrenceSpec::default()
        }
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// A free-form category tag.
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn source_link(mut self, link: SourceLink) -> Self {
        self.source_link = Some(link);
        self
    }

    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    pub(crate) fn place(self, tree: usize, index: usize, parent: Option<usize>, leaf: bool) -> Occurrence {
        Occurrence {
            title: self.title,
            subtitle: self.subtitle,
            class: self.class,
            source_link: self.source_link,
            args: self.args,
            index,
            parent,
            tree,
            leaf,
        }
    }
}

/// A recorded occurrence: one node of a history tree.
///
/// `index` is the position within the owning tree, assigned in recording order
/// starting from 0. `parent` is the index of the enclosing occurrence in the
/// same tree, or `None` for the tree's root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_link: Option<SourceLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    pub index: usize,
    pub parent: Option<usize>,
    /// Index of the owning tree in the recorder's list of trees.
    pub tree: usize,
    /// Set when the occurrence was recorded without a function, so nothing can nest under it.
    #[serde(default)]
    pub leaf: bool,
}

/// One causality tree: a root occurrence and everything recorded beneath it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryTree {
    pub index: usize,
    pub items: Vec<Occurrence>,
}

impl HistoryTree {
    pub fn root(&self) -> Option<&Occurrence> {
        self.items.first()
    }

    /// The occurrences whose parent is `index`, in recording order.
    pub fn children(&self, index: usize) -> impl Iterator<Item = &Occurrence> {
        self.items.iter().filter(move |item| item.parent == Some(index))
    }
}
