// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors reported by zonewise itself.
//!
//! Failures raised by user callbacks are a separate type, [`Failure`](crate::zone::Failure),
//! since zones recover from those with their `on_error` hook.

use crate::host::{NodeId, ObjectId};
use crate::zone::HookKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A property that was defined as unconfigurable was defined again.
    #[error("Cannot redefine property: {property} of {owner}")]
    CannotRedefine { property: String, owner: String },
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("{child} is not a valid child of {parent}")]
    Hierarchy { parent: NodeId, child: NodeId },
    /// A sigil key named no hook, e.g. `+beforeTsak`.
    #[error("unknown hook key `{0}`")]
    UnknownHook(String),
    #[error("hook key `{key}` was given a {kind} hook")]
    HookMismatch { key: String, kind: HookKind },
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
