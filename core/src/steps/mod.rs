//! Code-to-steps compiler
//!
//! Walks a parsed program and emits an ordered list of [`Step`] records, each
//! annotated with the queue it targets, its priority and its side-effect
//! payload. Nothing is executed: the steps are a rule-based ordering for
//! visualizing an event loop.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Val;

pub mod classifier;
pub mod extractor;
pub mod render;


pub use classifier::{classify, Ancestor, Node};
pub use extractor::{extract_program, parse_code_to_steps, Extraction, FunctionInfo};

/* ===================== Queues ===================== */

/// One of the four task containers of the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueId {
    CallStack,
    PendingAsync,
    CallbackQueue,
    DeferredQueue,
}

impl QueueId {
    pub const ALL: [QueueId; 4] = [
        QueueId::CallStack,
        QueueId::PendingAsync,
        QueueId::CallbackQueue,
        QueueId::DeferredQueue,
    ];

    /// Resolve a serialized queue name; anything unknown lands on the call stack
    pub fn from_name(name: &str) -> Self {
        match name {
            "pendingAsync" | "PendingAsync" => QueueId::PendingAsync,
            "callbackQueue" | "CallbackQueue" => QueueId::CallbackQueue,
            "deferredQueue" | "DeferredQueue" => QueueId::DeferredQueue,
            _ => QueueId::CallStack,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueId::CallStack => "callStack",
            QueueId::PendingAsync => "pendingAsync",
            QueueId::CallbackQueue => "callbackQueue",
            QueueId::DeferredQueue => "deferredQueue",
        }
    }
}

impl<'de> Deserialize<'de> for QueueId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(QueueId::from_name(&name))
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/* ===================== Step Vocabulary ===================== */

/// What a step does, as far as scheduling is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionTag {
    Console,
    Timer,
    Deferred,
    Network,
    VariableDeclaration,
    VariableAssignment,
    FunctionDeclaration,
    FunctionCall,
    Conditional,
    Loop,
    Statement,
    Error,
}

impl ActionTag {
    /// Whether steps with this action are handed off to the asynchronous side
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            ActionTag::Timer | ActionTag::Deferred | ActionTag::Network
        )
    }
}

/// Syntax node kind a step was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    VariableDeclaration,
    FunctionDeclaration,
    IfStatement,
    WhileStatement,
    DoWhileStatement,
    ForStatement,
    ForOfStatement,
    ForInStatement,
    ReturnStatement,
    ThrowStatement,
    BreakStatement,
    ContinueStatement,
    TryStatement,
    BlockStatement,
    EmptyStatement,
    SwitchStatement,
    ClassDeclaration,
    UnsupportedStatement,
    ExpressionStatement,
    CallExpression,
    NewExpression,
    AwaitExpression,
    Error,
}

/// One typed execution step, produced once and consumed in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub kind: NodeKind,
    /// 1-based source line
    pub source_line: usize,
    pub description: String,
    pub action: ActionTag,
    pub is_async: bool,
    pub delay_ms: u64,
    pub target_queue: QueueId,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_payload: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bound_variables: BTreeMap<String, Val>,
}

impl Step {
    /// Synchronous call-stack step with no payload
    pub fn sync(kind: NodeKind, action: ActionTag, source_line: usize, description: String) -> Self {
        Self {
            kind,
            source_line,
            description,
            action,
            is_async: false,
            delay_ms: 0,
            target_queue: QueueId::CallStack,
            priority: Priority::Normal,
            output_payload: None,
            bound_variables: BTreeMap::new(),
        }
    }

    /// Synthetic step standing in for a program that failed to parse
    pub fn parse_error(message: impl Into<String>, source_line: usize) -> Self {
        let message = message.into();
        Self {
            output_payload: Some(message.clone()),
            ..Self::sync(NodeKind::Error, ActionTag::Error, source_line, message)
        }
    }
}
