pub(crate) mod invoice;
pub(crate) mod plan;
pub(crate) mod reconcile;
pub(crate) mod seed;
pub(crate) mod show;

use ooh_storage::{Document, MemoryStore};
use ooh_workflow::{ErrorKind, Workflow, WorkflowError};
use serde_json::{json, Value};

use crate::OutputFormat;

/// Everything a subcommand needs.
pub(crate) struct Context {
    pub workflow: Workflow<MemoryStore>,
    pub output: OutputFormat,
    pub quiet: bool,
}

impl Context {
    /// Print a successful result: `text` in text mode, `json` in JSON mode.
    pub fn emit(&self, text: impl FnOnce() -> String, json: Value) {
        if self.quiet {
            return;
        }
        match self.output {
            OutputFormat::Text => println!("{}", text()),
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_else(|e| format!(
                    "{{\"error\": \"serialization error: {}\"}}",
                    e
                ))
            ),
        }
    }
}

/// A failed subcommand.
#[derive(Debug)]
pub(crate) enum CommandError {
    Workflow(WorkflowError),
    Message(String),
}

impl CommandError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Workflow(e) if e.kind() == ErrorKind::NotFound => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Workflow(e) => write!(f, "error [{}]: {}", e.kind(), e),
            CommandError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<WorkflowError> for CommandError {
    fn from(e: WorkflowError) -> Self {
        CommandError::Workflow(e)
    }
}

impl From<ooh_storage::StoreError> for CommandError {
    fn from(e: ooh_storage::StoreError) -> Self {
        CommandError::Workflow(e.into())
    }
}

impl From<String> for CommandError {
    fn from(msg: String) -> Self {
        CommandError::Message(msg)
    }
}

/// JSON rendering of a stored document.
pub(crate) fn document_json(doc: &Document) -> Value {
    json!({
        "path": doc.path.path(),
        "version": doc.version,
        "createTime": doc.create_time,
        "updateTime": doc.update_time,
        "fields": doc.fields,
    })
}
