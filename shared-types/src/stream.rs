// Push-stream frames and stream observability types

use crate::user_interaction::{QuestionStatus, QuestionView};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// One typed event of a job's push-stream.
///
/// Consumers must ignore `type` values they do not recognize. `stream_end`
/// is always the final frame of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text delta produced by the task
    Text { content: String },
    /// Tool use notice
    Tool {
        name: String,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// A question the job is waiting on
    Question { question: QuestionView },
    /// The answer a pending question received
    Answer { question_id: String, answer: String },
    /// A question that ended without an answer
    QuestionClosed {
        question_id: String,
        status: QuestionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Non-fatal error notice from the task
    Error { message: String },
    /// Final output of the task
    Completion {
        #[serde(default)]
        status: CompletionStatus,
        result: String,
    },
    /// Terminal marker; `delivered` counts the frames flushed before it
    StreamEnd { delivered: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    #[default]
    Succeeded,
    Failed,
}

impl StreamEvent {
    pub fn text(content: impl Into<String>) -> Self {
        StreamEvent::Text {
            content: content.into(),
        }
    }

    pub fn completion(result: impl Into<String>) -> Self {
        StreamEvent::Completion {
            status: CompletionStatus::Succeeded,
            result: result.into(),
        }
    }

    /// Wire name of the event, the value of its `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Text { .. } => "text",
            StreamEvent::Tool { .. } => "tool",
            StreamEvent::Question { .. } => "question",
            StreamEvent::Answer { .. } => "answer",
            StreamEvent::QuestionClosed { .. } => "question_closed",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Completion { .. } => "completion",
            StreamEvent::StreamEnd { .. } => "stream_end",
        }
    }

    pub fn is_stream_end(&self) -> bool {
        matches!(self, StreamEvent::StreamEnd { .. })
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, StreamEvent::Completion { .. })
    }
}

/// A sequenced event as written to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub seq: u64,
    pub job_id: String,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl StreamFrame {
    /// Server-sent events framing. The event type travels inside the JSON so
    /// `onmessage` consumers see every frame.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("id: {}\ndata: {}\n\n", self.seq, json))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Open,
    Draining,
    Closed,
}

impl StreamState {
    pub fn is_active(&self) -> bool {
        !matches!(self, StreamState::Closed)
    }
}

/// Body of a completion request
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompleteRequest {
    #[serde(default)]
    pub status: CompletionStatus,
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StreamSummary {
    pub stream_id: String,
    pub job_id: String,
    pub state: StreamState,
    pub opened_at: i64,
    pub duration_ms: u64,
    pub events_queued: u64,
    pub events_flushed: u64,
    pub orphaned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StreamHealthReport {
    pub active: Vec<StreamSummary>,
    pub recently_closed: Vec<StreamSummary>,
    pub orphaned: usize,
    pub flush_failures: u64,
}
