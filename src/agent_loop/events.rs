//! Run event stream types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::types::RunId;

/// Concrete event payloads emitted by the decision loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventPayload {
    RunStarted {
        thread_id: String,
    },
    DecideStarted {
        iteration: usize,
    },
    ToolCallStarted {
        call_id: String,
        tool_name: String,
    },
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        is_error: bool,
    },
    RunCompleted {
        iterations: usize,
        last_tool: Option<String>,
    },
    RunFailed {
        error: String,
    },
}

/// Envelope for run events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: RunId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: RunEventPayload,
}

pub type RunEventSink = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Numbers events per run and mirrors them to `tracing`.
pub(crate) struct RunEventEmitter {
    run_id: RunId,
    seq: AtomicU64,
    sink: Option<RunEventSink>,
}

impl RunEventEmitter {
    pub(crate) fn new(run_id: RunId, sink: Option<RunEventSink>) -> Self {
        Self {
            run_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: RunEventPayload) {
        trace_payload(self.run_id, &payload);
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(RunEvent {
            run_id: self.run_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}

fn trace_payload(run_id: RunId, payload: &RunEventPayload) {
    match payload {
        RunEventPayload::RunStarted { thread_id } => {
            info!(%run_id, %thread_id, "run started")
        }
        RunEventPayload::DecideStarted { iteration } => {
            debug!(%run_id, iteration, "asking model")
        }
        RunEventPayload::ToolCallStarted { call_id, tool_name } => {
            debug!(%run_id, %call_id, tool = %tool_name, "tool call started")
        }
        RunEventPayload::ToolCallFinished {
            call_id,
            tool_name,
            is_error,
        } => {
            debug!(%run_id, %call_id, tool = %tool_name, is_error, "tool call finished")
        }
        RunEventPayload::RunCompleted {
            iterations,
            last_tool,
        } => {
            info!(%run_id, iterations, last_tool = last_tool.as_deref(), "run completed")
        }
        RunEventPayload::RunFailed { error } => warn!(%run_id, %error, "run failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn emitter_numbers_events_from_one() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: RunEventSink = Arc::new(move |event| {
            sink_seen.lock().expect("sink lock").push(event.seq);
        });
        let emitter = RunEventEmitter::new(RunId::new_v4(), Some(sink));

        emitter.emit(RunEventPayload::DecideStarted { iteration: 1 });
        emitter.emit(RunEventPayload::DecideStarted { iteration: 2 });

        assert_eq!(*seen.lock().expect("sink lock"), vec![1, 2]);
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let value = serde_json::to_value(RunEventPayload::ToolCallStarted {
            call_id: "c1".into(),
            tool_name: "time_tool".into(),
        })
        .expect("serialize");
        assert_eq!(value["type"], "tool_call_started");
        assert_eq!(value["tool_name"], "time_tool");
    }
}
