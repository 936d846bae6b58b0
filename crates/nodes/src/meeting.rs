//! `meeting.*` node handlers (spec §6).
//!
//! No dedicated "meeting" service port is named in §6 — these handlers
//! track meeting state entirely in the run's reserved `_meeting` data key
//! (the same mechanism `action.set_variable` uses to mutate `ctx.data`
//! directly) and fall back to the `telegram` port for anything that needs
//! to reach a human.

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use serde_json::{json, Value};
use uuid::Uuid;

const MEETING_KEY: &str = "_meeting";

fn meeting_state(ctx: &ExecutionContext) -> Value {
    ctx.data_snapshot().get(MEETING_KEY).cloned().unwrap_or(json!({ "id": Value::Null, "transcript": [] }))
}

fn append_transcript_entry(ctx: &ExecutionContext, entry: Value) -> Value {
    let mut state = meeting_state(ctx);
    let transcript = state.get_mut("transcript").and_then(Value::as_array_mut);
    match transcript {
        Some(arr) => arr.push(entry),
        None => state["transcript"] = json!([entry]),
    }
    ctx.set_data(MEETING_KEY, state.clone());
    state
}

/// `meeting.start` — mints (or adopts) a meeting id and resets the
/// transcript.
pub struct MeetingStartAction;

#[async_trait]
impl NodeHandler for MeetingStartAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let meeting_id = node
            .config
            .get("meetingId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let state = json!({ "id": meeting_id, "transcript": [] });
        ctx.set_data(MEETING_KEY, state);
        Ok(json!({ "meetingId": meeting_id }))
    }

    fn describe(&self) -> String {
        "starts a meeting and resets its transcript".into()
    }
}

/// `meeting.send` — records an outbound message in the transcript and
/// optionally forwards it through the `telegram` port when
/// `config.notify` is true.
pub struct MeetingSendAction;

#[async_trait]
impl NodeHandler for MeetingSendAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let message = node
            .config
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("meeting.send requires a string `message` config field".into()))?;

        if node.config.get("notify").and_then(Value::as_bool).unwrap_or(false) {
            engine.services().telegram()?.send(message).await?;
        }

        let state = append_transcript_entry(ctx, json!({ "role": "assistant", "text": message }));
        Ok(json!({ "sent": true, "transcript": state["transcript"] }))
    }

    fn describe(&self) -> String {
        "sends a message into the meeting transcript".into()
    }
}

/// `meeting.transcript` — appends a `config.speaker`/`config.text` entry,
/// typically used to log a human participant's turn.
pub struct MeetingTranscriptAction;

#[async_trait]
impl NodeHandler for MeetingTranscriptAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let speaker = node.config.get("speaker").and_then(Value::as_str).unwrap_or("participant");
        let text = node
            .config
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("meeting.transcript requires a string `text` config field".into()))?;

        let state = append_transcript_entry(ctx, json!({ "role": speaker, "text": text }));
        Ok(json!({ "transcript": state["transcript"] }))
    }

    fn describe(&self) -> String {
        "appends a participant's turn to the meeting transcript".into()
    }
}

/// `meeting.vision` — appends a `config.description` entry tagged as a
/// vision observation (e.g. a screen-share frame summary).
pub struct MeetingVisionAction;

#[async_trait]
impl NodeHandler for MeetingVisionAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let description = node
            .config
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("meeting.vision requires a string `description` config field".into()))?;

        let state = append_transcript_entry(ctx, json!({ "role": "vision", "text": description }));
        Ok(json!({ "transcript": state["transcript"] }))
    }

    fn describe(&self) -> String {
        "appends a visual observation to the meeting transcript".into()
    }
}

/// `meeting.finalize` — returns the accumulated transcript and clears
/// the meeting state.
pub struct MeetingFinalizeAction;

#[async_trait]
impl NodeHandler for MeetingFinalizeAction {
    async fn execute(&self, _node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let state = meeting_state(ctx);
        ctx.set_data(MEETING_KEY, json!({ "id": Value::Null, "transcript": [] }));
        Ok(json!({ "meetingId": state["id"], "transcript": state["transcript"] }))
    }

    fn describe(&self) -> String {
        "closes out a meeting and returns its full transcript".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{NodeId, NodeTypeId, WorkflowId};
    use std::collections::HashMap;

    struct NoEngine;
    #[async_trait]
    impl EngineHandle for NoEngine {
        fn services(&self) -> &fleet_action::Services {
            unimplemented!()
        }
        async fn execute_workflow(&self, _w: &WorkflowId, _m: fleet_action::DispatchMode, _i: Value, _a: &[WorkflowId]) -> Result<Value, NodeError> {
            unimplemented!()
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}))
    }

    fn resolved<'a>(id: &'a NodeId, ty: &'a NodeTypeId, config: Value) -> ResolvedNode<'a> {
        ResolvedNode { id, node_type: ty, config }
    }

    #[tokio::test]
    async fn start_then_transcript_then_finalize_accumulates_entries() {
        let context = ctx();
        let id = NodeId::new("m1").unwrap();
        let ty = NodeTypeId::new("meeting.start").unwrap();
        let start_out = MeetingStartAction.execute(&resolved(&id, &ty, json!({})), &context, &NoEngine).await.unwrap();
        assert!(start_out["meetingId"].is_string());

        let id2 = NodeId::new("m2").unwrap();
        let ty2 = NodeTypeId::new("meeting.transcript").unwrap();
        MeetingTranscriptAction
            .execute(&resolved(&id2, &ty2, json!({ "speaker": "human", "text": "hello" })), &context, &NoEngine)
            .await
            .unwrap();

        let id3 = NodeId::new("m3").unwrap();
        let ty3 = NodeTypeId::new("meeting.vision").unwrap();
        MeetingVisionAction.execute(&resolved(&id3, &ty3, json!({ "description": "shared a diagram" })), &context, &NoEngine).await.unwrap();

        let id4 = NodeId::new("m4").unwrap();
        let ty4 = NodeTypeId::new("meeting.finalize").unwrap();
        let out = MeetingFinalizeAction.execute(&resolved(&id4, &ty4, json!({})), &context, &NoEngine).await.unwrap();
        let transcript = out["transcript"].as_array().unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0]["text"], json!("hello"));
        assert_eq!(transcript[1]["role"], json!("vision"));

        // meeting state resets after finalize
        assert_eq!(context.data_snapshot()[MEETING_KEY]["transcript"], json!([]));
    }
}
