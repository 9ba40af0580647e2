//! `POST /v1/responses` and its tool-output follow-up.
//!
//! Unlike chat completions, a Responses-API turn can pause mid-stream to wait for the
//! caller to run a tool and post its output back; the SSE connection opened by the
//! first request stays alive for the whole exchange. See [`session`] for the state
//! that makes that possible and [`pump_stream`] for the event translation itself.

mod session;
mod wire;

use std::{convert::Infallible, sync::Arc, time::SystemTime};

use axum::{
    Extension,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Sse, sse::Event},
};
use axum_serde::Sonic;
use futures::StreamExt;
use serde_json::Value;
use uuid::Uuid;

pub(crate) use session::SessionRegistry;

use crate::{
    error::LlmError,
    messages::unified::{self, UnifiedContent, UnifiedFinishReason, UnifiedMessage, UnifiedRequest},
    provider::ChatCompletionStream,
    request,
    server::LlmHandler,
};
use session::{STOP_AT, Session, SessionState, WARN_AT};

/// `POST /v1/responses`: opens an SSE stream and starts the first turn in a
/// background task so the handler can return the stream immediately.
pub(crate) async fn create_response(
    State(server): State<Arc<LlmHandler>>,
    headers: HeaderMap,
    authentication: Option<Extension<context::Authentication>>,
    Sonic(body): Sonic<wire::ResponsesRequest>,
) -> crate::Result<impl IntoResponse> {
    let principal = authentication.and_then(|ext| ext.0.principal);
    let context = request::extract_context(&headers, principal);

    let conversation = UnifiedRequest::from(body);
    let session_id = format!("resp_{}", Uuid::new_v4());

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let session = Session::new(session_id.clone(), conversation, context, events_tx);
    server.responses_sessions().insert(session);

    tokio::spawn(run_turn(server, session_id));

    let stream = futures::stream::unfold(events_rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });

    Ok(Sse::new(stream).into_response())
}

/// `POST /v1/responses/{id}/submit_tool_outputs`: appends the tool results to the
/// session's conversation and resumes emitting events on the session's existing SSE
/// writer. This handler's own response is just an acknowledgement.
pub(crate) async fn submit_tool_outputs(
    State(server): State<Arc<LlmHandler>>,
    Path(session_id): Path<String>,
    Sonic(body): Sonic<wire::SubmitToolOutputsRequest>,
) -> crate::Result<impl IntoResponse> {
    let Some(mut session) = server.responses_sessions().take(&session_id) else {
        return Err(LlmError::SessionNotFound(session_id));
    };

    if session.state != SessionState::AwaitingToolOutputs {
        let state_was = session.state;
        server.responses_sessions().insert(session);
        return Err(LlmError::InvalidRequest(format!(
            "session '{session_id}' is not awaiting tool outputs (state: {state_was:?})"
        )));
    }

    for output in body.tool_outputs {
        session.conversation.messages.push(UnifiedMessage {
            role: unified::UnifiedRole::Tool,
            content: unified::UnifiedContentContainer::Text(output.output),
            tool_calls: None,
            tool_call_id: Some(output.tool_call_id),
        });
    }

    session.state = SessionState::StreamingNextTurn;
    server.responses_sessions().insert(session);

    tokio::spawn(run_turn(server, session_id));

    Ok(axum::Json(serde_json::json!({ "status": "accepted" })))
}

/// Drive one model turn for `session_id` to completion, writing every event to the
/// session's SSE channel. Reinserts the session into the registry only if the turn
/// paused awaiting tool outputs; otherwise the session (and its sender) are dropped,
/// which closes the SSE connection once the handler's own sender clone is gone too.
async fn run_turn(server: Arc<LlmHandler>, session_id: String) {
    let Some(mut session) = server.responses_sessions().take(&session_id) else {
        log::warn!("responses: run_turn called for unknown session '{session_id}'");
        return;
    };

    let stream = match server
        .unified_completions_stream(
            crate::router::EndpointFamily::Responses,
            session.conversation.clone(),
            &session.context,
        )
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            emit(
                &mut session,
                wire::ResponsesStreamEvent::Error {
                    message: err.client_message(),
                    sequence_number: 0,
                },
            );
            return;
        }
    };

    if pump_stream(&mut session, stream).await == TurnOutcome::AwaitingToolOutputs {
        session.state = SessionState::AwaitingToolOutputs;
        server.responses_sessions().insert(session);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnOutcome {
    Completed,
    AwaitingToolOutputs,
}

struct TextItem {
    item_id: String,
    output_index: u32,
    text: String,
}

struct ToolItem {
    item_id: String,
    call_id: String,
    name: String,
    output_index: u32,
    arguments: String,
}

/// Translate one turn's `UnifiedChunk` stream into Responses SSE events, updating
/// `session`'s conversation with the assistant's turn and returning how it ended.
async fn pump_stream(session: &mut Session, mut stream: ChatCompletionStream) -> TurnOutcome {
    let model = session.conversation.model.clone();
    let created_at = unix_now();

    emit(
        session,
        wire::ResponsesStreamEvent::Created {
            response: response_object(&session.id, &model, created_at, "in_progress", Vec::new(), None),
            sequence_number: 0,
        },
    );

    let mut output_index = 0u32;
    let mut text_item: Option<TextItem> = None;
    let mut tool_items: Vec<Option<ToolItem>> = Vec::new();
    let mut usage = None;
    let mut finish_reason = None;

    while let Some(result) = stream.next().await {
        let chunk = match result {
            Ok(chunk) => chunk,
            Err(err) => {
                emit(
                    session,
                    wire::ResponsesStreamEvent::Error {
                        message: err.client_message(),
                        sequence_number: 0,
                    },
                );
                return TurnOutcome::Completed;
            }
        };

        if let Some(chunk_usage) = chunk.usage {
            usage = Some(chunk_usage);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };

        if let Some(delta_text) = choice.delta.content {
            if text_item.is_none() {
                let item_id = format!("msg_{}", Uuid::new_v4());
                let index = output_index;
                output_index += 1;

                emit(
                    session,
                    wire::ResponsesStreamEvent::OutputItemAdded {
                        item: wire::ResponsesOutputItem::Message {
                            id: item_id.clone(),
                            role: "assistant",
                            content: Vec::new(),
                        },
                        output_index: index,
                        sequence_number: 0,
                    },
                );

                text_item = Some(TextItem {
                    item_id,
                    output_index: index,
                    text: String::new(),
                });
            }

            let item = text_item.as_mut().expect("just ensured present");
            item.text.push_str(&delta_text);

            emit(
                session,
                wire::ResponsesStreamEvent::OutputTextDelta {
                    item_id: item.item_id.clone(),
                    output_index: item.output_index,
                    delta: delta_text,
                    sequence_number: 0,
                },
            );
        }

        for call in choice.delta.tool_calls.into_iter().flatten() {
            match call {
                unified::UnifiedStreamingToolCall::Start { index, id, function } => {
                    if tool_items.len() <= index {
                        tool_items.resize_with(index + 1, || None);
                    }

                    let item_id = format!("fc_{}", Uuid::new_v4());
                    let output_idx = output_index;
                    output_index += 1;

                    emit(
                        session,
                        wire::ResponsesStreamEvent::OutputItemAdded {
                            item: wire::ResponsesOutputItem::FunctionCall {
                                id: item_id.clone(),
                                call_id: id.clone(),
                                name: function.name.clone(),
                                arguments: String::new(),
                            },
                            output_index: output_idx,
                            sequence_number: 0,
                        },
                    );

                    if !function.arguments.is_empty() {
                        emit(
                            session,
                            wire::ResponsesStreamEvent::FunctionCallArgumentsDelta {
                                item_id: item_id.clone(),
                                output_index: output_idx,
                                delta: function.arguments.clone(),
                                sequence_number: 0,
                            },
                        );
                    }

                    tool_items[index] = Some(ToolItem {
                        item_id,
                        call_id: id,
                        name: function.name,
                        output_index: output_idx,
                        arguments: function.arguments,
                    });
                }
                unified::UnifiedStreamingToolCall::Delta { index, function } => {
                    if let Some(Some(item)) = tool_items.get_mut(index) {
                        item.arguments.push_str(&function.arguments);

                        emit(
                            session,
                            wire::ResponsesStreamEvent::FunctionCallArgumentsDelta {
                                item_id: item.item_id.clone(),
                                output_index: item.output_index,
                                delta: function.arguments,
                                sequence_number: 0,
                            },
                        );
                    }
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            finish_reason = Some(reason);
        }
    }

    let mut assistant_blocks = Vec::new();
    let mut output_items = Vec::new();

    if let Some(item) = text_item.take() {
        let done_item = wire::ResponsesOutputItem::Message {
            id: item.item_id.clone(),
            role: "assistant",
            content: vec![wire::ResponsesContentPart::OutputText { text: item.text.clone() }],
        };

        emit(
            session,
            wire::ResponsesStreamEvent::OutputItemDone {
                item: done_item.clone(),
                output_index: item.output_index,
                sequence_number: 0,
            },
        );

        output_items.push(done_item);
        assistant_blocks.push(UnifiedContent::Text { text: item.text });
    }

    let mut loop_stopped = false;

    for item in tool_items.into_iter().flatten() {
        emit(
            session,
            wire::ResponsesStreamEvent::FunctionCallArgumentsDone {
                item_id: item.item_id.clone(),
                output_index: item.output_index,
                arguments: item.arguments.clone(),
                sequence_number: 0,
            },
        );

        let done_item = wire::ResponsesOutputItem::FunctionCall {
            id: item.item_id.clone(),
            call_id: item.call_id.clone(),
            name: item.name.clone(),
            arguments: item.arguments.clone(),
        };

        emit(
            session,
            wire::ResponsesStreamEvent::OutputItemDone {
                item: done_item.clone(),
                output_index: item.output_index,
                sequence_number: 0,
            },
        );

        output_items.push(done_item);

        let input: Value = serde_json::from_str(&item.arguments).unwrap_or(Value::Null);
        let canonical = input.to_string();
        let count = session.record_tool_call(&item.name, &canonical);

        if count == WARN_AT {
            log::warn!(
                "responses: session '{}' has called '{}' with identical arguments {count} times",
                session.id,
                item.name
            );
        }
        if count >= STOP_AT {
            loop_stopped = true;
        }

        assistant_blocks.push(UnifiedContent::ToolUse {
            id: item.call_id,
            name: item.name,
            input,
        });
    }

    if !assistant_blocks.is_empty() {
        session.conversation.messages.push(UnifiedMessage {
            role: unified::UnifiedRole::Assistant,
            content: unified::UnifiedContentContainer::Blocks(assistant_blocks.clone()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    let has_tool_calls = assistant_blocks
        .iter()
        .any(|block| matches!(block, UnifiedContent::ToolUse { .. }));

    let response_usage = usage.map(wire::ResponsesUsage::from);

    if loop_stopped {
        log::warn!(
            "responses: session '{}' stopped after a tool call was repeated {STOP_AT} times",
            session.id
        );

        emit(
            session,
            wire::ResponsesStreamEvent::Completed {
                response: response_object(&session.id, &model, created_at, "completed", output_items, response_usage),
                sequence_number: 0,
            },
        );

        return TurnOutcome::Completed;
    }

    if has_tool_calls && finish_reason != Some(UnifiedFinishReason::Stop) {
        emit(
            session,
            wire::ResponsesStreamEvent::RequiresAction {
                response: response_object(&session.id, &model, created_at, "requires_action", output_items, response_usage),
                sequence_number: 0,
            },
        );

        return TurnOutcome::AwaitingToolOutputs;
    }

    emit(
        session,
        wire::ResponsesStreamEvent::Completed {
            response: response_object(&session.id, &model, created_at, "completed", output_items, response_usage),
            sequence_number: 0,
        },
    );

    TurnOutcome::Completed
}

fn response_object(
    id: &str,
    model: &str,
    created_at: u64,
    status: &'static str,
    output: Vec<wire::ResponsesOutputItem>,
    usage: Option<wire::ResponsesUsage>,
) -> wire::ResponsesObject {
    wire::ResponsesObject {
        id: id.to_string(),
        object: "response",
        created_at,
        model: model.to_string(),
        status,
        output,
        usage,
    }
}

fn emit(session: &mut Session, event: wire::ResponsesStreamEvent) {
    let sequence_number = session.next_sequence();
    let event = with_sequence(event, sequence_number);

    let json = sonic_rs::to_string(&event).unwrap_or_else(|err| {
        log::error!("responses: failed to serialize event: {err}");
        r#"{"type":"error","message":"serialization failed"}"#.to_string()
    });

    // A send error means the client disconnected; the stream's receiver is gone and
    // there's nothing further to do. Flushed immediately: no buffering between here
    // and the SSE body writer.
    let _ = session.events_tx.send(Event::default().event(event.type_str()).data(json));
}

/// Stamps the per-send sequence number onto an event built without one, so call sites
/// don't have to thread a sequence counter through every branch above.
fn with_sequence(event: wire::ResponsesStreamEvent, sequence_number: u64) -> wire::ResponsesStreamEvent {
    use wire::ResponsesStreamEvent as E;

    match event {
        E::Created { response, .. } => E::Created { response, sequence_number },
        E::OutputItemAdded { item, output_index, .. } => E::OutputItemAdded {
            item,
            output_index,
            sequence_number,
        },
        E::OutputTextDelta {
            item_id, output_index, delta, ..
        } => E::OutputTextDelta {
            item_id,
            output_index,
            delta,
            sequence_number,
        },
        E::FunctionCallArgumentsDelta {
            item_id, output_index, delta, ..
        } => E::FunctionCallArgumentsDelta {
            item_id,
            output_index,
            delta,
            sequence_number,
        },
        E::FunctionCallArgumentsDone {
            item_id,
            output_index,
            arguments,
            ..
        } => E::FunctionCallArgumentsDone {
            item_id,
            output_index,
            arguments,
            sequence_number,
        },
        E::OutputItemDone { item, output_index, .. } => E::OutputItemDone {
            item,
            output_index,
            sequence_number,
        },
        E::RequiresAction { response, .. } => E::RequiresAction { response, sequence_number },
        E::Completed { response, .. } => E::Completed { response, sequence_number },
        E::Error { message, .. } => E::Error { message, sequence_number },
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
