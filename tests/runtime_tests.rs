//! End-to-end tests for `AgentRuntime` against a scripted provider.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{harness, snapshot, text_response, tool_call, wait_for_event, Script, REJECTED};
use tollgate::agent::AgentState;
use tollgate::agent_loop::{AgentEvent, TurnStatus};
use tollgate::error::{ErrorCategory, TollgateError};
use tollgate::types::{Role, TextStreamDelta, TokenUsage};

fn position(events: &[AgentEvent], predicate: impl Fn(&AgentEvent) -> bool) -> usize {
    events
        .iter()
        .position(predicate)
        .expect("event should be present")
}

async fn settle(
    handle: tokio::task::JoinHandle<tollgate::error::Result<tollgate::agent_loop::TurnResult>>,
) -> tollgate::agent_loop::TurnResult {
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("turn should settle")
        .expect("turn task should not panic")
        .expect("turn should start")
}

#[tokio::test]
async fn approved_tool_call_runs_and_turn_completes() {
    let h = harness(
        vec![
            Script::Deltas(vec![
                tool_call("call-1", "list_files", json!({ "path": "." })),
                TextStreamDelta::done(Some(TokenUsage::new(10, 5))),
            ]),
            Script::Deltas(vec![
                TextStreamDelta::text("Found "),
                TextStreamDelta::text("2 files"),
                TextStreamDelta::done(Some(TokenUsage::new(12, 4))),
            ]),
        ],
        None,
    );
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list the files").await });

    let approval = wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::ToolApprovalRequired { .. })
    })
    .await;
    let AgentEvent::ToolApprovalRequired {
        interruption_id,
        tool_name,
        input,
        call_id,
    } = approval
    else {
        unreachable!();
    };
    assert_eq!(tool_name, "list_files");
    assert_eq!(input, "{\n  \"path\": \".\"\n}");
    assert_eq!(call_id.as_deref(), Some("call-1"));
    assert_eq!(h.agent.state(), AgentState::AwaitingApproval);
    assert_eq!(h.agent.pending_approvals().len(), 1);

    let before = snapshot(&h.events);
    assert!(!before
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolCallComplete { .. })));
    assert!(
        position(&before, |e| matches!(e, AgentEvent::ToolCallStart { .. }))
            < position(&before, |e| matches!(
                e,
                AgentEvent::ToolApprovalRequired { .. }
            ))
    );

    assert!(h.agent.approve(&interruption_id));
    let result = settle(turn).await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.final_text().as_deref(), Some("Found 2 files"));
    assert_eq!(result.usage, TokenUsage::new(22, 9));
    assert_eq!(h.agent.token_usage(), TokenUsage::new(22, 9));
    assert_eq!(h.agent.state(), AgentState::Idle);
    assert!(h.agent.pending_approvals().is_empty());

    let roles: Vec<Role> = h.agent.history().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );

    let events = snapshot(&h.events);
    let complete = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolCallComplete {
                call_id,
                output,
                is_error,
                ..
            } => Some((call_id.clone(), output.clone(), *is_error)),
            _ => None,
        })
        .expect("tool call should complete");
    assert_eq!(
        complete,
        ("call-1".to_string(), "./Cargo.toml\n./src".to_string(), false)
    );
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::MessageComplete { content, .. } if content == "Found 2 files"
    )));
    assert_eq!(
        events
            .iter()
            .rev()
            .find(|e| matches!(e, AgentEvent::TokenUsageChanged { .. })),
        Some(&AgentEvent::TokenUsageChanged {
            input_tokens: 22,
            output_tokens: 9,
        })
    );
}

#[tokio::test]
async fn grouped_rejection_resumes_with_rejection_results() {
    let h = harness(
        vec![
            Script::Deltas(vec![
                tool_call("call-1", "list_files", json!({ "path": "src" })),
                tool_call("call-2", "list_files", json!({ "path": "tests" })),
                TextStreamDelta::done(None),
            ]),
            Script::Deltas(text_response("Okay, I won't.", 3, 2)),
        ],
        None,
    );
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list both").await });

    let grouped = wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::GroupedApprovalRequired { .. })
    })
    .await;
    let AgentEvent::GroupedApprovalRequired {
        group_id,
        approvals,
    } = grouped
    else {
        unreachable!();
    };
    assert_eq!(approvals.len(), 2);
    assert!(group_id.starts_with("group-"));
    assert!(!snapshot(&h.events)
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolApprovalRequired { .. })));
    assert!(h
        .agent
        .pending_approvals()
        .iter()
        .all(|p| p.group_id.as_deref() == Some(group_id.as_str())));

    assert_eq!(h.agent.reject_group(&group_id), 2);
    let result = settle(turn).await;
    assert_eq!(result.status, TurnStatus::Completed);

    let outputs: Vec<(String, String, bool)> = snapshot(&h.events)
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::ToolCallComplete {
                call_id,
                output,
                is_error,
                ..
            } => Some((call_id, output, is_error)),
            _ => None,
        })
        .collect();
    assert_eq!(
        outputs,
        vec![
            ("call-1".to_string(), REJECTED.to_string(), false),
            ("call-2".to_string(), REJECTED.to_string(), false),
        ]
    );

    let second = &h.provider.requests()[1];
    let rejected = second
        .messages
        .iter()
        .flat_map(|m| m.tool_results())
        .filter(|r| r.result == json!(REJECTED))
        .count();
    assert_eq!(rejected, 2);
}

#[tokio::test]
async fn partial_group_resolution_does_not_resume() {
    let h = harness(
        vec![Script::Deltas(vec![
            tool_call("call-1", "list_files", json!({ "path": "a" })),
            tool_call("call-2", "list_files", json!({ "path": "b" })),
            TextStreamDelta::done(None),
        ])],
        None,
    );
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list a and b").await });

    wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::GroupedApprovalRequired { .. })
    })
    .await;
    let pending = h.agent.pending_approvals();
    assert_eq!(pending.len(), 2);
    let first = pending[0].interruption.id().to_string();
    let second = pending[1].interruption.id().to_string();

    assert!(h.agent.reject(&first));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.agent.state(), AgentState::AwaitingApproval);
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(h.agent.pending_approvals().len(), 1);
    assert!(!snapshot(&h.events)
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolCallComplete { .. })));

    assert!(h.agent.approve(&second));
    let result = settle(turn).await;
    assert!(result.is_completed());

    let outputs: Vec<(String, String)> = snapshot(&h.events)
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::ToolCallComplete {
                call_id, output, ..
            } => Some((call_id, output)),
            _ => None,
        })
        .collect();
    assert_eq!(
        outputs,
        vec![
            ("call-1".to_string(), REJECTED.to_string()),
            ("call-2".to_string(), "b/Cargo.toml\nb/src".to_string()),
        ]
    );
}

#[tokio::test]
async fn unknown_interruption_ids_are_ignored() {
    let h = harness(
        vec![Script::Deltas(vec![
            tool_call("call-1", "list_files", json!({ "path": "." })),
            TextStreamDelta::done(None),
        ])],
        None,
    );
    assert!(!h.agent.approve("nothing-pending"));

    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list").await });
    wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::ToolApprovalRequired { .. })
    })
    .await;
    let seen = snapshot(&h.events).len();

    assert!(!h.agent.approve("does-not-exist"));
    assert!(!h.agent.reject("does-not-exist"));
    assert_eq!(h.agent.approve_group("group-unknown"), 0);
    assert_eq!(snapshot(&h.events).len(), seen);
    assert_eq!(h.agent.pending_approvals().len(), 1);
    assert_eq!(h.agent.state(), AgentState::AwaitingApproval);

    let id = h.agent.pending_approvals()[0].interruption.id().to_string();
    assert!(h.agent.approve(&id));
    assert!(!h.agent.approve(&id), "a resolved id is no longer pending");
    assert!(settle(turn).await.is_completed());
}

#[tokio::test]
async fn cancel_mid_stream_keeps_user_message_only() {
    let h = harness(
        vec![Script::Hang(vec![TextStreamDelta::text("partial")])],
        None,
    );
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("tell me a story").await });

    wait_for_event(&h.events, |e| matches!(e, AgentEvent::MessageChunk { .. })).await;
    assert_eq!(h.agent.state(), AgentState::Streaming);
    assert!(h.agent.cancel());

    let result = settle(turn).await;
    assert_eq!(result.status, TurnStatus::Cancelled);
    assert!(result.error.is_none());
    assert_eq!(h.agent.state(), AgentState::Idle);

    let history = h.agent.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text(), "tell me a story");

    let events = snapshot(&h.events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::MessageComplete { .. })));
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));

    assert!(!h.agent.cancel(), "nothing left to cancel");
    let next = h.agent.run_turn("shorter then").await.unwrap();
    assert!(next.is_completed());
}

#[tokio::test]
async fn cancel_while_awaiting_approval_drops_pending() {
    let h = harness(
        vec![Script::Deltas(vec![
            tool_call("call-1", "list_files", json!({ "path": "." })),
            TextStreamDelta::done(None),
        ])],
        None,
    );
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list").await });
    let AgentEvent::ToolApprovalRequired {
        interruption_id, ..
    } = wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::ToolApprovalRequired { .. })
    })
    .await
    else {
        unreachable!();
    };

    assert!(h.agent.cancel());
    let result = settle(turn).await;
    assert_eq!(result.status, TurnStatus::Cancelled);
    assert!(h.agent.pending_approvals().is_empty());
    assert!(!h.agent.approve(&interruption_id));
    assert_eq!(h.agent.history().len(), 1);
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn usage_accumulates_across_turns_until_cleared() {
    let h = harness(
        vec![
            Script::Deltas(text_response("one", 3, 1)),
            Script::Deltas(text_response("two", 4, 2)),
            Script::Deltas(text_response("three", 5, 3)),
        ],
        None,
    );
    for prompt in ["a", "b", "c"] {
        let result = h.agent.run_turn(prompt).await.unwrap();
        assert!(result.is_completed());
    }
    assert_eq!(h.agent.token_usage(), TokenUsage::new(12, 6));
    assert_eq!(h.agent.history().len(), 6);

    // Each request carries the full prior history behind the system prompt.
    let third = &h.provider.requests()[2];
    assert_eq!(third.messages[0].role, Role::System);
    assert_eq!(third.messages.len(), 6);

    h.agent.clear_history().await;
    assert!(h.agent.history().is_empty());
    assert_eq!(h.agent.token_usage(), TokenUsage::default());
    assert_eq!(h.agent.state(), AgentState::Idle);
}

#[tokio::test]
async fn second_turn_is_refused_while_one_is_in_flight() {
    let h = harness(vec![Script::Hang(vec![TextStreamDelta::text("...")])], None);
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("first").await });
    wait_for_event(&h.events, |e| matches!(e, AgentEvent::MessageStart { .. })).await;

    let err = h.agent.run_turn("second").await.unwrap_err();
    assert!(matches!(err, TollgateError::InvalidState(_)));
    assert_eq!(h.agent.history().len(), 1);

    h.agent.cancel();
    assert_eq!(settle(turn).await.status, TurnStatus::Cancelled);
}

#[tokio::test]
async fn exceeding_turn_limit_reports_error_event() {
    let looping = (0..5)
        .map(|i| {
            Script::Deltas(vec![
                tool_call(&format!("call-{i}"), "echo", json!({ "n": i })),
                TextStreamDelta::done(Some(TokenUsage::new(1, 1))),
            ])
        })
        .collect();
    let h = harness(looping, Some(2));
    let result = h.agent.run_turn("loop forever").await.unwrap();

    assert_eq!(result.status, TurnStatus::Failed);
    assert!(matches!(
        result.error,
        Some(TollgateError::TurnLimitExceeded { max_turns: 2 })
    ));
    assert_eq!(h.provider.calls(), 2);
    assert_eq!(h.agent.history().len(), 1);
    assert_eq!(h.agent.token_usage(), TokenUsage::new(2, 2));

    let events = snapshot(&h.events);
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Error { category: ErrorCategory::TurnLimit, .. })
    ));
}

#[tokio::test]
async fn provider_failure_reports_stream_error() {
    let h = harness(vec![Script::Fail("upstream unavailable".into())], None);
    let result = h.agent.run_turn("hello").await.unwrap();

    assert_eq!(result.status, TurnStatus::Failed);
    let events = snapshot(&h.events);
    let AgentEvent::Error { message, category } = events.last().expect("error event") else {
        panic!("expected error event, got {events:?}");
    };
    assert_eq!(*category, ErrorCategory::Stream);
    assert!(message.contains("upstream unavailable"));
    assert_eq!(h.agent.state(), AgentState::Idle);
}

#[tokio::test]
async fn mid_stream_error_never_completes_the_message() {
    let h = harness(
        vec![Script::Deltas(vec![
            TextStreamDelta::text("half a sen"),
            TextStreamDelta::error("connection reset"),
        ])],
        None,
    );
    let result = h.agent.run_turn("hello").await.unwrap();
    assert_eq!(result.status, TurnStatus::Failed);

    let events = snapshot(&h.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::MessageChunk { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::MessageComplete { .. })));
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Error { category: ErrorCategory::Stream, .. })
    ));
}

#[tokio::test]
async fn failing_tool_reports_error_and_turn_continues() {
    let h = harness(
        vec![
            Script::Deltas(vec![
                tool_call("call-1", "broken", json!({})),
                TextStreamDelta::done(None),
            ]),
            Script::Deltas(text_response("The tool failed.", 1, 1)),
        ],
        None,
    );
    let result = h.agent.run_turn("try it").await.unwrap();
    assert!(result.is_completed());
    assert_eq!(result.final_text().as_deref(), Some("The tool failed."));

    let events = snapshot(&h.events);
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::ToolCallComplete { call_id, is_error: true, output, .. }
            if call_id == "call-1" && output.contains("permission denied")
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolApprovalRequired { .. })));
}

#[tokio::test]
async fn chunk_content_tracks_accumulated_text() {
    let h = harness(
        vec![Script::Deltas(vec![
            TextStreamDelta::text("a"),
            TextStreamDelta::text("bc"),
            TextStreamDelta::text(""),
            TextStreamDelta::text("def"),
            TextStreamDelta::done(None),
        ])],
        None,
    );
    h.agent.run_turn("spell").await.unwrap();

    let events = snapshot(&h.events);
    let mut message_ids = Vec::new();
    let mut joined = String::new();
    for event in &events {
        match event {
            AgentEvent::MessageStart { message_id } => message_ids.push(message_id.clone()),
            AgentEvent::MessageChunk {
                message_id,
                chunk,
                content,
            } => {
                assert_eq!(Some(message_id), message_ids.last());
                joined.push_str(chunk);
                assert_eq!(content, &joined);
            }
            AgentEvent::MessageComplete {
                message_id,
                content,
            } => {
                assert_eq!(Some(message_id), message_ids.last());
                assert_eq!(content, "abcdef");
            }
            _ => {}
        }
    }
    assert_eq!(message_ids.len(), 1);
    assert_eq!(joined, "abcdef");
}

#[tokio::test]
async fn state_watchers_observe_the_approval_cycle() {
    let h = harness(
        vec![Script::Deltas(vec![
            tool_call("call-1", "list_files", json!({ "path": "." })),
            TextStreamDelta::done(None),
        ])],
        None,
    );
    let mut states = h.agent.watch_state();
    assert_eq!(*states.borrow(), AgentState::Idle);

    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list").await });

    tokio::time::timeout(
        Duration::from_secs(2),
        states.wait_for(|state| *state == AgentState::AwaitingApproval),
    )
    .await
    .expect("should await approval")
    .expect("runtime alive");
    let id = h.agent.pending_approvals()[0].interruption.id().to_string();
    h.agent.approve(&id);

    tokio::time::timeout(Duration::from_secs(2), h.agent.wait_for_idle())
        .await
        .expect("should return to idle");
    assert!(settle(turn).await.is_completed());
    assert_eq!(h.agent.state(), AgentState::Idle);
}

#[tokio::test]
async fn reused_call_id_asks_for_approval_each_time() {
    let h = harness(
        vec![
            Script::Deltas(vec![
                tool_call("call_0", "list_files", json!({ "path": "." })),
                TextStreamDelta::done(None),
            ]),
            Script::Deltas(vec![
                tool_call("call_0", "list_files", json!({ "path": "src" })),
                TextStreamDelta::done(None),
            ]),
            Script::Deltas(text_response("Listed src.", 1, 1)),
        ],
        None,
    );
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list files").await });

    let AgentEvent::ToolApprovalRequired {
        interruption_id: first,
        ..
    } = wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::ToolApprovalRequired { .. })
    })
    .await
    else {
        unreachable!();
    };
    assert!(h.agent.reject(&first));

    let AgentEvent::ToolApprovalRequired {
        interruption_id: second,
        call_id,
        ..
    } = wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::ToolApprovalRequired { interruption_id, .. } if *interruption_id != first)
    })
    .await
    else {
        unreachable!();
    };
    assert_eq!(call_id.as_deref(), Some("call_0"));
    assert_eq!(h.agent.state(), AgentState::AwaitingApproval);
    let outputs_before: Vec<String> = snapshot(&h.events)
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::ToolCallComplete { output, .. } => Some(output),
            _ => None,
        })
        .collect();
    assert_eq!(outputs_before, vec![REJECTED.to_string()]);

    assert!(h.agent.approve(&second));
    assert!(settle(turn).await.is_completed());
    let outputs: Vec<String> = snapshot(&h.events)
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::ToolCallComplete { output, .. } => Some(output),
            _ => None,
        })
        .collect();
    assert_eq!(
        outputs,
        vec![REJECTED.to_string(), "src/Cargo.toml\nsrc/src".to_string()]
    );
}

#[tokio::test]
async fn parallel_calls_without_ids_are_grouped() {
    let h = harness(
        vec![Script::Deltas(vec![
            tool_call("", "list_files", json!({ "path": "a" })),
            tool_call("", "list_files", json!({ "path": "b" })),
            TextStreamDelta::done(None),
        ])],
        None,
    );
    let agent = h.agent.clone();
    let turn = tokio::spawn(async move { agent.run_turn("list a and b").await });

    let AgentEvent::GroupedApprovalRequired {
        group_id,
        approvals,
    } = wait_for_event(&h.events, |e| {
        matches!(e, AgentEvent::GroupedApprovalRequired { .. })
    })
    .await
    else {
        unreachable!();
    };
    assert_eq!(approvals.len(), 2);
    assert!(!snapshot(&h.events)
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolApprovalRequired { .. })));

    assert_eq!(h.agent.approve_group(&group_id), 2);
    assert!(settle(turn).await.is_completed());
    let completed = snapshot(&h.events)
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolCallComplete { is_error: false, .. }))
        .count();
    assert_eq!(completed, 2);
}
