//! End-to-end tests of the chat loop, permissions, delegation, retries,
//! repair, compression, timeouts, and snapshots, driven by a scripted
//! provider.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use waggle::prelude::*;
use waggle::snapshot::{AgentSnapshot, ContextState, SwarmState};

fn agent(name: &str, dir: &std::path::Path) -> AgentDefinition {
    let mut definition = AgentDefinition::new(name, "mock-model").directory(dir);
    definition.assume_model_exists = true;
    definition
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        delay: Duration::from_millis(1),
    }
}

fn swarm_with(provider: &MockProvider, spec: SwarmSpec) -> Swarm {
    Swarm::builder(spec)
        .provider_factory(Arc::new(FixedProviderFactory::new(Arc::new(provider.clone()))))
        .retry(fast_retry())
        .build()
        .expect("swarm builds")
}

fn event_types(result: &ExecutionResult) -> Vec<String> {
    result
        .logs
        .iter()
        .filter_map(|record| serde_json::to_value(record).ok())
        .map(|value| value["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn count(events: &[String], name: &str) -> usize {
    events.iter().filter(|event| *event == name).count()
}

/// Every assistant tool call has exactly one matching tool result later in
/// the log.
fn assert_tool_pairing(messages: &[Message]) {
    for (index, message) in messages.iter().enumerate() {
        for call in &message.tool_calls {
            let matches = messages[index..]
                .iter()
                .filter(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(&call.id))
                .count();
            assert_eq!(matches, 1, "call {} should have one result", call.id);
        }
    }
}

#[tokio::test]
async fn tool_loop_runs_to_final_answer() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("notes.txt"), "hello from disk\n").expect("seed");

    let provider = MockProvider::new()
        .tool_calls(vec![("call_1", "Read", json!({"file_path": "notes.txt"}))])
        .text_with_usage("the file says hello", 120, 8);
    let spec = SwarmSpec::new("solo").agent(agent("lead", dir.path()));
    let swarm = swarm_with(&provider, spec);

    let result = swarm.execute("what does notes.txt say?").await;
    assert!(result.is_success());
    assert_eq!(result.content.as_deref(), Some("the file says hello"));
    assert_eq!(result.agent, "lead");

    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    assert_tool_pairing(guard.messages());
    // The tool result carries the file content back to the model.
    let tool_message = guard
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result");
    assert!(tool_message.text().unwrap_or_default().contains("hello from disk"));
    // Counters follow the last assistant turn.
    assert_eq!(guard.cumulative_input_tokens(), 120);
    assert_eq!(guard.cumulative_output_tokens(), 18);

    let events = event_types(&result);
    for expected in [
        "swarm_start",
        "user_prompt",
        "agent_step",
        "tool_call",
        "tool_result",
        "agent_stop",
        "swarm_stop",
    ] {
        assert!(count(&events, expected) >= 1, "missing event {expected}");
    }
}

#[tokio::test]
async fn path_permission_denial_names_the_rule() {
    // S1: Write allowed under backend/** but **/.env is denied.
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new()
        .tool_calls(vec![(
            "call_1",
            "Write",
            json!({"file_path": "backend/.env", "content": "x"}),
        )])
        .text("done");
    let spec = SwarmSpec::new("guarded").agent(agent("lead", dir.path()).tool(
        ToolSpec::with_permissions(
            "Write",
            ToolPermissions::new()
                .allow_path("backend/**")
                .deny_path("**/.env"),
        ),
    ));
    let swarm = swarm_with(&provider, spec);

    let result = swarm.execute("write the env file").await;
    assert!(result.is_success());

    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    let denial = guard
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .and_then(Message::text)
        .expect("tool result");
    assert!(denial.contains("<tool_use_error>"));
    assert!(denial.contains("Blocked by policy: **/.env"));
    assert!(denial.contains("unrecoverable"));
    // The denied file was never created.
    assert!(!dir.path().join("backend/.env").exists());
}

#[tokio::test]
async fn command_permission_denial_omits_allow_list() {
    // S2: only a denied_commands list is configured.
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new()
        .tool_calls(vec![("call_1", "Bash", json!({"command": "rm -rf /"}))])
        .text("done");
    let spec = SwarmSpec::new("guarded").agent(agent("lead", dir.path()).tool(
        ToolSpec::with_permissions("Bash", ToolPermissions::new().deny_command("^rm")),
    ));
    let swarm = swarm_with(&provider, spec);

    swarm.execute("clean up").await;
    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    let denial = guard
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .and_then(Message::text)
        .expect("tool result");
    assert!(denial.contains("Blocked by policy: ^rm"));
    assert!(!denial.contains("allowed"));
}

#[tokio::test]
async fn orphan_tool_calls_are_repaired_once() {
    // S3: a restored conversation ends in unanswered assistant tool calls.
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new()
        .http_error(400, "unexpected `tool_use_id` found in `tool_result` blocks")
        .text("recovered");
    let spec = SwarmSpec::new("repairing").agent(agent("lead", dir.path()));
    let swarm = swarm_with(&provider, spec);

    let mut orphan = Message::assistant("");
    orphan.content = None;
    orphan.tool_calls = vec![
        ToolCall::new("call_a", "Read", json!({"file_path": "x"})),
        ToolCall::new("call_b", "Bash", json!({"command": "ls"})),
    ];
    let snapshot = Snapshot {
        version: "1.0.0".to_string(),
        kind: SnapshotKind::Swarm,
        swarm: SwarmState {
            first_message_sent: true,
        },
        agents: [(
            "lead".to_string(),
            AgentSnapshot {
                conversation: vec![Message::user("start"), orphan],
                context_state: ContextState::default(),
                plugin_state: Default::default(),
            },
        )]
        .into_iter()
        .collect(),
        delegation_instances: Default::default(),
        scratchpad: Default::default(),
        read_tracking: Default::default(),
        memory_read_tracking: Default::default(),
    };
    swarm.restore(&snapshot).await.expect("restore");

    let result = swarm.execute("continue").await;
    assert!(result.is_success());
    assert_eq!(result.content.as_deref(), Some("recovered"));
    assert_eq!(provider.call_count(), 2);

    let events = event_types(&result);
    assert_eq!(count(&events, "orphan_tool_calls_pruned"), 1);

    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    // The empty assistant message was deleted outright.
    assert!(guard.messages().iter().all(|m| m.tool_calls.is_empty()));
    let reminder = guard
        .messages()
        .iter()
        .filter(|m| m.role == Role::User)
        .find(|m| m.text().unwrap_or_default().contains("system-reminder"))
        .expect("repair reminder");
    let text = reminder.text().unwrap_or_default();
    assert!(text.contains(r#"Read(file_path: "x")"#));
    assert!(text.contains(r#"Bash(command: "ls")"#));
    assert_tool_pairing(guard.messages());
}

#[tokio::test]
async fn context_compression_fires_once() {
    // S4: window 100k, usage crosses 60%, old tool results are squashed.
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new();
    for turn in 0..8u64 {
        provider.push(Ok(ChatResponse {
            content: None,
            tool_calls: vec![ToolCall::new(
                format!("call_{turn}"),
                "Think",
                json!({"thought": "step"}),
            )],
            input_tokens: 5_000 * (turn + 1),
            output_tokens: 10,
            cached_tokens: 0,
            model_id: "mock-model".into(),
        }));
    }
    provider.push(Ok(
        ChatResponse::from_text("all done", "mock-model").with_usage(61_000, 20)
    ));

    let mut lead = agent("lead", dir.path());
    lead.context_window = Some(100_000);
    let log = LogStream::new();
    let compressions = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&compressions);
    log.on_log(move |record| {
        if matches!(record.event, SwarmEvent::ContextCompression { .. }) {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    });
    let swarm = Swarm::builder(SwarmSpec::new("long").agent(lead))
        .provider_factory(Arc::new(FixedProviderFactory::new(Arc::new(provider.clone()))))
        .retry(fast_retry())
        .log(log)
        .build()
        .expect("swarm builds");

    let result = swarm.execute("work through a long task").await;
    assert!(result.is_success());
    assert_eq!(compressions.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(count(&event_types(&result), "context_limit_warning") >= 1);

    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    let compressed: Vec<&Message> = guard
        .messages()
        .iter()
        .filter(|m| m.text().unwrap_or_default().starts_with("[compressed: "))
        .collect();
    assert!(!compressed.is_empty(), "old tool results should be compressed");
    for message in &compressed {
        assert_eq!(message.role, Role::Tool);
        assert!(message.tool_call_id.is_some());
    }
    // The most recent ten messages are untouched.
    let total = guard.messages().len();
    for message in &guard.messages()[total - 10..] {
        assert!(!message.text().unwrap_or_default().starts_with("[compressed: "));
    }
    drop(guard);

    // A later cheap turn must not compress again.
    provider.push(Ok(
        ChatResponse::from_text("still fine", "mock-model").with_usage(1_000, 5)
    ));
    swarm.execute("quick follow-up").await;
    assert_eq!(compressions.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delegation_cycle_aborts_swarm_construction() {
    // S5: A → B via AskB and B → A via AskA.
    let dir = tempfile::tempdir().expect("tempdir");
    let spec = SwarmSpec::new("cyclic")
        .agent(agent("A", dir.path()).delegates_to(DelegateSpec::new("B").tool_name("AskB")))
        .agent(agent("B", dir.path()).delegates_to(DelegateSpec::new("A").tool_name("AskA")));
    let err = Swarm::builder(spec).build().unwrap_err();
    assert!(err.to_string().contains("A → B → A"));
}

#[tokio::test]
async fn skill_swap_restricts_and_restores_tools() {
    // S6, with the swarm's actual registry: defaults disabled, explicit
    // grants, and the memory plugin in read-only mode.
    let dir = tempfile::tempdir().expect("tempdir");
    let mut lead = agent("lead", dir.path());
    lead.disable_default_tools = DefaultTools::Disabled;
    for name in ["Read", "Write", "Bash", "Think", "Clock"] {
        lead = lead.tool(ToolSpec::new(name));
    }
    let lead = lead.plugin_config(
        "memory",
        json!({"directory": dir.path().join("memory"), "mode": "read_only"}),
    );

    let provider = MockProvider::new().text("ok");
    let swarm = Swarm::builder(SwarmSpec::new("skilled").agent(lead))
        .provider_factory(Arc::new(FixedProviderFactory::new(Arc::new(provider))))
        .plugin(Arc::new(MemoryPlugin::with_default_embedder()))
        .build()
        .expect("swarm builds");

    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;

    guard.load_skill_state(SkillState::new("skills/focus.md").with_tools(vec!["Read".into()]));
    let mut restricted = guard.active_tool_names().expect("resolve");
    restricted.sort();
    assert_eq!(restricted, vec!["Clock", "MemoryRead", "Read", "Think"]);

    guard.clear_skill();
    let restored = guard.active_tool_names().expect("resolve");
    for name in ["Read", "Write", "Bash", "Think", "Clock", "MemoryRead", "MemorySearch"] {
        assert!(restored.iter().any(|n| n == name), "missing {name}");
    }
}

#[tokio::test]
async fn non_retryable_error_becomes_assistant_message() {
    // S7, first half: a 401 is not retried and surfaces gracefully.
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new().http_error(401, "Unauthorized");
    let spec = SwarmSpec::new("failing").agent(agent("lead", dir.path()));
    let swarm = swarm_with(&provider, spec);

    let result = swarm.execute("hello").await;
    // Execution finished gracefully: the failure is the content.
    assert!(result.is_success());
    let content = result.content.as_deref().expect("explanation");
    assert!(content.contains("Unauthorized"));
    assert!(content.contains("401"));
    assert!(content.contains("API key"));
    assert_eq!(provider.call_count(), 1);

    let events = event_types(&result);
    assert_eq!(count(&events, "llm_request_failed"), 1);
    assert_eq!(count(&events, "llm_retry_attempt"), 0);
    assert_eq!(count(&events, "swarm_stop"), 1);
}

#[tokio::test]
async fn retryable_errors_recover_after_three_attempts() {
    // S7, second half: three 500s then success.
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new()
        .http_error(500, "a")
        .http_error(500, "b")
        .http_error(500, "c")
        .text("eventually fine");
    let spec = SwarmSpec::new("flaky").agent(agent("lead", dir.path()));
    let swarm = swarm_with(&provider, spec);

    let result = swarm.execute("hello").await;
    assert_eq!(result.content.as_deref(), Some("eventually fine"));
    assert_eq!(provider.call_count(), 4);
    assert_eq!(count(&event_types(&result), "llm_retry_attempt"), 3);
}

#[tokio::test]
async fn execution_timeout_cancels_inflight_tools() {
    // S8: a blocking tool call is cancelled when the timeout fires.
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new()
        .tool_calls(vec![("call_1", "Bash", json!({"command": "sleep 5"}))])
        .text("never reached");
    let spec = SwarmSpec::new("slow")
        .agent(agent("lead", dir.path()))
        .execution_timeout(Duration::from_secs(1));
    let swarm = swarm_with(&provider, spec);

    let started = std::time::Instant::now();
    let result = swarm.execute("run something slow").await;
    assert!(started.elapsed() < Duration::from_secs(4));

    assert!(result.content.is_none());
    assert!(result.metadata.timeout);
    assert!(matches!(result.error, Some(Error::ExecutionTimeout { limit_secs: 1 })));

    let timed_out = result.logs.iter().any(|record| {
        matches!(record.event, SwarmEvent::ExecutionTimeout { limit: 1 })
    });
    assert!(timed_out, "execution_timeout event missing");
}

#[tokio::test]
async fn delegation_returns_target_answer() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Call order: lead, helper, lead.
    let provider = MockProvider::new()
        .tool_calls(vec![(
            "call_1",
            "WorkWithHelper",
            json!({"prompt": "look into the flaky test"}),
        )])
        .text("helper says: it is a timing issue")
        .text("resolved: timing issue");
    let spec = SwarmSpec::new("team")
        .agent(agent("lead", dir.path()).delegates_to(DelegateSpec::new("helper")))
        .agent(agent("helper", dir.path()).description("debugging specialist"));
    let swarm = swarm_with(&provider, spec);

    let result = swarm.execute("why is the test flaky?").await;
    assert_eq!(result.content.as_deref(), Some("resolved: timing issue"));

    let events = event_types(&result);
    assert_eq!(count(&events, "agent_delegation"), 1);
    assert_eq!(count(&events, "delegation_result"), 1);

    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    let tool_result = guard
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .and_then(Message::text)
        .expect("delegation result");
    assert!(tool_result.contains("timing issue"));
    assert_tool_pairing(guard.messages());
}

#[tokio::test]
async fn fresh_context_delegation_creates_per_caller_instance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new()
        .tool_calls(vec![(
            "call_1",
            "WorkWithHelper",
            json!({"prompt": "subtask"}),
        )])
        .text("sub-answer")
        .text("final");
    let spec = SwarmSpec::new("team")
        .agent(
            agent("lead", dir.path())
                .delegates_to(DelegateSpec::new("helper").fresh_context()),
        )
        .agent(agent("helper", dir.path()));
    let swarm = swarm_with(&provider, spec);

    swarm.execute("go").await;
    let snapshot = swarm.snapshot().await;
    assert!(snapshot.delegation_instances.contains_key("helper@lead"));
    // The singleton helper was never built.
    assert!(!snapshot.agents.contains_key("helper"));
}

#[tokio::test]
async fn swarm_stop_reprompt_loops_the_lead() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new().text("first answer").text("second answer");

    let reprompted = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&reprompted);
    let hook = HookDefinition::callback(HookEvent::SwarmStop, move |_ctx| {
        if flag.swap(true, std::sync::atomic::Ordering::SeqCst) {
            HookOutcome::Continue
        } else {
            HookOutcome::Reprompt("dig deeper".to_string())
        }
    });
    let spec = SwarmSpec::new("looping").agent(agent("lead", dir.path()).hook(hook));
    let swarm = swarm_with(&provider, spec);

    let result = swarm.execute("initial question").await;
    assert_eq!(result.content.as_deref(), Some("second answer"));
    assert_eq!(result.metadata.reprompts, 1);

    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    let user_turns: Vec<&str> = guard
        .messages()
        .iter()
        .filter(|m| m.role == Role::User)
        .filter_map(Message::text)
        .collect();
    assert_eq!(user_turns, vec!["initial question", "dig deeper"]);
}

#[tokio::test]
async fn pre_tool_use_hook_halts_matching_tool() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new()
        .tool_calls(vec![("call_1", "Bash", json!({"command": "ls"}))])
        .text("done");
    let hook = HookDefinition::callback(HookEvent::PreToolUse, |_ctx| {
        HookOutcome::Halt("blocked by review policy".to_string())
    })
    .matcher("^Bash$")
    .expect("valid matcher");
    let spec = SwarmSpec::new("hooked").agent(agent("lead", dir.path()).hook(hook));
    let swarm = swarm_with(&provider, spec);

    swarm.execute("list files").await;
    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    let tool_result = guard
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .and_then(Message::text)
        .expect("synthesized result");
    assert_eq!(tool_result, "blocked by review policy");
}

#[tokio::test]
async fn user_prompt_hook_appends_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new().text("noted");
    let hook = HookDefinition::callback(HookEvent::UserPrompt, |_ctx| {
        HookOutcome::Replace("today is a holiday".to_string())
    });
    let spec = SwarmSpec::new("hooked").agent(agent("lead", dir.path()).hook(hook));
    let swarm = swarm_with(&provider, spec);

    swarm.execute("plan my day").await;
    let requests = provider.requests();
    let sent = requests[0]
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .and_then(Message::text)
        .expect("user message");
    assert!(sent.contains("plan my day"));
    assert!(sent.contains("<hook-context>today is a holiday</hook-context>"));
}

#[tokio::test]
async fn snapshot_roundtrip_is_stable() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("a.txt"), "content").expect("seed");
    let provider = MockProvider::new()
        .tool_calls(vec![("call_1", "Read", json!({"file_path": "a.txt"}))])
        .text_with_usage("saw the file", 50, 5);
    let spec = SwarmSpec::new("persisted").agent(agent("lead", dir.path()));
    let swarm = swarm_with(&provider, spec.clone());

    swarm.execute("read a.txt").await;
    swarm.scratchpad().write("shared/plan", "phase one", "lead");

    let first = swarm.snapshot().await;
    let first_json = first.to_json().expect("serialize");

    let restored = swarm_with(&MockProvider::new(), spec);
    restored.restore(&first).await.expect("restore");
    let second_json = restored.snapshot().await.to_json().expect("serialize");
    assert_eq!(first_json, second_json);

    // Restored state is live, not just serialized: the read digest still
    // admits an edit without a fresh Read.
    let chat = restored.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    assert_eq!(guard.cumulative_input_tokens(), 50);
    assert!(guard.messages().iter().any(|m| m.role == Role::Tool));
}

#[tokio::test]
async fn execution_scope_restores_after_execute() {
    use waggle::swarm::scope;

    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new().text("inner done");
    let spec = SwarmSpec::new("inner").agent(agent("lead", dir.path()));
    let swarm = swarm_with(&provider, spec);

    let outer = scope::ExecutionScope {
        execution_id: "exec-outer".into(),
        swarm_id: "swarm-outer".into(),
        parent_swarm_id: None,
    };
    scope::enter(outer.clone(), async {
        let before = scope::current().expect("outer scope");
        swarm.execute("nested work").await;
        let after = scope::current().expect("outer scope survives");
        assert_eq!(before, after);
    })
    .await;
    assert!(scope::current().is_none());
}

#[tokio::test]
async fn usage_summary_tracks_costs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = MockProvider::new().text_with_usage("answer", 1_000_000, 100_000);
    let mut lead = AgentDefinition::new("lead", "gpt-4o").directory(dir.path());
    lead.context_window = Some(2_000_000);
    let spec = SwarmSpec::new("costly").agent(lead);
    let swarm = swarm_with(&provider, spec);

    swarm.execute("expensive question").await;
    let chat = swarm.chat("lead").await.expect("chat");
    let guard = chat.lock().await;
    let usage = guard.usage();
    assert_eq!(usage.input_tokens, 1_000_000);
    assert_eq!(usage.output_tokens, 100_000);
    // gpt-4o: $2.50/M input, $10/M output.
    assert!((usage.input_cost - 2.50).abs() < 1e-9);
    assert!((usage.output_cost - 1.00).abs() < 1e-9);
    assert!((guard.context_usage_percentage() - 55.0).abs() < 1e-9);
}
