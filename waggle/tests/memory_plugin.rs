//! Memory plugin behavior through the full swarm: discovery reminders,
//! skill activation via the tool loop, and the memory read-before-edit rule.

use std::sync::Arc;

use serde_json::json;
use waggle::plugin::memory::BagOfWordsEmbedder;
use waggle::prelude::*;

const DEPLOY_SKILL: &str = "---\ntype: skill\ntags: [deploy, release]\ntools:\n  - Read\n  - Bash\n---\n# Deploy helper\nHow to deploy the release safely.\n";

fn librarian(dir: &std::path::Path) -> AgentDefinition {
    let mut definition = AgentDefinition::new("librarian", "mock-model")
        .directory(dir)
        .plugin_config(
            "memory",
            json!({"directory": dir.join("memory"), "mode": "full_access"}),
        );
    definition.assume_model_exists = true;
    definition
}

async fn seed_skill(plugin: &MemoryPlugin, agent: &AgentDefinition) {
    // Opening the store happens on first tool construction.
    let _ = waggle::plugin::Plugin::tools(plugin, agent);
    let store = plugin.store("librarian").expect("store");
    let digest = store.write("skills/deploy.md", DEPLOY_SKILL).expect("write");
    let entry = store.read("skills/deploy.md").expect("read");
    let embedding = BagOfWordsEmbedder.embed(&entry.body).await.expect("embed");
    store.set_embedding("skills/deploy.md", digest, embedding);
}

fn build_swarm(provider: &MockProvider, plugin: Arc<MemoryPlugin>, agent: AgentDefinition) -> Swarm {
    Swarm::builder(SwarmSpec::new("library").agent(agent))
        .provider_factory(Arc::new(FixedProviderFactory::new(Arc::new(provider.clone()))))
        .plugin(plugin)
        .build()
        .expect("swarm builds")
}

#[tokio::test]
async fn discovery_injects_reminder_before_user_turn() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = librarian(dir.path());
    let plugin = Arc::new(MemoryPlugin::with_default_embedder());
    seed_skill(&plugin, &agent).await;

    let provider = MockProvider::new().text("on it");
    let swarm = build_swarm(&provider, Arc::clone(&plugin), agent);

    let result = swarm.execute("deploy the release").await;
    assert!(result.is_success());

    let searched = result.logs.iter().any(|record| {
        matches!(record.event, SwarmEvent::SemanticSkillSearch { hits, .. } if hits > 0)
    });
    assert!(searched, "skill search should have found the entry");

    let chat = swarm.chat("librarian").await.expect("chat");
    let guard = chat.lock().await;
    let messages = guard.messages();
    let reminder_index = messages
        .iter()
        .position(|m| {
            m.role == Role::System && m.text().unwrap_or_default().contains("skills/deploy.md")
        })
        .expect("reminder injected");
    let user_index = messages
        .iter()
        .position(|m| m.role == Role::User)
        .expect("user turn");
    assert!(reminder_index < user_index, "reminder precedes the user turn");

    // The provider saw the reminder too.
    let sent = &provider.requests()[0];
    assert!(
        sent.messages
            .iter()
            .any(|m| m.text().unwrap_or_default().contains("LoadSkill"))
    );
}

#[tokio::test]
async fn load_skill_through_the_loop_swaps_tools() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = librarian(dir.path());
    let plugin = Arc::new(MemoryPlugin::with_default_embedder());
    seed_skill(&plugin, &agent).await;

    let provider = MockProvider::new()
        .tool_calls(vec![(
            "call_1",
            "LoadSkill",
            json!({"skill_path": "skills/deploy.md"}),
        )])
        .text("skill ready");
    let swarm = build_swarm(&provider, Arc::clone(&plugin), agent);

    let result = swarm.execute("get ready to deploy").await;
    assert_eq!(result.content.as_deref(), Some("skill ready"));

    let chat = swarm.chat("librarian").await.expect("chat");
    let guard = chat.lock().await;
    let state = guard.skill_state().expect("skill active");
    assert!(state.file_path.ends_with("skills/deploy.md"));

    let active = guard.active_tool_names().expect("resolve");
    // The skill allows Read and Bash; non-removable tools survive.
    for name in ["Read", "Bash", "Think", "Clock", "TodoWrite", "MemoryRead"] {
        assert!(active.iter().any(|n| n == name), "missing {name}");
    }
    assert!(!active.iter().any(|n| n == "Write"), "Write should be dropped");
    assert!(!active.iter().any(|n| n == "Grep"), "Grep should be dropped");

    // The second provider request only advertised the restricted set.
    let requests = provider.requests();
    let advertised: Vec<&str> = requests[1].tools.iter().map(|t| t.name.as_str()).collect();
    assert!(advertised.contains(&"Read"));
    assert!(!advertised.contains(&"Write"));
}

#[tokio::test]
async fn memory_write_edit_cycle_through_the_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = librarian(dir.path());
    let plugin = Arc::new(MemoryPlugin::with_default_embedder());
    let _ = waggle::plugin::Plugin::tools(plugin.as_ref(), &agent);

    let provider = MockProvider::new()
        .tool_calls(vec![(
            "call_1",
            "MemoryWrite",
            json!({"path": "facts/deploys.md", "content": "---\ntype: fact\n---\ndeploys happen on fridays"}),
        )])
        .tool_calls(vec![(
            "call_2",
            "MemoryEdit",
            json!({"path": "facts/deploys.md", "old_string": "fridays", "new_string": "tuesdays"}),
        )])
        .text("memory updated");
    let swarm = build_swarm(&provider, Arc::clone(&plugin), agent);

    let result = swarm.execute("note when deploys happen, then fix the day").await;
    assert_eq!(result.content.as_deref(), Some("memory updated"));

    let store = plugin.store("librarian").expect("store");
    let entry = store.read("facts/deploys.md").expect("entry");
    assert!(entry.body.contains("tuesdays"));
}

#[tokio::test]
async fn memory_edit_without_read_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = librarian(dir.path());
    let plugin = Arc::new(MemoryPlugin::with_default_embedder());
    let _ = waggle::plugin::Plugin::tools(plugin.as_ref(), &agent);
    let store = plugin.store("librarian").expect("store");
    store
        .write("facts/a.md", "---\ntype: fact\n---\nseeded externally")
        .expect("seed");

    let provider = MockProvider::new()
        .tool_calls(vec![(
            "call_1",
            "MemoryEdit",
            json!({"path": "facts/a.md", "old_string": "seeded", "new_string": "changed"}),
        )])
        .text("done");
    let swarm = build_swarm(&provider, Arc::clone(&plugin), agent);

    swarm.execute("tweak the note").await;
    let chat = swarm.chat("librarian").await.expect("chat");
    let guard = chat.lock().await;
    let denial = guard
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .and_then(Message::text)
        .expect("tool result");
    assert!(denial.contains("<tool_use_error>"));
    assert!(denial.contains("MemoryRead first"));
    // The entry is untouched.
    let entry = plugin
        .store("librarian")
        .expect("store")
        .read("facts/a.md")
        .expect("entry");
    assert!(entry.body.contains("seeded externally"));
}
