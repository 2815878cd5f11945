//! Integration tests for the Agent Core Loop
//!
//! Drives the orchestrator against a mocked OpenAI-compatible endpoint with
//! the real tool catalog:
//! - tool results are appended in call order before the next request
//! - iteration cap
//! - provider failures abort the turn
//! - context prefix injection through a session

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

use clio_engine::agent::{AgentCore, ToolObserver, MAX_ITERATIONS};
use clio_engine::config::Config;
use clio_engine::llm::openai::OpenAICompatibleProvider;
use clio_engine::permission::{AutoApprove, PermissionGate};
use clio_engine::session::Session;
use clio_engine::tools::{ToolContext, ToolRegistry};
use sdk::errors::EngineError;

fn provider(server: &MockServer) -> Arc<OpenAICompatibleProvider> {
    Arc::new(
        OpenAICompatibleProvider::new(server.uri(), Some("sk-test".to_string()), Duration::from_secs(5))
            .unwrap(),
    )
}

fn agent(server: &MockServer, ctx: ToolContext) -> AgentCore {
    let tools = Arc::new(ToolRegistry::with_default_tools(Arc::new(ctx)));
    AgentCore::new(provider(server), "gpt-test", tools, "You are a test assistant.")
}

fn tool_call_response(calls: &[(&str, &str, Value)]) -> Value {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| {
            json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": args.to_string()}
            })
        })
        .collect();
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": null, "tool_calls": calls},
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn text_response(text: &str) -> Value {
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 3, "total_tokens": 23}
    })
}

async fn mount_once(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    let requests: Vec<Request> = server.received_requests().await.unwrap();
    requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ToolObserver for RecordingObserver {
    async fn on_tool_executed(&self, name: &str, _arguments: &str, result: &str) {
        self.seen
            .lock()
            .unwrap()
            .push((name.to_string(), result.to_string()));
    }
}

#[derive(Default)]
struct CountingGate {
    calls: AtomicUsize,
}

#[async_trait]
impl PermissionGate for CountingGate {
    async fn request(&self, _operation: &str, _details: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[tokio::test]
async fn test_tool_results_follow_call_order() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    mount_once(
        &server,
        tool_call_response(&[
            (
                "call_1",
                "write_file",
                json!({"path": "hello.txt", "content": "hello"}),
            ),
            ("call_2", "read_file", json!({"path": "hello.txt"})),
        ]),
    )
    .await;
    mount_once(&server, text_response("Created hello.txt")).await;

    let observer = Arc::new(RecordingObserver::default());
    let mut agent = agent(&server, ToolContext::new(temp.path()))
        .with_observer(Arc::clone(&observer) as Arc<dyn ToolObserver>);

    let result = agent.process_message("create hello.txt", "").await.unwrap();
    assert_eq!(result.answer, "Created hello.txt");
    assert_eq!(result.iterations, 2);
    assert_eq!(result.tool_calls, 2);
    assert_eq!(result.usage.total_tokens, 38);
    assert_eq!(
        std::fs::read_to_string(temp.path().join("hello.txt")).unwrap(),
        "hello"
    );

    let seen = observer.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "write_file");
    assert!(seen[0].1.starts_with("Successfully wrote 5 bytes"));
    assert_eq!(seen[1], ("read_file".to_string(), "hello".to_string()));

    // Second request carries both results, in order, right after the assistant turn
    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    let messages = bodies[1]["messages"].as_array().unwrap();
    let n = messages.len();
    assert_eq!(messages[n - 3]["role"], "assistant");
    assert_eq!(messages[n - 2]["role"], "tool");
    assert_eq!(messages[n - 2]["tool_call_id"], "call_1");
    assert_eq!(messages[n - 1]["tool_call_id"], "call_2");
    assert_eq!(messages[n - 1]["content"], "hello");

    assert_eq!(bodies[0]["tools"].as_array().unwrap().len(), 9);
    assert_eq!(bodies[0]["tool_choice"], "auto");
}

#[tokio::test]
async fn test_tool_errors_are_returned_to_the_model() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.txt"), "one two").unwrap();

    mount_once(
        &server,
        tool_call_response(&[
            ("c1", "write_file", json!({"path": "/etc/clio-test", "content": "x"})),
            (
                "c2",
                "edit_file",
                json!({"path": "a.txt", "old_text": "three", "new_text": "3"}),
            ),
            ("c3", "launch_rockets", json!({})),
            ("c4", "read_file", json!({})),
        ]),
    )
    .await;
    mount_once(&server, text_response("I could not do that")).await;

    let gate = Arc::new(CountingGate::default());
    let ctx = ToolContext::new(temp.path()).with_permission(Arc::clone(&gate) as Arc<dyn PermissionGate>);
    let mut agent = agent(&server, ctx);

    let result = agent.process_message("break things", "").await.unwrap();
    assert_eq!(result.tool_calls, 4);

    // Blocked before the gate, and the failed edit never asked either
    assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_to_string(temp.path().join("a.txt")).unwrap(), "one two");

    let bodies = request_bodies(&server).await;
    let messages = bodies[1]["messages"].as_array().unwrap();
    let results: Vec<&str> = messages
        .iter()
        .filter(|m| m["role"] == "tool")
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(results.len(), 4);
    assert!(results[0].starts_with("Error: Access denied"), "{}", results[0]);
    assert!(results[1].starts_with("Error: Text not found"), "{}", results[1]);
    assert!(results[2].starts_with("Error: Unknown tool 'launch_rockets'"));
    assert!(results[3].starts_with("Error: Invalid arguments"), "{}", results[3]);
}

#[tokio::test]
async fn test_iteration_cap_with_looping_model() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_response(&[(
            "loop",
            "list_directory",
            json!({"path": "."}),
        )])))
        .mount(&server)
        .await;

    let mut agent = agent(&server, ToolContext::new(temp.path()));
    let err = agent.process_message("loop forever", "").await.unwrap_err();

    assert!(
        matches!(err, EngineError::MaxIterationsReached(n) if n == MAX_ITERATIONS),
        "Unexpected error: {:?}",
        err
    );
    assert_eq!(request_bodies(&server).await.len(), MAX_ITERATIONS);
}

#[tokio::test]
async fn test_provider_failures_abort_the_turn() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_once(&server, json!({"choices": []})).await;
    mount_once(
        &server,
        json!({"choices": [{"message": {"role": "assistant", "content": "  "}, "finish_reason": "length"}]}),
    )
    .await;

    let mut agent = agent(&server, ToolContext::new(temp.path()));

    let err = agent.process_message("first", "").await.unwrap_err();
    assert!(matches!(err, EngineError::Transport(_)), "{:?}", err);

    let err = agent.process_message("second", "").await.unwrap_err();
    assert!(matches!(err, EngineError::MalformedResponse(_)), "{:?}", err);

    let err = agent.process_message("third", "").await.unwrap_err();
    assert!(
        matches!(&err, EngineError::EmptyModelResponse(reason) if reason == "length"),
        "{:?}",
        err
    );

    // Not retried: one request per turn
    assert_eq!(request_bodies(&server).await.len(), 3);
}

#[tokio::test]
async fn test_session_injects_context_only_when_present() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let work_dir: PathBuf = temp.path().canonicalize().unwrap();
    std::fs::write(work_dir.join("notes.md"), "remember the milk").unwrap();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
        .mount(&server)
        .await;

    let config = Config::default();
    let mut session = Session::with_provider(
        &config,
        work_dir.clone(),
        provider(&server),
        Arc::new(AutoApprove),
        None,
    )
    .unwrap();

    session.run_turn("no context yet").await.unwrap();

    let added = session.resolve_mentions("look at @notes.md").await;
    assert_eq!(added.len(), 1);
    assert!(added[0].1.is_ok());
    session.run_turn("look at @notes.md").await.unwrap();

    let bodies = request_bodies(&server).await;
    let first = bodies[0]["messages"].as_array().unwrap();
    assert_eq!(first[0]["role"], "system");
    assert_eq!(first[1]["role"], "user");

    let second = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(second[1]["role"], "system");
    let prefix = second[1]["content"].as_str().unwrap();
    assert!(prefix.contains("remember the milk"));
    assert!(prefix.contains("notes.md ==="));
    // History of the first turn precedes the new message
    assert_eq!(second.last().unwrap()["content"], "look at @notes.md");
    assert_eq!(second.len(), 2 + 2 + 1);
}
