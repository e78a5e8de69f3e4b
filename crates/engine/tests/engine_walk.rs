//! End-to-end walks of the engine over stub executors, plus the
//! fingerprint-gated deploy handler against a real store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use cf_domain::error::{Error, Result};
use cf_domain::workflow::NodeStatus;
use cf_domain::NoopLogger;
use cf_engine::{Engine, ExecutionContext, ExecutorRegistry, NodeEnv, NodeExecutor};
use cf_plugin::PluginHost;
use cf_store::Store;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stub executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug)]
struct Call {
    node_id: String,
    certificate: Option<Value>,
    from_node_data: Option<Value>,
    at: Instant,
}

/// Records every invocation; behavior driven by the node config:
/// `sleep_ms` delays, `fail: true` errors, `output` becomes the result.
struct StubExec {
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait::async_trait]
impl NodeExecutor for StubExec {
    async fn execute(&self, env: NodeEnv) -> Result<Option<Value>> {
        if let Some(ms) = env.config.get("sleep_ms").and_then(|v| v.as_u64()) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.calls.lock().push(Call {
            node_id: env.node_id.clone(),
            certificate: env.certificate.clone(),
            from_node_data: env.from_node_data.clone(),
            at: Instant::now(),
        });
        if env.config.get("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Err(Error::Other(format!("{} failed", env.node_id)));
        }
        Ok(env.config.get("output").cloned())
    }
}

fn stub_engine() -> (Arc<Engine>, Arc<Mutex<Vec<Call>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ExecutorRegistry::new();
    registry.register("stub", Arc::new(StubExec { calls: calls.clone() }));
    (Arc::new(Engine::new(Arc::new(registry))), calls)
}

fn new_ctx(run_id: &str) -> Arc<ExecutionContext> {
    Arc::new(ExecutionContext::new(run_id, Arc::new(NoopLogger)))
}

fn called_ids(calls: &Mutex<Vec<Call>>) -> Vec<String> {
    calls.lock().iter().map(|c| c.node_id.clone()).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Walk semantics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn linear_chain_resolves_inputs_and_propagates_output() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-linear");
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": "C", "key": "K" } },
        "childNode": {
            "id": "b", "type": "stub",
            "inputs": [{ "name": "certificate", "fromNodeId": "a" }]
        }
    })
    .to_string();

    engine.run(&content, ctx.clone()).await.unwrap();

    assert_eq!(called_ids(&calls), vec!["a", "b"], "document order");
    let b = calls.lock()[1].clone();
    assert_eq!(b.certificate.unwrap()["cert"], "C", "input resolved from upstream output");
    assert_eq!(b.from_node_data.unwrap()["key"], "K", "linear fromNodeData is the parent output");
    assert_eq!(ctx.get_status("a"), Some(NodeStatus::Success));
    assert_eq!(ctx.get_status("b"), Some(NodeStatus::Success));
}

#[tokio::test]
async fn unhandled_error_aborts_before_downstream_nodes() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-abort");
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "fail": true },
        "childNode": { "id": "b", "type": "stub" }
    })
    .to_string();

    let err = engine.run(&content, ctx.clone()).await.unwrap_err();
    assert!(err.to_string().contains("a failed"));
    assert_eq!(called_ids(&calls), vec!["a"], "downstream node must not run");
    assert_eq!(ctx.get_status("a"), None, "aborted node records no status");
}

#[tokio::test]
async fn unknown_node_kind_is_a_successful_noop() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-unknown");
    let content = json!({
        "id": "future", "type": "quantum_deploy",
        "childNode": { "id": "b", "type": "stub" }
    })
    .to_string();

    engine.run(&content, ctx.clone()).await.unwrap();
    assert_eq!(called_ids(&calls), vec!["b"]);
    assert_eq!(ctx.get_status("future"), Some(NodeStatus::Success));
}

#[tokio::test]
async fn result_branch_swallows_error_and_routes_fail_path() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-route");
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "fail": true },
        "childNode": {
            "id": "router", "type": "execute_result_branch",
            "config": { "fromNodeId": "a" },
            "conditionNodes": [
                {
                    "id": "on-success", "type": "condition",
                    "config": { "type": "success" },
                    "childNode": { "id": "won", "type": "stub" }
                },
                {
                    "id": "on-fail", "type": "condition",
                    "config": { "type": "fail" },
                    "childNode": { "id": "lost", "type": "stub" }
                }
            ]
        }
    })
    .to_string();

    engine.run(&content, ctx.clone()).await.expect("routed error ends successfully");
    assert_eq!(called_ids(&calls), vec!["a", "lost"], "only the fail path runs");
    assert_eq!(ctx.get_status("a"), Some(NodeStatus::Fail));
}

#[tokio::test]
async fn result_branch_routes_success_path_with_upstream_output() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-route-ok");
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": "C" } },
        "childNode": {
            "id": "router", "type": "execute_result_branch",
            "config": { "fromNodeId": "a" },
            "conditionNodes": [
                {
                    "id": "on-success", "type": "condition",
                    "config": { "type": "success" },
                    "childNode": { "id": "won", "type": "stub" }
                },
                {
                    "id": "on-fail", "type": "condition",
                    "config": { "type": "fail" },
                    "childNode": { "id": "lost", "type": "stub" }
                }
            ]
        }
    })
    .to_string();

    engine.run(&content, ctx).await.unwrap();
    assert_eq!(called_ids(&calls), vec!["a", "won"]);
    let won = calls.lock().last().cloned().unwrap();
    assert_eq!(
        won.from_node_data.unwrap()["cert"], "C",
        "condition child is seeded with the referenced node's output"
    );
}

#[tokio::test]
async fn result_branch_requires_from_node_id() {
    let (engine, _calls) = stub_engine();
    let ctx = new_ctx("run-no-from");
    let content = json!({
        "id": "router", "type": "execute_result_branch",
        "conditionNodes": [
            { "id": "c", "type": "condition", "config": { "type": "success" } }
        ]
    })
    .to_string();
    let err = engine.run(&content, ctx).await.unwrap_err();
    assert!(err.to_string().contains("fromNodeId"), "got: {err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn branch_children_run_concurrently() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-fanout");
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": "C" } },
        "childNode": {
            "id": "fan", "type": "branch",
            "conditionNodes": [
                { "id": "d1", "type": "stub", "config": { "sleep_ms": 100 } },
                { "id": "d2", "type": "stub", "config": { "sleep_ms": 100 } },
                { "id": "d3", "type": "stub", "config": { "sleep_ms": 100 } }
            ],
            "childNode": { "id": "after", "type": "stub" }
        }
    })
    .to_string();

    let started = Instant::now();
    engine.run(&content, ctx).await.unwrap();
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(280),
        "three 100ms children should overlap, took {elapsed:?}"
    );

    let ids = called_ids(&calls);
    assert_eq!(ids.len(), 5);
    assert_eq!(ids[0], "a");
    assert_eq!(ids[4], "after", "successor runs only after every child finished");
    let after_at = calls.lock()[4].at;
    for call in calls.lock().iter().filter(|c| c.node_id.starts_with('d')) {
        assert!(call.at <= after_at);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn branch_first_error_wins_after_all_children_finish() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-fanout-err");
    let content = json!({
        "id": "fan", "type": "branch",
        "conditionNodes": [
            { "id": "ok-1", "type": "stub", "config": { "sleep_ms": 50 } },
            { "id": "bad", "type": "stub", "config": { "fail": true } },
            { "id": "ok-2", "type": "stub", "config": { "sleep_ms": 50 } }
        ]
    })
    .to_string();

    let err = engine.run(&content, ctx).await.unwrap_err();
    assert!(err.to_string().contains("bad failed"));
    assert_eq!(called_ids(&calls).len(), 3, "all children still complete");
}

#[tokio::test]
async fn branch_propagates_parent_from_node_data_to_grandchildren() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-fanout-fnd");
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": "C", "skip": true } },
        "childNode": {
            "id": "fan", "type": "branch",
            "conditionNodes": [
                {
                    "id": "lane-1", "type": "container",
                    "childNode": { "id": "leaf-1", "type": "stub" }
                },
                {
                    "id": "lane-2", "type": "container",
                    "childNode": { "id": "leaf-2", "type": "stub" }
                }
            ]
        }
    })
    .to_string();

    engine.run(&content, ctx).await.unwrap();
    let calls = calls.lock();
    for leaf in calls.iter().filter(|c| c.node_id.starts_with("leaf")) {
        assert_eq!(
            leaf.from_node_data.as_ref().unwrap()["skip"],
            true,
            "{} must inherit the branch's fromNodeData",
            leaf.node_id
        );
    }
}

#[tokio::test]
async fn branch_passes_from_node_data_to_direct_children() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-fanout-direct");
    // The fan-out children are executors themselves, with no childNode
    // wrapper in between.
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": "C", "skip": true } },
        "childNode": {
            "id": "fan", "type": "branch",
            "conditionNodes": [
                { "id": "d1", "type": "stub" },
                { "id": "d2", "type": "stub" }
            ]
        }
    })
    .to_string();

    engine.run(&content, ctx).await.unwrap();
    let calls = calls.lock();
    for child in calls.iter().filter(|c| c.node_id.starts_with('d')) {
        let fnd = child
            .from_node_data
            .as_ref()
            .unwrap_or_else(|| panic!("{} executed without fromNodeData", child.node_id));
        assert_eq!(fnd["skip"], true, "{} must see the branch's fromNodeData", child.node_id);
    }
}

#[tokio::test]
async fn result_branch_passes_referenced_output_to_direct_entry() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-route-direct");
    // The condition entry is itself the executing node, exactly the
    // error-branching shape where a notify sits directly in
    // conditionNodes and must see the upstream output (e.g. its skip
    // marker).
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": "C", "skip": true } },
        "childNode": {
            "id": "router", "type": "execute_result_branch",
            "config": { "fromNodeId": "a" },
            "conditionNodes": [
                { "id": "won", "type": "stub", "config": { "type": "success" } },
                { "id": "lost", "type": "stub", "config": { "type": "fail" } }
            ]
        }
    })
    .to_string();

    engine.run(&content, ctx).await.unwrap();
    assert_eq!(called_ids(&calls), vec!["a", "won"]);
    let won = calls.lock().last().cloned().unwrap();
    let fnd = won.from_node_data.expect("direct entry executed without fromNodeData");
    assert_eq!(fnd["cert"], "C");
    assert_eq!(fnd["skip"], true, "skip propagation must reach a direct condition entry");
}

#[tokio::test]
async fn invalid_content_fails_before_any_execution() {
    let (engine, calls) = stub_engine();
    let ctx = new_ctx("run-bad-json");
    assert!(engine.run("not json", ctx).await.is_err());
    assert!(calls.lock().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deploy fingerprint gating (real handler, real store)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn self_signed_pair() -> (String, String) {
    let params = rcgen::CertificateParams::new(vec!["gate.example".into()]).unwrap();
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

fn deploy_engine(store: Arc<Store>, calls: Arc<Mutex<Vec<Call>>>) -> Arc<Engine> {
    let mut registry = ExecutorRegistry::new();
    registry.register("stub", Arc::new(StubExec { calls }));
    registry.register(
        "deploy",
        Arc::new(cf_engine::handlers::DeployExecutor::new(
            store,
            Arc::new(PluginHost::new()),
            "plugins".into(),
        )),
    );
    Arc::new(Engine::new(Arc::new(registry)))
}

#[tokio::test]
async fn unchanged_cert_with_skip_flag_bypasses_the_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
    let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
    let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");

    let (cert_pem, key_pem) = self_signed_pair();
    let sha = cf_certs::parse::cert_sha256(&cert_pem).unwrap();
    store.upsert_fingerprint(&wf, "deploy-1", &sha, "success").unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let engine = deploy_engine(store.clone(), calls.clone());
    let ctx = Arc::new(ExecutionContext::new(&run, Arc::new(NoopLogger)));

    // The provider tag is bogus on purpose: if the skip gate fails, the
    // dispatcher errors and so does the run.
    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": cert_pem, "key": key_pem } },
        "childNode": {
            "id": "deploy-1", "type": "deploy",
            "config": { "provider": "smoke-signals", "provider_id": "1", "skip": 1 },
            "inputs": [{ "name": "certificate", "fromNodeId": "a" }]
        }
    })
    .to_string();

    engine.run(&content, ctx.clone()).await.expect("skip gate avoids the adapter");
    assert_eq!(ctx.get_output("deploy-1").unwrap()["skip"], true);
    assert_eq!(
        store.get_fingerprint(&wf, "deploy-1").unwrap().unwrap().cert_hash,
        sha,
        "fingerprint row unchanged"
    );
}

#[tokio::test]
async fn failed_deploy_updates_the_fingerprint_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
    let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
    let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");

    let (cert_pem, key_pem) = self_signed_pair();
    let sha = cf_certs::parse::cert_sha256(&cert_pem).unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let engine = deploy_engine(store.clone(), calls);
    let ctx = Arc::new(ExecutionContext::new(&run, Arc::new(NoopLogger)));

    let content = json!({
        "id": "a", "type": "stub",
        "config": { "output": { "cert": cert_pem, "key": key_pem } },
        "childNode": {
            "id": "deploy-1", "type": "deploy",
            "config": { "provider": "smoke-signals", "provider_id": "1" },
            "inputs": [{ "name": "certificate", "fromNodeId": "a" }]
        }
    })
    .to_string();

    engine.run(&content, ctx).await.unwrap_err();
    let fp = store.get_fingerprint(&wf, "deploy-1").unwrap().unwrap();
    assert_eq!(fp.cert_hash, sha);
    assert_eq!(fp.status, "fail");
}

#[tokio::test]
async fn deploy_without_certificate_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
    let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
    let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let engine = deploy_engine(store, calls);
    let ctx = Arc::new(ExecutionContext::new(&run, Arc::new(NoopLogger)));

    let content = json!({
        "id": "deploy-1", "type": "deploy",
        "config": { "provider": "ssh", "provider_id": "1" }
    })
    .to_string();

    let err = engine.run(&content, ctx).await.unwrap_err();
    assert!(err.to_string().contains("no certificate"), "got: {err}");
}
