//! Integration tests for waypoint
//!
//! These tests drive the CLI binary against temporary projects and, where a
//! network is needed, an in-process JSON-RPC node.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a waypoint Command with a clean environment
fn waypoint() -> Command {
    let mut cmd = cargo_bin_cmd!("waypoint");
    cmd.env_remove("WAYPOINT_ENDPOINT")
        .env_remove("WAYPOINT_NETWORK_ID")
        .env_remove("WAYPOINT_TOOLCHAIN")
        .env_remove("WAYPOINT_PROJECT_DIR")
        .env_remove("WAYPOINT_LOG");
    cmd
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to initialize a waypoint project in a temp directory
fn init_waypoint_project(dir: &TempDir) {
    waypoint()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

fn write_artifact(dir: &Path, name: &str) {
    let build = dir.join("build/contracts");
    fs::create_dir_all(&build).unwrap();
    fs::write(
        build.join(format!("{}.json", name)),
        format!(r#"{{"contractName":"{}","bytecode":"0x6080604052"}}"#, name),
    )
    .unwrap();
}

fn read_ledger(dir: &Path, environment: &str) -> serde_json::Value {
    let path = dir.join(format!(".waypoint/ledger/{}.json", environment));
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_waypoint_help() {
        waypoint()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("resolve"));
    }

    #[test]
    fn test_waypoint_version() {
        waypoint().arg("--version").assert().success();
    }

    #[test]
    fn test_waypoint_init_creates_structure() {
        let dir = create_temp_project();

        waypoint()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized waypoint project"));

        assert!(dir.path().join(".waypoint/waypoint.toml").exists());
        assert!(dir.path().join(".waypoint/steps.json").exists());
        assert!(dir.path().join(".waypoint/ledger").is_dir());
        assert!(dir.path().join(".waypoint/locks").is_dir());
        assert!(dir.path().join(".waypoint/runs").is_dir());
    }

    #[test]
    fn test_waypoint_init_idempotent() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_status_uninitialized() {
        let dir = create_temp_project();

        waypoint()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Not initialized"));
    }

    #[test]
    fn test_status_initialized() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("1 defined"))
            .stdout(predicate::str::contains("development"))
            .stdout(predicate::str::contains("0/1"));
    }

    #[test]
    fn test_list_shows_starter_step() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("deploy_shop"))
            .stdout(predicate::str::contains("pending"));
    }

    #[test]
    fn test_envs_lists_development_network() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .arg("envs")
            .assert()
            .success()
            .stdout(predicate::str::contains("http://127.0.0.1:8545"))
            .stdout(predicate::str::contains("1337"));
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("deploy_shop"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();

        waypoint()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No waypoint.toml found"))
            .stdout(predicate::str::contains("[environments.development]"));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = create_temp_project();

        waypoint()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created waypoint.toml"));

        let content = fs::read_to_string(dir.path().join(".waypoint/waypoint.toml")).unwrap();
        assert!(content.contains("network_id = 1337"));
    }

    #[test]
    fn test_config_validate_starter() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));
    }

    #[test]
    fn test_config_validate_reports_bad_endpoint() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        fs::write(
            dir.path().join(".waypoint/waypoint.toml"),
            r#"
[environments.staging]
url = "ftp://staging.example"
network_id = 5
"#,
        )
        .unwrap();

        waypoint()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("staging"))
            .stdout(predicate::str::contains("http://"));
    }

    #[test]
    fn test_malformed_toml_is_a_configuration_error() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        fs::write(dir.path().join(".waypoint/waypoint.toml"), "[retry\n").unwrap();

        waypoint()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(2);
    }
}

// =============================================================================
// Run Failure Tests (no network needed)
// =============================================================================

mod run_failures {
    use super::*;

    #[test]
    fn test_run_uninitialized_is_configuration_error() {
        let dir = create_temp_project();

        waypoint()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("waypoint init"));
    }

    #[test]
    fn test_run_unknown_environment_is_configuration_error() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        write_artifact(dir.path(), "Shop");

        waypoint()
            .current_dir(dir.path())
            .args(["run", "mainnet"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unknown environment 'mainnet'"));

        assert!(!dir.path().join(".waypoint/ledger/mainnet.json").exists());
    }

    #[test]
    fn test_run_missing_artifact_is_artifact_error() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Shop"));

        assert!(!dir.path().join(".waypoint/ledger/development.json").exists());
    }

    #[test]
    fn test_invalid_steps_file_is_configuration_error() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        fs::write(
            dir.path().join(".waypoint/steps.json"),
            r#"{"steps":[{"sequence":2,"name":"b","artifact_ref":"B"}]}"#,
        )
        .unwrap();

        waypoint()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(2);
    }

    #[test]
    fn test_dry_run_lists_pending_steps() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .args(["run", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would apply"))
            .stdout(predicate::str::contains("deploy_shop"));
    }

    #[test]
    fn test_resolve_without_pending_deployment() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .args(["resolve", "development", "--discard", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to resolve"));
    }

    #[test]
    fn test_resolve_requires_a_decision() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .args(["resolve", "development"])
            .assert()
            .failure();
    }

    #[test]
    fn test_resolve_adopts_journaled_deployment() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        fs::write(
            dir.path().join(".waypoint/ledger/development.pending.json"),
            r#"{"sequence":1,"name":"deploy_shop","started_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        waypoint()
            .current_dir(dir.path())
            .args([
                "resolve",
                "development",
                "--adopt",
                "0xe78a0f7e598cc8b0bb87894b0f60dd2a88d6a8ab",
                "--yes",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Recorded step 1"));

        let ledger = read_ledger(dir.path(), "development");
        assert_eq!(ledger["entries"][0]["sequence"], 1);
        assert!(!dir.path().join(".waypoint/ledger/development.pending.json").exists());
    }

    #[test]
    fn test_resolve_without_terminal_requires_yes() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        let journal = dir.path().join(".waypoint/ledger/development.pending.json");
        fs::write(
            &journal,
            r#"{"sequence":1,"name":"deploy_shop","started_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        waypoint()
            .current_dir(dir.path())
            .args(["resolve", "development", "--discard"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("--yes"));

        assert!(journal.exists());
    }

    #[test]
    fn test_unresolved_journal_blocks_run() {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        write_artifact(dir.path(), "Shop");
        fs::write(
            dir.path().join(".waypoint/ledger/development.pending.json"),
            r#"{"sequence":1,"name":"deploy_shop","started_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        waypoint()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(7)
            .stderr(predicate::str::contains("waypoint resolve development"));
    }
}

// =============================================================================
// End-to-end runs against a fake JSON-RPC node
// =============================================================================

mod end_to_end {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Node {
        network_id: u64,
        lose_submit_response: bool,
        sent: AtomicU64,
    }

    async fn handle(State(node): State<Arc<Node>>, Json(req): Json<Value>) -> Response {
        let id = req["id"].clone();
        let result = match req["method"].as_str().unwrap_or_default() {
            "net_version" => json!(node.network_id.to_string()),
            "eth_accounts" => json!(["0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1"]),
            "eth_sendTransaction" => {
                let n = node.sent.fetch_add(1, Ordering::SeqCst) + 1;
                if node.lose_submit_response {
                    return (StatusCode::BAD_GATEWAY, "upstream closed").into_response();
                }
                json!(format!("0x{:064x}", n))
            }
            "eth_getTransactionReceipt" => {
                let hash = req["params"][0].as_str().unwrap_or_default().to_string();
                let address = format!("0x{}", &hash[hash.len() - 40..]);
                json!({ "status": "0x1", "contractAddress": address })
            }
            _ => Value::Null,
        };
        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
    }

    async fn spawn_node(network_id: u64) -> (String, Arc<Node>) {
        start_node(Node {
            network_id,
            lose_submit_response: false,
            sent: AtomicU64::new(0),
        })
        .await
    }

    async fn start_node(node: Node) -> (String, Arc<Node>) {
        let node = Arc::new(node);
        let app = Router::new()
            .route("/", post(handle))
            .with_state(node.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), node)
    }

    fn two_step_project() -> TempDir {
        let dir = create_temp_project();
        init_waypoint_project(&dir);
        write_artifact(dir.path(), "Shop");
        write_artifact(dir.path(), "Token");
        fs::write(
            dir.path().join(".waypoint/steps.json"),
            r#"{"steps":[
                {"sequence":1,"name":"deploy_shop","artifact_ref":"Shop","deploy_args":{"from":0}},
                {"sequence":2,"name":"deploy_token","artifact_ref":"Token","deploy_args":{"gas":3000000}}
            ]}"#,
        )
        .unwrap();
        dir
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_applies_steps_once() {
        let (endpoint, node) = spawn_node(1337).await;
        let dir = two_step_project();

        waypoint()
            .current_dir(dir.path())
            .env("WAYPOINT_ENDPOINT", &endpoint)
            .arg("run")
            .assert()
            .success();

        assert_eq!(node.sent.load(Ordering::SeqCst), 2);
        let ledger = read_ledger(dir.path(), "development");
        let entries = ledger["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "deploy_shop");
        assert_eq!(
            entries[1]["result_ref"],
            "0x0000000000000000000000000000000000000002"
        );

        waypoint()
            .current_dir(dir.path())
            .env("WAYPOINT_ENDPOINT", &endpoint)
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("up to date"));
        assert_eq!(node.sent.load(Ordering::SeqCst), 2);

        waypoint()
            .current_dir(dir.path())
            .arg("history")
            .assert()
            .success()
            .stdout(predicate::str::contains("deploy_token"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_network_mismatch_deploys_nothing() {
        let (endpoint, node) = spawn_node(1).await;
        let dir = two_step_project();

        waypoint()
            .current_dir(dir.path())
            .env("WAYPOINT_ENDPOINT", &endpoint)
            .arg("run")
            .assert()
            .code(4)
            .stderr(predicate::str::contains("1337"));

        assert_eq!(node.sent.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join(".waypoint/ledger/development.json").exists());
        assert!(!dir.path().join(".waypoint/ledger/development.pending.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lost_submission_halts_for_reconciliation() {
        let (endpoint, node) = start_node(Node {
            network_id: 1337,
            lose_submit_response: true,
            sent: AtomicU64::new(0),
        })
        .await;
        let dir = two_step_project();

        waypoint()
            .current_dir(dir.path())
            .env("WAYPOINT_ENDPOINT", &endpoint)
            .arg("run")
            .assert()
            .code(7)
            .stderr(predicate::str::contains("waypoint resolve development"));

        assert_eq!(node.sent.load(Ordering::SeqCst), 1);
        assert!(dir.path().join(".waypoint/ledger/development.pending.json").exists());
        assert!(!dir.path().join(".waypoint/ledger/development.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_environments_keep_separate_ledgers() {
        let (endpoint, node) = spawn_node(5).await;
        let dir = two_step_project();
        fs::write(
            dir.path().join(".waypoint/waypoint.toml"),
            format!(
                "[environments.staging]\nurl = \"{}\"\nnetwork_id = 5\n",
                endpoint
            ),
        )
        .unwrap();

        waypoint()
            .current_dir(dir.path())
            .args(["run", "staging"])
            .assert()
            .success();

        assert_eq!(node.sent.load(Ordering::SeqCst), 2);
        assert!(dir.path().join(".waypoint/ledger/staging.json").exists());
        assert!(!dir.path().join(".waypoint/ledger/development.json").exists());

        waypoint()
            .current_dir(dir.path())
            .args(["list", "staging"])
            .assert()
            .success()
            .stdout(predicate::str::contains("2 of 2 step(s) applied"));
    }
}
