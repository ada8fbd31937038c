use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// base64 of `{"id":"api_key"}`
const GOOD_TOKEN: &str = "eyJpZCI6ImFwaV9rZXkifQ==";

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    fn netrc(&self, body: &str) -> String {
        let path = self.dir.path().join("netrc");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path.display().to_string()
    }

    fn config(&self, body: serde_json::Value) -> String {
        let path = self.dir.path().join("connect.json");
        std::fs::write(&path, body.to_string()).unwrap();
        path.display().to_string()
    }

    fn command(&self, bin: &str) -> Command {
        let mut cmd = Command::cargo_bin(bin).unwrap();
        cmd.env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .env("HOME", self.dir.path());
        cmd
    }
}

#[test]
fn sample_config_is_json() {
    let ws = Workspace::new();
    let output = ws.command("db_connect").arg("--sample-config").output().unwrap();
    assert!(output.status.success());
    let sample: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(sample["inventory"]["hosts"]["testmetoo"]["mysql"]["port"], json!(33060));
}

#[test]
fn no_target_and_no_list_does_nothing() {
    let ws = Workspace::new();
    ws.command("ssh_connect")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn missing_credentials_exit_with_one() {
    let ws = Workspace::new();
    let netrc = ws.netrc("machine elsewhere.example login a password b\n");
    ws.command("db_connect")
        .args(["--server-address", "https://pmm.example", "--netrc-file", &netrc, "db1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No auth found"));
}

#[test]
fn errors_reach_stderr_whatever_the_log_level() {
    let ws = Workspace::new();
    let netrc = ws.netrc("machine elsewhere.example login a password b\n");
    ws.command("ssh_connect")
        .args(["--server-address", "https://pmm.example", "--netrc-file", &netrc, "--log-level", "critical", "web1"])
        .assert()
        .code(1)
        .stderr(predicate::str::is_match(r"!!.*No auth found").unwrap());
}

#[test]
fn undecodable_token_exits_with_two() {
    let ws = Workspace::new();
    let netrc = ws.netrc("machine pmm.example login api_key password %%%\n");
    ws.command("ssh_connect")
        .args(["--server-address", "https://pmm.example", "--netrc-file", &netrc, "web1"])
        .assert()
        .code(2);
}

#[test]
fn empty_target_is_rejected() {
    let ws = Workspace::new();
    ws.command("db_connect")
        .arg("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("empty target"));
}

#[test]
fn list_prints_nodes_and_services_from_pmm() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/v1/inventory/Nodes/List"))
            .and(header("authorization", format!("Bearer {GOOD_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "generic": [
                    {"node_id": "n1", "node_name": "web1", "address": "10.0.0.1",
                     "custom_labels": {"environment": "prod"}},
                    {"node_id": "n0", "node_name": "pmm-server", "address": "127.0.0.1"}
                ],
                "remote_rds": [{"node_id": "n2", "node_name": "rds1", "address": "rds.aws"}]
            })))
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/v1/inventory/Services/List"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mysql": [{"service_id": "s1", "service_name": "web1-mysql", "node_id": "n1",
                           "address": "127.0.0.1"}]
            })))
            .mount(&server),
    );

    let ws = Workspace::new();
    let netrc = ws.netrc(&format!("machine 127.0.0.1 login api_key password {GOOD_TOKEN}\n"));
    let config = ws.config(json!({
        "inventory": {"hosts": {"web1": {"mysql": {"port": 33061}}}}
    }));

    ws.command("ssh_connect")
        .args(["--server-address", &server.uri(), "--netrc-file", &netrc, "--config", &config, "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Available connections:"))
        .stdout(predicate::str::contains("web1 address=10.0.0.1 port=22"))
        .stdout(predicate::str::contains("pmm-server").not())
        .stdout(predicate::str::contains("rds1").not());

    ws.command("db_connect")
        .args(["--server-address", &server.uri(), "--netrc-file", &netrc, "--config", &config, "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("web1-mysql address=10.0.0.1 port=33061"))
        .stdout(predicate::str::contains("service=mysql"));

    drop(server);
}

#[test]
fn get_inventory_reports_errors_as_json() {
    let ws = Workspace::new();
    let config = ws.dir.path().join("inventory-config.json");
    std::fs::write(&config, r#"{"key_file": "/nonexistent/key", "retry_wait_seconds": 0}"#).unwrap();

    ws.command("get_inventory")
        .env("GASCAN_INVENTORY_CONFIG_FILE", &config)
        .env("GASCAN_CACHE_DIR", ws.dir.path().join("cache"))
        .assert()
        .success()
        .stdout(predicate::str::diff("{\"error\":1}\n"));
}

#[test]
fn get_inventory_generates_a_sample() {
    let ws = Workspace::new();
    let output = ws.command("get_inventory").arg("--generate-sample").output().unwrap();
    assert!(output.status.success());
    let sample: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(sample["retry_attempts"], json!(3));
}
