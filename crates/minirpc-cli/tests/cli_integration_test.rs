//! CLI Integration Tests
//!
//! These tests run the `minirpc` binary end to end:
//! 1. Argument validation and error exits
//! 2. `serve` over TCP, HTTP and unix sockets
//! 3. `call` printing raw JSON replies
//!
//! Servers bind `127.0.0.1` on a port reserved just before startup.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

// ============================================================================
// Test Helpers
// ============================================================================

fn minirpc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_minirpc"))
}

/// A `minirpc serve` child process, killed on drop.
struct ServeProcess {
    child: Child,
}

impl Drop for ServeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn spawn_serve(args: &[&str]) -> ServeProcess {
    let child = minirpc()
        .arg("serve")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    ServeProcess { child }
}

/// Waits until `ready` holds, failing the test after five seconds.
fn wait_for(what: &str, ready: impl Fn() -> bool) {
    let started = Instant::now();
    while !ready() {
        assert!(started.elapsed() < Duration::from_secs(5), "{} never came up", what);
        sleep(Duration::from_millis(50));
    }
}

fn serve_tcp(extra: &[&str]) -> (ServeProcess, String) {
    let addr = format!("127.0.0.1:{}", free_port());
    let mut args = vec!["--bind", addr.as_str()];
    args.extend_from_slice(extra);
    let process = spawn_serve(&args);

    wait_for(&addr, || std::net::TcpStream::connect(&addr).is_ok());
    (process, addr)
}

fn call(address: &str, method: &str, args: &str) -> Output {
    minirpc()
        .args(["call", address, method, "--args", args])
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[test]
fn test_call_requires_method_argument() {
    let output = minirpc().args(["call", "tcp@127.0.0.1:1"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_call_rejects_bad_address_format() {
    let output = call("127.0.0.1:9999", "Foo.Sum", "{}");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("wrong format '127.0.0.1:9999', expect protocol@addr"));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_call_rejects_invalid_json_args() {
    let output = call("tcp@127.0.0.1:1", "Foo.Sum", "{num1");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid JSON in args"));
}

#[test]
fn test_call_connection_refused() {
    let addr = format!("tcp@127.0.0.1:{}", free_port());
    let output = call(&addr, "Foo.Sum", r#"{"num1":1,"num2":2}"#);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to connect"));
}

// ============================================================================
// Serve + Call Tests
// ============================================================================

#[test]
fn test_serve_tcp_and_call() {
    let (_server, addr) = serve_tcp(&[]);

    let output = call(&format!("tcp@{}", addr), "Foo.Sum", r#"{"num1":2,"num2":3}"#);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "5");
}

#[test]
fn test_call_reports_server_error() {
    let (_server, addr) = serve_tcp(&[]);

    let output = call(&format!("tcp@{}", addr), "Foo.Bogus", r#"{"num1":2,"num2":3}"#);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("can't find method Bogus"));
}

#[test]
fn test_call_timeout() {
    let (_server, addr) = serve_tcp(&[]);

    let output = minirpc()
        .args([
            "call",
            &format!("tcp@{}", addr),
            "Foo.Sleep",
            "--args",
            r#"{"num1":5,"num2":0}"#,
            "--timeout-ms",
            "100",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("call canceled"));
}

#[test]
fn test_serve_http_and_call() {
    let (_server, addr) = serve_tcp(&["--http"]);

    let output = call(&format!("http@{}", addr), "Foo.Sum", r#"{"num1":10,"num2":20}"#);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "30");
}

#[cfg(unix)]
#[test]
fn test_serve_unix_and_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minirpc.sock");
    let path_str = path.to_str().unwrap();
    let _server = spawn_serve(&["--unix", path_str]);

    wait_for(path_str, || Path::new(path_str).exists());

    let output = call(&format!("unix@{}", path_str), "Foo.Sum", r#"{"num1":20,"num2":22}"#);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "42");
}
