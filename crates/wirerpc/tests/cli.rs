#![cfg(all(unix, feature = "cli"))]

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/wrpc-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("server did not come up at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// A `wirerpc serve` child process, killed on drop.
struct Server {
    child: Child,
    dir: PathBuf,
    sock: PathBuf,
}

impl Server {
    fn start(tag: &str) -> Self {
        let dir = unique_temp_dir(tag);
        let sock = dir.join("rpc.sock");
        let child = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
            .arg("--log-level")
            .arg("error")
            .arg("serve")
            .arg(&sock)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve command should start");
        wait_for_socket(&sock, Duration::from_secs(5));
        Self { child, dir, sock }
    }

    fn cli(&self, args: &[&str]) -> Output {
        let (command, rest) = args.split_first().expect("a subcommand is required");
        Command::new(env!("CARGO_BIN_EXE_wirerpc"))
            .arg("--log-level")
            .arg("error")
            .arg("--format")
            .arg("json")
            .arg(command)
            .arg(&self.sock)
            .args(rest)
            .output()
            .expect("cli should run")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn call_prints_result_as_json() {
    let server = Server::start("add");
    let output = server.cli(&["call", "add", "11", "12"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"method\":\"add\""));
    assert!(stdout.contains("\"result\":23"));
}

#[test]
fn call_accepts_params_document() {
    let server = Server::start("params");
    let output = server.cli(&["call", "echo", "--params", "[\"a\",{\"b\":1}]"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"result\":[\"a\",{\"b\":1}]"));
}

#[test]
fn unknown_method_exits_with_failure() {
    let server = Server::start("ghost");
    let output = server.cli(&["call", "ghost"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Method not found"));
}

#[test]
fn application_error_exits_with_failure() {
    let server = Server::start("error");
    let output = server.cli(&["call", "error"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("An error message"));
}

#[test]
fn slow_call_times_out_with_124() {
    let server = Server::start("delay");
    let output = server.cli(&["call", "delay", "2000", "--timeout", "100ms"]);

    assert_eq!(output.status.code(), Some(124));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("timed out"));
}

#[test]
fn signal_is_acknowledged() {
    let server = Server::start("signal");
    let output = server.cli(&["signal", "reload", "--payload", "{\"force\":true}"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"signal\":\"reload\""));
    assert!(stdout.contains("\"sent\":true"));
}

#[test]
fn missing_socket_is_a_connect_failure() {
    let dir = unique_temp_dir("missing");
    let output = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
        .arg("call")
        .arg(dir.join("absent.sock"))
        .arg("add")
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_params_json_is_data_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
        .arg("call")
        .arg("/tmp/unused.sock")
        .arg("add")
        .arg("--params")
        .arg("{")
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("wirerpc {}", env!("CARGO_PKG_VERSION")));
}
