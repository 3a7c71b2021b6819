#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        Self::spawn_with_env(&[])
    }

    pub fn spawn_with_env(env: &[(&str, &str)]) -> Self {
        let exe = env!("CARGO_BIN_EXE_kindergartend");
        let mut cmd = Command::new(exe);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_remove("KINDERGARTEND_WORKSPACE")
            .env_remove("KINDERGARTEND_DEMO_CODES");
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd.spawn().expect("spawn kindergartend");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns a sidecar and selects `workspace` in it.
    pub fn open(workspace: &std::path::Path) -> Self {
        let mut s = Self::spawn();
        s.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        s
    }

    pub fn send_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Returns the error code of a request that is expected to fail.
    pub fn request_err(&mut self, method: &str, params: Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"].as_str().unwrap_or("").to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
