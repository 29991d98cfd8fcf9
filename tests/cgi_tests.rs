//! CGI gateway tests, focused on the stdin/stdout orderings that are easy
//! to get wrong: a script that writes and exits without touching stdin, a
//! script that consumes all of stdin before writing, and one that hangs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use webserv::cgi::{self, CgiOutcome};

fn script_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("webserv_cgi_tests_{}", tag));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create script dir");
    dir
}

fn write_script(dir: &PathBuf, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write script");
    path
}

fn run(script: &PathBuf, body: &[u8], timeout_ms: u64) -> CgiOutcome {
    cgi::run(
        "/bin/sh",
        script,
        &HashMap::new(),
        body,
        Duration::from_millis(timeout_ms),
    )
    .expect("cgi spawn should succeed")
}

#[test]
fn test_script_writes_then_exits_ignoring_stdin() {
    let dir = script_dir("ignores_stdin");
    let script = write_script(
        &dir,
        "hello.sh",
        "printf 'Content-Type: text/plain\\r\\n\\r\\nhello from cgi'\n",
    );

    // a body is supplied even though the script never reads it
    match run(&script, b"unread body", 5000) {
        CgiOutcome::Complete(output) => {
            let response = cgi::parse_output(&output).expect("parseable output");
            assert_eq!(response.status, 200);
            assert_eq!(response.body, b"hello from cgi");
        }
        other => panic!("expected Complete, got {:?}", other),
    }
}

#[test]
fn test_script_reads_full_stdin_then_writes() {
    let dir = script_dir("echo");
    let script = write_script(
        &dir,
        "echo.sh",
        "printf 'Content-Type: text/plain\\r\\n\\r\\n'\ncat\n",
    );

    let body = b"round trip payload";
    match run(&script, body, 5000) {
        CgiOutcome::Complete(output) => {
            let response = cgi::parse_output(&output).expect("parseable output");
            assert_eq!(response.body, body);
        }
        other => panic!("expected Complete, got {:?}", other),
    }
}

#[test]
fn test_script_with_empty_body_sees_eof() {
    let dir = script_dir("empty_body");
    // cat terminates only once stdin reaches EOF
    let script = write_script(
        &dir,
        "echo.sh",
        "printf 'Content-Type: text/plain\\r\\n\\r\\n'\ncat\n",
    );

    match run(&script, b"", 5000) {
        CgiOutcome::Complete(output) => {
            let response = cgi::parse_output(&output).expect("parseable output");
            assert!(response.body.is_empty());
        }
        other => panic!("expected Complete, got {:?}", other),
    }
}

#[test]
fn test_status_header_is_honored() {
    let dir = script_dir("status");
    let script = write_script(
        &dir,
        "redirect.sh",
        "printf 'Status: 302 Found\\r\\nLocation: /other\\r\\n\\r\\n'\n",
    );

    match run(&script, b"", 5000) {
        CgiOutcome::Complete(output) => {
            let response = cgi::parse_output(&output).expect("parseable output");
            assert_eq!(response.status, 302);
            assert_eq!(response.headers.get("Location"), Some("/other"));
        }
        other => panic!("expected Complete, got {:?}", other),
    }
}

#[test]
fn test_hung_script_is_killed_on_deadline() {
    let dir = script_dir("hang");
    let script = write_script(&dir, "hang.sh", "sleep 30\n");

    match run(&script, b"", 400) {
        CgiOutcome::TimedOut(output) => assert!(output.is_empty()),
        other => panic!("expected TimedOut, got {:?}", other),
    }
}

#[test]
fn test_nonzero_exit_is_a_failure() {
    let dir = script_dir("failing");
    let script = write_script(&dir, "fail.sh", "exit 3\n");

    match run(&script, b"", 5000) {
        CgiOutcome::Failed => {}
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[test]
fn test_script_runs_in_its_own_directory() {
    let dir = script_dir("cwd");
    std::fs::write(dir.join("data.txt"), "sibling file").expect("write data");
    let script = write_script(
        &dir,
        "cwd.sh",
        "printf 'Content-Type: text/plain\\r\\n\\r\\n'\ncat data.txt\n",
    );

    match run(&script, b"", 5000) {
        CgiOutcome::Complete(output) => {
            let response = cgi::parse_output(&output).expect("parseable output");
            assert_eq!(response.body, b"sibling file");
        }
        other => panic!("expected Complete, got {:?}", other),
    }
}
