//! Session integration tests
//!
//! Runs the tether binary against a local listener standing in for the
//! remote operator.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;

const SESSION_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

fn tether() -> Command {
    Command::cargo_bin("tether")
        .expect("Failed to locate tether binary - ensure it's built before running tests")
}

/// Start tether against `listener` and accept its connection.
fn start_session(listener: &TcpListener) -> (Child, TcpStream) {
    let port = listener.local_addr().unwrap().port();
    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("tether"))
        .args(["127.0.0.1", &port.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    listener.set_nonblocking(true).unwrap();
    let deadline = Instant::now() + SESSION_TIMEOUT;
    let stream = loop {
        match listener.accept() {
            Ok((stream, _)) => break stream,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    panic!("tether never connected");
                }
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("accept failed: {}", e),
        }
    };
    stream.set_nonblocking(false).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    (child, stream)
}

/// Read from `stream` until `marker` shows up. Returns everything read.
fn read_until(stream: &mut TcpStream, marker: &str) -> String {
    let deadline = Instant::now() + SESSION_TIMEOUT;
    let mut seen = Vec::new();
    let mut buf = [0u8; 4096];
    while !String::from_utf8_lossy(&seen).contains(marker) {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {:?}, got {:?}",
            marker,
            String::from_utf8_lossy(&seen)
        );
        match stream.read(&mut buf) {
            Ok(0) => panic!(
                "connection closed before {:?}, got {:?}",
                marker,
                String::from_utf8_lossy(&seen)
            ),
            Ok(n) => seen.extend_from_slice(&buf[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => panic!("read failed: {}", e),
        }
    }
    String::from_utf8_lossy(&seen).into_owned()
}

/// Read until the peer closes the connection.
fn read_to_close(stream: &mut TcpStream) {
    let deadline = Instant::now() + SESSION_TIMEOUT;
    let mut buf = [0u8; 4096];
    loop {
        assert!(Instant::now() < deadline, "connection was never closed");
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return,
            Err(e) => panic!("read failed: {}", e),
        }
    }
}

fn wait_for_exit(child: &mut Child) -> ExitStatus {
    let deadline = Instant::now() + EXIT_TIMEOUT;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("tether did not exit");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_no_arguments_prints_usage() {
    tether()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_too_many_arguments() {
    tether()
        .args(["127.0.0.1", "4444", "extra"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_zero_rows_rejected_with_message() {
    tether()
        .args(["--rows", "0", "127.0.0.1", "4444"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--rows"));
}

#[test]
fn test_empty_term_rejected_with_message() {
    tether()
        .args(["--term", "", "127.0.0.1", "4444"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--term"));
}

#[test]
fn test_help() {
    tether()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("interactive shell"));
}

#[test]
fn test_refused_endpoint_exits_silently() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    tether()
        .args(["127.0.0.1", &port.to_string()])
        .timeout(EXIT_TIMEOUT)
        .assert()
        .code(1)
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_invalid_address_exits_silently() {
    tether()
        .args(["999.1.1.1", "4444"])
        .assert()
        .code(1)
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_refused_endpoint_is_logged_when_enabled() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    tether()
        .args(["--log-level", "error", "127.0.0.1", &port.to_string()])
        .timeout(EXIT_TIMEOUT)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("refused"));
}

#[test]
fn test_command_round_trip_then_remote_close() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (mut child, mut stream) = start_session(&listener);

    stream.write_all(b"echo tether-$((40+2))\n").unwrap();
    read_until(&mut stream, "tether-42");

    drop(stream);
    assert!(wait_for_exit(&mut child).success());
}

#[test]
fn test_shell_exit_closes_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (mut child, mut stream) = start_session(&listener);

    stream.write_all(b"exit\n").unwrap();
    read_to_close(&mut stream);

    assert!(wait_for_exit(&mut child).success());
}

#[test]
fn test_large_output_arrives_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (mut child, mut stream) = start_session(&listener);

    stream
        .write_all(b"seq 1 5000; echo done-$((1+1))\n")
        .unwrap();
    let output = read_until(&mut stream, "done-2");

    let expected: String = (1..=5000).map(|i| format!("{}\r\n", i)).collect();
    assert!(expected.len() > 4096);
    assert!(
        output.contains(&expected),
        "sequence was not delivered intact"
    );

    drop(stream);
    assert!(wait_for_exit(&mut child).success());
}
