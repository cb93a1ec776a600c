//! End-to-end tests that drive the compiled binary directly, the way a
//! user would invoke it: stdin in, stdout out.

use std::{
    io::{Read, Write},
    net::{Ipv4Addr, TcpListener},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bannerscan"))
}

/// Runs the binary with `args`, feeds `stdin` then closes it, and waits
/// (with a hard deadline) for it to exit.
fn run(args: &[&str], stdin: &str, deadline: Duration) -> (String, Duration) {
    let mut child = bin()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn bannerscan");

    child.stdin.take().unwrap().write_all(stdin.as_bytes()).expect("failed to write stdin");

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("failed to poll child") {
            let mut out = String::new();
            child.stdout.take().unwrap().read_to_string(&mut out).expect("failed to read stdout");
            assert!(status.success(), "bannerscan exited with {status}");
            return (out, start.elapsed());
        }
        assert!(start.elapsed() < deadline, "bannerscan did not exit within {deadline:?}");
        thread::sleep(Duration::from_millis(20));
    }
}

fn spawn_echoing_listener(port: u16, bind_ip: Ipv4Addr, banner: &'static [u8]) -> thread::JoinHandle<()> {
    let listener = TcpListener::bind((bind_ip, port)).expect("failed to bind test listener");
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = stream.write_all(banner);
        }
    })
}

fn spawn_silent_listener(port: u16, bind_ip: Ipv4Addr) -> thread::JoinHandle<()> {
    let listener = TcpListener::bind((bind_ip, port)).expect("failed to bind test listener");
    thread::spawn(move || {
        // Accept and then do nothing: exercises the read-timeout path.
        let _ = listener.accept();
        thread::sleep(Duration::from_secs(5));
    })
}

#[test]
fn empty_input_produces_no_output_and_exits() {
    let (out, _) = run(&["--port", "80"], "", Duration::from_secs(5));
    assert_eq!(out, "");
}

#[test]
fn matching_banner_is_reported_with_body() {
    let port = 23101;
    let _listener = spawn_echoing_listener(port, Ipv4Addr::LOCALHOST, b"SSH-2.0-OpenSSH\r\n");

    let (out, _) = run(
        &["--port", &port.to_string(), "--format", "ip-and-body"],
        "127.0.0.1\n",
        Duration::from_secs(5),
    );
    assert_eq!(out, "127.0.0.1 SSH-2.0-OpenSSH\r\n\n");
}

#[test]
fn search_string_filters_out_non_matching_banners() {
    let port = 23102;
    let _listener = spawn_echoing_listener(port, Ipv4Addr::LOCALHOST, b"220 smtp ready\r\n");

    let (out, _) = run(
        &["--port", &port.to_string(), "--search-string", "FTP"],
        "127.0.0.1\n",
        Duration::from_secs(5),
    );
    assert_eq!(out, "", "banner without the search string should not be reported");
}

#[test]
fn search_string_match_is_reported() {
    let port = 23103;
    let _listener = spawn_echoing_listener(port, Ipv4Addr::LOCALHOST, b"220 FTP ready\r\n");

    let (out, _) = run(&["--port", &port.to_string(), "--search-string", "FTP"], "127.0.0.1\n", Duration::from_secs(5));
    assert_eq!(out, "127.0.0.1 220 FTP ready\r\n\n", "default format is ip_and_body");
}

#[test]
fn connect_timeout_bounds_total_runtime() {
    // TEST-NET-1 (RFC 5737): guaranteed not to have a real listener, and
    // most sandboxes either silently drop it or refuse quickly. Either way
    // the run must finish within connect_timeout plus a little slack, never
    // hang.
    let (out, elapsed) =
        run(&["--port", "80", "--conn-timeout", "1"], "192.0.2.1\n", Duration::from_secs(6));
    assert_eq!(out, "");
    assert!(elapsed < Duration::from_secs(5), "connect timeout should bound total runtime, took {elapsed:?}");
}

#[test]
fn read_timeout_bounds_total_runtime_after_connecting() {
    let port = 23104;
    let _listener = spawn_silent_listener(port, Ipv4Addr::LOCALHOST);

    let (out, elapsed) =
        run(&["--port", &port.to_string(), "--read-timeout", "1"], "127.0.0.1\n", Duration::from_secs(6));
    assert_eq!(out, "");
    assert!(elapsed < Duration::from_secs(5), "read timeout should bound total runtime, took {elapsed:?}");
}

#[test]
fn bounded_concurrency_still_completes_every_target() {
    // All targets share one port, so each gets its own loopback address
    // (127.0.0.2..=127.0.0.N) to keep the scan realistic: distinct hosts
    // answering concurrently, with --concurrent capping how many of them
    // are ever in flight together.
    const TARGETS: u8 = 16;
    let port = 23105;

    let mut stdin = String::new();
    let mut handles = Vec::new();
    for i in 2..=(1 + TARGETS) {
        let ip = Ipv4Addr::new(127, 0, 0, i);
        handles.push(spawn_echoing_listener(port, ip, b"OK\r\n"));
        stdin.push_str(&ip.to_string());
        stdin.push('\n');
    }

    let (out, _) = run(&["--port", &port.to_string(), "--concurrent", "4"], &stdin, Duration::from_secs(10));

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), TARGETS as usize, "every target should have been scanned exactly once");
}
