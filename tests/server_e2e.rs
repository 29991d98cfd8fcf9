//! End-to-end tests: a real server on a loopback port, driven by plain
//! blocking std sockets from the test thread.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use mio::Poll;

use webserv::config::{cascade, Config};
use webserv::server::Server;

fn start_server(config_text: &str) {
    let mut config = Config::from_str(config_text).expect("config should parse");
    cascade::apply(&mut config);

    thread::spawn(move || {
        let poll = Poll::new().expect("poll");
        let mut server = Server::new(config, &poll).expect("server should bind");
        let _ = server.run(poll);
    });

    // give the listener time to come up
    thread::sleep(Duration::from_millis(300));
}

fn temp_root(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("webserv_e2e_{}", tag));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create temp root");
    dir
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to server");
    stream
        .set_read_timeout(Some(Duration::from_secs(3)))
        .expect("read timeout");
    stream
}

/// Read one full response: headers, then as many body bytes as
/// Content-Length announces.
fn read_response(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if response_complete(&data) {
            break;
        }
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

fn response_complete(data: &[u8]) -> bool {
    let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&data[..header_end]);
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    data.len() >= header_end + 4 + content_length
}

#[test]
fn test_get_static_file() {
    let root = temp_root("static");
    std::fs::write(root.join("index.html"), "Hello, world!").unwrap();

    start_server(&format!(
        "http {{ server {{ listen 18080; root {}; location / {{ }} }} }}",
        root.display()
    ));

    let mut stream = connect(18080);
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 200 OK"), "got: {}", response);
    assert!(response.contains("Content-Length: 13"), "got: {}", response);
    assert!(response.contains("Content-Type: text/html"), "got: {}", response);
    assert!(response.ends_with("Hello, world!"), "got: {}", response);
}

#[test]
fn test_chunked_upload_creates_file() {
    let root = temp_root("chunked_upload");

    start_server(&format!(
        "http {{ server {{ listen 18081; root {}; location /u {{ }} }} }}",
        root.display()
    ));

    let mut stream = connect(18081);
    stream
        .write_all(b"POST /u HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n")
        .unwrap();
    // dribble the chunks so the server sees partial frames
    stream.write_all(b"7\r\nMozilla\r\n").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"9\r\nDeveloper\r\n").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"7\r\nNetwork\r\n0\r\n\r\n").unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 201"), "got: {}", response);
    assert!(response.contains("Location: "), "got: {}", response);

    let upload_dir = root.join("u");
    let mut found = false;
    for entry in std::fs::read_dir(&upload_dir).expect("upload dir exists") {
        let path = entry.unwrap().path();
        if std::fs::read(&path).unwrap() == b"MozillaDeveloperNetwork" {
            found = true;
        }
    }
    assert!(found, "decoded chunked body not found on disk");
}

#[test]
fn test_method_not_allowed_closes_connection() {
    let root = temp_root("limit");

    start_server(&format!(
        "http {{ server {{ listen 18082; root {};
            location / {{ limit_except GET HEAD {{ deny all; }} }}
        }} }}",
        root.display()
    ));

    let mut stream = connect(18082);
    stream
        .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nhi")
        .unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 405"), "got: {}", response);
    assert!(response.contains("Connection: close"), "got: {}", response);

    // server closes after the write; the next read reports EOF
    let mut rest = Vec::new();
    let eof = stream.read_to_end(&mut rest).map(|n| n == 0).unwrap_or(true);
    assert!(eof, "connection should be closed after 405");
}

#[test]
fn test_directory_without_slash_redirects() {
    let root = temp_root("redirect");
    std::fs::create_dir_all(root.join("dir")).unwrap();

    start_server(&format!(
        "http {{ server {{ listen 18083; root {}; location / {{ }} }} }}",
        root.display()
    ));

    let mut stream = connect(18083);
    stream
        .write_all(b"GET /dir HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 301"), "got: {}", response);
    assert!(response.contains("Location: /dir/"), "got: {}", response);
}

#[test]
fn test_autoindex_lists_entries() {
    let root = temp_root("autoindex");
    std::fs::create_dir_all(root.join("files/sub")).unwrap();
    std::fs::write(root.join("files/a.txt"), "aaa").unwrap();

    start_server(&format!(
        "http {{ server {{ listen 18084; root {};
            location /files/ {{ autoindex on; }}
        }} }}",
        root.display()
    ));

    let mut stream = connect(18084);
    stream
        .write_all(b"GET /files/ HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
    assert!(response.contains("a.txt"), "got: {}", response);
    assert!(response.contains("sub/"), "got: {}", response);
}

#[test]
fn test_body_over_limit_gets_413() {
    let root = temp_root("toolarge");

    start_server(&format!(
        "http {{ server {{ listen 18085; root {};
            client_max_body_size 1K;
            location / {{ }}
        }} }}",
        root.display()
    ));

    let mut stream = connect(18085);
    // announce two megabytes; the response must come back without them
    stream
        .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 2097152\r\n\r\n")
        .unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 413"), "got: {}", response);
}

#[test]
fn test_keep_alive_serves_two_requests() {
    let root = temp_root("keepalive");
    std::fs::write(root.join("index.html"), "hi").unwrap();

    start_server(&format!(
        "http {{ server {{ listen 18086; root {}; location / {{ }} }} }}",
        root.display()
    ));

    let mut stream = connect(18086);
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let first = read_response(&mut stream);
    assert!(first.starts_with("HTTP/1.1 200"), "got: {}", first);

    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let second = read_response(&mut stream);
    assert!(second.starts_with("HTTP/1.1 200"), "got: {}", second);
}

#[test]
fn test_delete_removes_file() {
    let root = temp_root("delete");
    std::fs::write(root.join("victim.txt"), "bye").unwrap();

    start_server(&format!(
        "http {{ server {{ listen 18087; root {}; location / {{ }} }} }}",
        root.display()
    ));

    let mut stream = connect(18087);
    stream
        .write_all(b"DELETE /victim.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
    assert!(!root.join("victim.txt").exists());

    // deleting a directory is forbidden
    std::fs::create_dir_all(root.join("dir")).unwrap();
    let mut stream = connect(18087);
    stream
        .write_all(b"DELETE /dir HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 403"), "got: {}", response);
}

#[test]
fn test_cgi_status_redirect() {
    let root = temp_root("cgi");
    std::fs::create_dir_all(root.join("cgi-bin")).unwrap();
    std::fs::write(
        root.join("cgi-bin/redirect.sh"),
        "printf 'Status: 302 Found\\r\\nLocation: /other\\r\\n\\r\\n'\n",
    )
    .unwrap();

    start_server(&format!(
        "http {{ server {{ listen 18088; root {};
            location /cgi-bin/ {{ cgi_pass /bin/sh; }}
        }} }}",
        root.display()
    ));

    let mut stream = connect(18088);
    stream
        .write_all(b"GET /cgi-bin/redirect.sh HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 302"), "got: {}", response);
    assert!(response.contains("Location: /other"), "got: {}", response);
}

#[test]
fn test_cgi_echoes_posted_body() {
    let root = temp_root("cgi_echo");
    std::fs::create_dir_all(root.join("cgi-bin")).unwrap();
    std::fs::write(
        root.join("cgi-bin/echo.sh"),
        "printf 'Content-Type: text/plain\\r\\n\\r\\n'\ncat\n",
    )
    .unwrap();

    start_server(&format!(
        "http {{ server {{ listen 18089; root {};
            location /cgi-bin/ {{ cgi_pass /bin/sh; }}
        }} }}",
        root.display()
    ));

    let mut stream = connect(18089);
    stream
        .write_all(b"POST /cgi-bin/echo.sh HTTP/1.1\r\nHost: x\r\nContent-Length: 9\r\n\r\ncgi bytes")
        .unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
    assert!(response.ends_with("cgi bytes"), "got: {}", response);
}

#[test]
fn test_virtual_host_selection() {
    let root_a = temp_root("vhost_a");
    let root_b = temp_root("vhost_b");
    std::fs::write(root_a.join("index.html"), "site A").unwrap();
    std::fs::write(root_b.join("index.html"), "site B").unwrap();

    start_server(&format!(
        "http {{
            server {{ listen 18090 default_server; server_name a.test; root {}; location / {{ }} }}
            server {{ listen 18090; server_name b.test; root {}; location / {{ }} }}
        }}",
        root_a.display(),
        root_b.display()
    ));

    let mut stream = connect(18090);
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: b.test\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert!(response.ends_with("site B"), "got: {}", response);

    // unknown host falls back to the default server
    let mut stream = connect(18090);
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: nobody.test\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert!(response.ends_with("site A"), "got: {}", response);
}
