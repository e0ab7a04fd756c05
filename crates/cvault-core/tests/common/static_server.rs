//! Minimal HTTP/1.1 server for image fetches in integration tests.
//!
//! Serves fixed bodies by path, counts hits per path and can be told to
//! answer a path with an error status.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Default)]
struct State {
    bodies: HashMap<String, Vec<u8>>,
    failing: HashMap<String, u16>,
    hits: HashMap<String, usize>,
}

/// Handle to a running server. Clones share the same state.
#[derive(Clone)]
pub struct StaticServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl StaticServer {
    /// Starts a server in a background thread. Runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    /// Origin without trailing slash, e.g. `http://127.0.0.1:12345`.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn serve(&self, path: &str, body: Vec<u8>) {
        self.state.lock().unwrap().bodies.insert(path.to_string(), body);
    }

    /// Answer `path` with `status` until [`StaticServer::heal`] is called.
    pub fn fail(&self, path: &str, status: u16) {
        self.state.lock().unwrap().failing.insert(path.to_string(), status);
    }

    pub fn heal(&self, path: &str) {
        self.state.lock().unwrap().failing.remove(path);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.lock().unwrap().hits.values().sum()
    }
}

fn handle(mut stream: std::net::TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/").split('?').next().unwrap_or("/").to_string();
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let (status, body) = {
        let mut st = state.lock().unwrap();
        *st.hits.entry(path.clone()).or_insert(0) += 1;
        if let Some(code) = st.failing.get(&path) {
            (format!("{} Error", code), Vec::new())
        } else if let Some(body) = st.bodies.get(&path) {
            ("200 OK".to_string(), body.clone())
        } else {
            ("404 Not Found".to_string(), Vec::new())
        }
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
}
