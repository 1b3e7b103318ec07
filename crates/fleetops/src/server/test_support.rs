//! In-process stand-in for the device-management server's OAuth and classic XML endpoints.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct State {
    next_id: u64,
    // (resource path, id) -> (name, body without <id>)
    records: BTreeMap<(String, u64), (String, String)>,
    requests: Vec<String>,
}

pub struct FakeServer {
    addr: std::net::SocketAddr,
    state: Arc<Mutex<State>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeServer {
    pub const SECRET: &'static str = "s3cret";

    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let state = Arc::new(Mutex::new(State {
            next_id: 1,
            ..State::default()
        }));
        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, shared).await;
                });
            }
        });
        Self { addr, state, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().expect("state").requests.clone()
    }

    /// Stores a record as if it had been created out of band.
    pub fn seed(&self, path: &str, name: &str, body: &str) -> u64 {
        let mut st = self.state.lock().expect("state");
        let id = st.next_id;
        st.next_id += 1;
        st.records
            .insert((path.to_string(), id), (name.to_string(), body.to_string()));
        id
    }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(b) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn element_text(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].replace("&amp;", "&"))
}

fn with_id(body: &str, id: u64) -> String {
    match body.find('>') {
        Some(pos) => format!("{}<id>{id}</id>{}", &body[..=pos], &body[pos + 1..]),
        None => body.to_string(),
    }
}

fn root_of(path: &str) -> &'static str {
    if path == "advancedcomputersearches" {
        "advanced_computer_search"
    } else {
        "computer_extension_attribute"
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<(String, String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
    let mut first = head.lines().next().unwrap_or_default().split_whitespace();
    let method = first.next().unwrap_or_default().to_string();
    let target = first.next().unwrap_or_default().to_string();
    Ok((method, target, body))
}

fn route(state: &Mutex<State>, method: &str, target: &str, body: &str) -> (u16, String) {
    let mut st = state.lock().expect("state");
    st.requests.push(format!("{method} {target}"));
    let parts: Vec<&str> = target.trim_start_matches('/').split('/').collect();
    match (method, parts.as_slice()) {
        ("POST", ["api", "oauth", "token"]) => {
            if body.contains(&format!("client_secret={}", FakeServer::SECRET)) {
                (200, r#"{"access_token":"tok","token_type":"Bearer","expires_in":1199}"#.to_string())
            } else {
                (401, r#"{"error":"invalid_client"}"#.to_string())
            }
        }
        ("GET", ["JSSResource", path, "name", name]) => {
            let name = percent_decode(name);
            let hit = st
                .records
                .iter()
                .find(|((p, _), (n, _))| p.as_str() == *path && *n == name)
                .map(|((_, id), (_, b))| with_id(b, *id));
            match hit {
                Some(b) => (200, b),
                None => (404, "<html>Not Found</html>".to_string()),
            }
        }
        ("POST", ["JSSResource", path, "id", "0"]) => {
            let name = element_text(body, "name").unwrap_or_default();
            let id = st.next_id;
            st.next_id += 1;
            st.records
                .insert((path.to_string(), id), (name, body.to_string()));
            (201, format!("<{root}><id>{id}</id></{root}>", root = root_of(path)))
        }
        ("PUT", ["JSSResource", path, "id", id]) => {
            let Ok(id) = id.parse::<u64>() else {
                return (400, "bad id".to_string());
            };
            let key = (path.to_string(), id);
            if !st.records.contains_key(&key) {
                return (404, "<html>Not Found</html>".to_string());
            }
            let name = element_text(body, "name").unwrap_or_default();
            st.records.insert(key, (name, body.to_string()));
            (201, format!("<{root}><id>{id}</id></{root}>", root = root_of(path)))
        }
        _ => (404, "<html>Not Found</html>".to_string()),
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
    let (method, target, body) = read_request(&mut stream).await?;
    let (status, payload) = route(&state, &method, &target, &body);
    let reason = match status {
        200 => "OK",
        201 => "Created",
        401 => "Unauthorized",
        _ => "Not Found",
    };
    let content_type = if payload.starts_with('{') {
        "application/json"
    } else {
        "text/xml"
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
