//! Local stand-in for the Bot API used by tests.
//!
//! Answers every request with the JSON chosen by a responder function and
//! records `(method, body)` pairs for assertions.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Picks `(status, json body)` for a Bot API method name.
pub type Responder = fn(&str) -> (u16, String);

type Requests = Arc<Mutex<Vec<(String, Value)>>>;

/// Default responder: every call succeeds.
pub fn ok_responder(method: &str) -> (u16, String) {
    match method {
        "getMe" => (
            200,
            r#"{"ok":true,"result":{"id":1,"is_bot":true,"first_name":"Agency","username":"agency_bot"}}"#
                .to_owned(),
        ),
        "getUpdates" => (200, r#"{"ok":true,"result":[]}"#.to_owned()),
        "sendMessage" => (200, r#"{"ok":true,"result":{"message_id":1,"chat":{"id":1}}}"#.to_owned()),
        _ => (200, r#"{"ok":true,"result":true}"#.to_owned()),
    }
}

/// Responder that rejects the token like Telegram does.
pub fn unauthorized_responder(_method: &str) -> (u16, String) {
    (
        401,
        r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#.to_owned(),
    )
}

pub struct FakeBotServer {
    /// Base URL to pass to `BotApi::with_base`.
    pub base: String,
    requests: Requests,
}

impl FakeBotServer {
    pub async fn start(respond: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests: Requests = Arc::default();

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve(stream, respond, recorded).await;
                });
            }
        });

        Self { base, requests }
    }

    /// Recorded calls, oldest first.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    /// Bodies of the calls to `method`.
    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body)
            .collect()
    }
}

async fn serve(mut stream: TcpStream, respond: Responder, requests: Requests) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let path = head.split_whitespace().nth(1).unwrap_or_default().to_owned();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let body: Value =
            serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap_or(Value::Null);
        buf.drain(..header_end + content_length);

        let method = path.rsplit('/').next().unwrap_or_default().to_owned();
        let (status, json) = respond(&method);
        requests.lock().unwrap().push((method, body));

        let response = format!(
            "HTTP/1.1 {status} Fake\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{json}",
            json.len()
        );
        stream.write_all(response.as_bytes()).await?;
    }
}
