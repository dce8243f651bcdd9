use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/stockd.sock";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum AdminRequest {
    Status,
    /// Re-read subscriber preferences from the store.
    Reload,
    /// Human-readable report of the latest snapshot.
    Stock,
    SetItems { address: String, items: String },
    MyItems { address: String },
    ClearItems { address: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LaneStatus {
    pub lane: String,
    pub state: String,
    pub next_fire_in_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MonitorStatus {
    pub run_id: String,
    pub source: String,
    pub policy: String,
    pub subscribers: usize,
    pub last_updated_at: Option<String>,
    pub lanes: Vec<LaneStatus>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum AdminResponse {
    Status(MonitorStatus),
    Items(Vec<String>),
    Text(String),
    Ack,
    Error(String),
}

pub async fn run_server<F, Fut>(socket_path: &str, handler: F) -> Result<()>
where
    F: Fn(AdminRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AdminResponse>> + Send + 'static,
{
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    let handler = Arc::new(handler);
    info!(socket = socket_path, "admin ipc listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(stream, handler).await {
                warn!(error = ?err, "admin ipc handler error");
            }
        });
    }
}

async fn handle_stream<F, Fut>(stream: UnixStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(AdminRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AdminResponse>> + Send + 'static,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    let n = reader.read_line(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }
    let resp = match serde_json::from_str::<AdminRequest>(buf.trim()) {
        Ok(req) => {
            debug!(request = ?req, "admin request");
            handler(req)
                .await
                .unwrap_or_else(|err| AdminResponse::Error(err.to_string()))
        }
        Err(err) => AdminResponse::Error(format!("malformed request: {err}")),
    };
    let line = serde_json::to_string(&resp)? + "\n";
    write_half.write_all(line.as_bytes()).await?;
    Ok(())
}

pub async fn send_request(socket_path: &str, req: &AdminRequest) -> Result<AdminResponse> {
    let mut stream = UnixStream::connect(socket_path).await?;
    let line = serde_json::to_string(req)? + "\n";
    stream.write_all(line.as_bytes()).await?;
    let (read_half, _) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    let _ = reader.read_line(&mut buf).await?;
    let resp: AdminResponse = serde_json::from_str(buf.trim())?;
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_adjacent_tagging() {
        let req = AdminRequest::SetItems {
            address: "a@g.us".into(),
            items: "carrot, seed:all".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "SetItems",
                "payload": {"address": "a@g.us", "items": "carrot, seed:all"}
            })
        );

        let status: AdminRequest = serde_json::from_str(r#"{"type":"Status"}"#).unwrap();
        assert_eq!(status, AdminRequest::Status);
    }
}
