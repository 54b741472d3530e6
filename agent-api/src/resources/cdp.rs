//! Minimal Chrome DevTools Protocol client.
//!
//! Each call opens the page's debugger WebSocket, sends one `Runtime.evaluate`
//! command and waits for the reply with the matching id. Events Chrome pushes
//! in between are skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use super::browser::BrowserError;

const CDP_TIMEOUT: Duration = Duration::from_secs(10);

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Evaluate `expression` in the page behind `ws_url` and return its value.
pub async fn evaluate(ws_url: &str, expression: &str) -> Result<Value, BrowserError> {
    tokio::time::timeout(CDP_TIMEOUT, evaluate_once(ws_url, expression))
        .await
        .map_err(|_| {
            BrowserError::Cdp(format!("no reply within {}s", CDP_TIMEOUT.as_secs()))
        })?
}

async fn evaluate_once(ws_url: &str, expression: &str) -> Result<Value, BrowserError> {
    let (mut ws, _) = connect_async(ws_url).await?;
    let id = NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed);
    let command = json!({
        "id": id,
        "method": "Runtime.evaluate",
        "params": {
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        },
    });
    ws.send(Message::Text(command.to_string())).await?;

    while let Some(message) = ws.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply: Value = serde_json::from_str(&text)
            .map_err(|e| BrowserError::Cdp(format!("malformed reply: {e}")))?;
        if reply.get("id").and_then(Value::as_u64) != Some(id) {
            continue;
        }
        if let Err(e) = ws.close(None).await {
            debug!(error = %e, "devtools socket close failed");
        }
        return evaluation_value(&reply);
    }
    Err(BrowserError::Cdp("connection closed before reply".to_string()))
}

/// Unwrap a `Runtime.evaluate` reply into the returned value.
fn evaluation_value(reply: &Value) -> Result<Value, BrowserError> {
    if let Some(error) = reply.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown protocol error");
        return Err(BrowserError::Cdp(message.to_string()));
    }
    let result = reply.get("result").unwrap_or(&Value::Null);
    if let Some(details) = result.get("exceptionDetails") {
        let description = details
            .pointer("/exception/description")
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("script threw");
        return Err(BrowserError::Cdp(format!("script error: {description}")));
    }
    Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
}
