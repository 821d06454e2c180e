use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mcp_server::JsonRpcHandler;

/// Line-delimited JSON-RPC over stdin/stdout. Stdout carries protocol
/// frames only; logs go to stderr.
pub struct StdioTransport {
    handler: JsonRpcHandler,
}

impl StdioTransport {
    pub fn new(handler: JsonRpcHandler) -> Self {
        Self { handler }
    }

    pub async fn run(&self) -> io::Result<()> {
        info!("Starting stdio transport");
        let mut stdout = tokio::io::stdout();
        self.serve(BufReader::new(tokio::io::stdin()), &mut stdout)
            .await
    }

    /// Serve until `reader` reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut reader = reader;
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("EOF reached on input");
                        break;
                    }
                    Ok(_) => {
                        if !line.trim().is_empty() && tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error reading input: {}", e);
                        break;
                    }
                }
            }
        });

        while let Some(line) = rx.recv().await {
            if let Some(response) = self.process_line(&line).await {
                write_response(writer, &response).await?;
            }
        }

        Ok(())
    }

    async fn process_line(&self, line: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handler.handle_request(request).await,
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                Some(serde_json::json!({
                    "jsonrpc": "2.0",
                    "error": {
                        "code": -32700,
                        "message": "Parse error"
                    },
                    "id": null
                }))
            }
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) -> io::Result<()> {
    let response_str = serde_json::to_string(response)?;
    writer.write_all(response_str.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    debug!(bytes = response_str.len(), "Sent response");
    Ok(())
}
