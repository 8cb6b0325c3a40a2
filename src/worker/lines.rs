use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;

use super::{Request, Response, WorkerHandle};

/// Serves the worker protocol as newline-delimited JSON: one request per
/// input line, one response per output line, until `reader` hits EOF.
pub async fn serve_lines<R, W>(handle: &WorkerHandle, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => handle.request(request).await?,
            Err(e) => {
                tracing::warn!("Rejected message: {}", e);
                Response::Error {
                    error: format!("invalid message: {e}"),
                }
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    Ok(())
}
