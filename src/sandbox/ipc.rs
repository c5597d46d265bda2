//! Parent/worker protocol.
//!
//! Frames are length-delimited JSON: a 4-byte big-endian length prefix
//! followed by the payload. Each execution exchanges exactly one
//! [`WorkerRequest`] and at most one [`WorkerResponse`].

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::sandbox::config::AllowList;

/// Default maximum frame size: 64 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Sent from the parent to a fresh worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerRequest {
    /// Run an analyzed program.
    Execute {
        /// Source text that passed static analysis. The worker analyzes it
        /// again before running it.
        source: String,
        /// Allow-list the runtime binds builtins and modules from.
        allow_list: AllowList,
        /// Heap budget armed in the worker's allocator.
        memory_limit_bytes: u64,
        /// Cap on captured `print` output.
        max_output_bytes: usize,
    },
}

/// Sent from the worker when the program finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    Completed {
        captured_output: String,
        result_value: Option<String>,
    },
    RuntimeFailure {
        error_type: String,
        message: String,
    },
    /// The worker's heap grew past its memory budget.
    MemoryExceeded,
}

/// Encode one complete frame, length prefix included.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, std::io::Error> {
    let payload = serde_json::to_vec(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "IPC payload too large: {} bytes (max {} bytes)",
                payload.len(),
                u32::MAX
            ),
        )
    })?;
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write one frame.
pub async fn write_message<T: Serialize, W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &T,
) -> Result<(), std::io::Error> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame using [`DEFAULT_MAX_MESSAGE_SIZE`].
///
/// Returns `None` at a clean EOF.
pub async fn read_message<T: for<'de> Deserialize<'de>, R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<T>, std::io::Error> {
    read_message_with_limit(reader, DEFAULT_MAX_MESSAGE_SIZE).await
}

/// Read one frame, rejecting payloads above `max_size` bytes.
///
/// Returns `None` at a clean EOF. Oversized or undecodable frames are
/// `InvalidData` errors.
pub async fn read_message_with_limit<T: for<'de> Deserialize<'de>, R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<T>, std::io::Error> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("IPC message too large: {len} bytes (limit: {max_size} bytes)"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let msg: T = serde_json::from_slice(&payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_execute_request_survives_framing() {
        let msg = WorkerRequest::Execute {
            source: "result = [x * 2 for x in range(3)]\n".to_owned(),
            allow_list: AllowList::default(),
            memory_limit_bytes: 64 * 1024 * 1024,
            max_output_bytes: 1024,
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).await.unwrap();

        let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(declared, buf.len() - 4);

        let mut cursor = Cursor::new(buf);
        let decoded: WorkerRequest = read_message(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_response_is_tagged() {
        let msg = WorkerResponse::RuntimeFailure {
            error_type: "ZeroDivisionError".into(),
            message: "division by zero".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "RuntimeFailure");

        let mut buf = Vec::new();
        write_message(&mut buf, &WorkerResponse::MemoryExceeded).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded: Option<WorkerResponse> = read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, Some(WorkerResponse::MemoryExceeded));
    }

    #[tokio::test]
    async fn test_encoded_frame_matches_async_writer() {
        let frame = encode_frame(&WorkerResponse::MemoryExceeded).unwrap();
        let mut written = Vec::new();
        write_message(&mut written, &WorkerResponse::MemoryExceeded).await.unwrap();
        assert_eq!(frame, written);
    }

    #[tokio::test]
    async fn test_eof_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let msg: Option<WorkerResponse> = read_message(&mut cursor).await.unwrap();
        assert!(msg.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(1024u32).to_be_bytes());
        buf.extend_from_slice(&[b'x'; 1024]);
        let mut cursor = Cursor::new(buf);
        let err = read_message_with_limit::<WorkerResponse, _>(&mut cursor, 512)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_garbage_payload_is_invalid_data() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(3u32).to_be_bytes());
        buf.extend_from_slice(b"{{{");
        let mut cursor = Cursor::new(buf);
        let err = read_message::<WorkerResponse, _>(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
