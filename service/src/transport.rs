//! Line-delimited JSON transport.
//!
//! Requests on one stream are handled strictly in order: a response line is
//! written before the next request line is read.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::service::LedgerService;

/// One unit read from the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete request line, without its terminator.
    Line(String),
    /// A line longer than the limit. Its bytes were discarded as they arrived.
    Oversized,
    /// The input is exhausted.
    Closed,
}

/// Reads newline-terminated lines, never buffering more than `max_bytes` of one line.
pub struct LineReader<R> {
    inner: BufReader<R>,
    max_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap `inner`, rejecting lines longer than `max_bytes`.
    pub fn new(inner: R, max_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_bytes,
            buf: Vec::new(),
        }
    }

    /// Read the next frame.
    pub async fn next_frame(&mut self) -> io::Result<Frame> {
        self.buf.clear();
        let mut oversized = false;

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(if oversized {
                    Frame::Oversized
                } else if self.buf.is_empty() {
                    Frame::Closed
                } else {
                    self.take_line()
                });
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let line_bytes = newline.unwrap_or(available.len());
            let used = newline.map_or(available.len(), |i| i + 1);

            if !oversized {
                if self.buf.len() + line_bytes > self.max_bytes {
                    oversized = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(&available[..line_bytes]);
                }
            }
            self.inner.consume(used);

            if newline.is_some() {
                return Ok(if oversized {
                    Frame::Oversized
                } else {
                    self.take_line()
                });
            }
        }
    }

    fn take_line(&mut self) -> Frame {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Frame::Line(line)
    }
}

/// Answer every request line from `input` on `output`, in order.
///
/// Returns the number of requests answered once `input` is closed.
pub async fn serve<R, W>(service: &LedgerService, input: R, mut output: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = LineReader::new(input, service.config().max_request_bytes);
    let mut answered = 0;

    loop {
        let response = match reader.next_frame().await? {
            Frame::Closed => break,
            Frame::Line(line) if line.trim().is_empty() => continue,
            Frame::Line(line) => service.handle_line(&line).await,
            Frame::Oversized => {
                warn!(
                    limit = service.config().max_request_bytes,
                    "Discarded oversized request line"
                );
                service.oversized_line()
            }
        };

        output.write_all(response.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        answered += 1;
    }

    debug!(answered, "Input closed");
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use serde_json::Value;

    fn replies(output: &[u8]) -> Vec<Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_lines_run_in_order() {
        let service = LedgerService::new(ServiceConfig::default());
        service.start();

        let input = concat!(
            r#"{"id": 1, "method": "register", "email": "b@x.io", "role": "buyer"}"#,
            "\n",
            r#"{"id": 2, "method": "create_task", "buyer": "b@x.io", "task": {"title": "Follow", "required_workers": 2, "payable_amount": 5, "completion_date": "2026-12-31"}}"#,
            "\r\n\n",
            r#"{"id": 3, "method": "get_account", "email": "b@x.io"}"#,
        );
        let mut output = Vec::new();

        let answered = serve(&service, input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(answered, 3);

        let replies = replies(&output);
        assert_eq!(replies.len(), 3);
        for (i, reply) in replies.iter().enumerate() {
            assert_eq!(reply["id"], i as u64 + 1);
            assert_eq!(reply["ok"], true, "{reply}");
        }
        assert_eq!(replies[2]["result"]["balance"], 40);
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped_not_buffered() {
        let mut config = ServiceConfig::default();
        config.max_request_bytes = 64;
        let service = LedgerService::new(config);
        service.start();

        let mut input = vec![b'x'; 20_000];
        input.push(b'\n');
        input.extend_from_slice(br#"{"id": 7, "method": "totals"}"#);
        input.push(b'\n');
        let mut output = Vec::new();

        serve(&service, input.as_slice(), &mut output).await.unwrap();

        let replies = replies(&output);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], "BAD_REQUEST");
        assert_eq!(replies[1]["id"], 7);
        assert_eq!(replies[1]["ok"], true);
        assert_eq!(service.metrics().snapshot().requests_malformed, 1);
    }

    #[tokio::test]
    async fn test_reader_memory_stays_bounded() {
        let mut input = vec![b'y'; 50_000];
        input.extend_from_slice(b"\nshort\n");
        let mut reader = LineReader::new(input.as_slice(), 64);

        assert_eq!(reader.next_frame().await.unwrap(), Frame::Oversized);
        assert!(reader.buf.capacity() <= 128);
        assert_eq!(
            reader.next_frame().await.unwrap(),
            Frame::Line("short".to_string())
        );
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Closed);
    }
}
