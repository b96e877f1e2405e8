//! Server-Sent Events framing for streamed responses.
//!
//! Turns the raw HTTP byte stream into the `data:` payload of each event.
//! Payload interpretation is left to the caller.

use std::fmt::Display;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};

/// Split a byte stream into SSE data payloads.
///
/// Events are separated by a blank line. Multiple `data:` lines in one
/// event are joined with `\n`. Events without data (comments, keep-alives)
/// are skipped. Carriage returns are dropped so `\r\n` framing works too.
pub fn data_payloads<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (Box::pin(byte_stream), buffer, false),
        |(mut stream, mut buffer, mut exhausted)| async move {
            loop {
                if let Some(event) = take_event(&mut buffer) {
                    match parse_event(&event) {
                        Ok(Some(payload)) => {
                            return Some((Ok(payload), (stream, buffer, exhausted)));
                        }
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (stream, buffer, exhausted))),
                    }
                }

                if exhausted {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(Error::transport(format!("error in HTTP stream: {e}"))),
                            (stream, buffer, exhausted),
                        ));
                    }
                    None => {
                        // Flush a trailing event that was not followed by a blank line
                        exhausted = true;
                        if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                            buffer.extend_from_slice(b"\n\n");
                        } else {
                            buffer.clear();
                        }
                    }
                }
            }
        },
    )
}

/// Remove and return the first complete event from the buffer.
fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event = buffer[..end].to_vec();
    buffer.drain(..end + 2);
    Some(event)
}

fn parse_event(event: &[u8]) -> Result<Option<String>> {
    let text = std::str::from_utf8(event)
        .map_err(|e| Error::transport(format!("invalid UTF-8 in stream: {e}")))?;

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data.is_empty() {
        Ok(None)
    } else {
        Ok(Some(data.join("\n")))
    }
}
