//! JSON-RPC/LSP stdio framing.
//!
//! Every message is a JSON value preceded by HTTP-like headers:
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of UTF-8 JSON>
//! ```
//!
//! `Content-Type` is accepted and ignored. Header names are matched case-insensitively.

use serde_json::Value;
use std::io::{self, BufRead, Write};

/// Upper bound on a single message body. Larger frames indicate a corrupted stream.
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Write one framed message and flush.
pub fn write_message<W: Write>(writer: &mut W, value: &Value) -> io::Result<()> {
    let body = serde_json::to_vec(value).map_err(io::Error::other)?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}

/// Read one framed message.
///
/// Returns `Ok(None)` on a clean EOF between messages.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<Value>> {
    let Some(len) = read_headers(reader)? else {
        return Ok(None);
    };

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn read_headers<R: BufRead>(reader: &mut R) -> io::Result<Option<usize>> {
    let mut content_length = None;
    let mut saw_header = false;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            if saw_header {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside message headers",
                ));
            }
            return Ok(None);
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            if !saw_header {
                // Tolerate stray blank lines between frames.
                continue;
            }
            break;
        }
        saw_header = true;

        let Some((name, value)) = header.split_once(':') else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed header line: {header:?}"),
            ));
        };
        if name.trim().eq_ignore_ascii_case("Content-Length") {
            let len = value.trim().parse::<usize>().map_err(|err| {
                io::Error::new(io::ErrorKind::InvalidData, format!("bad Content-Length: {err}"))
            })?;
            content_length = Some(len);
        }
    }

    match content_length {
        Some(len) if len > MAX_CONTENT_LENGTH => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message of {len} bytes exceeds limit"),
        )),
        Some(len) => Ok(Some(len)),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing Content-Length header",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn frames_can_be_read_back_in_sequence() {
        let mut buf = Vec::new();
        write_message(&mut buf, &json!({"jsonrpc": "2.0", "method": "initialized"})).unwrap();
        write_message(&mut buf, &json!({"jsonrpc": "2.0", "id": 1, "result": "héllo"})).unwrap();

        let mut reader = Cursor::new(buf);
        let first = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(first["method"], "initialized");
        let second = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(second["result"], "héllo");
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn content_type_and_header_case_are_tolerated() {
        let body = r#"{"id":7}"#;
        let raw = format!(
            "content-length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            body.len(),
            body
        );
        let value = read_message(&mut Cursor::new(raw)).unwrap().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn missing_length_is_invalid_data() {
        let raw = "Content-Type: x\r\n\r\n{}";
        let err = read_message(&mut Cursor::new(raw)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_headers_are_unexpected_eof() {
        let err = read_message(&mut Cursor::new("Content-Length: 10\r\n")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
