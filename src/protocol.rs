//! Wire protocol.
//!
//! One request per TCP connection. The client writes a single JSON object and
//! waits; the server answers with plain UTF-8 text and closes the connection.
//!
//! | `action`       | Fields                       |
//! |----------------|------------------------------|
//! | `add`          | `program`                    |
//! | `get_output`   | `program`                    |
//! | `stop`         | `program`                    |
//! | `resume`       | `program`                    |
//! | `set_interval` | `interval` (string or number)|
//!
//! Clients are not required to half-close after writing, so the server stops
//! reading as soon as the bytes received form a complete JSON value.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Response to an action the server does not recognise.
pub const UNKNOWN_COMMAND: &str = "Unknown command.";

/// A decoded control request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Add {
        program: String,
    },
    GetOutput {
        program: String,
    },
    Stop {
        program: String,
    },
    Resume {
        program: String,
    },
    SetInterval {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<Value>,
    },
    /// Any `action` value not listed above.
    #[serde(other, skip_serializing)]
    Unknown,
}

impl Request {
    /// Raw interval text of a `set_interval` request. Numbers are rendered
    /// as-is, a missing value becomes the empty string.
    pub fn interval_text(interval: Option<&Value>) -> String {
        match interval {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Why a request could not be read off the wire.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("connection closed before a request was received")]
    Empty,
    #[error("request exceeds {0} bytes")]
    TooLarge(usize),
    #[error("timed out waiting for request")]
    Timeout,
    #[error("invalid request: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one request from `reader`.
///
/// Stops at end of stream or as soon as the buffered bytes parse as a JSON
/// value, whichever comes first. An `action` that is not recognised decodes
/// to [`Request::Unknown`]; a missing `action` or missing fields are decode
/// errors.
pub async fn read_request<R>(
    reader: &mut R,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Request, ReadError>
where
    R: AsyncRead + Unpin,
{
    let value = tokio::time::timeout(timeout, read_json_value(reader, max_bytes))
        .await
        .map_err(|_| ReadError::Timeout)??;
    Ok(serde_json::from_value(value)?)
}

async fn read_json_value<R>(reader: &mut R, max_bytes: usize) -> Result<Value, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            if buf.iter().all(u8::is_ascii_whitespace) {
                return Err(ReadError::Empty);
            }
            return Ok(serde_json::from_slice(&buf)?);
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.len() > max_bytes {
            return Err(ReadError::TooLarge(max_bytes));
        }
        match serde_json::from_slice::<Value>(&buf) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_eof() => {}
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LIMIT: usize = 64 * 1024;
    const WAIT: Duration = Duration::from_secs(5);

    async fn decode(bytes: &[u8]) -> Result<Request, ReadError> {
        let mut reader = bytes;
        read_request(&mut reader, LIMIT, WAIT).await
    }

    #[tokio::test]
    async fn test_decodes_every_action() {
        assert_eq!(
            decode(br#"{"action": "add", "program": "ls -la"}"#).await.unwrap(),
            Request::Add {
                program: "ls -la".into()
            }
        );
        assert_eq!(
            decode(br#"{"action": "get_output", "program": "ls"}"#).await.unwrap(),
            Request::GetOutput {
                program: "ls".into()
            }
        );
        assert_eq!(
            decode(br#"{"action": "stop", "program": "ls"}"#).await.unwrap(),
            Request::Stop {
                program: "ls".into()
            }
        );
        assert_eq!(
            decode(br#"{"action": "resume", "program": "ls"}"#).await.unwrap(),
            Request::Resume {
                program: "ls".into()
            }
        );
        assert_eq!(
            decode(br#"{"action": "set_interval", "interval": "5"}"#).await.unwrap(),
            Request::SetInterval {
                interval: Some(json!("5"))
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_action() {
        assert_eq!(
            decode(br#"{"action": "reboot"}"#).await.unwrap(),
            Request::Unknown
        );
    }

    #[tokio::test]
    async fn test_missing_fields_are_decode_errors() {
        assert!(matches!(
            decode(br#"{"program": "ls"}"#).await,
            Err(ReadError::Decode(_))
        ));
        assert!(matches!(
            decode(br#"{"action": "add"}"#).await,
            Err(ReadError::Decode(_))
        ));
        assert!(matches!(decode(b"not json").await, Err(ReadError::Decode(_))));
        assert!(matches!(decode(b"").await, Err(ReadError::Empty)));
    }

    #[tokio::test]
    async fn test_stops_at_complete_value_without_eof() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::io::AsyncWriteExt::write_all(&mut client, br#"{"action": "stop", "#)
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut client, br#""program": "x"}"#)
            .await
            .unwrap();
        // `client` stays open: the request must be recognised without EOF.
        let request = read_request(&mut server, LIMIT, WAIT).await.unwrap();
        assert_eq!(
            request,
            Request::Stop {
                program: "x".into()
            }
        );
        drop(client);
    }

    #[tokio::test]
    async fn test_oversized_request() {
        let big = format!(
            r#"{{"action": "add", "program": "{}"}}"#,
            "a".repeat(LIMIT)
        );
        assert!(matches!(
            decode(big.as_bytes()).await,
            Err(ReadError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_request(&mut server, LIMIT, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Timeout));
    }

    #[test]
    fn test_interval_text() {
        assert_eq!(Request::interval_text(Some(&json!("20"))), "20");
        assert_eq!(Request::interval_text(Some(&json!(15))), "15");
        assert_eq!(Request::interval_text(Some(&json!(-5))), "-5");
        assert_eq!(Request::interval_text(None), "");
    }

    #[test]
    fn test_serializes_to_wire_shape() {
        let value = serde_json::to_value(Request::Add {
            program: "ping -c 1 127.0.0.1".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"action": "add", "program": "ping -c 1 127.0.0.1"})
        );
    }
}
