//! Control client for a running daemon.
//!
//! [`send_request`] opens one connection per request, writes the JSON object
//! and reads the text reply until the server closes the stream. [`run_menu`]
//! wraps it in a numbered console menu.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::Request;

/// Errors talking to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Send one request to the daemon at `addr` and return its reply.
pub async fn send_request(addr: &str, request: &Request) -> Result<String, ClientError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    let payload = serde_json::to_vec(request)?;
    stream.write_all(&payload).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

/// Interactive menu over stdin/stdout. Returns when the user picks "Exit"
/// or stdin closes.
pub async fn run_menu(addr: &str) -> Result<(), ClientError> {
    let mut input = BufReader::new(tokio::io::stdin());
    let mut out = tokio::io::stdout();

    loop {
        out.write_all(
            b"\n1. Add program\n\
              2. Get program output\n\
              3. Stop program\n\
              4. Resume program\n\
              5. Set run interval\n\
              6. Exit\n",
        )
        .await?;

        let Some(choice) = prompt(&mut input, &mut out, "Choose an action (1-6): ").await? else {
            return Ok(());
        };

        let request = match choice.as_str() {
            "1" | "2" | "3" | "4" => {
                let Some(program) = prompt(&mut input, &mut out, "Program: ").await? else {
                    return Ok(());
                };
                match choice.as_str() {
                    "1" => Request::Add { program },
                    "2" => Request::GetOutput { program },
                    "3" => Request::Stop { program },
                    _ => Request::Resume { program },
                }
            }
            "5" => {
                let Some(value) =
                    prompt(&mut input, &mut out, "New interval (seconds): ").await?
                else {
                    return Ok(());
                };
                Request::SetInterval {
                    interval: Some(serde_json::Value::String(value)),
                }
            }
            "6" => {
                out.write_all(b"Bye.\n").await?;
                return Ok(());
            }
            _ => {
                out.write_all(b"Invalid choice.\n").await?;
                continue;
            }
        };

        match send_request(addr, &request).await {
            Ok(reply) => {
                out.write_all(reply.as_bytes()).await?;
                out.write_all(b"\n").await?;
            }
            Err(e) => out.write_all(format!("{e}\n").as_bytes()).await?,
        }
        out.flush().await?;
    }
}

/// Print `label` and read one trimmed line. `None` on end of input.
async fn prompt<R, W>(input: &mut R, out: &mut W, label: &str) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    out.write_all(label.as_bytes()).await?;
    out.flush().await?;
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_request_reads_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = crate::protocol::read_request(
                &mut stream,
                1024,
                std::time::Duration::from_secs(5),
            )
            .await
            .unwrap();
            stream.write_all(b"part one, ").await.unwrap();
            stream.write_all(b"part two").await.unwrap();
            request
        });

        let reply = send_request(
            &addr,
            &Request::Stop {
                program: "echo x".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, "part one, part two");
        assert_eq!(
            server.await.unwrap(),
            Request::Stop {
                program: "echo x".into()
            }
        );
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = send_request(&addr, &Request::Unknown).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_prompt_trims_and_detects_eof() {
        let mut input: &[u8] = b"  2 \n";
        let mut out = Vec::new();
        assert_eq!(
            prompt(&mut input, &mut out, "> ").await.unwrap(),
            Some("2".to_string())
        );
        assert_eq!(prompt(&mut input, &mut out, "> ").await.unwrap(), None);
        assert_eq!(out, b"> > ");
    }
}
