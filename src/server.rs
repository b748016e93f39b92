//! Request dispatcher: TCP accept loop and per-connection handling.
//!
//! Each accepted connection is handled on its own task: read one request,
//! route it to the [`Supervisor`], write the text response, close. Nothing a
//! single connection does can take the listener down; every failure turns
//! into a `Server error: ...` response on that connection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::protocol::{self, ReadError, Request};
use crate::supervisor::Supervisor;

/// Per-connection limits, lifted from [`ServerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_request_bytes: usize,
    pub request_timeout: Duration,
    /// `0` = unbounded.
    pub max_connections: usize,
}

impl From<&ServerConfig> for Limits {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            max_request_bytes: cfg.max_request_bytes,
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            max_connections: cfg.max_connections,
        }
    }
}

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, supervisor: Supervisor, limits: Limits, shutdown: F)
where
    F: Future<Output = ()>,
{
    let permits = (limits.max_connections > 0)
        .then(|| Arc::new(Semaphore::new(limits.max_connections)));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Accept error: {e}");
                        continue;
                    }
                };
                debug!("Connection from {peer}");

                let permits = permits.clone();
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    // Excess connections queue here until a handler frees up.
                    let _permit = match permits {
                        Some(sem) => match sem.acquire_owned().await {
                            Ok(p) => Some(p),
                            Err(_) => return,
                        },
                        None => None,
                    };
                    handle_connection(stream, &supervisor, limits).await;
                });
            }
        }
    }
    info!("Listener closed");
}

async fn handle_connection(mut stream: TcpStream, supervisor: &Supervisor, limits: Limits) {
    let response =
        match protocol::read_request(&mut stream, limits.max_request_bytes, limits.request_timeout)
            .await
        {
            Ok(request) => dispatch(supervisor, request).await,
            Err(ReadError::Empty) => {
                debug!("Client closed without sending a request");
                return;
            }
            Err(e) => {
                error!("Bad request: {e}");
                format!("Server error: {e}")
            }
        };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to write response: {e}");
        return;
    }
    let _ = stream.shutdown().await;
}

/// Route one request to the supervisor and render the text response.
pub async fn dispatch(supervisor: &Supervisor, request: Request) -> String {
    let (action, result) = match request {
        Request::Add { program } => ("add", supervisor.add(&program).await),
        Request::Stop { program } => ("stop", supervisor.stop(&program).await),
        Request::Resume { program } => ("resume", supervisor.resume(&program).await),
        Request::SetInterval { interval } => {
            let raw = Request::interval_text(interval.as_ref());
            ("set_interval", supervisor.set_interval(&raw).await)
        }
        Request::GetOutput { program } => {
            let result = supervisor.get_output(&program).await;
            if result.is_ok() {
                info!("Served output of '{program}'");
            }
            ("get_output", result)
        }
        Request::Unknown => {
            warn!("Unknown command");
            return protocol::UNKNOWN_COMMAND.to_string();
        }
    };

    match result {
        Ok(text) => {
            if action != "get_output" {
                info!("{text}");
            }
            text
        }
        Err(e) if e.is_refusal() => {
            warn!("{action}: {e}");
            e.to_string()
        }
        Err(e) => {
            error!("{action}: {e}");
            e.to_string()
        }
    }
}
