//! Command server: newline-delimited JSON over a Unix socket (named pipe on
//! Windows).
//!
//! Every connection gets its own task. Requests on one connection are
//! answered in order, one response line per request line; a malformed line
//! gets an error response and the connection stays open.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::engine::BlockEngine;
use crate::error::BlockdError;
use crate::protocol::{Outcome, ProtocolError, Request, Response};
use crate::signal::ShutdownToken;

/// Upper bound for one request line; longer lines close the connection.
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

/// Dispatch one request line to the engine.
pub async fn handle_line(engine: &BlockEngine, line: &str) -> Response {
    let request = match Request::decode(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected request: {}", e);
            return e.into();
        }
    };

    let action = request.action();
    debug!("Handling {}", action);

    match request {
        Request::Ping => Outcome::ok().into(),
        Request::StartBlock(start) => match engine.start_block(start).await {
            Ok(()) => Outcome::ok().into(),
            Err(e) => failure(action, e),
        },
        Request::ClearBlock => match engine.clear_block().await {
            Ok(true) => Outcome::ok().into(),
            Ok(false) => Outcome::ok_with_message("No active block").into(),
            Err(e) => failure(action, e),
        },
        Request::GetStatus => engine.status().await.into(),
    }
}

fn failure(action: &str, err: BlockdError) -> Response {
    if err.is_rejection() {
        warn!("{} rejected: {}", action, err);
    } else {
        error!("{} failed: {}", action, err);
    }
    Outcome::failure(err.to_string()).into()
}

/// Serve one client until it disconnects.
pub async fn handle_connection<S>(stream: S, engine: Arc<BlockEngine>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = (&mut reader)
            .take(MAX_REQUEST_BYTES)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            break;
        }

        let oversized = n as u64 == MAX_REQUEST_BYTES && buf.last() != Some(&b'\n');
        let response = if oversized {
            warn!("Request line exceeds {} bytes, closing connection", MAX_REQUEST_BYTES);
            Response::from(ProtocolError::InvalidJson)
        } else {
            match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => handle_line(&engine, line).await,
                Err(_) => {
                    warn!("Rejected request: not valid UTF-8");
                    ProtocolError::InvalidJson.into()
                }
            }
        };

        writer.write_all(response.encode()?.as_bytes()).await?;
        writer.flush().await?;

        if oversized {
            break;
        }
    }

    Ok(())
}

/// Removes the socket file when the server stops, however it stops.
#[cfg(unix)]
struct SocketGuard<'a>(&'a Path);

#[cfg(unix)]
impl Drop for SocketGuard<'_> {
    fn drop(&mut self) {
        match std::fs::remove_file(self.0) {
            Ok(()) => debug!("Removed socket {}", self.0.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove socket {}: {}", self.0.display(), e),
        }
    }
}

/// Bind the Unix socket at `path` and serve until `shutdown` is cancelled.
///
/// A stale socket file is replaced; a socket that still answers means another
/// daemon owns it, which is a startup error.
#[cfg(unix)]
pub async fn serve(
    engine: Arc<BlockEngine>,
    path: &Path,
    mode: u32,
    shutdown: ShutdownToken,
) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::net::{UnixListener, UnixStream};

    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            anyhow::bail!("Another daemon is already listening on {}", path.display());
        }
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        debug!("Removed stale socket {}", path.display());
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket {}", path.display()))?;
    let _guard = SocketGuard(path);

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

    info!("Listening on {}", path.display());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, engine).await {
                            debug!("Connection closed with error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Create the named pipe `path` and serve until `shutdown` is cancelled.
#[cfg(windows)]
pub async fn serve(
    engine: Arc<BlockEngine>,
    path: &Path,
    _mode: u32,
    shutdown: ShutdownToken,
) -> Result<()> {
    use tokio::net::windows::named_pipe::ServerOptions;

    let name = path.as_os_str();
    let mut server = ServerOptions::new()
        .first_pipe_instance(true)
        .reject_remote_clients(true)
        .create(name)
        .with_context(|| format!("Failed to create named pipe {}", path.display()))?;

    info!("Listening on {}", path.display());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            connected = server.connect() => {
                if let Err(e) = connected {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
                let next = ServerOptions::new()
                    .reject_remote_clients(true)
                    .create(name)
                    .with_context(|| format!("Failed to create named pipe {}", path.display()))?;
                let client = std::mem::replace(&mut server, next);
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(client, engine).await {
                        debug!("Connection closed with error: {}", e);
                    }
                });
            }
        }
    }

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::MockCommandExecutor;
    use crate::dns::mock::StaticResolver;
    use crate::engine::EngineParts;
    use crate::enforcer::NoopBackend;
    use crate::hosts::HostsFile;
    use crate::protocol::StatusReport;
    use crate::state::{now_ms, StateStore};
    use tempfile::TempDir;
    use tokio::io::duplex;

    fn engine(dir: &TempDir) -> Arc<BlockEngine> {
        BlockEngine::spawn(EngineParts {
            store: StateStore::new(dir.path().join("state.json")),
            hosts: HostsFile::new(dir.path().join("hosts")),
            backend: Arc::new(NoopBackend),
            resolver: Arc::new(StaticResolver::default()),
            executor: Arc::new(MockCommandExecutor::new()),
            flush_dns: false,
        })
    }

    async fn call(engine: &BlockEngine, line: &str) -> String {
        handle_line(engine, line).await.encode().unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        assert_eq!(call(&engine, r#"{"action":"ping"}"#).await, "{\"success\":true}\n");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        assert_eq!(
            call(&engine, "not json").await,
            "{\"success\":false,\"error\":\"Invalid JSON\"}\n"
        );
        assert_eq!(
            call(&engine, r#"{"action":"reboot"}"#).await,
            "{\"success\":false,\"error\":\"Unknown command: reboot\"}\n"
        );
        assert_eq!(
            call(&engine, r#"{"domains":[]}"#).await,
            "{\"success\":false,\"error\":\"Missing action\"}\n"
        );
        assert!(call(&engine, r#"{"action":"start-block","domains":"x.com"}"#)
            .await
            .starts_with("{\"success\":false,\"error\":\"Invalid start-block request: "));
    }

    #[tokio::test]
    async fn test_start_status_clear() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let end_time = now_ms() + 60_000;

        let start = format!(
            r#"{{"action":"start-block","domains":["x.com"],"endTime":{},"blocklistId":"b1"}}"#,
            end_time
        );
        assert_eq!(call(&engine, &start).await, "{\"success\":true}\n");

        match handle_line(&engine, r#"{"action":"get-status"}"#).await {
            Response::Status(report) => {
                assert!(report.active);
                assert_eq!(report.domains, Some(vec!["x.com".to_string()]));
                assert_eq!(report.end_time, Some(end_time));
                assert_eq!(report.blocklist_id, Some("b1".to_string()));
                assert!(report.remaining_ms.unwrap() > 0);
            }
            other => panic!("unexpected response {:?}", other),
        }

        assert_eq!(
            call(&engine, r#"{"action":"clear-block"}"#).await,
            "{\"success\":true}\n"
        );
        assert_eq!(
            call(&engine, r#"{"action":"clear-block"}"#).await,
            "{\"success\":true,\"message\":\"No active block\"}\n"
        );
        assert_eq!(
            handle_line(&engine, r#"{"action":"get-status"}"#).await,
            Response::Status(StatusReport::inactive())
        );
    }

    #[tokio::test]
    async fn test_start_block_rejection_is_reported() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let line = r#"{"action":"start-block","domains":["x.com"],"endTime":1,"blocklistId":"b1"}"#;
        assert_eq!(
            call(&engine, line).await,
            "{\"success\":false,\"error\":\"End time must be in the future\"}\n"
        );
    }

    #[tokio::test]
    async fn test_connection_answers_in_order_and_survives_bad_lines() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let (client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, engine));

        let (reader, mut writer) = tokio::io::split(client);
        writer
            .write_all(b"garbage\n\n\xff\xfe\n{\"action\":\"ping\"}\n")
            .await
            .unwrap();
        writer.shutdown().await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let mut responses = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(line);
        }

        assert_eq!(
            responses,
            vec![
                "{\"success\":false,\"error\":\"Invalid JSON\"}",
                "{\"success\":false,\"error\":\"Invalid JSON\"}",
                "{\"success\":true}",
            ]
        );
        task.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_serve_binds_and_cleans_up_socket() {
        use tokio::net::UnixStream;

        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("blockd.sock");
        // Stale file from a previous run
        std::fs::write(&socket, b"").unwrap();

        let engine = engine(&dir);
        let shutdown = ShutdownToken::new();
        let server = {
            let socket = socket.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(engine, &socket, 0o600, shutdown).await })
        };

        let stream = loop {
            match UnixStream::connect(&socket).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };

        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"action\":\"ping\"}\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        assert_eq!(line, "{\"success\":true}\n");

        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        shutdown.cancel();
        server.await.unwrap().unwrap();
        assert!(!socket.exists());
    }
}
