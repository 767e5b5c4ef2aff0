//! Client side of the command protocol, used by the CLI subcommands.
//!
//! One request per connection. Every transport failure (no socket, refused,
//! timeout, garbled reply) collapses into [`BlockdError::DaemonUnavailable`].

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::BlockdError;
use crate::protocol::{Request, Response, StartBlock};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Covers a `start-block` that has to resolve every domain first.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CommandClient {
    path: PathBuf,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl CommandClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send `request` and wait for its response line.
    pub async fn send(&self, request: &Request) -> Result<Response, BlockdError> {
        let line = request.encode().map_err(|e| {
            debug!("Failed to encode request: {}", e);
            BlockdError::DaemonUnavailable
        })?;

        let stream = match tokio::time::timeout(self.connect_timeout, connect(&self.path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!("Failed to connect to {}: {}", self.path.display(), e);
                return Err(BlockdError::DaemonUnavailable);
            }
            Err(_) => {
                debug!("Timed out connecting to {}", self.path.display());
                return Err(BlockdError::DaemonUnavailable);
            }
        };

        match tokio::time::timeout(self.response_timeout, exchange(stream, &line)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                debug!("{} exchange failed: {}", request.action(), e);
                Err(BlockdError::DaemonUnavailable)
            }
            Err(_) => {
                debug!("Timed out waiting for {} response", request.action());
                Err(BlockdError::DaemonUnavailable)
            }
        }
    }

    pub async fn ping(&self) -> Result<Response, BlockdError> {
        self.send(&Request::Ping).await
    }

    pub async fn start_block(&self, start: StartBlock) -> Result<Response, BlockdError> {
        self.send(&Request::StartBlock(start)).await
    }

    pub async fn clear_block(&self) -> Result<Response, BlockdError> {
        self.send(&Request::ClearBlock).await
    }

    pub async fn get_status(&self) -> Result<Response, BlockdError> {
        self.send(&Request::GetStatus).await
    }
}

#[cfg(unix)]
async fn connect(path: &Path) -> std::io::Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
async fn connect(
    path: &Path,
) -> std::io::Result<tokio::net::windows::named_pipe::NamedPipeClient> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(path.as_os_str())
}

async fn exchange<S>(stream: S, line: &str) -> std::io::Result<Response>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let mut reply = String::new();
    let n = BufReader::new(reader).read_line(&mut reply).await?;
    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before a response",
        ));
    }

    Ok(Response::decode(reply.trim_end())?)
}
