use anyhow::Result;
use async_trait::async_trait;

use crate::registry::RowPayload;
use crate::verify::row_sm::Command;

mod http;

pub use http::HttpTransport;
pub(crate) use http::parse_base;

/// Delivers one strategy command to the server.
///
/// `Ok(())` means the server acknowledged it. Any error, whether a non-2xx
/// status or a network failure, is a failed command.
#[async_trait]
pub trait CommandTransport {
    async fn send(&self, command: Command, payload: &RowPayload) -> Result<()>;
}

/// Path of the command endpoint, relative to the server base.
pub fn command_path(command: Command) -> String {
    format!("strategy/{}", command.as_str())
}
