use anyhow::{bail, Context, Result};
use reqwest::Client;
use url::Url;

use crate::registry::RowPayload;
use crate::state::Config;
use crate::transport::{command_path, CommandTransport};
use crate::verify::row_sm::Command;

/// Longest slice of an error body kept in `last_error`.
const MAX_BODY_CHARS: usize = 200;

pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.http_timeout())
            .build()
            .context("building http client")?;
        Ok(Self { client, base: parse_base(&cfg.base_url)? })
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        Ok(Self { client, base: parse_base(base_url)? })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn endpoint(&self, command: Command) -> Result<Url> {
        let path = command_path(command);
        self.base
            .join(&path)
            .with_context(|| format!("joining {} onto {}", path, self.base))
    }
}

/// Parses the server base and makes sure relative joins keep its path.
pub(crate) fn parse_base(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).with_context(|| format!("invalid base url {}", raw))
}

#[async_trait::async_trait]
impl CommandTransport for HttpTransport {
    async fn send(&self, command: Command, payload: &RowPayload) -> Result<()> {
        let url = self.endpoint(command)?;
        let resp = self
            .client
            .post(url.clone())
            .json(payload)
            .send()
            .await
            .with_context(|| format!("POST {}", url.path()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.trim().chars().take(MAX_BODY_CHARS).collect();
            if body.is_empty() {
                bail!("POST {} returned {}", url.path(), status);
            }
            bail!("POST {} returned {}: {}", url.path(), status, body);
        }
        Ok(())
    }
}
