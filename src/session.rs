//! Connection credentials supplied by the login collaborator.

use std::fmt;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::transport::parse_base;

fn default_port() -> u16 {
    8080
}

/// Connection defaults served by `GET /logininfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "port_from_any")]
    pub port: u16,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub user_id: String,
}

impl Default for LoginInfo {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            license: String::new(),
            app_id: String::new(),
            user_id: String::new(),
        }
    }
}

// Servers send the port either as a number or as the text the form edited.
fn port_from_any<'de, D>(de: D) -> std::result::Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Num(u16),
        Text(String),
    }
    match Port::deserialize(de)? {
        Port::Num(p) => Ok(p),
        Port::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// What the login dialog submits to the connection-setup routine.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(flatten)]
    pub info: LoginInfo,
    pub password: String,
}

impl Credentials {
    /// Password always starts blank, whatever the server sent.
    pub fn from_login_info(info: LoginInfo) -> Self {
        Self { info, password: String::new() }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn is_complete(&self) -> bool {
        !self.info.host.is_empty() && !self.info.user_id.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.info.host)
            .field("port", &self.info.port)
            .field("license", &"[REDACTED]")
            .field("app_id", &self.info.app_id)
            .field("user_id", &self.info.user_id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

pub async fn fetch_login_info(client: &Client, base_url: &str) -> Result<Credentials> {
    let url = parse_base(base_url)?.join("logininfo")?;
    let resp = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", url.path()))?;
    if !resp.status().is_success() {
        bail!("GET {} returned {}", url.path(), resp.status());
    }
    let info: LoginInfo = resp.json().await.context("decoding login info")?;
    log(
        Level::Info,
        Domain::Session,
        "login_info",
        obj(&[
            ("host", v_str(&info.host)),
            ("port", serde_json::json!(info.port)),
            ("app_id", v_str(&info.app_id)),
            ("user_id", v_str(&info.user_id)),
            ("license", v_str(&info.license)),
        ]),
    );
    Ok(Credentials::from_login_info(info))
}
