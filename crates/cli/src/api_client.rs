use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tripwire_core::Tag;
use tripwire_core::config::ApiConfig;

/// Client for the tagging API, authenticated with HTTP Basic credentials.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ApiClient {
    pub fn new(base_url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url).context("invalid API URL")?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(&config.url, &config.username, &config.password, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", self.base_url, path.trim_start_matches('/')))
            .context("failed to build API URL")
    }

    /// Submit a tag to `{api}/tag`. Any non-2xx status is an error; nothing is retried.
    pub async fn post_tag(&self, tag: &Tag) -> Result<()> {
        let url = self.url("tag")?;
        let body = tag.to_json().context("failed to serialize tag")?;
        let response = self
            .http
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(())
    }

    /// Check connectivity via `{api}/access`. Only a 200 counts as connected.
    pub async fn probe_access(&self) -> Result<bool> {
        let url = self.url("access")?;
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }
}
