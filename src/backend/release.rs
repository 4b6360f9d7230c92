//! GitHub release-asset implementation of [`AssetStore`].
//!
//! State objects are assets of the release with the configured tag. The
//! generation pointer lives in the release body as a `state-generation:`
//! line, so promotion is a single release update.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::AssetStore;
use crate::config::ReleaseConfig;
use crate::error::{Result, TrackerError};

const POINTER_MARKER: &str = "state-generation:";
const GITHUB_JSON: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize)]
struct Release {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    id: u64,
    name: String,
}

/// Reads and writes state assets on a GitHub release.
pub struct ReleaseAssetClient {
    repository: String,
    tag: String,
    api_base: String,
    uploads_base: String,
    token: Option<String>,
    client: Client,
}

impl ReleaseAssetClient {
    /// Build a client from validated settings; the token is read from
    /// `config.token_env`.
    pub fn from_config(config: &ReleaseConfig) -> Result<Self> {
        if config.repository.trim().is_empty() {
            return Err(TrackerError::Configuration(
                "remote_release_asset backend requires a non-empty repository".into(),
            ));
        }
        let token = std::env::var(&config.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            warn!(env = %config.token_env, "no API token set; remote saves will be rejected");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            repository: config.repository.trim().to_string(),
            tag: config.tag.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            uploads_base: config.uploads_base.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(USER_AGENT, concat!("mtg-spike-tracker/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    fn release(&self) -> Result<Option<Release>> {
        let url = format!(
            "{}/repos/{}/releases/tags/{}",
            self.api_base, self.repository, self.tag
        );
        let resp = self
            .request(self.client.get(&url))
            .header(ACCEPT, GITHUB_JSON)
            .send()?;
        match classify(resp.status(), "fetch release")? {
            Disposition::Missing => Ok(None),
            Disposition::Success => Ok(Some(resp.json()?)),
        }
    }

    fn release_or_create(&self) -> Result<Release> {
        if let Some(release) = self.release()? {
            return Ok(release);
        }
        let url = format!("{}/repos/{}/releases", self.api_base, self.repository);
        let payload = serde_json::json!({
            "tag_name": self.tag,
            "name": self.tag,
            "body": "",
            "prerelease": true,
        });
        let resp = self
            .request(self.client.post(&url))
            .header(ACCEPT, GITHUB_JSON)
            .json(&payload)
            .send()?;
        let release: Release = check(resp, "create release")?.json()?;
        info!(repository = %self.repository, tag = %self.tag, "created state release");
        Ok(release)
    }

    fn asset_id(release: &Release, name: &str) -> Option<u64> {
        release.assets.iter().find(|a| a.name == name).map(|a| a.id)
    }
}

impl AssetStore for ReleaseAssetClient {
    fn read_pointer(&self) -> Result<Option<String>> {
        Ok(self
            .release()?
            .and_then(|r| r.body)
            .and_then(|body| parse_pointer(&body)))
    }

    fn write_pointer(&self, expected: Option<&str>, generation: &str) -> Result<()> {
        let release = self.release_or_create()?;
        let current = release.body.as_deref().and_then(parse_pointer);
        if current.as_deref() != expected {
            return Err(TrackerError::Conflict(format!(
                "release {} pointer is {:?}, expected {:?}",
                self.tag, current, expected
            )));
        }
        let url = format!(
            "{}/repos/{}/releases/{}",
            self.api_base, self.repository, release.id
        );
        let body = replace_pointer(release.body.as_deref().unwrap_or(""), generation);
        let resp = self
            .request(self.client.patch(&url))
            .header(ACCEPT, GITHUB_JSON)
            .json(&serde_json::json!({ "body": body }))
            .send()?;
        check(resp, "update release pointer")?;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(release) = self.release()? else {
            return Ok(None);
        };
        let Some(id) = Self::asset_id(&release, name) else {
            return Ok(None);
        };
        let url = format!(
            "{}/repos/{}/releases/assets/{}",
            self.api_base, self.repository, id
        );
        let resp = self
            .request(self.client.get(&url))
            .header(ACCEPT, "application/octet-stream")
            .send()?;
        if classify(resp.status(), "download asset")? == Disposition::Missing {
            return Ok(None);
        }
        let bytes = resp.bytes()?;
        debug!(asset = name, bytes = bytes.len(), "downloaded asset");
        Ok(Some(bytes.to_vec()))
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let release = self.release_or_create()?;
        // Uploads refuse an existing name, so an overwrite is delete + upload.
        if let Some(id) = Self::asset_id(&release, name) {
            self.delete_asset(id)?;
        }
        let url = format!(
            "{}/repos/{}/releases/{}/assets",
            self.uploads_base, self.repository, release.id
        );
        let resp = self
            .request(self.client.post(&url))
            .query(&[("name", name)])
            .header(ACCEPT, GITHUB_JSON)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()?;
        check(resp, "upload asset")?;
        debug!(asset = name, bytes = bytes.len(), "uploaded asset");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let Some(release) = self.release()? else {
            return Ok(());
        };
        match Self::asset_id(&release, name) {
            Some(id) => self.delete_asset(id),
            None => Ok(()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .release()?
            .map(|r| r.assets.into_iter().map(|a| a.name).collect())
            .unwrap_or_default())
    }
}

impl ReleaseAssetClient {
    fn delete_asset(&self, id: u64) -> Result<()> {
        let url = format!(
            "{}/repos/{}/releases/assets/{}",
            self.api_base, self.repository, id
        );
        let resp = self
            .request(self.client.delete(&url))
            .header(ACCEPT, GITHUB_JSON)
            .send()?;
        // Already gone counts as deleted.
        classify(resp.status(), "delete asset")?;
        Ok(())
    }
}

/// Extract the generation from a release body.
pub fn parse_pointer(body: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| line.trim().strip_prefix(POINTER_MARKER))
        .map(|g| g.trim().to_string())
        .find(|g| !g.is_empty())
}

/// Rewrite a release body so it names `generation`, keeping every line that
/// is not a pointer line.
pub fn replace_pointer(body: &str, generation: &str) -> String {
    let mut out = String::new();
    for line in body.lines() {
        if !line.trim().starts_with(POINTER_MARKER) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out.truncate(out.trim_end().len());
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(&format!("{} {}\n", POINTER_MARKER, generation));
    out
}

/// What a non-failing response status means to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    /// 404: the release or asset does not exist.
    Missing,
}

/// Classify a response status: 5xx and 429 are transient, 404 is reported as
/// [`Disposition::Missing`], any other failure means the backend refused the
/// request.
pub fn classify(status: StatusCode, what: &str) -> Result<Disposition> {
    if status.is_success() {
        return Ok(Disposition::Success);
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(Disposition::Missing);
    }
    let msg = format!("{} failed: {}", what, status);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(TrackerError::Transient(msg))
    } else {
        Err(TrackerError::BackendUnavailable(msg))
    }
}

/// Require a successful response; a 404 here is a refusal like any other.
fn check(resp: Response, what: &str) -> Result<Response> {
    match classify(resp.status(), what)? {
        Disposition::Success => Ok(resp),
        Disposition::Missing => Err(TrackerError::BackendUnavailable(format!(
            "{} failed: {} ({})",
            what,
            resp.status(),
            resp.url()
        ))),
    }
}
