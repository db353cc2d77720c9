// ABOUTME: Sync adapter: GitHub contents upsert and Drive multipart upload
// ABOUTME: Token refresh flow; remote failures are logged, never fatal to a run

use crate::config::SyncSettings;
use crate::export::ExportFile;
use crate::runlog::RunLog;
use crate::util::file_extension;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::blocking::Client;
use serde_json::json;
use std::time::Duration;

const USER_AGENT: &str = "marksync/0.1 (Rust)";

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOverrides {
    pub github: Option<bool>,
    pub drive: Option<bool>,
}

impl SyncOverrides {
    /// Scheduled runs force each target on exactly when it is fully
    /// configured, regardless of the stored enablement flags.
    pub fn from_configuration(settings: &SyncSettings) -> Self {
        SyncOverrides {
            github: Some(settings.github_configured()),
            drive: Some(settings.drive_configured()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct SyncAdapter {
    http: Client,
    settings: SyncSettings,
    github_api_base: String,
    drive_upload_url: String,
    drive_files_base: String,
    token_url: String,
    token_refreshed: bool,
}

impl SyncAdapter {
    pub fn new(settings: SyncSettings) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(SyncAdapter {
            http,
            settings,
            github_api_base: "https://api.github.com".into(),
            drive_upload_url:
                "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart".into(),
            drive_files_base: "https://www.googleapis.com/drive/v3/files".into(),
            token_url: "https://accounts.google.com/o/oauth2/token".into(),
            token_refreshed: false,
        })
    }

    pub fn with_github_api_base(mut self, base: impl Into<String>) -> Self {
        self.github_api_base = base.into();
        self
    }

    pub fn with_drive_endpoints(
        mut self,
        upload_url: impl Into<String>,
        files_base: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.drive_upload_url = upload_url.into();
        self.drive_files_base = files_base.into();
        self.token_url = token_url.into();
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// True once a refresh-token exchange produced a new access token; the
    /// caller should persist `settings()` back to configuration.
    pub fn token_refreshed(&self) -> bool {
        self.token_refreshed
    }

    fn github_enabled(&self, overrides: &SyncOverrides) -> bool {
        overrides.github.unwrap_or(self.settings.github_enabled)
    }

    fn drive_enabled(&self, overrides: &SyncOverrides) -> bool {
        overrides.drive.unwrap_or(self.settings.drive_enabled)
    }

    // -- push ---------------------------------------------------------------

    /// Pushes exported documents to every enabled target. Each entry is an
    /// independent best-effort upsert; failures are logged and skipped.
    pub fn push_files(
        &mut self,
        files: &[ExportFile],
        context: &str,
        overrides: &SyncOverrides,
        log: &mut RunLog,
    ) {
        if files.is_empty() {
            return;
        }

        if self.github_enabled(overrides) {
            for file in files {
                self.push_github_entry(&file.name, file.content.as_bytes(), context, log);
            }
        }

        if self.drive_enabled(overrides) {
            if let Some(token) = self.drive_access_token(log) {
                for file in files {
                    self.upload_drive_file(&file.name, file.content.as_bytes(), &token, log);
                }
            }
        }
    }

    /// Pushes a single payload (an archive or one document) to every enabled
    /// target under its declared name.
    pub fn push_payload(
        &mut self,
        name: &str,
        bytes: &[u8],
        context: &str,
        overrides: &SyncOverrides,
        log: &mut RunLog,
    ) {
        if self.github_enabled(overrides) {
            self.push_github_entry(name, bytes, context, log);
        }

        if self.drive_enabled(overrides) {
            if let Some(token) = self.drive_access_token(log) {
                self.upload_drive_file(name, bytes, &token, log);
            }
        }
    }

    fn github_coordinates(&self, log: &mut RunLog) -> Option<(String, String)> {
        if !self.settings.github_configured() {
            return None;
        }
        match self.settings.github_repo.trim().split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
                Some((owner.to_string(), repo.to_string()))
            }
            _ => {
                log.debug("GitHub sync skipped: invalid repo format (expected owner/repo).");
                None
            }
        }
    }

    fn github_content_url(&self, owner: &str, repo: &str, content_path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.github_api_base,
            encode_path_segment(owner),
            encode_path_segment(repo),
            encode_path(content_path)
        )
    }

    fn prefixed_path(&self, name: &str) -> String {
        let prefix = self.settings.github_path.trim().trim_matches('/');
        if prefix.is_empty() {
            name.trim_start_matches('/').to_string()
        } else {
            format!("{}/{}", prefix, name.trim_start_matches('/'))
        }
    }

    /// Content-addressed upsert: recover the current blob sha, then PUT the
    /// new content with the sha attached (update) or omitted (create).
    fn push_github_entry(&self, name: &str, bytes: &[u8], context: &str, log: &mut RunLog) {
        let Some((owner, repo)) = self.github_coordinates(log) else {
            return;
        };

        let branch = self.settings.branch().to_string();
        let content_path = self.prefixed_path(name);
        let url = self.github_content_url(&owner, &repo, &content_path);

        let existing_sha = self.github_blob_sha(&url);

        let mut message = format!("Export {} UTC", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        if !context.is_empty() {
            message.push_str(" | ");
            message.push_str(context);
        }

        let mut payload = json!({
            "message": message,
            "content": BASE64.encode(bytes),
            "branch": branch,
        });
        if let Some(sha) = existing_sha {
            payload["sha"] = json!(sha);
        }

        let response = self
            .http
            .put(&url)
            .header("Authorization", format!("token {}", self.settings.github_token))
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send();

        match response {
            Ok(response) => {
                let code = response.status().as_u16();
                if code == 200 || code == 201 {
                    let sha = response
                        .json::<serde_json::Value>()
                        .ok()
                        .and_then(|body| {
                            body.pointer("/content/sha")
                                .and_then(|v| v.as_str())
                                .map(String::from)
                        })
                        .unwrap_or_else(|| "n/a".into());
                    log.debug(format!(
                        "GitHub sync ok: {} ({}), sha={}",
                        content_path, branch, sha
                    ));
                } else {
                    let body = response.text().unwrap_or_default();
                    log.debug(format!(
                        "GitHub sync HTTP {} for {} ({})",
                        code, content_path, branch
                    ));
                    if !body.is_empty() {
                        log.debug(format!("GitHub response: {}", truncate(&body, 200)));
                    }
                }
            }
            Err(e) => {
                log.debug(format!("GitHub sync failed for {}: {}", content_path, e));
            }
        }
    }

    fn github_blob_sha(&self, url: &str) -> Option<String> {
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("token {}", self.settings.github_token))
            .header("User-Agent", USER_AGENT)
            .send()
            .ok()?;
        if response.status().as_u16() != 200 {
            return None;
        }
        let body: serde_json::Value = response.json().ok()?;
        body.get("sha").and_then(|v| v.as_str()).map(String::from)
    }

    // -- drive --------------------------------------------------------------

    /// Static token if stored, otherwise a refresh-token exchange. A failed
    /// refresh degrades the push to a logged no-op.
    fn drive_access_token(&mut self, log: &mut RunLog) -> Option<String> {
        if !self.settings.drive_token.is_empty() {
            return Some(self.settings.drive_token.clone());
        }

        if self.settings.drive_client_id.is_empty()
            || self.settings.drive_client_secret.is_empty()
            || self.settings.drive_refresh_token.is_empty()
        {
            return None;
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.settings.drive_client_id.as_str()),
            ("client_secret", self.settings.drive_client_secret.as_str()),
            ("refresh_token", self.settings.drive_refresh_token.as_str()),
        ];

        let response = match self.http.post(&self.token_url).form(&params).send() {
            Ok(response) => response,
            Err(e) => {
                log.debug(format!("Drive token refresh failed: {}", e));
                return None;
            }
        };

        let code = response.status().as_u16();
        if code != 200 {
            log.debug(format!("Drive token refresh HTTP {}", code));
            return None;
        }

        let body: serde_json::Value = match response.json() {
            Ok(body) => body,
            Err(e) => {
                log.debug(format!("Drive token refresh parse error: {}", e));
                return None;
            }
        };

        let token = body.get("access_token").and_then(|v| v.as_str())?;
        self.settings.drive_token = token.to_string();
        self.token_refreshed = true;
        Some(self.settings.drive_token.clone())
    }

    fn upload_drive_file(&self, name: &str, bytes: &[u8], token: &str, log: &mut RunLog) {
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();

        let body = build_multipart_body(name, bytes, &boundary, &self.settings.drive_folder_id);

        let response = self
            .http
            .post(&self.drive_upload_url)
            .header("Authorization", format!("Bearer {}", token))
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send();

        match response {
            Ok(response) => {
                let code = response.status().as_u16();
                if code == 200 || code == 201 {
                    let id = response
                        .json::<serde_json::Value>()
                        .ok()
                        .and_then(|body| body.get("id").and_then(|v| v.as_str()).map(String::from))
                        .unwrap_or_else(|| "unknown".into());
                    log.debug(format!("Drive sync ok: file id {}", id));
                } else {
                    log.debug(format!("Drive sync HTTP {} for {}", code, name));
                }
            }
            Err(e) => log.debug(format!("Drive sync failed for {}: {}", name, e)),
        }
    }

    // -- pull ---------------------------------------------------------------

    /// Fetches one file from the GitHub target at the configured branch and
    /// path prefix.
    pub fn fetch_github(&self, path: &str) -> Result<RemoteFile> {
        let path = path.trim().trim_matches('/');
        if path.is_empty() {
            return Err(Error::UserInput("GitHub path is empty".into()));
        }
        if !self.settings.github_configured() {
            return Err(Error::Precondition("GitHub settings are missing".into()));
        }
        let (owner, repo) = self
            .settings
            .github_repo
            .trim()
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
            .ok_or_else(|| Error::UserInput("GitHub repo must be in owner/repo format".into()))?;

        let content_path = self.prefixed_path(path);
        let url = format!(
            "{}?ref={}",
            self.github_content_url(owner, repo, &content_path),
            encode_path_segment(self.settings.branch())
        );

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("token {}", self.settings.github_token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github.raw")
            .send()?;

        let code = response.status().as_u16();
        if code != 200 {
            return Err(Error::RemoteSync {
                target: "github".into(),
                message: format!("HTTP {} for {}", code, content_path),
            });
        }

        let bytes = response.bytes()?.to_vec();
        if bytes.is_empty() {
            return Err(Error::RemoteSync {
                target: "github".into(),
                message: "Empty response from GitHub".into(),
            });
        }

        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Ok(RemoteFile { name, bytes })
    }

    /// Fetches one object from the Drive target, inferring a display name
    /// from the response when the id does not imply one.
    pub fn fetch_drive(&mut self, file_id: &str, log: &mut RunLog) -> Result<RemoteFile> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(Error::UserInput("Drive file id is empty".into()));
        }

        let token = self
            .drive_access_token(log)
            .ok_or_else(|| Error::RemoteSync {
                target: "drive".into(),
                message: "Drive token is missing".into(),
            })?;

        let url = format!(
            "{}/{}?alt=media",
            self.drive_files_base,
            encode_path_segment(file_id)
        );

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()?;

        let code = response.status().as_u16();
        if code != 200 {
            return Err(Error::RemoteSync {
                target: "drive".into(),
                message: format!("HTTP {} for file {}", code, file_id),
            });
        }

        let disposition = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());

        let bytes = response.bytes()?.to_vec();
        if bytes.is_empty() {
            return Err(Error::RemoteSync {
                target: "drive".into(),
                message: "Empty response from Drive".into(),
            });
        }

        let name = infer_name(file_id, disposition.as_deref(), content_type.as_deref());
        Ok(RemoteFile { name, bytes })
    }
}

/// Multipart/related body: JSON metadata part naming the file (and parent
/// folder when configured), then the typed binary part.
fn build_multipart_body(name: &str, bytes: &[u8], boundary: &str, folder_id: &str) -> Vec<u8> {
    let mut metadata = json!({ "name": name });
    if !folder_id.is_empty() {
        metadata["parents"] = json!([folder_id]);
    }

    let content_type = match file_extension(name).as_str() {
        "zip" => "application/zip",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    };

    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());
    body
}

fn infer_name(file_id: &str, disposition: Option<&str>, content_type: Option<&str>) -> String {
    if let Some(disposition) = disposition {
        if let Some(pos) = disposition.find("filename=") {
            let raw = disposition[pos + "filename=".len()..]
                .trim_start_matches('"')
                .split(['"', ';'])
                .next()
                .unwrap_or_default()
                .trim();
            if !raw.is_empty() {
                return raw.rsplit(['/', '\\']).next().unwrap_or(raw).to_string();
            }
        }
    }

    match content_type {
        Some(ct) if ct.contains("zip") => format!("{}.zip", file_id),
        Some(ct) if ct.contains("markdown") || ct.contains("text/plain") => {
            format!("{}.md", file_id)
        }
        _ => file_id.to_string(),
    }
}

fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_path_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut boundary = max_chars;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}...", &text[..boundary])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_with(settings: SyncSettings) -> SyncAdapter {
        SyncAdapter::new(settings).unwrap()
    }

    #[test]
    fn test_overrides_beat_settings() {
        let settings = SyncSettings {
            github_enabled: true,
            ..Default::default()
        };
        let adapter = adapter_with(settings);

        assert!(adapter.github_enabled(&SyncOverrides::default()));
        assert!(!adapter.github_enabled(&SyncOverrides {
            github: Some(false),
            ..Default::default()
        }));
        assert!(adapter.drive_enabled(&SyncOverrides {
            drive: Some(true),
            ..Default::default()
        }));
    }

    #[test]
    fn test_overrides_from_configuration() {
        let settings = SyncSettings {
            github_repo: "octo/notes".into(),
            github_token: "tok".into(),
            ..Default::default()
        };

        let overrides = SyncOverrides::from_configuration(&settings);
        assert_eq!(overrides.github, Some(true));
        assert_eq!(overrides.drive, Some(false));
    }

    #[test]
    fn test_prefixed_path() {
        let settings = SyncSettings {
            github_repo: "octo/notes".into(),
            github_token: "tok".into(),
            github_path: "/exports/".into(),
            ..Default::default()
        };
        let adapter = adapter_with(settings);

        assert_eq!(adapter.prefixed_path("posts/a.md"), "exports/posts/a.md");
        assert_eq!(adapter.prefixed_path("/a.md"), "exports/a.md");
    }

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("a b/c#d.md"), "a%20b/c%23d.md");
        assert_eq!(encode_path_segment("ü"), "%C3%BC");
    }

    #[test]
    fn test_multipart_body_shape() {
        let body = build_multipart_body("export.zip", b"ZIPBYTES", "BOUNDARY", "folder9");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--BOUNDARY\r\n"));
        assert!(text.contains("Content-Type: application/json; charset=UTF-8"));
        assert!(text.contains("\"name\":\"export.zip\""));
        assert!(text.contains("\"parents\":[\"folder9\"]"));
        assert!(text.contains("Content-Type: application/zip"));
        assert!(text.contains("ZIPBYTES"));
        assert!(text.ends_with("--BOUNDARY--"));
    }

    #[test]
    fn test_multipart_body_markdown_without_folder() {
        let body = build_multipart_body("post.md", b"# Hi", "B", "");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("Content-Type: text/markdown"));
        assert!(!text.contains("parents"));
    }

    #[test]
    fn test_infer_name() {
        assert_eq!(
            infer_name("id1", Some("attachment; filename=\"export.zip\""), None),
            "export.zip"
        );
        assert_eq!(infer_name("id1", None, Some("application/zip")), "id1.zip");
        assert_eq!(infer_name("id1", None, Some("text/markdown")), "id1.md");
        assert_eq!(infer_name("id1", None, Some("image/png")), "id1");
    }

    #[test]
    fn test_invalid_repo_format_logged() {
        let settings = SyncSettings {
            github_repo: "not-a-repo".into(),
            github_token: "tok".into(),
            ..Default::default()
        };
        let adapter = adapter_with(settings);

        let mut log = RunLog::new();
        assert!(adapter.github_coordinates(&mut log).is_none());
        assert!(log.contains("invalid repo format"));
    }
}
