//! OAuth2 credential management
//!
//! Parses the Google client key file, persists the granted tokens with
//! owner-only permissions, and refreshes the access token through the
//! standard token endpoint once it nears expiry. The interactive
//! authorization-code + PKCE flow for the first grant lives here as well,
//! driven by the `auth` subcommand.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::debug;
use url::Url;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const OAUTH_SCOPES: &str = "https://www.googleapis.com/auth/gmail.modify \
     https://www.googleapis.com/auth/gmail.settings.basic";

/// OAuth client identity parsed from the Google key file
///
/// The secret is wrapped in `SecretString` so it never lands in logs.
#[derive(Debug, Clone)]
pub struct ClientKeys {
    pub client_id: String,
    pub client_secret: Option<SecretString>,
}

/// Load and validate the OAuth client key file
///
/// Accepts both the `installed` and `web` layouts produced by the Google
/// Cloud console.
///
/// # Errors
///
/// Returns `AuthFailed` when the file is missing, unparseable, or lacks a
/// client id.
pub fn load_client_keys(path: &Path) -> AppResult<ClientKeys> {
    let raw = fs::read_to_string(path).map_err(|e| {
        AppError::AuthFailed(format!(
            "cannot read oauth key file {}: {e}; download it from the Google Cloud console",
            path.display()
        ))
    })?;

    let key_file: KeyFile = serde_json::from_str(&raw).map_err(|e| {
        AppError::AuthFailed(format!(
            "oauth key file {} is not valid JSON: {e}",
            path.display()
        ))
    })?;

    let entry = key_file.installed.or(key_file.web).ok_or_else(|| {
        AppError::AuthFailed(format!(
            "oauth key file {} contains neither an `installed` nor a `web` section",
            path.display()
        ))
    })?;

    let client_id = entry
        .client_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            AppError::AuthFailed(format!(
                "oauth key file {} is missing a client_id",
                path.display()
            ))
        })?;

    Ok(ClientKeys {
        client_id,
        client_secret: entry
            .client_secret
            .filter(|secret| !secret.is_empty())
            .map(|secret| SecretString::new(secret.into())),
    })
}

#[derive(Debug, Deserialize)]
struct KeyFile {
    installed: Option<KeyFileEntry>,
    web: Option<KeyFileEntry>,
}

#[derive(Debug, Deserialize)]
struct KeyFileEntry {
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// Granted OAuth tokens as persisted on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_unix: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenSet {
    /// Refresh this long before the recorded expiry to absorb clock drift
    const EXPIRY_SKEW_SECS: u64 = 30;

    /// Whether the access token is expired (or will be within the skew)
    pub fn is_expired(&self, now: SystemTime) -> bool {
        let Some(expires_at) = self.expires_at_unix else {
            return false;
        };

        let Ok(elapsed) = now.duration_since(UNIX_EPOCH) else {
            return false;
        };

        elapsed
            .as_secs()
            .saturating_add(Self::EXPIRY_SKEW_SECS)
            >= expires_at
    }

    /// Seconds until expiry, negative when already expired
    pub fn expires_in_seconds(&self, now: SystemTime) -> Option<i64> {
        let expires_at = self.expires_at_unix? as i64;
        let now_secs = now.duration_since(UNIX_EPOCH).ok()?.as_secs() as i64;
        Some(expires_at - now_secs)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// File-backed token persistence
///
/// Tokens are written as pretty JSON with `0o600` permissions so other local
/// users cannot read the grant.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the stored token, `None` when no grant exists yet
    pub fn load(&self) -> AppResult<Option<TokenSet>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path).map_err(|e| {
            AppError::Internal(format!(
                "cannot read token file {}: {e}",
                self.path.display()
            ))
        })?;

        let token = serde_json::from_str(&raw).map_err(|e| {
            AppError::AuthFailed(format!(
                "token file {} is not valid JSON: {e}; re-run the auth subcommand",
                self.path.display()
            ))
        })?;

        Ok(Some(token))
    }

    /// Persist the token, creating parent directories as needed
    pub fn save(&self, token: &TokenSet) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Internal(format!(
                    "cannot create token directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let payload = serde_json::to_string_pretty(token)
            .map_err(|e| AppError::Internal(format!("cannot serialize token: {e}")))?;
        fs::write(&self.path, payload).map_err(|e| {
            AppError::Internal(format!(
                "cannot write token file {}: {e}",
                self.path.display()
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(&self.path)
                .map_err(|e| AppError::Internal(format!("cannot stat token file: {e}")))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .map_err(|e| AppError::Internal(format!("cannot restrict token file: {e}")))?;
        }

        Ok(())
    }
}

/// Token source handed to the tool layer
///
/// Loads the stored grant lazily, refreshes it transparently when expired,
/// and persists every refreshed grant. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Authenticator {
    keys: ClientKeys,
    store: FileTokenStore,
    http: reqwest::Client,
    token_endpoint: String,
    cached: tokio::sync::Mutex<Option<TokenSet>>,
}

impl Authenticator {
    /// Build an authenticator against the standard Google token endpoint
    ///
    /// # Errors
    ///
    /// Fails when the key file cannot be loaded or the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ServerConfig) -> AppResult<Self> {
        Self::with_token_endpoint(config, GOOGLE_TOKEN_ENDPOINT)
    }

    /// Build an authenticator against a custom token endpoint
    ///
    /// Used by tests and by deployments that route token traffic through a
    /// local broker.
    pub fn with_token_endpoint(config: &ServerConfig, token_endpoint: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("cannot build http client: {e}")))?;

        Ok(Self {
            keys: load_client_keys(&config.key_file)?,
            store: FileTokenStore::new(config.token_file.clone()),
            http,
            token_endpoint: token_endpoint.trim_end_matches('/').to_owned(),
            cached: tokio::sync::Mutex::new(None),
        })
    }

    /// Current access token, refreshing and persisting it when expired
    ///
    /// # Errors
    ///
    /// Returns `AuthFailed` when no grant is stored, the grant lacks a
    /// refresh token, or the token endpoint rejects the refresh.
    pub async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = self.store.load()?;
        }

        let Some(current) = cached.as_ref() else {
            return Err(AppError::AuthFailed(
                "no stored credentials; run the `auth` subcommand first".to_owned(),
            ));
        };

        if !current.is_expired(SystemTime::now()) {
            return Ok(current.access_token.clone());
        }

        let refresh_token = current.refresh_token.clone().ok_or_else(|| {
            AppError::AuthFailed(
                "access token expired and no refresh token is stored; run the `auth` subcommand again"
                    .to_owned(),
            )
        })?;

        debug!("access token expired, refreshing");
        let refreshed = self.refresh(&refresh_token).await?;
        self.store.save(&refreshed)?;
        let access_token = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access_token)
    }

    /// Run the interactive authorization-code + PKCE flow and store the grant
    ///
    /// Opens the consent page in a browser when possible, captures the
    /// redirect on the configured loopback port, exchanges the code, and
    /// persists the resulting token set.
    pub async fn login(&self, config: &ServerConfig) -> AppResult<TokenSet> {
        let redirect_uri = config.redirect_uri();
        let flow = build_login_flow(&self.keys, &redirect_uri)?;

        if open_browser(&flow.authorization_url) {
            eprintln!("opened the Google consent page in your browser; waiting for the redirect");
        } else {
            eprintln!(
                "open this URL in your browser to continue:\n{}",
                flow.authorization_url
            );
        }

        let code = wait_for_callback(
            config.redirect_port,
            &flow.state,
            Duration::from_secs(config.auth_timeout_secs),
        )
        .await?;

        let token = self
            .exchange_code(&code, &flow.code_verifier, &redirect_uri)
            .await?;
        self.store.save(&token)?;
        Ok(token)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> AppResult<TokenSet> {
        let mut form = HashMap::from([
            ("grant_type", "authorization_code".to_owned()),
            ("code", code.to_owned()),
            ("client_id", self.keys.client_id.clone()),
            ("redirect_uri", redirect_uri.to_owned()),
            ("code_verifier", code_verifier.to_owned()),
        ]);
        if let Some(secret) = &self.keys.client_secret {
            form.insert("client_secret", secret.expose_secret().to_owned());
        }

        self.post_token_form(&form).await
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenSet> {
        let mut form = HashMap::from([
            ("grant_type", "refresh_token".to_owned()),
            ("refresh_token", refresh_token.to_owned()),
            ("client_id", self.keys.client_id.clone()),
        ]);
        if let Some(secret) = &self.keys.client_secret {
            form.insert("client_secret", secret.expose_secret().to_owned());
        }

        let mut token = self.post_token_form(&form).await?;
        // Google omits the refresh token on refresh responses; keep the old one.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_owned());
        }
        Ok(token)
    }

    async fn post_token_form(&self, form: &HashMap<&str, String>) -> AppResult<TokenSet> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("token endpoint request timed out: {e}"))
                } else {
                    AppError::Internal(format!("token endpoint request failed: {e}"))
                }
            })?;

        parse_token_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

async fn parse_token_response(response: reqwest::Response) -> AppResult<TokenSet> {
    let status = response.status();
    if status.is_success() {
        let payload: TokenResponse = response.json().await.map_err(|e| {
            AppError::Internal(format!("token endpoint returned unreadable JSON: {e}"))
        })?;
        return Ok(TokenSet {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_at_unix: expires_at_unix(payload.expires_in),
            token_type: payload.token_type,
            scope: payload.scope,
        });
    }

    let body = response.text().await.unwrap_or_default();
    if let Ok(payload) = serde_json::from_str::<TokenErrorResponse>(&body) {
        let error = payload.error.unwrap_or_else(|| "unknown_error".to_owned());
        let description = payload
            .error_description
            .unwrap_or_else(|| "no description".to_owned());
        return Err(AppError::AuthFailed(format!(
            "token exchange failed ({status}): {error} ({description})"
        )));
    }

    Err(AppError::AuthFailed(format!(
        "token exchange failed ({status}): {body}"
    )))
}

/// Absolute expiry instant derived from a relative `expires_in`
fn expires_at_unix(expires_in: Option<u64>) -> Option<u64> {
    let expires_in = expires_in?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(now.saturating_add(expires_in))
}

#[derive(Debug)]
struct LoginFlow {
    authorization_url: String,
    code_verifier: String,
    state: String,
}

/// Assemble the consent URL with a fresh state and PKCE challenge
fn build_login_flow(keys: &ClientKeys, redirect_uri: &str) -> AppResult<LoginFlow> {
    let state = random_token(32);
    let code_verifier = random_token(96);
    let code_challenge = pkce_challenge(&code_verifier);

    let mut url = Url::parse(GOOGLE_AUTH_ENDPOINT)
        .map_err(|e| AppError::Internal(format!("invalid authorization endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &keys.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", OAUTH_SCOPES)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", &state)
        .append_pair("code_challenge", &code_challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(LoginFlow {
        authorization_url: url.to_string(),
        code_verifier,
        state,
    })
}

/// Serve the loopback redirect until the consent flow lands on `/callback`
///
/// Stray browser requests (favicons, health probes) get a 404 and the wait
/// continues; only the callback path resolves the flow, successfully or not.
async fn wait_for_callback(
    port: u16,
    expected_state: &str,
    timeout: Duration,
) -> AppResult<String> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
        AppError::AuthFailed(format!(
            "cannot bind the oauth callback listener on 127.0.0.1:{port}: {e}"
        ))
    })?;

    time::timeout(timeout, async {
        loop {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| AppError::Internal(format!("oauth callback accept failed: {e}")))?;

            let mut buf = vec![0_u8; 8192];
            let size = stream
                .read(&mut buf)
                .await
                .map_err(|e| AppError::Internal(format!("oauth callback read failed: {e}")))?;
            if size == 0 {
                continue;
            }

            let request = String::from_utf8_lossy(&buf[..size]);
            let Some(target) = request_target(&request) else {
                let _ = respond(&mut stream, "405 Method Not Allowed", "unsupported request").await;
                continue;
            };

            if !target.starts_with("/callback") {
                let _ = respond(&mut stream, "404 Not Found", "not the oauth callback").await;
                continue;
            }

            match parse_callback(target, expected_state) {
                Ok(code) => {
                    let _ = respond(
                        &mut stream,
                        "200 OK",
                        "authorization complete. you can return to the terminal.",
                    )
                    .await;
                    return Ok(code);
                }
                Err(err) => {
                    let _ = respond(
                        &mut stream,
                        "400 Bad Request",
                        "authorization failed. check the terminal for details.",
                    )
                    .await;
                    return Err(err);
                }
            }
        }
    })
    .await
    .map_err(|_| AppError::Timeout("timed out waiting for the oauth callback".to_owned()))?
}

/// Target of a GET request line, `None` for anything else
fn request_target(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    (method == "GET").then_some(target)
}

/// Extract the authorization code from the callback query string
///
/// Verifies the anti-forgery state and surfaces provider-reported errors.
fn parse_callback(target: &str, expected_state: &str) -> AppResult<String> {
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| AppError::AuthFailed(format!("malformed oauth callback target: {e}")))?;

    let mut code = None;
    let mut state = None;
    let mut oauth_error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => oauth_error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = oauth_error {
        return Err(AppError::AuthFailed(format!(
            "authorization was refused: {error}"
        )));
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AppError::AuthFailed(
            "oauth state mismatch; aborting login".to_owned(),
        ));
    }

    code.ok_or_else(|| {
        AppError::AuthFailed("oauth callback is missing the code parameter".to_owned())
    })
}

/// Write a minimal fixed HTML page and close the connection
async fn respond(stream: &mut TcpStream, status: &str, message: &str) -> AppResult<()> {
    let body = format!("<!doctype html><html><body><p>{message}</p></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| AppError::Internal(format!("oauth callback write failed: {e}")))?;
    let _ = stream.shutdown().await;
    Ok(())
}

/// Random URL-safe token of `len` source bytes
fn random_token(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    rand::thread_rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 PKCE challenge for a code verifier
fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Best-effort attempt to open the consent URL in the default browser
fn open_browser(url: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        return std::process::Command::new("open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }

    #[cfg(target_os = "linux")]
    {
        return std::process::Command::new("xdg-open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }

    #[cfg(target_os = "windows")]
    {
        return std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()
            .is_ok_and(|status| status.success());
    }

    #[allow(unreachable_code)]
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at_unix: Option<u64>) -> TokenSet {
        TokenSet {
            access_token: "access".to_owned(),
            refresh_token: Some("refresh".to_owned()),
            expires_at_unix,
            token_type: Some("Bearer".to_owned()),
            scope: None,
        }
    }

    fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs()
    }

    #[test]
    fn expiry_check_applies_the_skew() {
        let now = SystemTime::now();
        assert!(token(Some(now_unix() + 10)).is_expired(now));
        assert!(!token(Some(now_unix() + 120)).is_expired(now));
        assert!(!token(None).is_expired(now));
    }

    #[test]
    fn store_round_trips_and_restricts_permissions() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileTokenStore::new(dir.path().join("nested").join("token.json"));

        assert!(store.load().expect("load empty").is_none());
        store.save(&token(Some(12345))).expect("save token");

        let loaded = store.load().expect("load saved").expect("token present");
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.expires_at_unix, Some(12345));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = fs::metadata(dir.path().join("nested").join("token.json"))
                .expect("stat token file")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn key_file_accepts_installed_and_web_layouts() {
        let dir = tempfile::tempdir().expect("temp dir");

        let installed = dir.path().join("installed.json");
        fs::write(
            &installed,
            r#"{"installed": {"client_id": "id-1", "client_secret": "s3cret"}}"#,
        )
        .expect("write key file");
        let keys = load_client_keys(&installed).expect("installed keys");
        assert_eq!(keys.client_id, "id-1");
        assert!(keys.client_secret.is_some());

        let web = dir.path().join("web.json");
        fs::write(&web, r#"{"web": {"client_id": "id-2"}}"#).expect("write key file");
        let keys = load_client_keys(&web).expect("web keys");
        assert_eq!(keys.client_id, "id-2");
        assert!(keys.client_secret.is_none());

        let neither = dir.path().join("neither.json");
        fs::write(&neither, r#"{}"#).expect("write key file");
        assert!(load_client_keys(&neither).is_err());
    }

    #[test]
    fn callback_parsing_checks_state_and_surfaces_errors() {
        let code = parse_callback("/callback?code=abc123&state=xyz", "xyz").expect("valid callback");
        assert_eq!(code, "abc123");

        assert!(parse_callback("/callback?code=abc123&state=wrong", "xyz").is_err());
        assert!(parse_callback("/callback?state=xyz", "xyz").is_err());
        assert!(parse_callback("/callback?error=access_denied&state=xyz", "xyz").is_err());
    }

    #[test]
    fn pkce_challenge_matches_the_reference_vector() {
        // RFC 7636 appendix B
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn random_tokens_are_url_safe_and_unique() {
        let a = random_token(32);
        let b = random_token(32);
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn request_target_accepts_only_get() {
        assert_eq!(
            request_target("GET /callback?code=x HTTP/1.1\r\nHost: h\r\n\r\n"),
            Some("/callback?code=x")
        );
        assert_eq!(request_target("POST /callback HTTP/1.1\r\n\r\n"), None);
        assert_eq!(request_target(""), None);
    }

    #[tokio::test]
    async fn refresh_exchanges_and_persists_a_new_grant() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&mock)
            .await;

        let dir = tempfile::tempdir().expect("temp dir");
        let key_file = dir.path().join("keys.json");
        fs::write(
            &key_file,
            r#"{"installed": {"client_id": "id-1", "client_secret": "s3cret"}}"#,
        )
        .expect("write key file");

        let token_file = dir.path().join("token.json");
        FileTokenStore::new(token_file.clone())
            .save(&token(Some(now_unix().saturating_sub(60))))
            .expect("seed expired token");

        let config = ServerConfig {
            key_file,
            token_file: token_file.clone(),
            api_base_url: "http://unused.invalid".to_owned(),
            redirect_port: 8787,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            auth_timeout_secs: 5,
        };

        let authenticator =
            Authenticator::with_token_endpoint(&config, &format!("{}/token", mock.uri()))
                .expect("authenticator");

        let access = authenticator.access_token().await.expect("refreshed token");
        assert_eq!(access, "fresh-token");

        let persisted = FileTokenStore::new(token_file)
            .load()
            .expect("load persisted")
            .expect("token present");
        assert_eq!(persisted.access_token, "fresh-token");
        // the endpoint omitted the refresh token, so the old one is kept
        assert_eq!(persisted.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn refresh_rejection_maps_to_auth_failure() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been revoked."
            })))
            .mount(&mock)
            .await;

        let dir = tempfile::tempdir().expect("temp dir");
        let key_file = dir.path().join("keys.json");
        fs::write(&key_file, r#"{"installed": {"client_id": "id-1"}}"#).expect("write key file");

        let token_file = dir.path().join("token.json");
        FileTokenStore::new(token_file.clone())
            .save(&token(Some(now_unix().saturating_sub(60))))
            .expect("seed expired token");

        let config = ServerConfig {
            key_file,
            token_file,
            api_base_url: "http://unused.invalid".to_owned(),
            redirect_port: 8787,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            auth_timeout_secs: 5,
        };

        let authenticator =
            Authenticator::with_token_endpoint(&config, &format!("{}/token", mock.uri()))
                .expect("authenticator");

        let err = authenticator.access_token().await.expect_err("refresh must fail");
        let message = err.to_string();
        assert!(message.contains("invalid_grant"), "unexpected error: {message}");
    }
}
