//! Authenticated HTTP session and the login handshake that produces it.
//!
//! The service has no documented API. Logging in means scraping a one-time
//! form token from the landing page, posting credentials, then locating a
//! versioned script on the protected page that carries the file access token
//! (`sf`) and the catalog endpoint path.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

static INPUT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid regex"));

static TOKEN_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bname\s*=\s*["']token["']"#).expect("valid regex"));

static VALUE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bvalue\s*=\s*["']([^"']*)["']"#).expect("valid regex"));

static SCRIPT_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static SF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sf\s*:\s*'(\w+)'").expect("valid regex"));

static ENDPOINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"url:\s*'([^']+)'").expect("valid regex"));

/// Account credentials. The password is redacted from `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    /// Account user name (an e-mail address).
    pub username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// An HTTP session bound to one service root.
///
/// Cloning is cheap and every clone shares the same cookie store and
/// connection pool, so one session can serve all concurrent download tasks.
#[derive(Debug, Clone)]
pub struct Session {
    http: reqwest::Client,
    base_url: Url,
    download_endpoint: String,
}

impl Session {
    /// Builds a session with a cookie store and the service's expected headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid, a header value is not
    /// representable, or the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Config(format!("user_agent: {e}")))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(
            HeaderName::from_static("x-request-reason"),
            HeaderValue::from_str(&config.request_reason)
                .map_err(|e| Error::Config(format!("request_reason: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .pool_max_idle_per_host(config.pool_size)
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(&config.base_url)?,
            download_endpoint: config.download_endpoint.clone(),
        })
    }

    /// Returns the underlying HTTP client.
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns the service root.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a path (absolute or relative) against the service root.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL is invalid.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Builds the download URL for one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the download endpoint cannot be joined onto the root.
    pub fn file_url(&self, access_token: &str, file_id: &str) -> Result<Url> {
        let mut url = self.resolve(&self.download_endpoint)?;
        url.query_pairs_mut()
            .append_pair("flags", "1")
            .append_pair("sfile", access_token)
            .append_pair("file", file_id);
        Ok(url)
    }

    /// GETs a page and returns its body, failing on any non-200 status.
    async fn get_text(&self, url: Url) -> Result<String> {
        let response = self.http.get(url.clone()).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Everything later stages need from a successful login.
#[derive(Debug, Clone)]
pub struct Bootstrapped {
    /// Logged-in session.
    pub session: Session,
    /// File access token (`sf`) required by the download endpoint.
    pub access_token: String,
    /// Catalog endpoint path, relative to the service root.
    pub catalog_endpoint: String,
}

/// Logs in and extracts the access token and catalog endpoint.
///
/// # Errors
///
/// Returns [`Error::Bootstrap`] if the login token, the login itself, or the
/// session parameters fail, and transport errors as they occur.
pub async fn bootstrap(config: &Config, credentials: &Credentials) -> Result<Bootstrapped> {
    let session = Session::new(config)?;
    let root = session.base_url().clone();

    let landing = session.get_text(root.clone()).await?;
    let Some(token) = extract_login_token(&landing) else {
        log::debug!("Landing page without login token: {landing}");
        return Err(Error::Bootstrap("login token not found".to_string()));
    };

    let response = session
        .http()
        .post(root.clone())
        .form(&[
            ("us", credentials.username.as_str()),
            ("ps", credentials.password.as_str()),
            ("token", token.as_str()),
        ])
        .send()
        .await?;
    let status = response.status();
    log::info!("Login response: {status}");
    if status.is_client_error() || status.is_server_error() {
        return Err(Error::Bootstrap(format!("login rejected with status {status}")));
    }

    let page = session.get_text(root).await?;
    log::info!("Accessed protected page");

    for src in extract_versioned_scripts(&page) {
        let script_url = session.resolve(&src)?;
        match session.get_text(script_url.clone()).await {
            Ok(js) => {
                log::info!("Fetched script {script_url}");
                if let Some((access_token, catalog_endpoint)) = extract_script_params(&js) {
                    return Ok(Bootstrapped {
                        session,
                        access_token,
                        catalog_endpoint,
                    });
                }
            }
            Err(e) => log::error!("Failed to fetch script {script_url}: {e}"),
        }
    }

    Err(Error::Bootstrap(
        "access token and catalog endpoint not found".to_string(),
    ))
}

/// Finds the value of the `<input name="token">` element.
#[must_use]
pub fn extract_login_token(html: &str) -> Option<String> {
    INPUT_TAG_RE
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| TOKEN_NAME_RE.is_match(tag))
        .find_map(|tag| VALUE_ATTR_RE.captures(tag).map(|c| c[1].to_string()))
}

/// Lists `src` attributes of script tags that carry a version query (`v=`).
#[must_use]
pub fn extract_versioned_scripts(html: &str) -> Vec<String> {
    SCRIPT_SRC_RE
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|src| src.contains("v="))
        .collect()
}

/// Extracts `(sf, catalog endpoint)` from script source. Both must be present.
#[must_use]
pub fn extract_script_params(js: &str) -> Option<(String, String)> {
    let sf = SF_RE.captures(js)?[1].to_string();
    let endpoint = ENDPOINT_RE.captures(js)?[1].to_string();
    Some((sf, endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
        <script src="/static/vendor.js"></script>
        <script type="text/javascript" src="/static/app.js?v=42"></script>
        </head><body>
        <form method="post">
          <input type="hidden" value="abc123" name="token">
          <input name="us"><input name="ps" type="password">
        </form></body></html>
    "#;

    const SCRIPT: &str = r"
        var cfg = { sf : 'deadbeef01', other: 1 };
        $.ajax({ url: '/cloudia_api/files/list', type: 'POST' });
    ";

    #[test]
    fn login_token_found_regardless_of_attribute_order() {
        assert_eq!(extract_login_token(PAGE).as_deref(), Some("abc123"));
        let alt = r#"<input name='token' value='xyz'/>"#;
        assert_eq!(extract_login_token(alt).as_deref(), Some("xyz"));
    }

    #[test]
    fn login_token_missing() {
        assert_eq!(extract_login_token("<input name=\"us\" value=\"a\">"), None);
    }

    #[test]
    fn only_versioned_scripts_are_listed() {
        assert_eq!(extract_versioned_scripts(PAGE), vec!["/static/app.js?v=42"]);
    }

    #[test]
    fn script_params_need_both_values() {
        assert_eq!(
            extract_script_params(SCRIPT),
            Some(("deadbeef01".to_string(), "/cloudia_api/files/list".to_string()))
        );
        assert_eq!(extract_script_params("sf: 'abc'"), None);
        assert_eq!(extract_script_params("url: '/x'"), None);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("me@example.com", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("me@example.com"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn file_url_carries_token_and_id() {
        let config = Config::new().with_base_url("https://cloud.example");
        let session = Session::new(&config).unwrap();
        let url = session.file_url("SF", "f 1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://cloud.example/cloudia_api/core/get_file?flags=1&sfile=SF&file=f+1"
        );
    }

    #[tokio::test]
    async fn bootstrap_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(PAGE)
            .expect(2)
            .create_async()
            .await;
        let login = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("us".into(), "me@example.com".into()),
                mockito::Matcher::UrlEncoded("ps".into(), "pw".into()),
                mockito::Matcher::UrlEncoded("token".into(), "abc123".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;
        let script = server
            .mock("GET", "/static/app.js")
            .match_query(mockito::Matcher::UrlEncoded("v".into(), "42".into()))
            .with_status(200)
            .with_body(SCRIPT)
            .create_async()
            .await;

        let config = Config::new().with_base_url(server.url());
        let creds = Credentials::new("me@example.com", "pw");
        let boot = bootstrap(&config, &creds).await.unwrap();

        assert_eq!(boot.access_token, "deadbeef01");
        assert_eq!(boot.catalog_endpoint, "/cloudia_api/files/list");
        page.assert_async().await;
        login.assert_async().await;
        script.assert_async().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_on_rejected_login() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(PAGE)
            .create_async()
            .await;
        let _login = server
            .mock("POST", "/")
            .with_status(403)
            .create_async()
            .await;

        let config = Config::new().with_base_url(server.url());
        let err = bootstrap(&config, &Credentials::new("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bootstrap(_)));
    }
}
