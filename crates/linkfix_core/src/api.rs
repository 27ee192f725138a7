//! MediaWiki Action API client backing the production `LinkSource` and
//! `ContentStore` implementations.
//!
//! The original maintenance pass ran inside the wiki and read the
//! `externallinks` table directly; from the outside the same rows come from
//! `list=exturlusage`, page content from `prop=revisions|info`, and the
//! write-back from `action=edit`. Reads are anonymous; the first save logs
//! in with the configured bot account and caches a csrf token.

use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::config::LinkfixConfig;
use crate::store::{ContentStore, LinkRecord, LinkSource, PageDocument, SaveOptions};

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub bot_username: Option<String>,
    pub bot_password: Option<String>,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &LinkfixConfig) -> Self {
        Self {
            api_url: config.api_url().unwrap_or_default(),
            user_agent: config.user_agent(),
            bot_username: config.bot_username(),
            bot_password: config.bot_password(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
    logged_in: bool,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
            logged_in: false,
        })
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(false);
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    check_api_error(&payload)?;
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn request_json_post(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        // Writes are not retried: a duplicate edit is worse than a missed one.
        self.apply_rate_limit(true);
        let response = self
            .client
            .post(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .form(&pairs)
            .send()
            .context("failed to call MediaWiki API")?;
        let status = response.status();
        if !status.is_success() {
            bail!("MediaWiki API request failed with HTTP {status}");
        }
        let payload: Value = response
            .json()
            .context("failed to decode MediaWiki API JSON response")?;
        check_api_error(&payload)?;
        Ok(payload)
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }

    fn ensure_login(&mut self) -> Result<()> {
        if self.logged_in {
            return Ok(());
        }
        let (username, password) = match (
            self.config.bot_username.clone(),
            self.config.bot_password.clone(),
        ) {
            (Some(username), Some(password)) => (username, password),
            _ => bail!(
                "bot credentials are required to save pages; set WIKI_BOT_USERNAME and WIKI_BOT_PASSWORD"
            ),
        };

        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.logintoken.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(&[
            ("action", "login".to_string()),
            ("lgname", username),
            ("lgpassword", password),
            ("lgtoken", login_token),
        ])?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.logged_in = true;
                self.csrf_token = None;
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.csrftoken.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }

    fn query_single_page(&mut self, selector: (&'static str, String)) -> Result<Option<PageDocument>> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            selector,
            ("prop", "revisions|info".to_string()),
            ("rvprop", "content".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        let parsed: QueryResponse =
            serde_json::from_value(response).context("failed to decode page content response")?;

        let page = match parsed.query.pages.into_iter().next() {
            Some(page) => page,
            None => return Ok(None),
        };
        if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
            return Ok(None);
        }
        let page_id = match page.pageid {
            Some(value) => value,
            None => return Ok(None),
        };
        let text = match page
            .revisions
            .first()
            .and_then(|revision| revision.slots.as_ref())
            .and_then(|slots| slots.main.as_ref())
        {
            Some(slot) => slot.content.clone(),
            None => return Ok(None),
        };

        Ok(Some(PageDocument {
            page_id,
            title: page.title,
            is_redirect: page.redirect,
            text,
        }))
    }
}

impl LinkSource for MediaWikiClient {
    /// All recorded external links, in the API's natural row order. Archive
    /// filtering stays client-side so row indices keep their offset meaning.
    fn external_links(&mut self) -> Result<Vec<LinkRecord>> {
        let mut records = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "exturlusage".to_string()),
                ("euprop", "ids|url".to_string()),
                ("eulimit", "500".to_string()),
            ];
            if let Some(token) = &continue_token {
                params.push(("eucontinue", token.clone()));
            }

            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode exturlusage API response")?;

            for item in parsed.query.exturlusage {
                records.push(LinkRecord {
                    page_id: item.pageid,
                    target_url: item.url,
                });
            }

            continue_token = parsed.continuation.and_then(|cont| cont.eucontinue);
            if continue_token.is_none() {
                break;
            }
        }

        Ok(records)
    }
}

impl ContentStore for MediaWikiClient {
    fn page_by_id(&mut self, page_id: i64) -> Result<Option<PageDocument>> {
        self.query_single_page(("pageids", page_id.to_string()))
    }

    fn page_by_title(&mut self, title: &str) -> Result<Option<PageDocument>> {
        self.query_single_page(("titles", title.to_string()))
    }

    fn save_text(&mut self, page: &PageDocument, text: &str, options: &SaveOptions) -> Result<()> {
        self.ensure_login()?;
        let token = self.ensure_csrf_token()?;

        let mut params = vec![
            ("action", "edit".to_string()),
            ("pageid", page.page_id.to_string()),
            ("text", text.to_string()),
            ("summary", options.summary.clone()),
            ("nocreate", "1".to_string()),
            ("token", token),
        ];
        if options.suppress_recent_changes {
            params.push(("bot", "1".to_string()));
        }

        let response = self.request_json_post(&params)?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                page.title,
                edit.result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }
}

fn check_api_error(payload: &Value) -> Result<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    exturlusage: Vec<ExtUrlUsageItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    eucontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtUrlUsageItem {
    pageid: i64,
    url: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<i64>,
    title: String,
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    redirect: bool,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
