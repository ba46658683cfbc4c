use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderValue, SET_COOKIE};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::error::{PipelineError, Result};

/// Authenticated transport handle for one course site.
///
/// Cheap to clone: the underlying client and cookie jar are shared.
#[derive(Clone)]
pub struct SiteClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    origin: Url,
}

impl SiteClient {
    pub fn new(user_agent: &str, jar: Arc<Jar>, origin: Url) -> Result<Self> {
        HeaderValue::from_str(user_agent)
            .map_err(|_| PipelineError::Parse("user agent is not a valid header value".into()))?;
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(user_agent)
            .build()
            .map_err(|e| PipelineError::transport(origin.as_str(), e))?;
        Ok(Self {
            client,
            jar,
            origin,
        })
    }

    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        debug!(url, "GET");
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::transport(url, e))
    }

    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        debug!(url, "POST");
        self.client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| PipelineError::transport(url, e))
    }

    /// GETs a page and returns its body. Any non-2xx status is an error.
    pub async fn get_page(&self, url: &str) -> Result<String> {
        let response = ensure_success(self.get(url).await?)?;
        response
            .text()
            .await
            .map_err(|e| PipelineError::transport(url, e))
    }

    /// `name=value` pairs the jar would send to the site origin.
    #[must_use]
    pub fn cookie_pairs(&self) -> Vec<(String, String)> {
        let Some(header) = self.jar.cookies(&self.origin) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            warn!("cookie header is not valid UTF-8");
            return Vec::new();
        };
        header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Fails on anything outside 2xx, logging the status the way the site reports it.
pub fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    match status.as_u16() {
        403 => warn!(url, "403 Forbidden"),
        404 => warn!(url, "404 Resource not found"),
        500 => warn!(url, "500 Server error"),
        code => warn!(url, status = code, "Unexpected status code"),
    }
    Err(PipelineError::HttpError {
        url,
        status: status.as_u16(),
    })
}

/// Raw `Set-Cookie` header values of a response.
#[must_use]
pub fn set_cookie_headers(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}

pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

pub(crate) fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect()
}

/// The site answers throttled clients with a captcha wall.
#[must_use]
pub fn has_captcha(page: &Html) -> bool {
    element_text(page.root_element())
        .to_lowercase()
        .contains("captcha")
}

/// A "Sign In" button or link means the session is not logged in.
#[must_use]
pub fn requires_login(page: &Html) -> bool {
    page.select(&selector("button, a"))
        .any(|element| element_text(element).to_lowercase().contains("sign in"))
}
