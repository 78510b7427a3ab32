//! Yahoo Finance session handling.
//!
//! The quote summary endpoint rejects requests without a crumb token that is
//! bound to a session cookie. The cookie comes from `fc.yahoo.com` and lands in
//! the client's cookie jar; the crumb is then read from `/v1/test/getcrumb`.

use reqwest::{header::REFERER, Client};
use tokio::sync::Mutex;
use valuation_core::ValuationError;

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_ENDPOINTS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const FINANCE_REFERER: &str = "https://finance.yahoo.com/";

#[derive(Default)]
pub(crate) struct CrumbManager {
    crumb: Mutex<Option<String>>,
}

impl CrumbManager {
    /// Cached crumb, fetching a new session when there is none.
    pub(crate) async fn crumb(&self, client: &Client) -> Result<String, ValuationError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }
        let fresh = fetch_crumb(client).await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    pub(crate) async fn invalidate(&self) {
        *self.crumb.lock().await = None;
    }
}

async fn fetch_crumb(client: &Client) -> Result<String, ValuationError> {
    // fc.yahoo.com usually answers 404 but still sets the session cookie
    if let Err(e) = client
        .get(COOKIE_URL)
        .header(REFERER, FINANCE_REFERER)
        .send()
        .await
    {
        tracing::debug!("Yahoo cookie request failed: {}", e);
    }

    for endpoint in CRUMB_ENDPOINTS {
        let response = match client.get(endpoint).header(REFERER, FINANCE_REFERER).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Crumb request to {} failed: {}", endpoint, e);
                continue;
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ValuationError::UpstreamFailure(
                "Yahoo rate limited while fetching crumb".to_string(),
            ));
        }
        if !status.is_success() {
            tracing::debug!("Crumb endpoint {} returned HTTP {}", endpoint, status);
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        if is_valid_crumb(&body) {
            return Ok(body.trim().to_string());
        }
    }

    Err(ValuationError::UpstreamFailure(
        "failed to obtain Yahoo crumb from all endpoints".to_string(),
    ))
}

fn is_valid_crumb(body: &str) -> bool {
    let crumb = body.trim();
    !crumb.is_empty()
        && crumb.len() <= 32
        && !crumb.chars().any(|c| c.is_whitespace() || c == '<' || c == '{')
}
