//! Two-step marketplace exchange.
//!
//! The remote renders listings through a server-side "program": a GET on the
//! item page embeds a per-session program state as a `window.pvNNN = {...}`
//! assignment, and a POST to `a_program_run` replays that state to receive
//! the rendered lot list. Both requests must look like an ordinary browser
//! tab — the remote rejects anything missing its expected header set.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{API_ID, GROUP_ID};
use crate::error::{AppError, Result};
use crate::remote::form::flatten;
use crate::remote::lots::parse_lots;
use crate::types::{Account, Lot};

/// Static client identity the remote expects in every program-run envelope.
const PROGRAM_CODE: &str = "51132l145l691d2fbd8b124d57";
const PROGRAM_PWID: &str = "w_171";

/// Glyph the remote embeds in its "you are blocked" reply. Seeing it means
/// the account tripped bot detection and must cool down.
pub const BLOCKED_MARKER: &str = "⛔";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/89.0.4389.90 Safari/537.36";

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"window\.pv\d+ = (\{.+\})").expect("token marker regex is valid")
    })
}

pub struct MarketClient {
    http: reqwest::Client,
    base_url: String,
}

impl MarketClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, base_url: base_url.into() })
    }

    /// Fetch the current lots for one item on one account.
    ///
    /// Stateless across calls: every invocation performs the full
    /// GET-token → POST-program exchange.
    pub async fn fetch_lots(&self, account: &Account, item_code: i64) -> Result<Vec<Lot>> {
        let item_url = self.act_url(&format!("item&id={item_code}"), account);

        let resp = self
            .http
            .get(&item_url)
            .headers(browser_headers(&item_url))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::RemoteUnavailable(status.as_u16()));
        }

        let page = resp.text().await?;
        let vars: Value = match token_re().captures(&page) {
            Some(cap) => serde_json::from_str(&cap[1])?,
            // Either the page layout changed or the session is dead; the
            // caller retries, a human investigates if it persists.
            None => return Err(AppError::TokenExtraction),
        };

        let envelope = json!({
            "code": PROGRAM_CODE,
            "pwid": PROGRAM_PWID,
            "context": 1,
            "hash": "",
            "channel": "",
            "vars": vars,
        });
        let pairs = flatten(&envelope);
        debug!(account = account.tag(), item_code, fields = pairs.len(), "submitting program run");

        let run_url = self.act_url("a_program_run", account);
        let resp = self
            .http
            .post(&run_url)
            .form(&pairs)
            .headers(browser_headers(&item_url))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        interpret_run_response(status, &body)
    }

    fn act_url(&self, act: &str, account: &Account) -> String {
        format!(
            "{}?act={}&auth_key={}&group_id={}&api_id={}",
            self.base_url, act, account.auth_key, GROUP_ID, API_ID
        )
    }
}

/// Turn the program-run reply into lots or a failure. The remote signals a
/// rejected run through the JSON `result` field; a block signal is a glyph
/// embedded in an otherwise successful reply, so it is checked after the
/// result field, not instead of it.
fn interpret_run_response(status: reqwest::StatusCode, body: &str) -> Result<Vec<Lot>> {
    if !status.is_success() {
        return Err(AppError::ProgramExecution(format!("status {status}")));
    }
    let reply: Value = serde_json::from_str(body)
        .map_err(|_| AppError::ProgramExecution("response body is not JSON".to_string()))?;
    if reply.get("result").and_then(Value::as_i64) != Some(1) {
        return Err(AppError::ProgramExecution("result != 1".to_string()));
    }
    if body.contains(BLOCKED_MARKER) {
        return Err(AppError::RateLimited);
    }
    Ok(parse_lots(body))
}

/// The header set an ordinary Chrome tab sends to this endpoint. The values
/// are a compatibility contract — the remote's bot detection checks them.
/// Hop-by-hop headers (Host, Connection, Content-Length, Accept-Encoding)
/// are left to reqwest.
fn browser_headers(referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static(r#""Google Chrome";v="89", "Chromium";v="89", ";Not A Brand";v="99""#),
    );
    headers.insert(
        "Accept",
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));
    headers.insert(
        "Content-Type",
        HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
    );
    headers.insert("Origin", HeaderValue::from_static("https://vip3.activeusers.ru"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert("Referer", value);
    }
    headers.insert(
        "Accept-Language",
        HeaderValue::from_static("ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_marker_matches_any_pv_suffix() {
        let page = r#"<script>window.pv624 = {"options":[{"id":5}],"step":2}</script>"#;
        let cap = token_re().captures(page).unwrap();
        assert_eq!(&cap[1], r#"{"options":[{"id":5}],"step":2}"#);

        let other = r#"window.pv71 = {"a":1}"#;
        assert!(token_re().captures(other).is_some());
    }

    #[test]
    fn token_marker_absent_on_plain_page() {
        assert!(token_re().captures("<html><body>login please</body></html>").is_none());
    }

    #[test]
    fn run_reply_with_lots_parses() {
        let body = r#"{"result":1,"vars":{"text":"3*Меч - 120 золота (7)"}}"#;
        let lots = interpret_run_response(reqwest::StatusCode::OK, body).unwrap();
        assert_eq!(lots, vec![Lot::new(3, 120, 7)]);
    }

    #[test]
    fn run_reply_non_success_status_is_program_failure() {
        let err = interpret_run_response(reqwest::StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(matches!(err, AppError::ProgramExecution(_)));
    }

    #[test]
    fn run_reply_non_json_body_is_program_failure() {
        let err =
            interpret_run_response(reqwest::StatusCode::OK, "<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, AppError::ProgramExecution(_)));
    }

    #[test]
    fn run_reply_result_zero_is_program_failure() {
        let err = interpret_run_response(reqwest::StatusCode::OK, r#"{"result":0}"#).unwrap_err();
        assert!(matches!(err, AppError::ProgramExecution(_)));
    }

    /// The block signal arrives inside an otherwise successful reply:
    /// result is 1, the glyph sits in the rendered text. It must map to
    /// RateLimited, never to a plain program failure, or a blocked account
    /// would be hammered on the short retry path instead of cooling down.
    #[test]
    fn blocked_glyph_in_successful_reply_is_rate_limited() {
        let body = format!(r#"{{"result":1,"vars":{{"text":"{BLOCKED_MARKER}Вы заблокированы"}}}}"#);
        let err = interpret_run_response(reqwest::StatusCode::OK, &body).unwrap_err();
        assert!(matches!(err, AppError::RateLimited));
    }

    /// Result takes precedence: a rejected run is a program failure even if
    /// the body happens to carry the glyph.
    #[test]
    fn rejected_run_with_glyph_is_still_program_failure() {
        let body = format!(r#"{{"result":0,"vars":{{"text":"{BLOCKED_MARKER}"}}}}"#);
        let err = interpret_run_response(reqwest::StatusCode::OK, &body).unwrap_err();
        assert!(matches!(err, AppError::ProgramExecution(_)));
    }

    #[test]
    fn envelope_flattens_with_static_identity_first() {
        let envelope = json!({
            "code": PROGRAM_CODE,
            "pwid": PROGRAM_PWID,
            "context": 1,
            "hash": "",
            "channel": "",
            "vars": {"options": [{"id": 5}]},
        });
        let pairs = flatten(&envelope);
        assert_eq!(pairs[0], ("code".to_string(), PROGRAM_CODE.to_string()));
        assert_eq!(pairs[1], ("pwid".to_string(), PROGRAM_PWID.to_string()));
        assert!(pairs.contains(&("vars[options][0][id]".to_string(), "5".to_string())));
    }
}
