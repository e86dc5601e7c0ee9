//! NodeSeek API endpoints: URL construction, request headers, and response
//! shapes.
//!
//! The forum speaks JSON over a handful of endpoints; the only wrinkle is
//! that responses fetched with spoofed `Accept-Encoding` headers can arrive
//! still Brotli-compressed, so board responses go through [`decoded_text`]
//! before parsing.

use std::io::Read;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Deserialize;
use url::Url;

use crate::outcome::AttendanceRecord;
use crate::transport::{TransportError, TransportRequest, TransportResult};

pub const ORIGIN: &str = "https://www.nodeseek.com";
pub const BOARD_PAGE: &str = "https://www.nodeseek.com/board";

pub fn sign_url(random_choice: bool) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{ORIGIN}/api/attendance?random={}",
        if random_choice { "true" } else { "false" }
    ))
}

pub fn board_url(page: u32) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{ORIGIN}/api/attendance/board?page={page}"))
}

pub fn user_info_url(member_id: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{ORIGIN}/api/account/getInfo/{member_id}?readme=1"))
}

pub fn credit_url(page: u32) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{ORIGIN}/api/account/credit/page-{page}"))
}

pub fn board_page_url() -> Result<Url, url::ParseError> {
    Url::parse(BOARD_PAGE)
}

/// Browser-like API headers shared by all forum calls. The cookie is the
/// user's raw session string, passed verbatim.
pub fn api_headers(referer: &str, cookie: Option<&str>) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    let mut set = |name: &'static str, value: &str| -> Result<(), TransportError> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        headers.insert(HeaderName::from_static(name), value);
        Ok(())
    };

    set("accept", "*/*")?;
    set("accept-encoding", "gzip, deflate, br, zstd")?;
    set("origin", ORIGIN)?;
    set("referer", referer)?;
    set("sec-fetch-dest", "empty")?;
    set("sec-fetch-mode", "cors")?;
    set("sec-fetch-site", "same-origin")?;
    if let Some(cookie) = cookie {
        set("cookie", cookie)?;
    }
    Ok(headers)
}

/// Sign-in POST: empty body, content-type json, reward mode in the query.
pub fn sign_request(random_choice: bool, cookie: &str) -> Result<TransportRequest, TransportError> {
    let url = sign_url(random_choice).map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
    let mut headers = api_headers(BOARD_PAGE, Some(cookie))?;
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    Ok(TransportRequest::new(Method::POST, url)
        .with_headers(headers)
        .with_body(Vec::new()))
}

pub fn board_request(page: u32, cookie: &str) -> Result<TransportRequest, TransportError> {
    let url = board_url(page).map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
    let headers = api_headers(BOARD_PAGE, Some(cookie))?;
    Ok(TransportRequest::new(Method::GET, url).with_headers(headers))
}

pub fn user_info_request(member_id: &str, cookie: &str) -> Result<TransportRequest, TransportError> {
    let url =
        user_info_url(member_id).map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
    let referer = format!("{ORIGIN}/space/{member_id}");
    let headers = api_headers(&referer, Some(cookie))?;
    Ok(TransportRequest::new(Method::GET, url).with_headers(headers))
}

pub fn credit_request(page: u32, cookie: &str) -> Result<TransportRequest, TransportError> {
    let url = credit_url(page).map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
    let headers = api_headers(BOARD_PAGE, Some(cookie))?;
    Ok(TransportRequest::new(Method::GET, url).with_headers(headers))
}

/// Body text with Brotli tolerance: when the response is still
/// `content-encoding: br` (spoofed Accept-Encoding disables reqwest's
/// auto-decode), decompress; on any decode failure fall back to the raw
/// text.
pub fn decoded_text(result: &TransportResult) -> String {
    if result
        .content_encoding
        .as_deref()
        .is_some_and(|enc| enc.eq_ignore_ascii_case("br"))
    {
        let mut out = Vec::new();
        let mut reader = brotli::Decompressor::new(result.body.as_ref(), 4096);
        if reader.read_to_end(&mut out).is_ok() {
            if let Ok(text) = String::from_utf8(out) {
                return text;
            }
        }
        log::warn!("brotli decode failed, falling back to raw body text");
    }
    result.text()
}

/// Board response: today's record plus optional rank information at the top
/// level.
#[derive(Debug, Deserialize)]
struct BoardResponse {
    #[serde(default)]
    record: Option<AttendanceRecord>,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    total: Option<i64>,
}

/// Parse an attendance-board body, promoting `order`/`total` into the
/// record's `rank`/`total_signers`.
pub fn parse_board_body(text: &str) -> Option<AttendanceRecord> {
    let response: BoardResponse = serde_json::from_str(text).ok()?;
    let mut record = response.record?;
    if response.order.is_some() {
        record.rank = response.order;
        record.total_signers = response.total;
    }
    Some(record)
}

/// Profile details from the user-info endpoint; only the fields shown in
/// notifications are modeled, the raw `detail` object is cached as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserDetail {
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub rank: Option<serde_json::Value>,
    #[serde(default)]
    pub coin: Option<i64>,
}

/// One credit-ledger row, shipped as a 4-tuple:
/// (amount, balance, description, timestamp).
#[derive(Debug, Clone, Deserialize)]
pub struct CreditRow(pub f64, pub f64, pub String, pub String);

impl CreditRow {
    pub fn amount(&self) -> f64 {
        self.0
    }

    pub fn description(&self) -> &str {
        &self.2
    }

    pub fn timestamp(&self) -> &str {
        &self.3
    }
}

/// One page of the credit ledger.
#[derive(Debug, Deserialize)]
pub struct CreditPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "data")]
    pub rows: Vec<CreditRow>,
}
