//! Heuristic classification of sign-in responses.
//!
//! The forum's attendance endpoint answers with JSON on the happy path, but
//! anti-bot layers substitute HTML block pages, login redirects, and other
//! garbage. Everything here is pure: (status, content-type, body) in, a
//! definite verdict or a "not JSON, try harder" marker out, so the whole
//! grammar can be table-tested against recorded responses.

/// Slang the site uses for its reward item; its presence in a message is a
/// success signal on its own.
const REWARD_SLANG: &str = "鸡腿";
/// "already completed today's sign-in"
const ALREADY_SIGNED_PHRASE: &str = "已完成签到";
/// Success phrases seen in raw (non-JSON) bodies.
const TEXT_SUCCESS_MARKERS: [&str; 4] = [REWARD_SLANG, "签到成功", "签到完成", "success"];
/// Markers of a login/registration page served instead of the API.
const LOGIN_PAGE_MARKERS: [&str; 3] = ["登录", "注册", "你好啊，陌生人"];

const SNIPPET_CHARS: usize = 400;
const MESSAGE_CHARS: usize = 80;

/// Definite verdict for one sign-in response.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub success: bool,
    pub already_signed: bool,
    pub message: String,
    pub gain: Option<i64>,
    pub current: Option<i64>,
}

impl Classification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            already_signed: false,
            message: message.into(),
            gain: None,
            current: None,
        }
    }

    pub fn already_signed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            already_signed: true,
            message: message.into(),
            gain: None,
            current: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            already_signed: false,
            message: message.into(),
            gain: None,
            current: None,
        }
    }
}

/// Classifier output: either a verdict, or a marker that the body was not
/// JSON (with a diagnostics snippet) so the caller can run the warm-up
/// fallback before falling back to [`classify_text`].
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Verdict(Classification),
    NonJson { snippet: String },
}

/// First-pass classification of the raw sign-in response.
// The content-type is advisory only; servers behind a challenge layer have
// been seen labelling HTML as JSON and vice versa, so the parse attempt
// decides.
pub fn classify(status: u16, _content_type: &str, body: &[u8]) -> Classified {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => Classified::Verdict(classify_json(&value, status)),
        Err(_) => Classified::NonJson {
            snippet: truncate_chars(&String::from_utf8_lossy(body), SNIPPET_CHARS),
        },
    }
}

/// Classification grammar for a parsed JSON body. First match wins.
pub fn classify_json(value: &serde_json::Value, status: u16) -> Classification {
    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default();

    if value.get("success").and_then(|s| s.as_bool()) == Some(true) {
        let mut verdict = Classification::success(message);
        if let Some(gain) = value.get("gain").and_then(|g| g.as_i64()).filter(|g| *g > 0) {
            verdict.gain = Some(gain);
            verdict.current = value.get("current").and_then(|c| c.as_i64());
        }
        return verdict;
    }

    if message.contains(REWARD_SLANG) {
        return Classification::success(message);
    }

    if message.contains(ALREADY_SIGNED_PHRASE) {
        return Classification::already_signed(message);
    }

    if message == "USER NOT FOUND" || value.get("status").and_then(|s| s.as_i64()) == Some(404) {
        return Classification::failure("cookie invalid or expired, please refresh it");
    }

    if message.contains("签到") && (message.contains("成功") || message.contains("完成")) {
        return Classification::success(message);
    }

    if message.is_empty() {
        Classification::failure(format!("unknown response: {status}"))
    } else {
        Classification::failure(message)
    }
}

/// Last-resort substring classification over a raw text body, used when the
/// warm-up fallback also failed to produce JSON.
pub fn classify_text(text: &str, status: u16) -> Classification {
    if TEXT_SUCCESS_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::success(truncate_chars(text, MESSAGE_CHARS));
    }

    if text.contains(ALREADY_SIGNED_PHRASE) {
        return Classification::already_signed(truncate_chars(text, MESSAGE_CHARS));
    }

    if text.contains("Cannot GET /api/attendance") {
        return Classification::failure(
            "server rejected GET, POST required; possibly blocked by firewall",
        );
    }

    if LOGIN_PAGE_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::failure("not logged in or cookie expired (login page returned)");
    }

    Classification::failure(format!("non-JSON response ({status})"))
}

/// Char-safe truncation; bodies are routinely Chinese text, so byte slicing
/// would panic mid-codepoint.
fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
