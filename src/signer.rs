//! Sign-in orchestration.
//!
//! Wires the transport chain, classifier, reconciler, history ledger,
//! retry scheduler and statistics collector into one service. `sign` is
//! the single entry point: it always appends exactly one history entry
//! and never panics its way out; unexpected errors are converted into an
//! Error-status entry at the boundary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::api::{self, CreditPage, UserDetail};
use crate::config::SignConfig;
use crate::host::{HostScheduler, KeyValueStore, Notifier, keys};
use crate::modules::history::HistoryLedger;
use crate::modules::retry::{RetryDecision, RetryScheduler};
use crate::modules::stats::{self, CreditSource, SigninStats};
use crate::modules::timing::human_delay;
use crate::outcome::classifier::{Classification, Classified, classify, classify_json, classify_text};
use crate::outcome::reconciler::{Reconciliation, reconcile};
use crate::outcome::{AttendanceRecord, SignAttempt, SignStatus};
use crate::transport::{AdapterChain, TransportError, TransportRequest, TransportResult};

const NOTIFY_TITLE: &str = "【NodeSeek 签到】";
const ONCE_TASK_ID: &str = "nodeseek-sign-once";

/// The sign-in service. One instance per configured account; `sign` may be
/// called concurrently with itself only through the internal retry lock.
pub struct SignService {
    config: SignConfig,
    chain: AdapterChain,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    host: Arc<dyn HostScheduler>,
    retry: Mutex<RetryScheduler>,
    history: HistoryLedger,
}

impl SignService {
    pub fn new(
        config: SignConfig,
        chain: AdapterChain,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        host: Arc<dyn HostScheduler>,
    ) -> Self {
        let retry = Mutex::new(RetryScheduler::new(config.max_retries));
        let history = HistoryLedger::new(store.clone(), config.history_days);
        Self {
            config,
            chain,
            store,
            notifier,
            host,
            retry,
            history,
        }
    }

    /// Build a service with the standard transport chain derived from the
    /// configuration.
    pub fn from_config(
        config: SignConfig,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        host: Arc<dyn HostScheduler>,
    ) -> Self {
        let chain = AdapterChain::standard(config.proxy_pair(), config.verify_ssl);
        Self::new(config, chain, store, notifier, host)
    }

    /// Startup hook: honors the one-shot flags.
    pub async fn start(&self) {
        if self.config.clear_history {
            self.history.clear().await;
        }
        if self.config.onlyonce {
            log::info!("scheduling one-shot sign-in run");
            self.host
                .schedule_once(ONCE_TASK_ID, std::time::Duration::from_secs(3));
        }
    }

    /// Shutdown hook: drops any pending retry.
    pub async fn stop(&self) {
        self.retry.lock().await.cancel_pending(&*self.host);
    }

    /// Run one sign-in. Always appends exactly one history entry and
    /// returns it.
    pub async fn sign(&self) -> SignAttempt {
        match self.sign_inner().await {
            Ok(attempt) => attempt,
            Err(err) => {
                log::error!("sign-in run aborted: {err}");
                let attempt = SignAttempt::error(format!("签到异常: {err}"));
                self.history.append(attempt.clone()).await;
                self.notify(&format!("签到异常\n{}", attempt.message)).await;
                attempt
            }
        }
    }

    async fn sign_inner(&self) -> Result<SignAttempt, TransportError> {
        if self.config.cookie.is_empty() {
            log::warn!("no session cookie configured, skipping network calls");
            let attempt = SignAttempt::new(SignStatus::Failed, "未配置 Cookie，无法签到");
            self.history.append(attempt.clone()).await;
            self.notify(&format!("签到失败\n{}", attempt.message)).await;
            return Ok(attempt);
        }

        let delay = human_delay(self.config.min_delay, self.config.max_delay);
        if !delay.is_zero() {
            log::info!("pre-request delay: {:.1}s", delay.as_secs_f64());
            sleep(delay).await;
        }

        let classification = self.run_sign_call().await?;
        let record = self.fetch_attendance_record().await;
        self.fetch_user_info().await;

        let attempt = if classification.success {
            self.finish_success(classification, record.as_ref()).await
        } else {
            self.finish_failure(classification, record.as_ref()).await
        };
        Ok(attempt)
    }

    /// Execute the sign-in POST through the chain and classify the body,
    /// running the warm-up fallback when the API answered with something
    /// other than JSON.
    async fn run_sign_call(&self) -> Result<Classification, TransportError> {
        let request = api::sign_request(self.config.random_choice, &self.config.cookie)?;

        let result = match self.chain.execute(&request).await {
            Ok(result) => result,
            Err(TransportError::Exhausted { last_status }) => {
                return Ok(Classification::failure(format!(
                    "请求被拦截 (HTTP {last_status})"
                )));
            }
            Err(err) => return Err(err),
        };

        match classify(result.status, &result.content_type, &result.body) {
            Classified::Verdict(classification) => Ok(classification),
            Classified::NonJson { snippet } => {
                self.cache(keys::LAST_SIGN_RESPONSE, Value::String(snippet))
                    .await;
                self.warmup_retry(&request, &result).await
            }
        }
    }

    /// Non-JSON answer to the sign-in POST usually means an unsolved
    /// challenge: warm the session up on the board page and replay once.
    async fn warmup_retry(
        &self,
        request: &TransportRequest,
        original: &TransportResult,
    ) -> Result<Classification, TransportError> {
        let origin = match api::board_page_url() {
            Ok(url) => url,
            Err(err) => {
                log::error!("board page url: {err}");
                return Ok(classify_text(&api::decoded_text(original), original.status));
            }
        };

        match self
            .chain
            .warmup_execute(request, &origin, &self.config.cookie)
            .await
        {
            Ok(replay) => {
                let text = api::decoded_text(&replay);
                match serde_json::from_str::<Value>(&text) {
                    Ok(json) => Ok(classify_json(&json, replay.status)),
                    // A non-JSON replay adds nothing; the text heuristics
                    // run over the primary response body.
                    Err(_) => Ok(classify_text(&api::decoded_text(original), original.status)),
                }
            }
            Err(err) => {
                log::warn!("warm-up replay failed: {err}");
                Ok(classify_text(&api::decoded_text(original), original.status))
            }
        }
    }

    /// Fetch today's attendance record from the board endpoint. A non-JSON
    /// answer degrades to the cached record when that record is from today.
    async fn fetch_attendance_record(&self) -> Option<AttendanceRecord> {
        let request = match api::board_request(1, &self.config.cookie) {
            Ok(request) => request,
            Err(err) => {
                log::warn!("board request build failed: {err}");
                return self.cached_record_today().await;
            }
        };

        let result = match self.chain.execute(&request).await {
            Ok(result) => result,
            Err(err) => {
                log::warn!("attendance board fetch failed: {err}");
                return self.cached_record_today().await;
            }
        };

        let text = api::decoded_text(&result);
        match api::parse_board_body(&text) {
            Some(record) => {
                if let Ok(value) = serde_json::to_value(&record) {
                    self.cache(keys::LAST_ATTENDANCE_RECORD, value).await;
                }
                Some(record)
            }
            None => {
                let snippet: String = text.chars().take(400).collect();
                self.cache(keys::LAST_ATTENDANCE_RESPONSE, Value::String(snippet))
                    .await;
                self.cached_record_today().await
            }
        }
    }

    /// Last persisted attendance record, only if its timestamp falls on
    /// today by the site's clock (UTC+8), wherever the process runs.
    async fn cached_record_today(&self) -> Option<AttendanceRecord> {
        let value = self.store.get(keys::LAST_ATTENDANCE_RECORD).await.ok()??;
        let record: AttendanceRecord = serde_json::from_value(value).ok()?;
        let created = record.created_at.as_deref()?;
        let when = chrono::DateTime::parse_from_rfc3339(created).ok()?;
        let now = stats::site_now();
        (when.with_timezone(&now.timezone()).date_naive() == now.date_naive()).then_some(record)
    }

    /// Optional profile fetch, cached for the host UI. Failures are logged
    /// and ignored.
    async fn fetch_user_info(&self) {
        let Some(member_id) = self.config.member_id.as_deref() else {
            return;
        };
        let request = match api::user_info_request(member_id, &self.config.cookie) {
            Ok(request) => request,
            Err(err) => {
                log::warn!("user info request build failed: {err}");
                return;
            }
        };
        match self.chain.execute(&request).await {
            Ok(result) => {
                let text = api::decoded_text(&result);
                match serde_json::from_str::<Value>(&text) {
                    Ok(value) => {
                        let detail = value.get("detail").cloned().unwrap_or(value);
                        if let Ok(parsed) =
                            serde_json::from_value::<UserDetail>(detail.clone())
                        {
                            log::info!(
                                "user info: name={:?} coin={:?}",
                                parsed.member_name,
                                parsed.coin
                            );
                        }
                        self.cache(keys::LAST_USER_INFO, detail).await;
                    }
                    Err(err) => log::warn!("user info not parseable: {err}"),
                }
            }
            Err(err) => log::warn!("user info fetch failed: {err}"),
        }
    }

    async fn finish_success(
        &self,
        classification: Classification,
        record: Option<&AttendanceRecord>,
    ) -> SignAttempt {
        let status = if classification.already_signed {
            SignStatus::AlreadySigned
        } else {
            SignStatus::Success
        };
        let mut attempt = SignAttempt::new(status, classification.message);
        // The attendance record is authoritative for the reward amount; the
        // classification's gain only fills in when no record is available.
        attempt.gain = record.and_then(|r| r.gain).or(classification.gain);
        if let Some(record) = record {
            attempt.rank = record.rank;
            attempt.total_signers = record.total_signers;
        }

        self.history.append(attempt.clone()).await;
        self.history.record_last_sign().await;
        self.retry.lock().await.on_success();

        let stats = self.refresh_stats().await;
        self.notify(&success_text(&attempt, stats.as_ref())).await;
        attempt
    }

    async fn finish_failure(
        &self,
        classification: Classification,
        record: Option<&AttendanceRecord>,
    ) -> SignAttempt {
        // The API can refuse the POST even though today's sign-in already
        // went through; the attendance record is the authority.
        let verdict = reconcile(record, Local::now().date_naive(), Utc::now());
        if verdict.is_upgrade() {
            log::info!("attendance record contradicts the failure: {verdict:?}");
            let upgraded = match verdict {
                Reconciliation::ConfirmedToday => {
                    Classification::already_signed("接口返回失败，但今日签到记录已存在")
                }
                _ => Classification::success("接口返回失败，但签到记录在时间窗口内"),
            };
            return self.finish_success(upgraded, record).await;
        }

        let attempt = SignAttempt::new(SignStatus::Failed, classification.message);
        self.history.append(attempt.clone()).await;
        self.refresh_stats().await;

        let decision = self.retry.lock().await.on_failure(&*self.host);
        self.notify(&failure_text(&attempt, &decision)).await;
        attempt
    }

    /// Recompute the reward statistics cache; best effort.
    async fn refresh_stats(&self) -> Option<SigninStats> {
        let source = ChainCreditSource {
            chain: &self.chain,
            cookie: &self.config.cookie,
        };
        let stats = stats::collect(&source, &self.history, self.config.stats_days).await;
        match serde_json::to_value(&stats) {
            Ok(value) => self.cache(keys::LAST_SIGNIN_STATS, value).await,
            Err(err) => log::warn!("stats not serializable: {err}"),
        }
        Some(stats)
    }

    async fn cache(&self, key: &str, value: Value) {
        if let Err(err) = self.store.set(key, value).await {
            log::warn!("failed to cache {key}: {err}");
        }
    }

    async fn notify(&self, text: &str) {
        if !self.config.notify {
            return;
        }
        if let Err(err) = self.notifier.send(NOTIFY_TITLE, text).await {
            log::error!("notification delivery failed: {err}");
        }
    }
}

/// Credit ledger pages fetched through the transport chain.
struct ChainCreditSource<'a> {
    chain: &'a AdapterChain,
    cookie: &'a str,
}

#[async_trait]
impl CreditSource for ChainCreditSource<'_> {
    async fn credit_page(&self, page: u32) -> Result<Option<CreditPage>, TransportError> {
        let request = api::credit_request(page, self.cookie)?;
        let result = self.chain.execute(&request).await?;
        let text = api::decoded_text(&result);
        Ok(serde_json::from_str(&text).ok())
    }
}

fn success_text(attempt: &SignAttempt, stats: Option<&SigninStats>) -> String {
    let mut lines = vec![format!("签到结果: {}", attempt.message)];
    if let Some(gain) = attempt.gain {
        lines.push(format!("今日收益: {gain} 个鸡腿"));
    }
    if let (Some(rank), Some(total)) = (attempt.rank, attempt.total_signers) {
        lines.push(format!("今日排名: {rank}/{total}"));
    }
    if let Some(stats) = stats {
        if stats.days_count > 0 {
            lines.push(format!(
                "统计({}): 共签到 {} 天, 合计 {} 鸡腿, 日均 {}",
                stats.period, stats.days_count, stats.total_gain, stats.average
            ));
        }
    }
    lines.join("\n")
}

fn failure_text(attempt: &SignAttempt, decision: &RetryDecision) -> String {
    let mut lines = vec![format!("签到失败: {}", attempt.message)];
    match decision {
        RetryDecision::Scheduled {
            delay,
            attempt,
            max_attempts,
            ..
        } => lines.push(format!(
            "将在 {} 分钟后自动重试 (第 {attempt}/{max_attempts} 次)",
            delay.as_secs() / 60
        )),
        RetryDecision::Exhausted { max_attempts } => {
            lines.push(format!("重试次数已用完 ({max_attempts} 次)"));
        }
        RetryDecision::Disabled => {}
    }
    lines.join("\n")
}
