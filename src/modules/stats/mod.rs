//! Sign-in reward statistics over the credit ledger.
//!
//! The primary source is the paginated credit API; rows are newest-first,
//! so pagination stops as soon as a page falls entirely outside the window.
//! When the API yields nothing the local history ledger fills in, and when
//! both are empty the result is zeroed rather than an error.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::CreditPage;
use crate::modules::history::HistoryLedger;
use crate::transport::TransportError;

/// Hard cap on credit-ledger pagination.
pub const MAX_CREDIT_PAGES: u32 = 20;

/// The site's clock; ledger timestamps and the lookback window are
/// interpreted in UTC+8.
const SITE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// A reward row mentions both the sign-in income wording and the drumstick
/// currency, in either order.
static REWARD_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new("签到收益.*鸡腿|鸡腿.*签到收益").expect("invalid reward description regex")
});

/// One counted reward, kept for notification detail lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRecord {
    pub date: String,
    pub gain: f64,
}

/// Aggregated sign-in rewards over the configured window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigninStats {
    pub total_gain: f64,
    pub average: f64,
    pub days_count: usize,
    pub records: Vec<RewardRecord>,
    pub period: String,
}

/// Pull-based view of the credit ledger, one page at a time. `Ok(None)`
/// means the page could not be interpreted and pagination should stop.
#[async_trait]
pub trait CreditSource: Send + Sync {
    async fn credit_page(&self, page: u32) -> Result<Option<CreditPage>, TransportError>;
}

/// Current time on the site's clock.
pub(crate) fn site_now() -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(SITE_UTC_OFFSET_SECS)
        .unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn period_label(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> String {
    format!("{} ~ {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
}

fn summarize(mut records: Vec<RewardRecord>, period: String) -> SigninStats {
    if records.is_empty() {
        return SigninStats {
            period,
            ..SigninStats::default()
        };
    }
    records.sort_by(|a, b| a.date.cmp(&b.date));
    let total: f64 = records.iter().map(|r| r.gain).sum();
    let days_count = records.len();
    SigninStats {
        total_gain: round2(total),
        average: round2(total / days_count as f64),
        days_count,
        records,
        period,
    }
}

/// Collect sign-in reward statistics for the last `stats_days` days.
///
/// Walks the credit ledger newest-first, counting rows whose description
/// matches the reward wording and whose timestamp falls inside the window.
/// Falls back to the local history when the ledger yields nothing.
pub async fn collect(
    source: &dyn CreditSource,
    history: &HistoryLedger,
    stats_days: i64,
) -> SigninStats {
    let now = site_now();
    let window_start = now - chrono::Duration::days(stats_days.max(1));
    let period = period_label(window_start, now);

    let mut rewards = Vec::new();
    'pages: for page in 1..=MAX_CREDIT_PAGES {
        let credit_page = match source.credit_page(page).await {
            Ok(Some(p)) if p.success && !p.rows.is_empty() => p,
            Ok(_) => break,
            Err(err) => {
                log::warn!("credit page {page} failed, stopping pagination: {err}");
                break;
            }
        };

        for row in &credit_page.rows {
            let Ok(when) = DateTime::parse_from_rfc3339(row.timestamp()) else {
                continue;
            };
            if when < window_start {
                // Rows are newest-first, the rest of the ledger is older.
                break 'pages;
            }
            if REWARD_DESCRIPTION.is_match(row.description()) {
                rewards.push(RewardRecord {
                    date: when
                        .with_timezone(&now.timezone())
                        .format("%Y-%m-%d")
                        .to_string(),
                    gain: row.amount(),
                });
            }
        }
    }

    if !rewards.is_empty() {
        return summarize(rewards, period);
    }

    log::info!("credit ledger yielded no rewards, falling back to local history");
    let window_start_day = window_start.format("%Y-%m-%d").to_string();
    let fallback: Vec<RewardRecord> = history
        .entries()
        .await
        .into_iter()
        .filter(|e| e.status.is_success_family())
        .filter_map(|e| {
            let gain = e.gain.filter(|g| *g > 0)?;
            let date = e.date.get(..10)?.to_string();
            (date >= window_start_day).then_some(RewardRecord {
                date,
                gain: gain as f64,
            })
        })
        .collect();

    summarize(fallback, period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CreditRow;
    use crate::host::MemoryStore;
    use crate::outcome::{SignAttempt, SignStatus};
    use std::sync::Arc;

    struct PagedSource {
        pages: Vec<CreditPage>,
    }

    #[async_trait]
    impl CreditSource for PagedSource {
        async fn credit_page(&self, page: u32) -> Result<Option<CreditPage>, TransportError> {
            Ok(self.pages.get(page as usize - 1).map(|p| CreditPage {
                success: p.success,
                rows: p.rows.clone(),
            }))
        }
    }

    fn empty_history() -> HistoryLedger {
        HistoryLedger::new(Arc::new(MemoryStore::new()), 30)
    }

    fn row(amount: f64, description: &str, when: DateTime<FixedOffset>) -> CreditRow {
        CreditRow(amount, 100.0, description.to_string(), when.to_rfc3339())
    }

    #[tokio::test]
    async fn counts_only_reward_rows_inside_the_window() {
        let now = site_now();
        let pages = vec![CreditPage {
            success: true,
            rows: vec![
                row(5.0, "签到收益 5个鸡腿", now - chrono::Duration::days(1)),
                row(3.0, "购买商品", now - chrono::Duration::days(2)),
                row(7.0, "签到收益 7个鸡腿", now - chrono::Duration::days(3)),
            ],
        }];
        let stats = collect(&PagedSource { pages }, &empty_history(), 30).await;
        assert_eq!(stats.days_count, 2);
        assert_eq!(stats.total_gain, 12.0);
        assert_eq!(stats.average, 6.0);
    }

    #[tokio::test]
    async fn stops_paginating_past_the_window() {
        let now = site_now();
        let old = now - chrono::Duration::days(90);
        let pages = vec![
            CreditPage {
                success: true,
                rows: vec![
                    row(5.0, "签到收益 5个鸡腿", now - chrono::Duration::days(1)),
                    row(9.0, "签到收益 9个鸡腿", old),
                ],
            },
            // Would double-count if pagination continued.
            CreditPage {
                success: true,
                rows: vec![row(9.0, "签到收益 9个鸡腿", now - chrono::Duration::days(2))],
            },
        ];
        let stats = collect(&PagedSource { pages }, &empty_history(), 30).await;
        assert_eq!(stats.days_count, 1);
        assert_eq!(stats.total_gain, 5.0);
    }

    #[tokio::test]
    async fn falls_back_to_local_history() {
        let history = empty_history();
        let mut attempt = SignAttempt::new(SignStatus::Success, "ok");
        attempt.gain = Some(5);
        history.append(attempt).await;

        let stats = collect(&PagedSource { pages: vec![] }, &history, 30).await;
        assert_eq!(stats.days_count, 1);
        assert_eq!(stats.total_gain, 5.0);
        assert_eq!(stats.average, 5.0);
    }

    #[tokio::test]
    async fn zeroed_when_both_sources_are_empty() {
        let stats = collect(&PagedSource { pages: vec![] }, &empty_history(), 30).await;
        assert_eq!(stats.days_count, 0);
        assert_eq!(stats.total_gain, 0.0);
        assert_eq!(stats.average, 0.0);
        assert!(stats.records.is_empty());
        assert!(!stats.period.is_empty());
    }

    #[tokio::test]
    async fn averages_over_days_with_rewards() {
        let now = site_now();
        let pages = vec![CreditPage {
            success: true,
            rows: vec![
                row(3.0, "签到收益 3个鸡腿", now - chrono::Duration::days(1)),
                row(2.0, "签到收益 2个鸡腿", now - chrono::Duration::days(3)),
                row(1.0, "签到收益 1个鸡腿", now - chrono::Duration::days(5)),
            ],
        }];
        let stats = collect(&PagedSource { pages }, &empty_history(), 7).await;
        assert_eq!(stats.total_gain, 6.0);
        assert_eq!(stats.days_count, 3);
        assert_eq!(stats.average, 2.0);
    }

    #[tokio::test]
    async fn average_rounds_to_two_decimals() {
        let now = site_now();
        let pages = vec![CreditPage {
            success: true,
            rows: vec![
                row(5.0, "签到收益 5个鸡腿", now - chrono::Duration::days(1)),
                row(5.0, "签到收益 5个鸡腿", now - chrono::Duration::days(2)),
                row(6.0, "签到收益 6个鸡腿", now - chrono::Duration::days(3)),
            ],
        }];
        let stats = collect(&PagedSource { pages }, &empty_history(), 30).await;
        assert_eq!(stats.average, 5.33);
    }
}
