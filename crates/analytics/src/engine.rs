use crate::report::{
    AggregateStats, Recommendation, Severity, StatisticsReport, StatsDimension, SymbolStats,
    TopPerformers,
};
use chrono::{DateTime, Utc};
use core_types::{Direction, Outcome, OutcomeRecord};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A win-rate gap between LONG and SHORT signals worth pointing out, in percentage points.
const DIRECTION_GAP_PCT: Decimal = dec!(15);
/// How far below target the overall win rate must fall to be critical.
const CRITICAL_MARGIN_PCT: Decimal = dec!(20);

/// A stateless calculator for deriving win-rate statistics from outcome records.
#[derive(Debug, Clone)]
pub struct StatisticsEngine {
    min_symbol_samples: usize,
    target_win_rate_pct: Decimal,
    min_group_samples: usize,
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self::new(3, dec!(55), 5)
    }
}

impl StatisticsEngine {
    /// # Arguments
    ///
    /// * `min_symbol_samples` - Symbols with fewer records are left out of the symbol rankings.
    /// * `target_win_rate_pct` - The win rate the recommendation rules measure against.
    /// * `min_group_samples` - Groups with fewer records are not judged by the
    ///   recommendation rules.
    pub fn new(
        min_symbol_samples: usize,
        target_win_rate_pct: Decimal,
        min_group_samples: usize,
    ) -> Self {
        Self {
            min_symbol_samples,
            target_win_rate_pct,
            min_group_samples,
        }
    }

    pub fn target_win_rate_pct(&self) -> Decimal {
        self.target_win_rate_pct
    }

    /// Summarises `records`. An empty slice yields all zeroes.
    pub fn aggregate(&self, records: &[OutcomeRecord]) -> AggregateStats {
        aggregate(records.iter())
    }

    /// Splits `records` along `dimension` and aggregates every group.
    pub fn group_by(
        &self,
        records: &[OutcomeRecord],
        dimension: StatsDimension,
    ) -> BTreeMap<String, AggregateStats> {
        let mut groups: BTreeMap<String, Vec<&OutcomeRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(dimension.key_of(record)).or_default().push(record);
        }
        groups
            .into_iter()
            .map(|(key, members)| (key, aggregate(members.into_iter())))
            .collect()
    }

    /// Ranks individual outcomes by directional P&L and symbols by win rate.
    pub fn top_performers(&self, records: &[OutcomeRecord], limit: usize) -> TopPerformers {
        let mut ranked: Vec<&OutcomeRecord> = records.iter().collect();
        ranked.sort_by_key(|r| Reverse(r.directional_pnl_pct()));

        let best_signals = ranked.iter().take(limit).map(|r| (*r).clone()).collect();
        let worst_signals = ranked.iter().rev().take(limit).map(|r| (*r).clone()).collect();

        let mut per_symbol: HashMap<&str, Vec<&OutcomeRecord>> = HashMap::new();
        for record in records {
            per_symbol.entry(record.symbol.as_str()).or_default().push(record);
        }
        let mut symbols: Vec<SymbolStats> = per_symbol
            .into_iter()
            .filter(|(_, members)| members.len() >= self.min_symbol_samples)
            .map(|(symbol, members)| SymbolStats {
                symbol: symbol.to_string(),
                stats: aggregate(members.into_iter()),
            })
            .collect();
        // Ties on win rate fall back to average P&L, then the symbol for a stable order.
        symbols.sort_by(|a, b| {
            b.stats
                .win_rate
                .cmp(&a.stats.win_rate)
                .then(b.stats.avg_pnl_pct.cmp(&a.stats.avg_pnl_pct))
                .then(a.symbol.cmp(&b.symbol))
        });

        TopPerformers {
            best_signals,
            worst_signals,
            best_symbols: symbols.iter().take(limit).cloned().collect(),
            worst_symbols: symbols.iter().rev().take(limit).cloned().collect(),
        }
    }

    /// Builds the complete report for one window, recommendations included.
    pub fn report(
        &self,
        records: &[OutcomeRecord],
        window_days: u32,
        top_limit: usize,
        generated_at: DateTime<Utc>,
    ) -> StatisticsReport {
        let mut report = StatisticsReport {
            window_days,
            generated_at,
            overall: self.aggregate(records),
            by_scanner_source: self.group_by(records, StatsDimension::ScannerSource),
            by_tier: self.group_by(records, StatsDimension::Tier),
            by_interval: self.group_by(records, StatsDimension::Interval),
            by_direction: self.group_by(records, StatsDimension::Direction),
            top_performers: self.top_performers(records, top_limit),
            recommendations: Vec::new(),
        };
        report.recommendations = self.recommendations(&report);
        debug!(
            window_days,
            total = report.overall.total,
            recommendations = report.recommendations.len(),
            "Statistics report built"
        );
        report
    }

    /// Derives guidance from a report. Pure: recomputing it never changes anything.
    pub fn recommendations(&self, report: &StatisticsReport) -> Vec<Recommendation> {
        let mut out = Vec::new();
        let overall = &report.overall;
        let target = self.target_win_rate_pct;

        if overall.total == 0 {
            out.push(Recommendation::new(
                Severity::Info,
                format!(
                    "No outcomes recorded in the last {} days; nothing to judge yet",
                    report.window_days
                ),
            ));
            return out;
        }

        // --- Overall ---
        if overall.win_rate < target - CRITICAL_MARGIN_PCT {
            out.push(Recommendation::new(
                Severity::Critical,
                format!(
                    "Overall win rate {}% is far below the {}% target; signal generation needs a rethink",
                    overall.win_rate.round_dp(1),
                    target
                ),
            ));
        } else if overall.win_rate < target {
            out.push(Recommendation::new(
                Severity::Warning,
                format!(
                    "Overall win rate {}% is below the {}% target; needs optimization",
                    overall.win_rate.round_dp(1),
                    target
                ),
            ));
        } else {
            out.push(Recommendation::new(
                Severity::Info,
                format!(
                    "Overall win rate {}% meets the {}% target",
                    overall.win_rate.round_dp(1),
                    target
                ),
            ));
        }

        // --- Weak groups ---
        for dimension in [StatsDimension::ScannerSource, StatsDimension::Tier] {
            for (key, stats) in report.breakdown(dimension) {
                if self.is_judged(stats) && stats.win_rate < target {
                    out.push(Recommendation::new(
                        Severity::Warning,
                        format!(
                            "{} '{}' wins {}% of {} checks, below target; review or disable it",
                            dimension,
                            key,
                            stats.win_rate.round_dp(1),
                            stats.total
                        ),
                    ));
                }
            }
        }

        // --- Tier ordering ---
        if let (Some(high), Some(low)) = (report.by_tier.get("high"), report.by_tier.get("low")) {
            if self.is_judged(high) && self.is_judged(low) && high.win_rate < low.win_rate {
                out.push(Recommendation::new(
                    Severity::Warning,
                    format!(
                        "High-tier signals win less often than low-tier ones ({}% vs {}%); tier scoring is miscalibrated",
                        high.win_rate.round_dp(1),
                        low.win_rate.round_dp(1)
                    ),
                ));
            }
        }

        // --- Best horizon ---
        let best_interval = report
            .by_interval
            .iter()
            .filter(|(_, stats)| self.is_judged(stats))
            .max_by_key(|(_, stats)| stats.win_rate);
        if let Some((interval, stats)) = best_interval {
            out.push(Recommendation::new(
                Severity::Info,
                format!(
                    "Signals perform best at the {} horizon ({}% win rate)",
                    interval,
                    stats.win_rate.round_dp(1)
                ),
            ));
        }

        // --- Direction bias ---
        let long = report.by_direction.get(Direction::Long.as_str());
        let short = report.by_direction.get(Direction::Short.as_str());
        if let (Some(long), Some(short)) = (long, short) {
            let gap = long.win_rate - short.win_rate;
            if self.is_judged(long) && self.is_judged(short) && gap.abs() > DIRECTION_GAP_PCT {
                let (better, worse) = if gap > Decimal::ZERO {
                    (Direction::Long, Direction::Short)
                } else {
                    (Direction::Short, Direction::Long)
                };
                out.push(Recommendation::new(
                    Severity::Info,
                    format!(
                        "{} signals outperform {} signals by {} points; consider weighting toward {}",
                        better,
                        worse,
                        gap.abs().round_dp(1),
                        better
                    ),
                ));
            }
        }

        // --- Risk/reward ---
        if overall.wins > 0
            && overall.losses > 0
            && overall.avg_loss_pct.abs() > overall.avg_win_pct
        {
            out.push(Recommendation::new(
                Severity::Warning,
                format!(
                    "Average loss ({}%) is larger than average win ({}%); exits are too loose",
                    overall.avg_loss_pct.round_dp(2),
                    overall.avg_win_pct.round_dp(2)
                ),
            ));
        }

        out
    }

    fn is_judged(&self, stats: &AggregateStats) -> bool {
        stats.total >= self.min_group_samples
    }
}

fn aggregate<'a>(records: impl Iterator<Item = &'a OutcomeRecord>) -> AggregateStats {
    let mut stats = AggregateStats::empty();
    let mut win_sum = Decimal::ZERO;
    let mut loss_sum = Decimal::ZERO;
    let mut pnl_sum = Decimal::ZERO;

    for record in records {
        let pnl = record.directional_pnl_pct();
        stats.total += 1;
        pnl_sum += pnl;
        match record.outcome {
            Outcome::Win => {
                stats.wins += 1;
                win_sum += pnl;
            }
            Outcome::Loss => {
                stats.losses += 1;
                loss_sum += pnl;
            }
            Outcome::Neutral => stats.neutral += 1,
        }
    }

    stats.win_rate = percentage(stats.wins, stats.total);
    stats.avg_win_pct = mean(win_sum, stats.wins);
    stats.avg_loss_pct = mean(loss_sum, stats.losses);
    stats.avg_pnl_pct = mean(pnl_sum, stats.total);
    stats
}

fn percentage(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)
}

fn mean(sum: Decimal, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    sum / Decimal::from(count)
}
