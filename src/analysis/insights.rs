//! Cooldown-gated insight rules and recommendation ranking.
//!
//! The generator holds a fixed registry of [`InsightRule`]s. A rule runs
//! when its minimum interval has elapsed since it last produced something;
//! its output is stamped with the tick timestamp, the rule id and the rule
//! priority, then appended to a bounded history.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use super::anomaly::Anomaly;
use super::statistics::StatisticsSnapshot;
use super::trend::{TrendDirection, TrendState};
use super::{Priority, Severity};
use crate::error::{isolate, AnalysisError};
use crate::metrics::MetricSnapshot;

/// Insight history cap.
pub const INSIGHT_HISTORY_CAP: usize = 200;

/// Insights considered "recent" by reports.
pub const RECENT_INSIGHTS: usize = 20;

/// Recommendations per report.
pub const TOP_RECOMMENDATIONS: usize = 5;

/// Window in which critical anomalies count toward instability.
pub const INSTABILITY_WINDOW_MS: u64 = 30_000;

/// Critical anomalies within the window that signal instability.
pub const INSTABILITY_ANOMALIES: usize = 3;

/// Insight type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    /// Something is limiting performance now.
    Bottleneck,
    /// Headroom that could be used.
    Optimization,
    /// Performance is getting worse.
    Degradation,
    /// Resource utilization is high.
    Resource,
}

/// A generated insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Unique id.
    pub id: Uuid,
    /// Tick timestamp.
    pub timestamp: u64,
    /// Rule id that produced it.
    pub generator: String,
    /// Rule priority.
    pub priority: Priority,
    /// Insight type.
    #[serde(rename = "type")]
    pub kind: InsightKind,
    /// Category (rendering, memory, network, ...).
    pub category: String,
    /// Short title.
    pub title: String,
    /// Human-readable description.
    pub description: String,
    /// Expected impact.
    pub impact: Severity,
    /// Suggested action keys.
    pub suggestions: Vec<String>,
    /// Severity.
    pub severity: Severity,
    /// Supporting numbers.
    pub metrics: BTreeMap<String, f64>,
}

/// Rule output before it is stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightDraft {
    kind: InsightKind,
    category: &'static str,
    title: &'static str,
    description: String,
    impact: Severity,
    suggestions: [&'static str; 2],
    severity: Severity,
    metrics: Vec<(&'static str, f64)>,
}

impl InsightDraft {
    fn stamp(self, timestamp: u64, generator: &str, priority: Priority) -> Insight {
        Insight {
            id: Uuid::new_v4(),
            timestamp,
            generator: generator.to_string(),
            priority,
            kind: self.kind,
            category: self.category.to_string(),
            title: self.title.to_string(),
            description: self.description,
            impact: self.impact,
            suggestions: self.suggestions.iter().map(|s| (*s).to_string()).collect(),
            severity: self.severity,
            metrics: self
                .metrics
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct InsightContext<'a> {
    /// Tick timestamp.
    pub timestamp: u64,
    /// Current snapshot.
    pub metrics: &'a MetricSnapshot,
    /// Latest trends.
    pub trends: &'a BTreeMap<String, TrendState>,
    /// Anomaly history.
    pub anomalies: &'a VecDeque<Anomaly>,
    /// Baselines.
    pub baselines: &'a BTreeMap<String, f64>,
    /// Latest statistics.
    pub statistics: &'a StatisticsSnapshot,
}

impl InsightContext<'_> {
    fn current_and_baseline(&self, metric: &str) -> Option<(f64, f64)> {
        Some((self.metrics.get(metric)?, *self.baselines.get(metric)?))
    }
}

/// Severity for lower-is-worse ratios (fps):
/// `<0.5` critical, `<0.7` high, `<0.9` medium, else low.
#[must_use]
pub fn lower_is_worse_severity(current: f64, baseline: f64) -> Severity {
    if baseline == 0.0 {
        return Severity::Medium;
    }
    let ratio = current / baseline;
    if ratio < 0.5 {
        Severity::Critical
    } else if ratio < 0.7 {
        Severity::High
    } else if ratio < 0.9 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Severity for higher-is-worse ratios:
/// `>3` critical, `>2` high, `>1.5` medium, else low.
#[must_use]
pub fn higher_is_worse_severity(current: f64, baseline: f64) -> Severity {
    if baseline == 0.0 {
        return Severity::Medium;
    }
    let ratio = current / baseline;
    if ratio > 3.0 {
        Severity::Critical
    } else if ratio > 2.0 {
        Severity::High
    } else if ratio > 1.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn ratio(current: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        current / baseline
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Insight rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightRule {
    /// Current values well off baseline.
    Bottlenecks,
    /// Headroom worth using.
    Optimization,
    /// Worsening trends and anomaly bursts.
    Degradation,
    /// High resource utilization.
    Resources,
}

impl InsightRule {
    /// All rules in evaluation order.
    pub const ALL: [Self; 4] = [
        Self::Bottlenecks,
        Self::Optimization,
        Self::Degradation,
        Self::Resources,
    ];

    /// Rule id.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Bottlenecks => "bottlenecks",
            Self::Optimization => "optimization",
            Self::Degradation => "degradation",
            Self::Resources => "resources",
        }
    }

    /// Default priority.
    #[must_use]
    pub const fn default_priority(self) -> Priority {
        match self {
            Self::Bottlenecks | Self::Degradation => Priority::High,
            Self::Optimization | Self::Resources => Priority::Medium,
        }
    }

    /// Default minimum interval between productive runs.
    #[must_use]
    pub const fn default_interval_ms(self) -> u64 {
        match self {
            Self::Bottlenecks => 30_000,
            Self::Optimization => 60_000,
            Self::Degradation => 15_000,
            Self::Resources => 45_000,
        }
    }

    /// Evaluate the rule.
    ///
    /// # Errors
    ///
    /// Rules are pure and currently infallible; the `Result` lets the
    /// generator treat every rule as a fallible unit.
    pub fn evaluate(self, ctx: &InsightContext<'_>) -> Result<Vec<InsightDraft>, AnalysisError> {
        Ok(match self {
            Self::Bottlenecks => bottlenecks(ctx),
            Self::Optimization => optimization(ctx),
            Self::Degradation => degradation(ctx),
            Self::Resources => resources(ctx),
        })
    }
}

fn bottlenecks(ctx: &InsightContext<'_>) -> Vec<InsightDraft> {
    let mut out = Vec::new();

    if let Some((fps, base)) = ctx.current_and_baseline("fps") {
        if fps < base * 0.8 {
            out.push(InsightDraft {
                kind: InsightKind::Bottleneck,
                category: "rendering",
                title: "FPS Performance Bottleneck",
                description: format!(
                    "Current FPS ({fps:.1}) is significantly below baseline ({base:.1})"
                ),
                impact: Severity::High,
                suggestions: ["reduce_graphics_quality", "optimize_rendering"],
                severity: lower_is_worse_severity(fps, base),
                metrics: vec![("current", fps), ("baseline", base), ("ratio", ratio(fps, base))],
            });
        }
    }

    if let Some(trend) = ctx.trends.get("memory_used") {
        if trend.direction == TrendDirection::Increasing {
            let pair = ctx.current_and_baseline("memory_used");
            let mut metrics = vec![("confidence", trend.confidence)];
            if let Some((current, base)) = pair {
                metrics.push(("current", current));
                metrics.push(("baseline", base));
            }
            out.push(InsightDraft {
                kind: InsightKind::Bottleneck,
                category: "memory",
                title: "Memory Usage Bottleneck",
                description: "Memory usage is consistently increasing".to_string(),
                impact: Severity::Medium,
                suggestions: ["memory_cleanup", "check_memory_leaks"],
                severity: pair.map_or(Severity::Medium, |(c, b)| higher_is_worse_severity(c, b)),
                metrics,
            });
        }
    }

    if let Some((frame_time, base)) = ctx.current_and_baseline("frame_time") {
        if frame_time > base * 1.5 {
            out.push(InsightDraft {
                kind: InsightKind::Bottleneck,
                category: "rendering",
                title: "Frame Time Bottleneck",
                description: format!(
                    "Frame time ({frame_time:.2}ms) is significantly above baseline"
                ),
                impact: Severity::High,
                suggestions: ["optimize_rendering", "reduce_complexity"],
                severity: higher_is_worse_severity(frame_time, base),
                metrics: vec![
                    ("current", frame_time),
                    ("baseline", base),
                    ("ratio", ratio(frame_time, base)),
                ],
            });
        }
    }

    out
}

fn optimization(ctx: &InsightContext<'_>) -> Vec<InsightDraft> {
    let mut out = Vec::new();
    let Some(descriptive) = ctx.statistics.descriptive.as_ref() else {
        return out;
    };

    if let Some(fps) = descriptive.stats.get("fps") {
        if fps.p95 > 55.0 {
            out.push(InsightDraft {
                kind: InsightKind::Optimization,
                category: "rendering",
                title: "FPS Optimization Opportunity",
                description: "System can handle higher graphics quality settings".to_string(),
                impact: Severity::Low,
                suggestions: ["increase_graphics_quality", "enable_advanced_features"],
                severity: Severity::Low,
                metrics: vec![("p95_fps", fps.p95), ("threshold", 55.0)],
            });
        }
    }

    if let Some(memory) = descriptive.stats.get("memory_used") {
        if memory.max != 0.0 {
            let efficiency = memory.mean / memory.max;
            if efficiency < 0.7 {
                out.push(InsightDraft {
                    kind: InsightKind::Optimization,
                    category: "memory",
                    title: "Memory Optimization Opportunity",
                    description: "Memory usage patterns suggest optimization potential"
                        .to_string(),
                    impact: Severity::Medium,
                    suggestions: ["memory_pooling", "optimize_allocations"],
                    severity: Severity::Low,
                    metrics: vec![("efficiency", efficiency), ("threshold", 0.7)],
                });
            }
        }
    }

    if let Some((latency, base)) = ctx.current_and_baseline("network_latency") {
        if latency < base * 0.8 {
            out.push(InsightDraft {
                kind: InsightKind::Optimization,
                category: "network",
                title: "Network Performance Opportunity",
                description: "Network conditions allow for enhanced features".to_string(),
                impact: Severity::Low,
                suggestions: ["enable_network_features", "increase_sync_frequency"],
                severity: Severity::Low,
                metrics: vec![
                    ("current", latency),
                    ("baseline", base),
                    ("ratio", ratio(latency, base)),
                ],
            });
        }
    }

    out
}

fn degradation(ctx: &InsightContext<'_>) -> Vec<InsightDraft> {
    let mut out = Vec::new();

    if let Some(trend) = ctx.trends.get("fps") {
        if trend.direction == TrendDirection::Decreasing && trend.confidence > 0.7 {
            out.push(InsightDraft {
                kind: InsightKind::Degradation,
                category: "performance",
                title: "FPS Degradation Detected",
                description: format!(
                    "FPS is showing a decreasing trend with {:.1}% confidence",
                    trend.confidence * 100.0
                ),
                impact: Severity::High,
                suggestions: ["investigate_performance", "restart_application"],
                severity: Severity::High,
                metrics: vec![("confidence", trend.confidence)],
            });
        }
    }

    if let Some(trend) = ctx.trends.get("memory_used") {
        if trend.direction == TrendDirection::Increasing && trend.confidence > 0.8 {
            out.push(InsightDraft {
                kind: InsightKind::Degradation,
                category: "memory",
                title: "Memory Degradation Detected",
                description: format!(
                    "Memory usage is consistently increasing with {:.1}% confidence",
                    trend.confidence * 100.0
                ),
                impact: Severity::Medium,
                suggestions: ["memory_cleanup", "investigate_leaks"],
                severity: Severity::Medium,
                metrics: vec![("confidence", trend.confidence)],
            });
        }
    }

    let critical = ctx
        .anomalies
        .iter()
        .filter(|a| {
            a.severity == Severity::Critical
                && ctx.timestamp.saturating_sub(a.timestamp) < INSTABILITY_WINDOW_MS
        })
        .count();
    if critical >= INSTABILITY_ANOMALIES {
        #[allow(clippy::cast_precision_loss)]
        let count = critical as f64;
        out.push(InsightDraft {
            kind: InsightKind::Degradation,
            category: "stability",
            title: "Performance Instability Detected",
            description: "Multiple critical anomalies detected in the last 30 seconds".to_string(),
            impact: Severity::Critical,
            suggestions: ["emergency_mode", "restart_application"],
            severity: Severity::Critical,
            metrics: vec![("anomaly_count", count), ("time_window", 30_000.0)],
        });
    }

    out
}

fn resources(ctx: &InsightContext<'_>) -> Vec<InsightDraft> {
    let mut out = Vec::new();

    if let Some((memory, base)) = ctx.current_and_baseline("memory_used") {
        if memory > base * 1.5 {
            out.push(InsightDraft {
                kind: InsightKind::Resource,
                category: "memory",
                title: "High Memory Utilization",
                description: format!("Memory usage ({memory:.1}MB) is 50% above baseline"),
                impact: Severity::Medium,
                suggestions: ["memory_cleanup", "close_unused_features"],
                severity: higher_is_worse_severity(memory, base),
                metrics: vec![
                    ("current", memory),
                    ("baseline", base),
                    ("ratio", ratio(memory, base)),
                ],
            });
        }
    }

    if let Some(cpu) = ctx.metrics.get("cpu_usage") {
        if cpu > 80.0 {
            out.push(InsightDraft {
                kind: InsightKind::Resource,
                category: "cpu",
                title: "High CPU Utilization",
                description: format!("CPU usage ({cpu:.1}%) is very high"),
                impact: Severity::High,
                suggestions: ["reduce_cpu_load", "optimize_algorithms"],
                severity: if cpu > 90.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                metrics: vec![("current", cpu), ("threshold", 80.0)],
            });
        }
    }

    if let Some((latency, base)) = ctx.current_and_baseline("network_latency") {
        if latency > base * 2.0 {
            out.push(InsightDraft {
                kind: InsightKind::Resource,
                category: "network",
                title: "High Network Latency",
                description: format!("Network latency ({latency:.1}ms) is significantly elevated"),
                impact: Severity::Medium,
                suggestions: ["check_network", "reduce_network_load"],
                severity: higher_is_worse_severity(latency, base),
                metrics: vec![
                    ("current", latency),
                    ("baseline", base),
                    ("ratio", ratio(latency, base)),
                ],
            });
        }
    }

    out
}

// ============================================================================
// Recommendations and reports
// ============================================================================

/// Description for a suggestion key.
#[must_use]
pub fn recommendation_description(action: &str) -> String {
    let known = match action {
        "reduce_graphics_quality" => {
            "Consider reducing graphics quality settings to improve performance"
        }
        "optimize_rendering" => "Review rendering pipeline for optimization opportunities",
        "memory_cleanup" => "Perform memory cleanup and garbage collection",
        "check_memory_leaks" => "Investigate potential memory leaks",
        "investigate_performance" => "Conduct detailed performance analysis",
        "restart_application" => "Consider restarting the application to reset performance state",
        "emergency_mode" => "Switch to emergency performance mode",
        "increase_graphics_quality" => "System performance allows for higher graphics settings",
        "enable_advanced_features" => "Performance headroom available for advanced features",
        "close_unused_features" => "Close or disable unused features to free resources",
        _ => return format!("Execute action: {action}"),
    };
    known.to_string()
}

/// A ranked recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Suggestion key.
    pub action: String,
    /// Occurrences among recent insights.
    pub frequency: usize,
    /// `high` at 3+, `medium` at 2, else `low`.
    pub priority: Priority,
    /// Human-readable description.
    pub description: String,
}

/// Rank suggestion keys by frequency; ties keep first-encounter order.
#[must_use]
pub fn rank_recommendations(insights: &[Insight], limit: usize) -> Vec<Recommendation> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for suggestion in insights.iter().flat_map(|i| i.suggestions.iter()) {
        match counts.iter_mut().find(|(key, _)| *key == suggestion) {
            Some((_, count)) => *count += 1,
            None => counts.push((suggestion, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(action, frequency)| Recommendation {
            action: action.to_string(),
            frequency,
            priority: match frequency {
                3.. => Priority::High,
                2 => Priority::Medium,
                _ => Priority::Low,
            },
            description: recommendation_description(action),
        })
        .collect()
}

/// Summary report over the insight history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    /// Report time.
    pub timestamp: u64,
    /// Insights in history.
    pub total_insights: usize,
    /// Recent insights counted.
    pub recent_insights: usize,
    /// Critical insights in history.
    pub critical_issues: usize,
    /// High-severity insights in history.
    pub high_priority_issues: usize,
    /// Counts per category over the whole history.
    pub categories: BTreeMap<String, usize>,
    /// Recent insights grouped by category.
    pub recent_by_category: BTreeMap<String, Vec<Insight>>,
    /// Top recommendations from recent insights.
    pub recommendations: Vec<Recommendation>,
}

// ============================================================================
// InsightGenerator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RuleSlot {
    rule: InsightRule,
    priority: Priority,
    min_interval_ms: u64,
    last_generated: Option<u64>,
}

/// Runs the rule registry and keeps the insight history.
#[derive(Debug, Clone)]
pub struct InsightGenerator {
    slots: Vec<RuleSlot>,
    insights: VecDeque<Insight>,
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self::new(&InsightRule::ALL)
    }
}

impl InsightGenerator {
    /// Create a generator with the given rules at their default priority
    /// and interval.
    #[must_use]
    pub fn new(rules: &[InsightRule]) -> Self {
        Self {
            slots: rules
                .iter()
                .map(|rule| RuleSlot {
                    rule: *rule,
                    priority: rule.default_priority(),
                    min_interval_ms: rule.default_interval_ms(),
                    last_generated: None,
                })
                .collect(),
            insights: VecDeque::new(),
        }
    }

    /// Override one rule's minimum interval.
    pub fn set_interval(&mut self, rule: InsightRule, min_interval_ms: u64) {
        for slot in self.slots.iter_mut().filter(|s| s.rule == rule) {
            slot.min_interval_ms = min_interval_ms;
        }
    }

    /// Bound every rule's interval by `max_interval_ms`. Rules whose default
    /// is shorter keep it.
    pub fn cap_intervals(&mut self, max_interval_ms: u64) {
        for slot in &mut self.slots {
            slot.min_interval_ms = slot.rule.default_interval_ms().min(max_interval_ms);
        }
    }

    /// Run every due rule. Returns the insights produced this call.
    pub fn generate(&mut self, ctx: &InsightContext<'_>) -> Vec<Insight> {
        self.generate_with(ctx, |rule, ctx| rule.evaluate(ctx))
    }

    /// Run every due rule through `eval`. Lets callers wrap or replace rule
    /// evaluation while keeping cooldown and history handling.
    pub fn generate_with<F>(&mut self, ctx: &InsightContext<'_>, mut eval: F) -> Vec<Insight>
    where
        F: FnMut(InsightRule, &InsightContext<'_>) -> Result<Vec<InsightDraft>, AnalysisError>,
    {
        let mut produced = Vec::new();
        for slot in &mut self.slots {
            let due = match slot.last_generated {
                Some(last) => ctx.timestamp.saturating_sub(last) >= slot.min_interval_ms,
                None => true,
            };
            if !due {
                continue;
            }

            let unit = format!("insight:{}", slot.rule.id());
            let Some(drafts) = isolate(&unit, || eval(slot.rule, ctx)) else {
                continue;
            };
            if drafts.is_empty() {
                continue;
            }

            slot.last_generated = Some(ctx.timestamp);
            produced.extend(
                drafts
                    .into_iter()
                    .map(|d| d.stamp(ctx.timestamp, slot.rule.id(), slot.priority)),
            );
        }

        self.insights.extend(produced.iter().cloned());
        while self.insights.len() > INSIGHT_HISTORY_CAP {
            self.insights.pop_front();
        }
        produced
    }

    /// Insight history, oldest first.
    #[must_use]
    pub const fn insights(&self) -> &VecDeque<Insight> {
        &self.insights
    }

    /// The last `n` insights, oldest first.
    #[must_use]
    pub fn last(&self, n: usize) -> Vec<Insight> {
        let skip = self.insights.len().saturating_sub(n);
        self.insights.iter().skip(skip).cloned().collect()
    }

    /// The last [`RECENT_INSIGHTS`], optionally filtered by category.
    #[must_use]
    pub fn recent(&self, category: Option<&str>) -> Vec<Insight> {
        let mut recent = self.last(RECENT_INSIGHTS);
        if let Some(category) = category {
            recent.retain(|i| i.category == category);
        }
        recent
    }

    /// All insights of a type.
    #[must_use]
    pub fn by_type(&self, kind: InsightKind) -> Vec<Insight> {
        self.insights.iter().filter(|i| i.kind == kind).cloned().collect()
    }

    /// All insights of a severity.
    #[must_use]
    pub fn by_severity(&self, severity: Severity) -> Vec<Insight> {
        self.insights
            .iter()
            .filter(|i| i.severity == severity)
            .cloned()
            .collect()
    }

    /// Build a report as of `now`.
    #[must_use]
    pub fn report(&self, now: u64) -> InsightReport {
        let recent = self.recent(None);
        let mut categories = BTreeMap::new();
        for insight in &self.insights {
            *categories.entry(insight.category.clone()).or_insert(0) += 1;
        }
        let mut recent_by_category: BTreeMap<String, Vec<Insight>> = BTreeMap::new();
        for insight in &recent {
            recent_by_category
                .entry(insight.category.clone())
                .or_default()
                .push(insight.clone());
        }

        InsightReport {
            timestamp: now,
            total_insights: self.insights.len(),
            recent_insights: recent.len(),
            critical_issues: self.by_severity(Severity::Critical).len(),
            high_priority_issues: self.by_severity(Severity::High).len(),
            categories,
            recent_by_category,
            recommendations: rank_recommendations(&recent, TOP_RECOMMENDATIONS),
        }
    }

    /// Replace the history.
    pub fn restore(&mut self, insights: Vec<Insight>) {
        self.insights = insights.into();
        while self.insights.len() > INSIGHT_HISTORY_CAP {
            self.insights.pop_front();
        }
    }

    /// Drop history and cooldowns.
    pub fn clear(&mut self) {
        self.insights.clear();
        for slot in &mut self.slots {
            slot.last_generated = None;
        }
    }
}
