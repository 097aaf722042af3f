//! 压测指标
//!
//! Prometheus 侧的计数器/仪表，以及进程内的迭代统计（用于结束时打印摘要）。

use std::time::Duration;

use contracts::RunOutcome;
use metrics::{counter, gauge, histogram};

/// 一个分支挂载完成（端口已申请、守卫已安装）
pub fn record_branch_attached() {
    counter!("tee_stress_branches_attached_total").increment(1);
}

/// 分支累计消费的数据单元
pub fn record_units_consumed(units: u64) {
    counter!("tee_stress_units_consumed_total").increment(units);
}

/// 当前迭代尚未达到配额的分支数
pub fn set_remaining_branches(remaining: u64) {
    gauge!("tee_stress_remaining_branches").set(remaining as f64);
}

/// 记录一次迭代的结果与耗时
pub fn record_iteration(outcome: RunOutcome, elapsed: Duration) {
    counter!("tee_stress_iterations_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("tee_stress_iteration_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
}

/// 迭代统计聚合器
#[derive(Debug, Clone, Default)]
pub struct IterationAggregator {
    completed: u64,
    errors: u64,
    timeouts: u64,
    units: u64,
    duration_ms: RunningStats,
}

impl IterationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, outcome: RunOutcome, elapsed: Duration, units: u64) {
        match outcome {
            RunOutcome::Completed => self.completed += 1,
            RunOutcome::Error => self.errors += 1,
            RunOutcome::Timeout => self.timeouts += 1,
        }
        self.units += units;
        self.duration_ms.push(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn iterations(&self) -> u64 {
        self.completed + self.errors + self.timeouts
    }

    pub fn summary(&self) -> IterationSummary {
        IterationSummary {
            completed: self.completed,
            errors: self.errors,
            timeouts: self.timeouts,
            units_consumed: self.units,
            duration_ms: StatsSummary::from(&self.duration_ms),
        }
    }
}

/// 迭代统计摘要
#[derive(Debug, Clone, Default)]
pub struct IterationSummary {
    pub completed: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub units_consumed: u64,
    pub duration_ms: StatsSummary,
}

impl std::fmt::Display for IterationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Completed: {}", self.completed)?;
        writeln!(f, "Errors: {}", self.errors)?;
        writeln!(f, "Timeouts: {}", self.timeouts)?;
        writeln!(f, "Units consumed: {}", self.units_consumed)?;
        write!(f, "Iteration duration (ms): {}", self.duration_ms)
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}

/// 在线统计 (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            (self.min, self.max, self.mean, self.m2) = (value, value, value, 0.0);
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [10.0, 20.0, 30.0, 40.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 4);
        assert!((stats.mean() - 25.0).abs() < 1e-10);
        assert!((stats.min() - 10.0).abs() < 1e-10);
        assert!((stats.max() - 40.0).abs() < 1e-10);
        assert!((stats.variance() - 166.666_666_666_666_66).abs() < 1e-6);
    }

    #[test]
    fn test_aggregator_counts_outcomes() {
        let mut aggregator = IterationAggregator::new();
        aggregator.update(RunOutcome::Completed, Duration::from_millis(120), 4000);
        aggregator.update(RunOutcome::Completed, Duration::from_millis(80), 4000);
        aggregator.update(RunOutcome::Timeout, Duration::from_secs(35), 12);

        let summary = aggregator.summary();
        assert_eq!(aggregator.iterations(), 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.units_consumed, 8012);
        assert_eq!(summary.duration_ms.count, 3);
    }

    #[test]
    fn test_empty_summary_display() {
        let summary = IterationAggregator::new().summary();
        assert!(summary.to_string().contains("Iteration duration (ms): N/A"));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: the macros are no-ops
        record_branch_attached();
        record_units_consumed(20);
        set_remaining_branches(3);
        record_iteration(RunOutcome::Error, Duration::from_millis(5));
    }
}
