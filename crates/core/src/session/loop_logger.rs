use std::collections::HashMap;
use std::time::Instant;

/// Observer for detection loop events.
///
/// Lets hosts choose where loop statistics go without touching the loop.
pub trait LoopLogger: Send {
    /// Called once per cycle that reached the detector.
    fn cycle(&mut self, rendered: bool);

    /// Records how long a named stage took for one cycle.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Records a point-in-time metric (e.g. detections per frame).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emitted when the loop exits. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used by the desktop app and by tests.
pub struct NullLoopLogger;

impl LoopLogger for NullLoopLogger {
    fn cycle(&mut self, _rendered: bool) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Count, sum, max and latest value of one stream of samples.
///
/// Fixed size regardless of how long the session runs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn record(&mut self, value: f64) {
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn last(&self) -> f64 {
        self.last
    }
}

/// Aggregates per-stage timings and metrics, logs a throttled status line
/// every `report_every` cycles and a summary when the loop ends.
pub struct StatsLoopLogger {
    report_every: usize,
    timings: HashMap<String, RunningStat>,
    metrics: HashMap<String, RunningStat>,
    start_time: Instant,
    cycles: usize,
    rendered: usize,
}

impl StatsLoopLogger {
    pub fn new(report_every: usize) -> Self {
        Self {
            report_every: report_every.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            cycles: 0,
            rendered: 0,
        }
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn rendered(&self) -> usize {
        self.rendered
    }

    pub fn timings_for(&self, stage: &str) -> Option<&RunningStat> {
        self.timings.get(stage)
    }

    pub fn metrics_for(&self, name: &str) -> Option<&RunningStat> {
        self.metrics.get(name)
    }

    /// Formatted summary, or `None` if no cycle ever ran.
    pub fn summary_string(&self) -> Option<String> {
        if self.cycles == 0 {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let failed = self.cycles - self.rendered;
        let mut lines = vec![format!(
            "Detection summary ({} cycles, {} rendered, {failed} failed, {elapsed_s:.1}s):",
            self.cycles, self.rendered
        )];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, stat) in stages {
            lines.push(format!(
                "  {stage:8}: avg {:6.1}ms  max {:6.1}ms",
                stat.mean(),
                stat.max()
            ));
        }

        let mut names: Vec<_> = self.metrics.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        for (name, stat) in names {
            lines.push(format!("  {name}: avg {:.1}", stat.mean()));
        }

        if elapsed_s > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} fps",
                self.rendered as f64 / elapsed_s
            ));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StatsLoopLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl LoopLogger for StatsLoopLogger {
    fn cycle(&mut self, rendered: bool) {
        self.cycles += 1;
        if rendered {
            self.rendered += 1;
        }
        if self.cycles % self.report_every == 0 {
            let latest = self.timings.get("detect").map_or(0.0, RunningStat::last);
            log::info!(
                "Cycles: {} ({} rendered), last detect {latest:.1}ms",
                self.cycles,
                self.rendered
            );
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
