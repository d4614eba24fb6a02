//! Per-interaction latency measurement and reporting.

use std::time::{Duration, Instant};

/// Monotonic timestamps for one interaction. Each mark is set once; later
/// marks of the same kind are ignored until [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct InteractionMetrics {
    wake: Option<Instant>,
    command_start: Option<Instant>,
    command_end: Option<Instant>,
    answer_start: Option<Instant>,
    first_token: Option<Instant>,
    first_speech: Option<Instant>,
}

fn mark(slot: &mut Option<Instant>, at: Instant) {
    if slot.is_none() {
        *slot = Some(at);
    }
}

impl InteractionMetrics {
    pub fn mark_wake(&mut self, at: Instant) {
        mark(&mut self.wake, at);
    }

    pub fn mark_command_start(&mut self, at: Instant) {
        mark(&mut self.command_start, at);
    }

    pub fn mark_command_end(&mut self, at: Instant) {
        mark(&mut self.command_end, at);
    }

    /// Dispatch began, for questions and built-ins alike.
    pub fn mark_answer_start(&mut self, at: Instant) {
        mark(&mut self.answer_start, at);
    }

    pub fn mark_first_token(&mut self, at: Instant) {
        mark(&mut self.first_token, at);
    }

    pub fn mark_first_speech(&mut self, at: Instant) {
        mark(&mut self.first_speech, at);
    }

    /// Derived latencies, with `ended_at` closing the interaction.
    pub fn timing(&self, ended_at: Instant) -> InteractionTiming {
        let between = |from: Option<Instant>, to: Option<Instant>| match (from, to) {
            (Some(from), Some(to)) => Some(to.saturating_duration_since(from)),
            _ => None,
        };

        InteractionTiming {
            wake_to_command: between(self.wake, self.command_start),
            command_duration: between(self.command_start, self.command_end),
            answer_latency: between(self.answer_start, self.first_token),
            answer_to_speech: between(self.first_token.or(self.answer_start), self.first_speech),
            total_interaction: between(self.wake.or(self.command_start), Some(ended_at)),
        }
    }
}

/// Latencies derived once at the end of an interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InteractionTiming {
    pub wake_to_command: Option<Duration>,
    pub command_duration: Option<Duration>,
    /// Dispatch start to first streamed token.
    pub answer_latency: Option<Duration>,
    /// First token (or dispatch start for built-ins) to first audio.
    pub answer_to_speech: Option<Duration>,
    pub total_interaction: Option<Duration>,
}

fn millis(duration: Option<Duration>) -> Option<u64> {
    duration.map(|d| d.as_millis() as u64)
}

impl InteractionTiming {
    pub fn log(&self) {
        tracing::info!(
            wake_to_command_ms = millis(self.wake_to_command),
            command_duration_ms = millis(self.command_duration),
            answer_latency_ms = millis(self.answer_latency),
            answer_to_speech_ms = millis(self.answer_to_speech),
            total_ms = millis(self.total_interaction),
            "interaction metrics"
        );
    }
}

/// Aggregated latency statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsStats {
    pub count: usize,
    pub total_avg: Duration,
    pub total_max: Duration,
    /// Average over interactions that streamed an answer.
    pub answer_avg: Option<Duration>,
}

/// Collects timings across interactions for the shutdown summary.
#[derive(Debug, Default)]
pub struct MetricsSummary {
    timings: Vec<InteractionTiming>,
}

impl MetricsSummary {
    pub fn record(&mut self, timing: InteractionTiming) {
        self.timings.push(timing);
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    pub fn stats(&self) -> Option<MetricsStats> {
        let totals: Vec<Duration> = self
            .timings
            .iter()
            .filter_map(|t| t.total_interaction)
            .collect();
        if totals.is_empty() {
            return None;
        }

        let answers: Vec<Duration> = self.timings.iter().filter_map(|t| t.answer_latency).collect();
        let average = |values: &[Duration]| values.iter().sum::<Duration>() / values.len() as u32;

        Some(MetricsStats {
            count: totals.len(),
            total_avg: average(&totals),
            total_max: totals.iter().copied().max().unwrap_or_default(),
            answer_avg: (!answers.is_empty()).then(|| average(&answers)),
        })
    }

    pub fn log_summary(&self) {
        match self.stats() {
            Some(stats) => tracing::info!(
                interactions = stats.count,
                total_avg_ms = stats.total_avg.as_millis() as u64,
                total_max_ms = stats.total_max.as_millis() as u64,
                answer_avg_ms = millis(stats.answer_avg),
                "session metrics summary"
            ),
            None => tracing::info!("no completed interactions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_full_interaction_timing() {
        let base = Instant::now();
        let mut metrics = InteractionMetrics::default();
        metrics.mark_wake(base);
        metrics.mark_command_start(at(base, 100));
        metrics.mark_command_end(at(base, 2100));
        metrics.mark_answer_start(at(base, 2600));
        metrics.mark_first_token(at(base, 3400));
        metrics.mark_first_speech(at(base, 4000));

        let timing = metrics.timing(at(base, 6000));
        assert_eq!(timing.wake_to_command, Some(Duration::from_millis(100)));
        assert_eq!(timing.command_duration, Some(Duration::from_millis(2000)));
        assert_eq!(timing.answer_latency, Some(Duration::from_millis(800)));
        assert_eq!(timing.answer_to_speech, Some(Duration::from_millis(600)));
        assert_eq!(timing.total_interaction, Some(Duration::from_millis(6000)));
    }

    #[test]
    fn test_marks_are_set_once() {
        let base = Instant::now();
        let mut metrics = InteractionMetrics::default();
        metrics.mark_answer_start(base);
        metrics.mark_first_speech(at(base, 300));
        metrics.mark_first_speech(at(base, 900));

        let timing = metrics.timing(at(base, 1000));
        // Built-in response: no token, speech measured from dispatch
        assert_eq!(timing.answer_latency, None);
        assert_eq!(timing.answer_to_speech, Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_summary_averages() {
        let mut summary = MetricsSummary::default();
        assert!(summary.stats().is_none());

        summary.record(InteractionTiming {
            total_interaction: Some(Duration::from_millis(2000)),
            answer_latency: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        summary.record(InteractionTiming {
            total_interaction: Some(Duration::from_millis(4000)),
            ..Default::default()
        });

        let stats = summary.stats().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_avg, Duration::from_millis(3000));
        assert_eq!(stats.total_max, Duration::from_millis(4000));
        assert_eq!(stats.answer_avg, Some(Duration::from_millis(500)));
        assert_eq!(summary.len(), 2);
    }
}
