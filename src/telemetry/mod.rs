//! Telemetry for the inference bridge
//!
//! Bounded in-memory event log with counters: session transitions, loads, real vs
//! simulated analyses, fallbacks, server spawns and shutdowns.

use colored::Colorize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Events kept in the log; counters keep counting past this
const MAX_EVENTS: usize = 1_000;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    StateTransition {
        from: String,
        to: String,
        timestamp: Instant,
    },
    LoadCompleted {
        outcome: String,
        duration_ms: u64,
        timestamp: Instant,
    },
    AnalysisCompleted {
        simulated: bool,
        duration_ms: u64,
        timestamp: Instant,
    },
    FallbackEngaged {
        reason: String,
        timestamp: Instant,
    },
    ServerSpawned {
        timestamp: Instant,
    },
    ServerShutdown {
        issued: bool,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub state_transitions: usize,
    pub loads: usize,
    pub real_analyses: usize,
    pub simulated_analyses: usize,
    pub fallbacks: usize,
    pub server_spawns: usize,
    pub server_terminations: usize,
}

/// Telemetry collector
#[derive(Debug, Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    max_events: usize,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::with_max_events(MAX_EVENTS)
    }

    /// Collector retaining at most `max_events` recent events
    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: max_events.max(1),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        if let Ok(mut stats) = self.stats.lock() {
            match &event {
                TelemetryEvent::StateTransition { .. } => stats.state_transitions += 1,
                TelemetryEvent::LoadCompleted { .. } => stats.loads += 1,
                TelemetryEvent::AnalysisCompleted { simulated: true, .. } => stats.simulated_analyses += 1,
                TelemetryEvent::AnalysisCompleted { simulated: false, .. } => stats.real_analyses += 1,
                TelemetryEvent::FallbackEngaged { .. } => stats.fallbacks += 1,
                TelemetryEvent::ServerSpawned { .. } => stats.server_spawns += 1,
                TelemetryEvent::ServerShutdown { issued: true, .. } => stats.server_terminations += 1,
                TelemetryEvent::ServerShutdown { issued: false, .. } => {}
            }
        }

        if let Ok(mut events) = self.events.lock() {
            if events.len() >= self.max_events {
                events.pop_front();
            }
            events.push_back(event);
        }
    }

    /// Shorthand for a state transition event
    pub fn transition(&self, from: impl ToString, to: impl ToString) {
        self.record(TelemetryEvent::StateTransition {
            from: from.to_string(),
            to: to.to_string(),
            timestamp: Instant::now(),
        });
    }

    pub fn get_stats(&self) -> TelemetryStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        match self.events.lock() {
            Ok(events) => {
                let start = events.len().saturating_sub(n);
                events.iter().skip(start).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Share of analyses that came from the real server
    pub fn real_analysis_rate(&self) -> f64 {
        let stats = self.get_stats();
        let total = stats.real_analyses + stats.simulated_analyses;
        if total == 0 {
            0.0
        } else {
            stats.real_analyses as f64 / total as f64
        }
    }

    /// Print summary statistics
    pub fn display_summary(&self) {
        let stats = self.get_stats();

        println!("\n{}", "Session Summary".bold());
        println!("─────────────────────────────────────");
        println!("Duration:            {:?}", self.elapsed());
        println!("State transitions:   {}", stats.state_transitions);
        println!("Model loads:         {}", stats.loads);
        println!("Real analyses:       {}", stats.real_analyses);
        println!("Simulated analyses:  {}", stats.simulated_analyses);
        println!("Fallbacks:           {}", stats.fallbacks);
        println!("Server spawns:       {}", stats.server_spawns);
        println!("Server terminations: {}", stats.server_terminations);
        println!();
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}
