use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::domain::order::ErrorKind;

// ============================================================================
// Metrics Module - Prometheus metrics for the order store
// ============================================================================
//
// Provides metrics for:
// - Order commands (throughput, latency, failures by error kind)
// - Optimistic concurrency retries
// - Catalog stock operations
// - Seed/import volume
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Command Metrics
    pub commands_total: IntCounterVec,
    pub command_failures: IntCounterVec,
    pub command_duration: HistogramVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,

    // Catalog Metrics
    pub stock_operations: IntCounterVec,

    // Import Metrics
    pub orders_imported: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let commands_total = IntCounterVec::new(
            Opts::new("order_commands_total", "Total order commands that succeeded"),
            &["command"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_failures = IntCounterVec::new(
            Opts::new("order_command_failures_total", "Total order commands that failed"),
            &["command", "kind"],
        )?;
        registry.register(Box::new(command_failures.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new("order_command_duration_seconds", "Order command duration")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("order_retry_attempts_total", "Total retried order commands"),
            &["command", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let stock_operations = IntCounterVec::new(
            Opts::new("catalog_stock_operations_total", "Catalog stock operations"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(stock_operations.clone()))?;

        let orders_imported = IntCounter::new("orders_imported_total", "Total orders imported from documents")?;
        registry.register(Box::new(orders_imported.clone()))?;

        Ok(Self {
            registry,
            commands_total,
            command_failures,
            command_duration,
            retry_attempts_total,
            stock_operations,
            orders_imported,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_command(&self, command: &str, duration_secs: f64, outcome: Result<(), ErrorKind>) {
        match outcome {
            Ok(()) => self.commands_total.with_label_values(&[command]).inc(),
            Err(kind) => self
                .command_failures
                .with_label_values(&[command, kind.as_str()])
                .inc(),
        }
        self.command_duration.with_label_values(&[command]).observe(duration_secs);
    }

    pub fn record_retry_attempt(&self, command: &str, attempt: u32) {
        let attempt = attempt.to_string();
        self.retry_attempts_total
            .with_label_values(&[command, attempt.as_str()])
            .inc();
    }

    pub fn record_stock_operation(&self, operation: &str, success: bool) {
        let outcome = if success { "ok" } else { "rejected" };
        self.stock_operations.with_label_values(&[operation, outcome]).inc();
    }

    pub fn record_import(&self, count: usize) {
        self.orders_imported.inc_by(count as u64);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
