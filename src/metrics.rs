use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, opts,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry,
};
use std::{sync::LazyLock, time::Duration};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

trait ResultExt<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                eprintln!("failed to initialize metric ({context}): {err}");
                std::process::exit(1);
            }
        }
    }
}

/// Step and tool durations range from seconds to the better part of an hour.
const LONG_BUCKETS: &[f64] = &[
    0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0,
];

pub static OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "oradba_operations_total",
            "Total administrative operations by result"
        ),
        &["operation", "result"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        HistogramOpts::new(
            "oradba_operation_duration_seconds",
            "Administrative operation duration in seconds"
        )
        .buckets(LONG_BUCKETS.to_vec()),
        &["operation"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static STEP_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        HistogramOpts::new(
            "oradba_step_duration_seconds",
            "Plan step duration in seconds"
        )
        .buckets(LONG_BUCKETS.to_vec()),
        &["step"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static PLANS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!("oradba_plans_total", "Executed plans by final status"),
        &["status"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static JOBS_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!("oradba_jobs_running", "Background jobs in progress", &REGISTRY)
        .or_exit("metric can be created")
});

pub static LOGIN_ATTEMPTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!("oradba_login_attempts_total", "Web login attempts by result"),
        &["result"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static TERMINAL_COMMANDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "oradba_terminal_commands_total",
            "Web terminal commands by allow-list verdict"
        ),
        &["verdict"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

/// Count one finished operation and its duration.
#[inline]
pub fn record_operation(operation: &str, ok: bool, elapsed: Duration) {
    let result = if ok { "success" } else { "error" };
    OPERATIONS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}

/// Encode metrics to Prometheus text format
///
/// # Errors
///
/// Returns an error if the metrics cannot be encoded
pub fn encode_metrics() -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| format!("could not encode custom metrics: {e}"))?;

    Ok(buffer)
}
