use metrics::{counter, histogram};

// Recorded against the Prometheus recorder installed at startup, so these
// show up in the `/metrics` exposition.

pub fn inc_requests(route: &'static str) {
    counter!("mull_requests_total", "route" => route).increment(1);
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    histogram!("mull_stage_elapsed_ms", "stage" => stage).record(elapsed_ms as f64);
}

/// Counts insight runs answered with the encouragement payload because the
/// text-generation gateway was unreachable.
pub fn inc_insight_fallback() {
    counter!("mull_insight_fallback_total").increment(1);
}
