//! Hand-rolled Prometheus text exposition. No teacher file talks to
//! Prometheus directly, so this follows the wire format's own spec rather
//! than a crate; the counters/histogram shape mirrors how the teacher
//! tracks simple process-wide counters elsewhere (plain atomics, no lock).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::kernel::LoadAccount;

/// Upper bounds (inclusive) of the latency histogram buckets, in
/// milliseconds; the final bucket is implicitly `+Inf`.
const LATENCY_BUCKETS_MS: &[u64] = &[50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000];

pub struct Metrics {
    queries_total: AtomicU64,
    queries_failed_total: AtomicU64,
    latency_bucket_counts: Vec<AtomicU64>,
    latency_sum_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            queries_total: AtomicU64::new(0),
            queries_failed_total: AtomicU64::new(0),
            latency_bucket_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            latency_sum_ms: AtomicU64::new(0),
        }
    }

    pub fn record_query(&self, latency_ms: u64, success: bool) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.queries_failed_total.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        for (bound, counter) in LATENCY_BUCKETS_MS.iter().zip(self.latency_bucket_counts.iter()) {
            if latency_ms <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Render the current counters plus per-replica load gauges as
    /// Prometheus text exposition format.
    pub async fn render(&self, load: &Arc<dyn LoadAccount>, replica_count: usize) -> String {
        let mut out = String::new();

        out.push_str("# HELP rag_queries_total Total queries accepted by the ingress.\n");
        out.push_str("# TYPE rag_queries_total counter\n");
        out.push_str(&format!("rag_queries_total {}\n", self.queries_total.load(Ordering::Relaxed)));

        out.push_str("# HELP rag_queries_failed_total Queries that ended in an error.\n");
        out.push_str("# TYPE rag_queries_failed_total counter\n");
        out.push_str(&format!(
            "rag_queries_failed_total {}\n",
            self.queries_failed_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP rag_query_latency_ms Query end-to-end latency in milliseconds.\n");
        out.push_str("# TYPE rag_query_latency_ms histogram\n");
        let mut cumulative = 0u64;
        for (bound, counter) in LATENCY_BUCKETS_MS.iter().zip(self.latency_bucket_counts.iter()) {
            cumulative = counter.load(Ordering::Relaxed).max(cumulative);
            out.push_str(&format!("rag_query_latency_ms_bucket{{le=\"{bound}\"}} {cumulative}\n"));
        }
        let total = self.queries_total.load(Ordering::Relaxed);
        out.push_str(&format!("rag_query_latency_ms_bucket{{le=\"+Inf\"}} {total}\n"));
        out.push_str(&format!("rag_query_latency_ms_sum {}\n", self.latency_sum_ms.load(Ordering::Relaxed)));
        out.push_str(&format!("rag_query_latency_ms_count {total}\n"));

        out.push_str("# HELP rag_replica_load Current in-flight job count per generator replica.\n");
        out.push_str("# TYPE rag_replica_load gauge\n");
        for replica in 0..replica_count {
            let value = load.get(replica).await.unwrap_or(0);
            out.push_str(&format!("rag_replica_load{{replica=\"{replica}\"}} {value}\n"));
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::InMemoryLoadAccount;

    #[tokio::test]
    async fn render_reflects_recorded_queries() {
        let metrics = Metrics::new();
        metrics.record_query(40, true);
        metrics.record_query(2000, false);

        let load: Arc<dyn LoadAccount> = Arc::new(InMemoryLoadAccount::new());
        let text = metrics.render(&load, 2).await;

        assert!(text.contains("rag_queries_total 2"));
        assert!(text.contains("rag_queries_failed_total 1"));
        assert!(text.contains("rag_query_latency_ms_count 2"));
        assert!(text.contains("rag_replica_load{replica=\"0\"}"));
    }
}
