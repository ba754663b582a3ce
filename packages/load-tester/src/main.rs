//! Issues concurrent queries against the ingress and reports latency
//! percentiles. Ported from the source project's own `load_tester.py`
//! sample-query pool and percentile methodology.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SAMPLE_QUERIES: &[&str] = &[
    "What is recursion in computer science?",
    "Explain the difference between REST and GraphQL.",
    "How does machine learning improve RAG systems?",
    "What are the benefits of microservices architecture?",
    "Describe the role of embeddings in vector databases.",
    "What is the CAP theorem in distributed systems?",
    "How does Redis handle persistence?",
    "Explain the difference between SQL and NoSQL databases.",
];

#[derive(Parser)]
#[command(about = "Concurrent load generator for the RAG ingress")]
struct Args {
    /// Ingress /query endpoint URL.
    #[arg(long, env = "LT_TARGET_URL", default_value = "http://localhost:8080/query")]
    target_url: String,

    /// Number of concurrent requests to issue.
    #[arg(long, env = "LT_CONCURRENCY", default_value_t = 50)]
    concurrency: usize,

    /// Per-request timeout, seconds.
    #[arg(long, default_value_t = 60)]
    timeout_s: u64,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct QueryResponse {
    job_id: String,
    answer: String,
    latency_ms: u64,
    selected_replica: usize,
}

struct RequestOutcome {
    request_id: usize,
    latency_ms: f64,
    success: bool,
    error: Option<String>,
}

async fn send_query(
    client: &reqwest::Client,
    url: &str,
    query: &str,
    request_id: usize,
) -> RequestOutcome {
    let start = Instant::now();
    let result = client.post(url).json(&QueryRequest { query }).send().await;

    match result {
        Ok(response) if response.status().is_success() => {
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            match response.json::<QueryResponse>().await {
                Ok(_) => RequestOutcome { request_id, latency_ms, success: true, error: None },
                Err(e) => RequestOutcome {
                    request_id,
                    latency_ms,
                    success: false,
                    error: Some(format!("malformed response: {e}")),
                },
            }
        }
        Ok(response) => {
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            RequestOutcome {
                request_id,
                latency_ms,
                success: false,
                error: Some(format!("{status}: {body}")),
            }
        }
        Err(e) => RequestOutcome {
            request_id,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            success: false,
            error: Some(e.to_string()),
        },
    }
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_s))
        .build()
        .context("failed to build HTTP client")?;

    println!("{}", "=".repeat(60));
    println!("RAG System Load Test");
    println!("{}", "=".repeat(60));
    println!("Target: {}", args.target_url);
    println!("Concurrency: {} requests", args.concurrency);
    println!("Starting test...\n");

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(args.concurrency);
    for i in 0..args.concurrency {
        let client = client.clone();
        let url = args.target_url.clone();
        let query = SAMPLE_QUERIES[i % SAMPLE_QUERIES.len()].to_string();
        tasks.push(tokio::spawn(async move { send_query(&client, &url, &query, i).await }));
    }

    let mut results = Vec::with_capacity(args.concurrency);
    for task in tasks {
        results.push(task.await.context("load test task panicked")?);
    }
    let total_time = start.elapsed();

    let (successful, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.success);

    if successful.is_empty() {
        println!("\nAll requests failed!");
        for r in failed.iter().take(3) {
            println!("  sample error: {}", r.error.as_deref().unwrap_or("unknown"));
        }
        return Ok(());
    }

    let mut latencies: Vec<f64> = successful.iter().map(|r| r.latency_ms).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let min = latencies.first().copied().unwrap_or(0.0);
    let max = latencies.last().copied().unwrap_or(0.0);
    let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
    let p50 = percentile(&latencies, 50.0);
    let p95 = percentile(&latencies, 95.0);
    let p99 = percentile(&latencies, 99.0);

    println!("\n{}", "=".repeat(60));
    println!("Load Test Results");
    println!("{}", "=".repeat(60));
    println!("Total Duration:    {:.2}s", total_time.as_secs_f64());
    println!("Total Requests:    {}", args.concurrency);
    println!(
        "Successful:        {} ({:.1}%)",
        successful.len(),
        successful.len() as f64 / args.concurrency as f64 * 100.0
    );
    println!(
        "Failed:            {} ({:.1}%)",
        failed.len(),
        failed.len() as f64 / args.concurrency as f64 * 100.0
    );
    println!("\nLatency Statistics (ms):");
    println!("  Min:             {min:.2}");
    println!("  P50 (Median):    {p50:.2}");
    println!("  P95:             {p95:.2}");
    println!("  P99:             {p99:.2}");
    println!("  Max:             {max:.2}");
    println!("  Average:         {mean:.2}");
    println!("\nThroughput:        {:.2} req/s", args.concurrency as f64 / total_time.as_secs_f64());

    if !failed.is_empty() {
        println!("\nErrors encountered:");
        for (i, r) in failed.iter().take(5).enumerate() {
            println!("  {}. [{}] {}", i + 1, r.request_id, r.error.as_deref().unwrap_or("unknown"));
        }
        if failed.len() > 5 {
            println!("  ... and {} more", failed.len() - 5);
        }
    }

    println!("\n{}", "=".repeat(60));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_empty_slice_is_zero() {
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn p50_of_sorted_values_is_the_median() {
        let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&values, 50.0), 30.0);
    }

    #[test]
    fn p99_of_small_samples_is_close_to_the_max() {
        let values = vec![10.0, 20.0, 30.0];
        assert_eq!(percentile(&values, 99.0), 30.0);
    }
}
