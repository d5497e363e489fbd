//! Load generation against the prediction endpoint

use anyhow::{Context, Result};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::client::{ApiClient, ApiError, PredictionInput};
use crate::output::{format_latency, print_info, print_json, print_success, print_warning, OutputFormat};

pub const DEFAULT_DISTRICT: &str = "ANURADHAPURA";

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub requests: usize,
    pub concurrency: usize,
    pub season: String,
    pub district: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub requests: usize,
    pub successes: usize,
    pub failures: usize,
    pub elapsed_secs: f64,
    pub requests_per_sec: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    /// Failure counts keyed by API reason or HTTP status
    pub errors: BTreeMap<String, usize>,
}

/// Random request in the ranges the service sees in practice
pub fn random_payload<R: Rng>(rng: &mut R, season: &str, district: &str) -> PredictionInput {
    let sown_hect: f64 = rng.gen_range(1000.0..5000.0);
    let previous_yield: f64 = rng.gen_range(3000.0..8000.0);
    let previous_production = if season == "Maha" {
        Some(round2(rng.gen_range(10_000.0..50_000.0)))
    } else {
        None
    };

    PredictionInput {
        year: rng.gen_range(2000..=2024),
        season: season.to_string(),
        district: district.to_string(),
        sown_hect: round2(sown_hect),
        previous_yield: round2(previous_yield),
        previous_production,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Nearest-rank percentile over sorted samples
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn failure_key(error: &anyhow::Error) -> String {
    match error.downcast_ref::<ApiError>() {
        Some(api) => api.reason.clone(),
        None => "transport".to_string(),
    }
}

pub fn summarize(latencies_ms: &mut [f64], errors: BTreeMap<String, usize>, elapsed: Duration) -> LoadReport {
    latencies_ms.sort_by(|a, b| a.total_cmp(b));
    let failures: usize = errors.values().sum();
    let requests = latencies_ms.len() + failures;
    let elapsed_secs = elapsed.as_secs_f64();

    LoadReport {
        requests,
        successes: latencies_ms.len(),
        failures,
        elapsed_secs,
        requests_per_sec: if elapsed_secs > 0.0 {
            requests as f64 / elapsed_secs
        } else {
            0.0
        },
        p50_ms: percentile(latencies_ms, 50.0),
        p90_ms: percentile(latencies_ms, 90.0),
        p99_ms: percentile(latencies_ms, 99.0),
        max_ms: latencies_ms.last().copied().unwrap_or(0.0),
        errors,
    }
}

pub async fn run_load(client: ApiClient, options: LoadOptions, format: OutputFormat) -> Result<()> {
    if options.requests == 0 {
        anyhow::bail!("--requests must be at least 1");
    }

    let client = Arc::new(client);
    let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "Sending {} {} requests for {} with concurrency {}",
            options.requests, options.season, options.district, options.concurrency
        ));
    }

    let started = Instant::now();
    for _ in 0..options.requests {
        let payload = random_payload(&mut rand::thread_rng(), &options.season, &options.district);
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .context("Load generator semaphore closed")?;
        let client = client.clone();

        tasks.spawn(async move {
            let sent = Instant::now();
            let outcome = client.predict(&payload).await;
            drop(permit);
            (sent.elapsed(), outcome)
        });
    }

    let mut latencies_ms = Vec::with_capacity(options.requests);
    let mut errors: BTreeMap<String, usize> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (latency, outcome) = joined.context("Load task panicked")?;
        match outcome {
            Ok(_) => latencies_ms.push(latency.as_secs_f64() * 1000.0),
            Err(e) => *errors.entry(failure_key(&e)).or_default() += 1,
        }
    }

    let report = summarize(&mut latencies_ms, errors, started.elapsed());

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &LoadReport) {
    if report.failures == 0 {
        print_success(&format!("{} requests succeeded", report.successes));
    } else {
        print_warning(&format!(
            "{} of {} requests failed",
            report.failures, report.requests
        ));
        for (reason, count) in &report.errors {
            println!("  {}: {}", reason, count);
        }
    }

    println!("Elapsed: {:.2}s ({:.1} req/s)", report.elapsed_secs, report.requests_per_sec);
    println!(
        "Latency p50 {}  p90 {}  p99 {}  max {}",
        format_latency(report.p50_ms),
        format_latency(report.p90_ms),
        format_latency(report.p99_ms),
        format_latency(report.max_ms)
    );
}
