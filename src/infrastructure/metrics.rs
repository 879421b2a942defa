// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::settings::MetricsSettings;

/// 初始化指标系统
///
/// 未启用时不安装记录器，`metrics` 宏调用成为空操作。
pub fn init_metrics(settings: &MetricsSettings) -> Result<()> {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = settings
        .listen_addr
        .parse()
        .with_context(|| format!("invalid metrics listen address {}", settings.listen_addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus recorder")?;

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

fn describe_metrics() {
    describe_counter!("jobs_submitted_total", "Scrape jobs accepted, by engine");
    describe_counter!("jobs_completed_total", "Scrape jobs completed, by engine");
    describe_counter!(
        "jobs_failed_total",
        "Scrape jobs failed terminally, by engine and error code"
    );
    describe_counter!(
        "jobs_requeued_total",
        "Scrape jobs put back on their queue, by engine and reason"
    );
    describe_counter!("credits_charged_total", "Credits charged for completed jobs");
    describe_histogram!(
        "job_duration_seconds",
        "Wall time of a single job execution attempt"
    );
    describe_gauge!("queue_depth", "Ready plus delayed jobs per engine queue");
    describe_gauge!("workers_running", "Worker tasks currently running per engine");
    describe_gauge!("browser_pool_live", "Browser processes currently alive");
    describe_gauge!("browser_pool_idle", "Browser processes idle in the pool");
    describe_gauge!("browser_pool_in_use", "Browser processes checked out");
    describe_counter!("browser_pool_created_total", "Browser processes launched");
    describe_counter!(
        "browser_pool_retired_total",
        "Browser processes retired, by reason"
    );
    describe_counter!(
        "browser_pool_exhausted_total",
        "Acquire calls that timed out waiting for a browser"
    );
}
