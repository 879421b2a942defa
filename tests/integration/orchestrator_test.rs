// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{build_stack, test_settings, wait_for_terminal};
use scrapifie::application::usecases::ScrapeSubmission;
use scrapifie::domain::models::{EngineType, JobStatus, ScrapeOptions};
use scrapifie::domain::repositories::JobRepository;
use scrapifie::queue::JobQueue;
use std::sync::atomic::Ordering;
use std::time::Duration;
use uuid::Uuid;

fn browser_submission(path: &str) -> ScrapeSubmission {
    ScrapeSubmission::new(
        Uuid::new_v4(),
        format!("https://example.com/{}", path),
        ScrapeOptions {
            render_js: true,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_start_all_twice_returns_same_set() {
    let stack = build_stack(test_settings(), Duration::ZERO);

    let first = stack.orchestrator.start_all().await;
    let second = stack.orchestrator.start_all().await;
    assert_eq!(first, second);
    assert_eq!(first.workers_for(EngineType::Http), 2);
    assert_eq!(first.workers_for(EngineType::Browser), 2);
    assert_eq!(first.workers_for(EngineType::Stealth), 1);
    assert_eq!(stack.orchestrator.active_workers().await, 5);

    let report = stack
        .orchestrator
        .stop_all(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(report.drained, 5);
    assert_eq!(report.aborted, 0);
    assert!(stack
        .orchestrator
        .stop_all(Duration::from_secs(2))
        .await
        .is_none());
}

#[tokio::test]
async fn test_stop_closes_every_browser() {
    let stack = build_stack(test_settings(), Duration::ZERO);
    stack.orchestrator.start_all().await;

    let job = stack.submit.submit(browser_submission("a")).await.unwrap();
    let done = wait_for_terminal(&stack.repository, job.id, Duration::from_secs(10)).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(stack.browsers.live(), 1);

    let report = stack
        .orchestrator
        .stop_all(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(report.browsers.closed, 1);
    assert_eq!(report.browsers.failed, 0);
    assert_eq!(stack.browsers.live(), 0);
}

#[tokio::test]
async fn test_restart_uses_fresh_browser_pool() {
    let stack = build_stack(test_settings(), Duration::ZERO);

    let first = stack.orchestrator.start_all().await;
    let job = stack.submit.submit(browser_submission("one")).await.unwrap();
    wait_for_terminal(&stack.repository, job.id, Duration::from_secs(10)).await;
    stack
        .orchestrator
        .stop_all(Duration::from_secs(2))
        .await
        .unwrap();
    assert!(!stack.orchestrator.is_running().await);

    let second = stack.orchestrator.start_all().await;
    assert_eq!(second.generation, first.generation + 1);
    assert_eq!(stack.orchestrator.browser_pool_stats().await.unwrap().live, 0);

    let job = stack.submit.submit(browser_submission("two")).await.unwrap();
    let done = wait_for_terminal(&stack.repository, job.id, Duration::from_secs(10)).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(stack.browsers.launched.load(Ordering::SeqCst), 2);

    stack
        .orchestrator
        .stop_all(Duration::from_secs(2))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_drain_timeout_force_cancels_busy_worker() {
    let stack = build_stack(test_settings(), Duration::from_secs(5));
    stack.orchestrator.start_all().await;

    let job = stack.submit.submit(browser_submission("slow")).await.unwrap();

    // Wait until a worker has claimed the job and started rendering.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = stack.repository.find_by_id(job.id).await.unwrap().unwrap();
        if stored.status == JobStatus::Running {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let started = tokio::time::Instant::now();
    let report = stack
        .orchestrator
        .stop_all(Duration::from_millis(100))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.aborted, 1);
    assert_eq!(report.drained, 4);

    // The claim was never acknowledged, so the job stays in flight until its
    // claim expires and it is redelivered.
    let stats = stack.queues.browser.stats().await.unwrap();
    assert_eq!(stats.in_flight, 1);
    let stored = stack.repository.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.credits_charged, None);
}
