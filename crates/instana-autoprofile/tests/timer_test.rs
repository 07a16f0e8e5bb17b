// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use instana_autoprofile::Timer;
use tokio::time::sleep;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timer_can_be_stopped_from_another_thread() {
    let calls = Arc::new(AtomicUsize::new(0));
    let job_calls = Arc::clone(&calls);
    let timer = Arc::new(Timer::new(
        Duration::from_millis(5),
        Duration::from_millis(5),
        move || {
            job_calls.fetch_add(1, Ordering::SeqCst);
        },
    ));

    sleep(Duration::from_millis(60)).await;
    assert!(calls.load(Ordering::SeqCst) > 0);

    let stoppers = (0..4)
        .map(|_| {
            let timer = Arc::clone(&timer);
            std::thread::spawn(move || timer.stop())
        })
        .collect::<Vec<_>>();
    for stopper in stoppers {
        stopper.join().expect("stopper panicked");
    }
    assert!(timer.is_stopped());

    // a run already in flight on another worker may still complete
    sleep(Duration::from_millis(20)).await;
    let seen = calls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), seen);
}

#[tokio::test(start_paused = true)]
async fn panicking_job_does_not_stop_the_schedule() {
    let calls = Arc::new(AtomicUsize::new(0));
    let job_calls = Arc::clone(&calls);
    let timer = Timer::new(Duration::from_millis(10), Duration::from_millis(10), move || {
        job_calls.fetch_add(1, Ordering::SeqCst);
        panic!("always failing");
    });

    sleep(Duration::from_millis(45)).await;
    timer.stop();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
