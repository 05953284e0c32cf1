// Copyright (C) 2026 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Shutdown behaviour of the worker pools as seen from outside the crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hearth_common::tracing::init_test_tracing;
use hearth_kernel::{ElasticPool, FixedPool, TaskError};
use pretty_assertions::assert_eq;
use test_case::test_case;

fn counting_tasks(n: usize) -> (Arc<Vec<AtomicUsize>>, Vec<hearth_kernel::Task>) {
    let counters: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
    let tasks = (0..n)
        .map(|i| {
            let counters = counters.clone();
            Box::new(move || {
                std::thread::sleep(Duration::from_micros(50));
                counters[i].fetch_add(1, Ordering::SeqCst);
            }) as hearth_kernel::Task
        })
        .collect();
    (counters, tasks)
}

fn assert_each_ran_once(counters: &[AtomicUsize]) {
    let counts: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![1; counters.len()]);
}

#[test_case(1, 100; "single worker")]
#[test_case(4, 500; "four workers")]
#[test_case(16, 1000; "more workers than cores")]
fn fixed_pool_runs_everything_when_dropped_immediately(workers: usize, tasks: usize) {
    init_test_tracing();
    let (counters, tasks) = counting_tasks(tasks);
    let pool = FixedPool::with_workers(workers, "drop-test");
    for task in tasks {
        pool.push(task);
    }
    drop(pool);
    assert_each_ran_once(&counters);
}

#[test_case(None, 200; "unbounded")]
#[test_case(Some(2), 200; "capped at two")]
fn elastic_pool_runs_everything_when_dropped_immediately(max: Option<usize>, tasks: usize) {
    init_test_tracing();
    let (counters, tasks) = counting_tasks(tasks);
    let pool = ElasticPool::with_max_workers("elastic-drop-test", max);
    for task in tasks {
        pool.push(task);
    }
    if let Some(max) = max {
        assert!(pool.worker_count() <= max);
    }
    drop(pool);
    assert_each_ran_once(&counters);
}

#[test]
fn fan_out_fan_in_collects_every_result() {
    init_test_tracing();
    let pool = FixedPool::with_workers(3, "fan-out");
    let handles: Vec<_> = (0..10u64)
        .map(|i| {
            pool.checked_push(move || {
                if i == 7 {
                    panic!("section {i} failed");
                }
                i * i
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.wait()).collect();
    for (i, result) in results.iter().enumerate() {
        if i == 7 {
            assert_eq!(
                result,
                &Err(TaskError::Panicked("section 7 failed".to_string()))
            );
        } else {
            assert_eq!(result, &Ok((i * i) as u64));
        }
    }
}
