// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Collectors, one per wrapped utility, and the device fan-out they share.

pub mod chrony;
pub mod nvme;
pub mod smartmon;
pub mod ssacli;
pub mod wireguard;
pub mod zfs;
pub mod zypper;

use std::fmt::Display;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::MetricAggregator;
use crate::traits::CommandRunner;

pub use chrony::ChronyCollector;
pub use nvme::NvmeCollector;
pub use smartmon::SmartmonCollector;
pub use ssacli::SsacliCollector;
pub use wireguard::WireguardCollector;
pub use zfs::ZfsCollector;
pub use zypper::ZypperCollector;

/// Run `probe` once per item on the blocking pool, at most `jobs` at a time.
///
/// Successful results are merged in the order of `items`, so the output does
/// not depend on which probe finished first. A failed probe is logged and
/// skipped; it never aborts the others.
pub async fn probe_parallel<T, F>(
    items: Vec<T>,
    jobs: usize,
    runner: Arc<dyn CommandRunner>,
    probe: F,
) -> MetricAggregator
where
    T: Display + Send + 'static,
    F: Fn(&dyn CommandRunner, &T) -> Result<MetricAggregator> + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let probe = Arc::new(probe);
    let total = items.len();
    let mut pending = FuturesUnordered::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let runner = runner.clone();
        let probe = probe.clone();

        pending.push(tokio::spawn(async move {
            // Acquire semaphore permit to limit concurrency
            let _permit = semaphore.acquire_owned().await.ok();
            let name = item.to_string();
            let result =
                tokio::task::spawn_blocking(move || probe(runner.as_ref(), &item)).await;
            (index, name, result)
        }));
    }

    let mut results: Vec<Option<MetricAggregator>> = (0..total).map(|_| None).collect();
    while let Some(joined) = pending.next().await {
        match joined {
            Ok((index, name, Ok(Ok(agg)))) => {
                debug!(item = %name, samples = agg.sample_count(), "probe finished");
                results[index] = Some(agg);
            }
            Ok((_, name, Ok(Err(e)))) => warn!(item = %name, error = %e, "probe failed, skipping"),
            Ok((_, name, Err(e))) => warn!(item = %name, error = %e, "probe panicked, skipping"),
            Err(e) => warn!(error = %e, "probe task failed"),
        }
    }

    let mut merged = MetricAggregator::new();
    for agg in results.into_iter().flatten() {
        merged.merge(agg);
    }
    merged
}
