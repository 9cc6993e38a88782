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

//! End-to-end collector runs against captured tool output.

use std::collections::HashSet;
use std::sync::Arc;

use textfile_collectors::cli::{collect_exposition, render};
use textfile_collectors::collectors::zfs::Report;
use textfile_collectors::collectors::{
    ChronyCollector, WireguardCollector, ZfsCollector, ZypperCollector,
};
use textfile_collectors::metrics::LabelPolicy;
use textfile_collectors::runner::FixtureRunner;
use textfile_collectors::traits::Collector;
use textfile_collectors::Error;

const ZYPPER_LU: &str = include_str!("fixtures/zypper_lu.txt");
const ZYPPER_LP: &str = include_str!("fixtures/zypper_lp.txt");
const ZYPPER_ORPHANED: &str = include_str!("fixtures/zypper_orphaned.txt");
const CHRONY_TRACKING: &str = include_str!("fixtures/chrony_tracking.csv");
const CHRONY_SOURCES: &str = include_str!("fixtures/chrony_sources.csv");
const CHRONY_SOURCESTATS: &str = include_str!("fixtures/chrony_sourcestats.csv");
const WG_DUMP: &str = include_str!("fixtures/wg_dump.txt");
const ZPOOL_LIST_METADATA: &str = include_str!("fixtures/zpool_list_metadata.txt");
const ZPOOL_LIST_INFO: &str = include_str!("fixtures/zpool_list_info.txt");
const ZFS_LIST_METADATA: &str = include_str!("fixtures/zfs_list_metadata.txt");
const ZFS_LIST_INFO: &str = include_str!("fixtures/zfs_list_info.txt");
const ZPOOL_STATUS: &str = include_str!("fixtures/zpool_status.txt");

fn zypper_runner(lu: &str, lp: &str, orphaned: &str) -> Arc<FixtureRunner> {
    Arc::new(
        FixtureRunner::new()
            .with_status("zypper --quiet lu", 100, lu)
            .with_status("zypper --quiet lp", 100, lp)
            .with_output("zypper --quiet pa --orphaned", orphaned)
            .with_output("zypper -V", "zypper 1.14.68\n")
            .with_missing("/usr/bin/needs-restarting"),
    )
}

fn chrony_runner() -> Arc<FixtureRunner> {
    Arc::new(
        FixtureRunner::new()
            .with_output("chronyc --version", "chronyc (chrony) version 4.3\n")
            .with_output("chronyc -c tracking", CHRONY_TRACKING)
            .with_output("chronyc -c sources", CHRONY_SOURCES)
            .with_output("chronyc -c sourcestats", CHRONY_SOURCESTATS),
    )
}

fn zfs_runner() -> Arc<FixtureRunner> {
    let key = |report: Report| report.command().to_string();
    Arc::new(
        FixtureRunner::new()
            .with_output("zpool version", "zfs-2.2.2-1\nzfs-kmod-2.2.2-1\n")
            .with_output(&key(Report::PoolMetadata), ZPOOL_LIST_METADATA)
            .with_output(&key(Report::PoolInfo), ZPOOL_LIST_INFO)
            .with_output(&key(Report::DatasetMetadata), ZFS_LIST_METADATA)
            .with_output(&key(Report::DatasetMetrics), ZFS_LIST_INFO)
            .with_output(&key(Report::PoolStatus), ZPOOL_STATUS),
    )
}

/// Names in `# TYPE` lines, in output order.
fn type_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("# TYPE "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_zypper_empty_output_emits_placeholders() {
    let collector = ZypperCollector::new(true);
    let text = collect_exposition(&collector, zypper_runner("", "", ""), LabelPolicy::Lenient)
        .await
        .unwrap();

    let expected = "\
# HELP zypper_package_orphan zypper packages with no update source (orphaned)
# TYPE zypper_package_orphan gauge
zypper_package_orphan{package=\"\",installed-version=\"\"} 0
# HELP zypper_patch_pending zypper patch available from repository. (0 = not available, 1 = available)
# TYPE zypper_patch_pending gauge
zypper_patch_pending{repository=\"\",patch-name=\"\",category=\"\",severity=\"\",interactive=\"\",status=\"\"} 0
# HELP zypper_patches_pending_reboot_total zypper patches available which require reboot total
# TYPE zypper_patches_pending_reboot_total gauge
zypper_patches_pending_reboot_total 0
# HELP zypper_patches_pending_security_important_total zypper patches available with category security severity important total
# TYPE zypper_patches_pending_security_important_total gauge
zypper_patches_pending_security_important_total 0
# HELP zypper_patches_pending_security_total zypper patches available with category security total
# TYPE zypper_patches_pending_security_total gauge
zypper_patches_pending_security_total 0
# HELP zypper_patches_pending_total zypper patches available total
# TYPE zypper_patches_pending_total gauge
zypper_patches_pending_total 0
# HELP zypper_update_pending zypper package update available from repository. (0 = not available, 1 = available)
# TYPE zypper_update_pending gauge
zypper_update_pending{repository=\"\",package-name=\"\",available-version=\"\"} 0
# HELP zypper_updates_pending_total zypper packages updates available in total
# TYPE zypper_updates_pending_total gauge
zypper_updates_pending_total 0
# HELP zypper_version zypper installed package version
# TYPE zypper_version gauge
zypper_version{version=\"1.14.68\"} 1
";
    assert_eq!(text, expected);
}

#[tokio::test]
async fn test_zypper_pending_updates() {
    let collector = ZypperCollector::new(true);
    let text = collect_exposition(
        &collector,
        zypper_runner(ZYPPER_LU, ZYPPER_LP, ZYPPER_ORPHANED),
        LabelPolicy::Lenient,
    )
    .await
    .unwrap();

    assert!(text.contains(
        "zypper_update_pending{repository=\"SLE-Product-SLES15-SP5\",package-name=\"kernel-default\",available-version=\"5.14.21-150500.55.39\"} 1\n"
    ));
    assert!(text.contains("zypper_updates_pending_total 3\n"));
    assert!(text.contains("zypper_patches_pending_security_total 2\n"));
    assert!(text.contains("zypper_patches_pending_security_important_total 1\n"));
    assert!(text.contains("zypper_patches_pending_reboot_total 1\n"));
    assert!(text.contains(
        "zypper_package_orphan{package=\"legacy-tool\",installed-version=\"1.2.3-1.1\"} 1\n"
    ));
    // no placeholder once real series exist
    assert!(!text.contains("zypper_update_pending{repository=\"\""));
}

#[tokio::test]
async fn test_zypper_less_drops_version_label() {
    let collector = ZypperCollector::new(false);
    let text = collect_exposition(&collector, zypper_runner("", "", ""), LabelPolicy::Lenient)
        .await
        .unwrap();
    assert!(text.contains("zypper_update_pending{repository=\"\",package-name=\"\"} 0\n"));
    assert!(text.contains(
        "zypper_patch_pending{repository=\"\",patch-name=\"\",interactive=\"\",status=\"\"} 0\n"
    ));
}

#[tokio::test]
async fn test_missing_tool_fails_before_collecting() {
    let runner = Arc::new(FixtureRunner::new().with_missing("zypper"));
    let err = collect_exposition(&ZypperCollector::new(true), runner.clone(), LabelPolicy::Lenient)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolNotInstalled(ref tool) if tool == "zypper"));
    assert_eq!(runner.calls(), vec!["zypper -V".to_string()]);
}

#[tokio::test]
async fn test_output_is_idempotent() {
    let collector = ChronyCollector::new();
    let first = collect_exposition(&collector, chrony_runner(), LabelPolicy::Lenient)
        .await
        .unwrap();
    let second = collect_exposition(&collector, chrony_runner(), LabelPolicy::Lenient)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_families_are_unique_and_sorted() {
    let collector = ChronyCollector::new();
    let text = collect_exposition(&collector, chrony_runner(), LabelPolicy::Lenient)
        .await
        .unwrap();

    let names = type_lines(&text);
    let unique: HashSet<_> = names.iter().collect();
    assert_eq!(unique.len(), names.len());

    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    // every sample line sits in the block of its own family
    let mut current = String::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("# TYPE ") {
            current = rest.split_whitespace().next().unwrap_or_default().to_string();
        } else if !line.starts_with('#') {
            let name = line.split(['{', ' ']).next().unwrap();
            assert_eq!(name, current, "sample outside its family block: {line}");
        }
    }
}

#[tokio::test]
async fn test_output_parses_as_prometheus_text() {
    let collector = ChronyCollector::new();
    let text = collect_exposition(&collector, chrony_runner(), LabelPolicy::Lenient)
        .await
        .unwrap();

    let scrape = prometheus_parse::Scrape::parse(text.lines().map(|s| Ok(s.to_owned())))
        .expect("Failed to parse Prometheus output");

    let poll = scrape
        .samples
        .iter()
        .find(|s| {
            s.metric == "chrony_source_poll_rate_seconds"
                && s.labels.get("ref_host").map(|v| v.to_string())
                    == Some("ntp1.example.org".to_string())
        })
        .expect("Expected poll rate for ntp1.example.org");
    match poll.value {
        prometheus_parse::Value::Gauge(v) => assert_eq!(v, 64.0),
        ref other => panic!("Expected gauge, got {other:?}"),
    }

    let stratum = scrape
        .samples
        .iter()
        .find(|s| s.metric == "chrony_tracking_stratum")
        .expect("Expected tracking stratum");
    match stratum.value {
        prometheus_parse::Value::Gauge(v) => assert_eq!(v, 4.0),
        ref other => panic!("Expected gauge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_zypper_output_parses_as_prometheus_text() {
    let collector = ZypperCollector::new(true);
    let text = collect_exposition(
        &collector,
        zypper_runner(ZYPPER_LU, ZYPPER_LP, ZYPPER_ORPHANED),
        LabelPolicy::Lenient,
    )
    .await
    .unwrap();

    let scrape = prometheus_parse::Scrape::parse(text.lines().map(|s| Ok(s.to_owned())))
        .expect("Failed to parse Prometheus output");
    let pending = scrape
        .samples
        .iter()
        .filter(|s| s.metric == "zypper_update_pending")
        .count();
    assert_eq!(pending, 3);
}

#[tokio::test]
async fn test_wireguard_render() {
    let collector = WireguardCollector::new();
    let runner = Arc::new(FixtureRunner::new().with_output("wg show all dump", WG_DUMP));
    let agg = collector.collect(runner).await.unwrap();
    let text = render(&collector, agg, LabelPolicy::Lenient);

    assert!(text.contains(
        "wireguard_interface_info{interface=\"wg0\",public_key=\"gN65BkIKy1eCE9pP1wdc8ROUtkHLF2PfAqYdyYBz6EA=\",listen_port=\"51820\"} 1\n"
    ));
    assert!(text.contains("wireguard_peers{interface=\"wg0\"} 1\n"));
    assert!(text.contains(
        "wireguard_received_bytes_total{interface=\"wg0\",public_key=\"GtL7fZc/bLnqZldpVofMCD6hDjrK28SsdLxevJ+qtKU=\"} 123456\n"
    ));
}

#[tokio::test]
async fn test_zfs_pools_and_datasets() {
    let text = collect_exposition(&ZfsCollector::new(), zfs_runner(), LabelPolicy::Lenient)
        .await
        .unwrap();

    assert!(text.contains(
        "zfs_zpool{zpool_name=\"test\",health=\"DEGRADED\",version=\"-\",readonly=\"off\",ashift=\"9\",autoreplace=\"on\",failmode=\"continue\"} 1\n"
    ));
    assert!(text.contains("zfs_zpool_size_bytes{pool_name=\"pool0\"} 53876069761024\n"));
    assert!(text.contains("zfs_zpool_fragmentation{pool_name=\"pool0\"} 3\n"));
    // fragmentation does not apply to the second pool
    assert!(!text.contains("zfs_zpool_fragmentation{pool_name=\"test\"}"));
    assert!(text.contains("zfs_dataset_compressratio{dataset_name=\"pool0/data\"} 1.32\n"));
    assert!(text.contains(
        "zfs_dataset_volsize_bytes{dataset_name=\"pool0/vm-100-disk-0\"} 34359738368\n"
    ));
    assert!(!text.contains("zfs_dataset_volsize_bytes{dataset_name=\"pool0/data\"}"));
    assert!(text.contains("zfs_zpool_status{zpool_name=\"test\",state=\"DEGRADED\"} 1\n"));
    assert!(text.contains("zfs_zpool_scrub_duration_seconds{zpool_name=\"pool0\"} 25082\n"));
    assert!(text.contains(
        "zfs_zpool_resilvering_corrected_bytes{zpool_name=\"test\"} 27053261\n"
    ));

    let names = type_lines(&text);
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test]
async fn test_zfs_vdev_tree_parses_as_prometheus_text() {
    let text = collect_exposition(&ZfsCollector::new(), zfs_runner(), LabelPolicy::Lenient)
        .await
        .unwrap();

    let scrape = prometheus_parse::Scrape::parse(text.lines().map(|s| Ok(s.to_owned())))
        .expect("Failed to parse Prometheus output");
    let vdevs: Vec<_> = scrape
        .samples
        .iter()
        .filter(|s| s.metric == "zfs_zpool_vdev_info")
        .collect();
    // 5 for pool0; test has 6 vdevs plus 2 spares
    assert_eq!(vdevs.len(), 13);

    let replaced = vdevs
        .iter()
        .find(|s| {
            s.labels.get("vdev_name") == Some("pci-0000:00:0d.0-scsi-12:0:0:0-part1")
        })
        .expect("Expected the replaced device under its old name");
    assert_eq!(replaced.labels.get("zpool_name"), Some("test"));
    assert_eq!(replaced.labels.get("state"), Some("FAULTED"));
    assert_eq!(
        replaced.labels.get("path"),
        Some("test://mirror-0/spare-0/pci-0000:00:0d.0-scsi-12:0:0:0-part1")
    );

    let spare = vdevs
        .iter()
        .find(|s| s.labels.get("vdev_name") == Some("pci-0000:00:0d.0-scsi-13:0:0:0"))
        .expect("Expected the in-use spare");
    assert_eq!(spare.labels.get("state"), Some("INUSE"));
    assert_eq!(spare.labels.get("read"), Some(""));

    let scrub_time = scrape
        .samples
        .iter()
        .find(|s| s.metric == "zfs_zpool_scrub_time_seconds")
        .expect("Expected scrub timestamp");
    match scrub_time.value {
        // Sun Nov 12 07:22:03 2023 in any time zone
        prometheus_parse::Value::Gauge(v) => assert!((1_699_700_000.0..1_699_820_000.0).contains(&v)),
        ref other => panic!("Expected gauge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_zfs_failed_report_is_skipped() {
    let runner = Arc::new(
        FixtureRunner::new()
            .with_output("zpool version", "zfs-2.2.2-1\n")
            .with_status(&Report::PoolStatus.command().to_string(), 1, "")
            .with_output(&Report::PoolInfo.command().to_string(), ZPOOL_LIST_INFO),
    );
    let text = collect_exposition(&ZfsCollector::new(), runner, LabelPolicy::Lenient)
        .await
        .unwrap();
    assert!(text.contains("zfs_zpool_free_bytes{pool_name=\"test\"} 1046478848\n"));
    assert!(!text.contains("zfs_zpool_vdev_info"));
}
