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

//! WireGuard interfaces and peers via `wg show all dump`.

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;

use crate::cli::CommonArgs;
use crate::error::{Error, Result};
use crate::metrics::{MetricAggregator, MetricKind};
use crate::parsing::common::parse_number;
use crate::parsing::{LineParser, Separator};
use crate::runner::CommandSpec;
use crate::traits::{Collector, CommandRunner};

const WG: &str = "wg";

const INTERFACE_FIELDS: usize = 5;
const PEER_FIELDS: usize = 9;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Expose WireGuard peer metrics in Prometheus text format", long_about = None)]
pub struct WireguardArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    pub public_key: String,
    pub endpoint: String,
    pub allowed_ips: String,
    /// Unix time of the most recent handshake, 0 if none yet.
    pub latest_handshake: u64,
    pub received_bytes: u64,
    pub sent_bytes: u64,
}

/// Everything `wg` reports about one interface. The private key is never kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    pub public_key: String,
    pub listen_port: String,
    pub peers: Vec<Peer>,
}

fn counter(field: &str, what: &str) -> Result<u64> {
    parse_number::<u64>(field)
        .ok_or_else(|| Error::Parse(format!("invalid {what} value '{field}'")))
}

/// Parse the tab separated dump into a map from interface name to record.
///
/// Interface lines carry 5 fields, peer lines 9; anything else is malformed.
pub fn parse_dump(raw: &str) -> Result<BTreeMap<String, Interface>> {
    let mut interfaces: BTreeMap<String, Interface> = BTreeMap::new();

    for row in LineParser::new(Separator::Tab).rows(raw) {
        match row.len() {
            INTERFACE_FIELDS => {
                let iface = interfaces.entry(row[0].clone()).or_default();
                iface.public_key = row[2].clone();
                iface.listen_port = row[3].clone();
            }
            PEER_FIELDS => {
                let peer = Peer {
                    public_key: row[1].clone(),
                    endpoint: row[3].clone(),
                    allowed_ips: row[4].clone(),
                    latest_handshake: counter(&row[5], "latest handshake")?,
                    received_bytes: counter(&row[6], "transfer rx")?,
                    sent_bytes: counter(&row[7], "transfer tx")?,
                };
                interfaces.entry(row[0].clone()).or_default().peers.push(peer);
            }
            n => {
                return Err(Error::Parse(format!(
                    "unexpected wg dump line with {n} fields"
                )))
            }
        }
    }
    Ok(interfaces)
}

#[derive(Debug, Clone, Default)]
pub struct WireguardCollector;

impl WireguardCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for WireguardCollector {
    fn name(&self) -> &'static str {
        "wireguard-metrics"
    }

    fn namespace(&self) -> &'static str {
        "wireguard_"
    }

    fn requires_root(&self) -> bool {
        true
    }

    fn tool_probe(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new(WG).arg("--version"))
    }

    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator> {
        let spec = CommandSpec::new(WG).args(["show", "all", "dump"]).check_status();
        let interfaces = parse_dump(&runner.run(&spec)?.stdout)?;

        let mut agg = MetricAggregator::new();
        agg.describe("interface_info", "WireGuard interface information", MetricKind::Gauge)
            .describe("peers", "Number of peers configured on the interface", MetricKind::Gauge)
            .describe(
                "peer_info",
                "WireGuard peer information",
                MetricKind::Gauge,
            )
            .describe(
                "latest_handshake_seconds",
                "Unix time of the latest handshake with the peer, 0 if none",
                MetricKind::Gauge,
            )
            .describe(
                "received_bytes_total",
                "Bytes received from the peer",
                MetricKind::Counter,
            )
            .describe("sent_bytes_total", "Bytes sent to the peer", MetricKind::Counter);

        for (name, iface) in &interfaces {
            let info = labels! {
                "interface" => name,
                "public_key" => &iface.public_key,
                "listen_port" => &iface.listen_port,
            };
            agg.record("interface_info", info, 1.0)?;
            agg.record("peers", labels! { "interface" => name }, iface.peers.len() as f64)?;

            for peer in &iface.peers {
                let info = labels! {
                    "interface" => name,
                    "public_key" => &peer.public_key,
                    "endpoint" => &peer.endpoint,
                    "allowed_ips" => &peer.allowed_ips,
                };
                agg.record("peer_info", info, 1.0)?;

                let key = labels! { "interface" => name, "public_key" => &peer.public_key };
                agg.record("latest_handshake_seconds", key.clone(), peer.latest_handshake as f64)?;
                agg.record("received_bytes_total", key.clone(), peer.received_bytes as f64)?;
                agg.record("sent_bytes_total", key, peer.sent_bytes as f64)?;
            }
        }
        Ok(agg)
    }
}
