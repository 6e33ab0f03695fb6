//! Traffic Statistics - the dashboard's running fold over sink messages
//!
//! Rendering is someone else's job; this keeps the numbers a dashboard shows:
//! per-domain counters, category buckets, first/third-party tallies and a
//! bounded list of recent requests.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::classifier::{classify, is_known_tracker, Category};
use crate::events::{SinkBus, SinkMessage};
use crate::records::{ConsolidatedRecord, FailureRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub count: u64,
    pub total_bytes: u64,
    pub total_duration_ms: u64,
}

/// One row of the top-domains table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSummary {
    pub domain: String,
    pub count: u64,
    pub avg_latency_ms: u64,
    pub total_bytes: u64,
    /// Matches the tracker/advertiser pattern
    pub known_tracker: bool,
}

/// Entry of the recent-requests list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecentRequest {
    Completed(ConsolidatedRecord),
    Failed(FailureRecord),
}

impl RecentRequest {
    pub fn domain(&self) -> &str {
        match self {
            Self::Completed(r) => &r.domain,
            Self::Failed(r) => &r.domain,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrafficStats {
    recent_limit: usize,
    recent: VecDeque<RecentRequest>,
    domains: HashMap<String, DomainStats>,
    categories: BTreeMap<Category, BTreeMap<String, Vec<ConsolidatedRecord>>>,
    first_party: u64,
    third_party: u64,
    failed: u64,
    active_requests: usize,
}

const UNKNOWN_DOMAIN: &str = "unknown";

impl TrafficStats {
    pub fn new(recent_limit: usize) -> Self {
        Self {
            recent_limit,
            recent: VecDeque::new(),
            domains: HashMap::new(),
            categories: BTreeMap::new(),
            first_party: 0,
            third_party: 0,
            failed: 0,
            active_requests: 0,
        }
    }

    pub fn apply(&mut self, message: &SinkMessage) {
        match message {
            SinkMessage::Clear => self.clear(),
            SinkMessage::ActiveCount(count) => {
                self.active_requests = count.active_request_count;
            }
            SinkMessage::Failed(record) => {
                self.failed += 1;
                self.tally_party(record.first_party);
                self.push_recent(RecentRequest::Failed(record.clone()));
            }
            SinkMessage::Data(record) => self.record_completed(record),
        }
    }

    fn record_completed(&mut self, record: &ConsolidatedRecord) {
        let domain = if record.domain.is_empty() {
            UNKNOWN_DOMAIN
        } else {
            record.domain.as_str()
        };

        let stats = self.domains.entry(domain.to_string()).or_default();
        stats.count += 1;
        stats.total_bytes += record.bytes_transferred;
        stats.total_duration_ms += record.duration_ms;

        self.categories
            .entry(classify(domain))
            .or_default()
            .entry(domain.to_string())
            .or_default()
            .push(record.clone());

        self.tally_party(record.first_party);
        self.push_recent(RecentRequest::Completed(record.clone()));
    }

    fn tally_party(&mut self, first_party: bool) {
        if first_party {
            self.first_party += 1;
        } else {
            self.third_party += 1;
        }
    }

    fn push_recent(&mut self, entry: RecentRequest) {
        self.recent.push_front(entry);
        self.recent.truncate(self.recent_limit);
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.recent_limit);
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests
    }

    pub fn first_party_count(&self) -> u64 {
        self.first_party
    }

    pub fn third_party_count(&self) -> u64 {
        self.third_party
    }

    pub fn failed_count(&self) -> u64 {
        self.failed
    }

    /// Newest first
    pub fn recent(&self) -> impl Iterator<Item = &RecentRequest> {
        self.recent.iter()
    }

    pub fn domain_stats(&self, domain: &str) -> Option<DomainStats> {
        self.domains.get(domain).copied()
    }

    /// Busiest domains, ties broken alphabetically
    pub fn top_domains(&self, limit: usize) -> Vec<DomainSummary> {
        let mut rows = self.domain_summaries();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
        rows.truncate(limit);
        rows
    }

    fn domain_summaries(&self) -> Vec<DomainSummary> {
        self.domains
            .iter()
            .map(|(domain, s)| DomainSummary {
                domain: domain.clone(),
                count: s.count,
                avg_latency_ms: average(s.total_duration_ms, s.count),
                total_bytes: s.total_bytes,
                known_tracker: is_known_tracker(domain),
            })
            .collect()
    }

    /// Seen domains flagged as trackers or advertisers, alphabetical
    pub fn tracker_domains(&self) -> Vec<&str> {
        let mut rows: Vec<&str> = self
            .domains
            .keys()
            .map(String::as_str)
            .filter(|domain| is_known_tracker(domain))
            .collect();
        rows.sort_unstable();
        rows
    }

    /// Mean of the per-domain average latencies
    pub fn average_latency_ms(&self) -> u64 {
        let rows = self.domain_summaries();
        let sum: u64 = rows.iter().map(|r| r.avg_latency_ms).sum();
        average(sum, rows.len() as u64)
    }

    pub fn total_bytes(&self) -> u64 {
        self.domains.values().map(|s| s.total_bytes).sum()
    }

    /// Distinct domains per category, largest first
    pub fn category_breakdown(&self) -> Vec<(Category, usize)> {
        let mut rows: Vec<_> = self
            .categories
            .iter()
            .map(|(category, domains)| (*category, domains.len()))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Domains in a category with their request counts, alphabetical
    pub fn domains_in_category(&self, category: Category) -> Vec<(String, usize)> {
        self.categories
            .get(&category)
            .map(|domains| {
                domains
                    .iter()
                    .map(|(domain, records)| (domain.clone(), records.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Completed-request domains on one side of the party line, busiest first.
    ///
    /// A domain's side is taken from its first recorded request.
    pub fn domains_by_party(&self, third_party: bool) -> Vec<(String, usize)> {
        let mut rows: Vec<(String, usize)> = self
            .categories
            .values()
            .flat_map(|domains| domains.iter())
            .filter(|(_, records)| {
                records
                    .first()
                    .is_some_and(|r| r.first_party != third_party)
            })
            .map(|(domain, records)| (domain.clone(), records.len()))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Every completed request seen for `domain`
    pub fn requests_for_domain(&self, domain: &str) -> Vec<&ConsolidatedRecord> {
        self.categories
            .values()
            .filter_map(|domains| domains.get(domain))
            .flatten()
            .collect()
    }
}

impl Default for TrafficStats {
    fn default() -> Self {
        Self::new(150)
    }
}

fn average(total: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        (total as f64 / count as f64).round() as u64
    }
}

/// Keeps a shared [`TrafficStats`] up to date from a [`SinkBus`]
pub struct StatsCollector {
    stats: Arc<RwLock<TrafficStats>>,
    task: JoinHandle<()>,
}

impl StatsCollector {
    pub fn spawn(bus: &SinkBus, recent_limit: usize) -> Self {
        let stats = Arc::new(RwLock::new(TrafficStats::new(recent_limit)));
        let mut rx = bus.subscribe();

        let shared = stats.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => shared.write().await.apply(&message),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("[Stats] Fell behind, {} messages lost", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { stats, task }
    }

    pub fn stats(&self) -> Arc<RwLock<TrafficStats>> {
        self.stats.clone()
    }

    pub async fn snapshot(&self) -> TrafficStats {
        self.stats.read().await.clone()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
