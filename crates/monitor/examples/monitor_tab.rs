//! Watch the network traffic of one browser tab and print live statistics.
//!
//! Start Chrome with `--remote-debugging-port=9222`, then:
//!
//! ```text
//! cargo run --example monitor_tab -- ws://localhost:9222/devtools/browser/<id> [config.json]
//! ```

use monitor::debugger::select_monitorable;
use monitor::store::{JsonFileStore, MemoryStore, MetadataStore};
use monitor::{service, CDPClient, CdpDebugger, MonitorConfig, SessionController, SinkBus, StatsCollector};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let cdp_url = args.next();
    let mut config = match args.next() {
        Some(path) => MonitorConfig::load(path).await?,
        None => MonitorConfig::default(),
    };
    if let Some(url) = cdp_url {
        config.cdp_url = url;
    }

    println!("Connecting to Chrome at: {}", config.cdp_url);
    let client = CDPClient::connect(&config.cdp_url).await?;
    let (debugger, events) = CdpDebugger::new(client.clone());

    let targets = debugger.page_targets().await?;
    let Some(target) = select_monitorable(&targets, None).cloned() else {
        println!("Open any website in another tab to monitor.");
        return Ok(());
    };

    let store: Arc<dyn MetadataStore> = match &config.metadata_path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    let bus = SinkBus::new(config.sink_capacity);
    let collector = StatsCollector::spawn(&bus, config.recent_limit);
    let controller = SessionController::new(Arc::new(debugger), store, bus);
    let (handle, task) = service::spawn(controller, events);

    let status = handle.start(&target.target_id, &target.title).await?;
    println!("Monitoring {} ({})", target.title, status.monitored_origin);

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let stats = collector.snapshot().await;

        println!(
            "active {} | first-party {} | third-party {} | failed {} | avg {} ms | {} KB",
            stats.active_requests(),
            stats.first_party_count(),
            stats.third_party_count(),
            stats.failed_count(),
            stats.average_latency_ms(),
            stats.total_bytes() / 1024,
        );
        for (category, domains) in stats.category_breakdown() {
            println!("  {:<15} {} domains", category, domains);
        }
        for row in stats.top_domains(config.top_domains) {
            println!(
                "  {:<40} {:>4} req  avg {} ms  {} KB{}",
                row.domain,
                row.count,
                row.avg_latency_ms,
                row.total_bytes / 1024,
                if row.known_tracker { "  [tracker]" } else { "" }
            );
        }
    }

    handle.stop().await?;
    drop(handle);
    task.await?;
    collector.stop();
    client.close().await?;
    println!("Stopped");

    Ok(())
}
