use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use lantopo_common::config::DiscoveryConfig;
use lantopo_common::model::NetworkTopology;
use lantopo_core::discovery::{Collectors, DiscoveryService};
use lantopo_core::render;
use tracing::info;

use crate::terminal::print;

/// Runs one discovery, writes the rendered topology, then reports warnings.
pub async fn discover(config: &DiscoveryConfig, output: Option<&Path>) -> anyhow::Result<()> {
    let service: DiscoveryService = DiscoveryService::new(Collectors::system(config));

    let start_time: Instant = Instant::now();
    let topology: NetworkTopology = service.perform_discovery(config).await?;
    let total_time: Duration = start_time.elapsed();

    let rendered: String = render::render(&topology, &config.render)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, &rendered)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("topology written to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    print::warnings(&topology.warnings);
    print::summary(&topology, total_time);
    Ok(())
}
