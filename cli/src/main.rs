mod commands;
mod terminal;

use commands::{CommandLine, discover};
use lantopo_common::config::DiscoveryConfig;
use terminal::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands: CommandLine = CommandLine::parse_args();
    logging::init_logging(commands.verbose);

    let config: DiscoveryConfig = commands.to_config()?;
    discover::discover(&config, commands.output.as_deref()).await
}
