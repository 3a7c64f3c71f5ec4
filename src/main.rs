use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use load_planner::api;
use load_planner::cli::{Cli, Command, run_pack, run_template};
use load_planner::config::AppConfig;

fn init_logger(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level);

    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("🚀 Load planner starting...");
            api::start_api_server(app_config.api, app_config.optimizer).await?;
        }
        Command::Pack(args) => {
            let base = app_config.optimizer.packing_config();
            let result = tokio::task::spawn_blocking(move || run_pack(&args, base)).await??;
            print!("{}", result.render_text());
        }
        Command::Template(args) => run_template(&args)?,
    }
    Ok(())
}
