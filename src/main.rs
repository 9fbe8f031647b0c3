use anyrules::config::Config;
use anyrules::downloader::GithubReleaseSource;
use anyrules::error::Result;
use anyrules::generate;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "anyrules")]
#[command(about = "Convert Clash rule lists and v2ray geosite.dat into sing-box rule-sets")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for generated rule-sets
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
        .init();

    if let Err(e) = run(&config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(args: Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Override config with command line arguments
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }

    config.validate()?;
    Ok(config)
}

async fn run(config: &Config) -> Result<()> {
    info!("Output directory: {}", config.output_dir.display());
    info!("Concurrency: {}", config.concurrency);

    let source = GithubReleaseSource::from_env(&config.github)?;
    generate::run(config, &source).await?;

    if config.action_output {
        println!("{}", generate::action_output(chrono::Local::now()));
    }
    Ok(())
}
