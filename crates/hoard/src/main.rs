use anyhow::Result;
use clap::Parser;
use cli::Cli;
use dotenv::{dotenv, var};
use hoard_util::build_client;
use hoard_warehouse::config::{api_key, listing, API_KEY_VAR};
use hoard_warehouse::{AlphaVantage, Config, DataManager, Fetcher};
use tokio::sync::watch;
use tracing::{debug, subscriber, trace, Level};
use tracing_subscriber::FmtSubscriber;

mod cli;

fn preprocess(trace_level: Level) {
    dotenv().ok();
    let my_subscriber = FmtSubscriber::builder()
        .with_max_level(trace_level)
        .with_writer(std::io::stderr)
        .finish();
    subscriber::set_global_default(my_subscriber).expect("Set subscriber");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    preprocess(cli.trace.into());
    trace!("Command line input recorded: {cli:#?}");

    let config = Config {
        data_dir: cli.data_dir.clone(),
        output_size: cli.output_size.into(),
        ..Config::default()
    };

    // "> hoard --list"
    if cli.list {
        println!("{}", listing(&config.symbols));
        return Ok(());
    }

    let Some(key) = api_key() else {
        println!("❌ Error: {API_KEY_VAR} not found in environment variables");
        return Ok(());
    };

    let http_client = build_client(var("USER_AGENT").ok().as_deref(), config.timeout)?;
    let source = AlphaVantage::new(http_client, key, config.output_size)
        .with_base_url(&config.base_url);
    let store = DataManager::new(&config.data_dir)
        .await?
        .with_max_days_old(config.max_days_old);
    let fetcher = Fetcher::new(source, store, config);

    // Ctrl-C lets the current symbol finish, then ends the batch
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            let _ = cancel_tx.send(true);
        }
    });

    // "> hoard [--force] [--quiet] [--symbols ...]"
    let tally = fetcher
        .fetch_all(cli.symbols.as_deref(), cli.force, cli.quiet, cancel_rx)
        .await;
    debug!("batch finished: {tally:?}");

    Ok(())
}
