//! odootable command line: resolve a document's blocks into tables.

use std::path::PathBuf;

use clap::Parser;
use odootable_client::ClientBuilder;
use odootable_core::Resolver;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    document::BlockDocument,
    format::{Formatter, OutputFormat},
    settings::Settings,
};

mod document;
mod format;
mod settings;

#[derive(Parser)]
#[command(name = "odootable")]
#[command(about = "Resolve odootable blocks into tables fetched from Odoo", long_about = None)]
struct Args {
    /// YAML document with `globals` and `blocks`
    blocks: PathBuf,

    /// Client settings file
    #[arg(short, long, default_value = "odootable.toml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn get_env_filter() -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else if cfg!(debug_assertions) {
        EnvFilter::new("odootable=debug")
    } else {
        EnvFilter::new("odootable=info")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    Registry::default()
        .with(get_env_filter())
        .with(stderr_layer)
        .init();

    let args = Args::parse();
    let settings = Settings::load_from_path(&args.config)?;
    let document = BlockDocument::load(&args.blocks)?;

    let options = settings.client_options();
    let client = ClientBuilder::new()
        .timeout(options.timeout)
        .page_size(options.page_size)
        .retry(options.retry)
        .build()?;
    let resolver = Resolver::new(client)
        .with_globals(document.globals())
        .max_parallel(settings.max_parallel);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling in-flight blocks...");
            trigger.cancel();
        }
    });

    let inputs = document.inputs();
    tracing::debug!("Resolving {} block(s) from {}", inputs.len(), args.blocks.display());
    let results = resolver.resolve_all(&inputs, &cancel).await;

    Formatter::new().print_results(&results, args.format)?;

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        tracing::error!("{failed} of {} block(s) failed", results.len());
        std::process::exit(1);
    }
    Ok(())
}
