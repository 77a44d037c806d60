mod cli;
mod client;
mod daemon;
mod db;
mod graph;
mod provider;
mod rpc;
#[cfg(test)]
mod testutil;
mod types;
mod utils;

use anyhow::Result;
use clap::Parser;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use types::config::{Config, DaemonCmd, Opts, SubCmd};

// Initialize writer
lazy_static! {
    static ref WRITER: cli::Writer = cli::Writer::new();
}
// Set by --verbose, read by debug!
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Exit codes:
/// 1 => something went wrong, or the daemon replied with an error
/// 2 => daemon interrupted
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) if e.use_stderr() => {
            e.print().ok();
            std::process::exit(1);
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    if let Err(err) = try_main(opts).await {
        error!("{}", err.to_string());
        err.chain().skip(1).for_each(|cause| {
            due_to!("{}", cause);
        });
        std::process::exit(1);
    }
}

async fn try_main(opts: Opts) -> Result<()> {
    VERBOSE.store(opts.verbose, Ordering::Relaxed);
    let config = Config::load(&opts.config)?;
    debug!("Loaded config from {}", opts.config.display());

    match opts.subcmd {
        SubCmd::Daemon(DaemonCmd::Start) => daemon::run(config).await,
        subcmd => {
            let client = client::Client::new(&config, opts.arch.as_deref())?;
            client.execute(&subcmd).await
        }
    }
}
