use anyhow::{bail, Context};
use clap::Parser;
use flowproxy::config::Config;
use flowproxy::mapper::MapperRegistry;
use flowproxy::proxy::Proxy;
use log::LevelFilter;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on for debug engine connections.
    #[clap(long, default_value = "127.0.0.1:9010")]
    listen: String,

    /// Address of the IDE's DBGp listener.
    #[clap(long, default_value = "127.0.0.1:9000")]
    ide: String,

    /// Flow application context, also taken from FLOW_CONTEXT.
    #[clap(long, env = "FLOW_CONTEXT", default_value = "Development")]
    context: String,

    /// Framework convention used for path mapping.
    #[clap(long, default_value = "flow")]
    framework: String,

    /// Log every mapping registration.
    #[clap(short, long)]
    verbose: bool,

    /// Additionally log reverse mappings recovered from disk.
    #[clap(long = "vv")]
    very_verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.very_verbose {
        LevelFilter::Debug
    } else if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    // RUST_LOG still overrides the flag-driven default.
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let registry = MapperRegistry::with_defaults();
    if !registry.contains(&args.framework) {
        bail!(
            "unknown framework `{}`, available: {:?}",
            args.framework,
            registry.names()
        );
    }

    let listen: SocketAddr = args.listen.parse().context("Invalid listen address")?;
    let ide: SocketAddr = args.ide.parse().context("Invalid IDE address")?;
    let listener = TcpListener::bind(listen).with_context(|| format!("bind {listen}"))?;

    let config = Config {
        context: args.context,
        framework: args.framework,
        verbose: args.verbose,
        very_verbose: args.very_verbose,
    };

    Arc::new(Proxy::new(config, registry, ide)).run(listener)
}
