// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use signal_hook::consts::signal::*;
use signal_hook::iterator::Signals;
use slog::debug;
use slog::info;
use structopt::StructOpt;

pub use errors::OltdError;
pub use types::OltdResult;

mod api_server;
mod config;
mod errors;
mod poller;
mod reconcile;
mod sensors;
mod sink;
mod snmp;
mod types;

/// All global state for the oltd daemon
pub struct Global {
    /// Root of the tree of loggers
    pub log: slog::Logger,
    /// Deployment configuration, validated at startup and immutable
    /// afterwards.
    pub config: config::Config,
    /// Metric catalog, validated at startup and referenced read-only.
    pub catalog: mib::OidCatalog,
    /// Transport used to walk tables on the devices.
    pub transport: Arc<dyn snmp::SnmpTransport>,
    /// Persistent ONT entity store.
    pub store: Arc<dyn reconcile::OntStore>,
    /// Destination for readings and per-cycle aggregates.
    pub sink: Arc<dyn sink::TelemetrySink>,
    /// Devices we are polling
    pub devices: Mutex<BTreeMap<String, Arc<Mutex<poller::Device>>>>,
    /// List of addresses on which the api_server should listen.
    pub listen_addresses: Mutex<Vec<SocketAddr>>,
}

impl Global {
    fn new(
        log: &slog::Logger,
        config: config::Config,
        catalog: mib::OidCatalog,
        transport: Arc<dyn snmp::SnmpTransport>,
        store: Arc<dyn reconcile::OntStore>,
        sink: Arc<dyn sink::TelemetrySink>,
    ) -> Self {
        Global {
            log: log.clone(),
            config,
            catalog,
            transport,
            store,
            sink,
            devices: Mutex::new(BTreeMap::new()),
            listen_addresses: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "oltd", about = "PON OLT telemetry polling daemon")]
enum Args {
    /// Run the oltd pollers and API server.
    Run(Opt),
}

#[derive(Clone, Debug, StructOpt)]
pub(crate) struct Opt {
    #[structopt(long, help = "log file")]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        default_value = "json",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: common::LogFormat,

    #[structopt(long = "config", short = "c", help = "config file path")]
    config_file: String,

    #[structopt(
        long = "listen-addr",
        short = "a",
        help = "additional SocketAddr oltd should listen on"
    )]
    listen_addr: Option<SocketAddr>,
}

async fn signal_handler(
    g: Arc<Global>,
    _api_tx: tokio::sync::watch::Sender<()>,
) {
    const SIGNALS: &[std::ffi::c_int] = &[SIGTERM, SIGQUIT, SIGINT];
    let mut sigs = Signals::new(SIGNALS).unwrap();

    let log = g.log.new(slog::o!("unit" => "signal-handler"));
    for signal in &mut sigs {
        if signal == SIGINT || signal == SIGQUIT || signal == SIGTERM {
            info!(&log, "caught signal {signal} - exiting");
            break;
        }
    }
    // _api_tx drops here, telling the api_server_manager to wind down.
}

async fn run_oltd(opts: Opt) -> OltdResult<()> {
    let log = common::log_init("oltd", &opts.log_file, opts.log_format)?;

    let config = config::Config::from_file(&opts.config_file)?;
    let catalog = config.catalog()?;

    let transport = Arc::new(snmp::NetSnmpTransport::new(
        log.new(slog::o!("unit" => "snmp")),
        config.walk_timeout_secs,
        config.walk_retries,
    ));
    let store = Arc::new(reconcile::MemStore::new());
    let sink =
        Arc::new(sink::LogSink::new(log.new(slog::o!("unit" => "sink"))));

    let global =
        Arc::new(Global::new(&log, config, catalog, transport, store, sink));

    {
        let mut listen = global.listen_addresses.lock().unwrap();
        *listen = global.config.listen_addresses.clone();
        if let Some(addr) = opts.listen_addr {
            listen.push(addr);
        }
    }

    for device in global.config.devices.clone() {
        poller::device_add(&global, device).await?;
    }

    let (api_tx, api_rx) = tokio::sync::watch::channel(());
    let api_global = global.clone();
    let api_server_manager = tokio::task::spawn(async move {
        api_server::api_server_manager(api_global, api_rx).await
    });

    signal_handler(global.clone(), api_tx).await;

    debug!(&log, "shutting down API server");
    api_server_manager
        .await
        .expect("while shutting down the api_server_manager");

    poller::shutdown_all(&global).await;

    info!(&log, "exiting");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> OltdResult<()> {
    let args = Args::from_args();

    match args {
        Args::Run(opt) => run_oltd(opt).await,
    }
}
