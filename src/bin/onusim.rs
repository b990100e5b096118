//! TR-451 ONU simulator.
//!
//! Simulates one or more ONU instances on a single channel termination.
//! OMCI commands arrive over UDP; alarms can be injected out of band
//! through the interactive console (`alarm <class> <inst> <hex_bitmap>
//! <seq>`) or the REST surface (`POST /onu/action_on_mes`, port taken
//! from the `http_port` environment variable).
//!
//! Messages addressed to an invalid channel termination name or ONU id
//! are ignored; no response is generated.

use clap::Parser;
use log::{LevelFilter, debug, error, info};
use onusim::endpoint::{Config, Endpoint};
use onusim::message::CtermName;
use onusim::{console, rest};
use std::net::ToSocketAddrs;
use std::sync::Arc;

/// Default REST listener port, overridden by the `http_port` environment
/// variable.
const DEFAULT_HTTP_PORT: u16 = 3017;

#[derive(Parser, Debug)]
#[command(name = "onusim", version, about = "TR-451 ONU simulator")]
struct Args {
    /// Server DNS name or IP address.
    #[arg(short, long, default_value = "0.0.0.0")]
    address: String,

    /// Server UDP port number.
    #[arg(short, long, default_value_t = 12345)]
    port: u16,

    /// Channel termination name.
    #[arg(short = 'n', long, default_value = "cterm")]
    ctermname: String,

    /// First ONU id.
    #[arg(short = 'i', long, default_value_t = 42)]
    onuidfirst: u16,

    /// Last ONU id; defaults to the first.
    #[arg(short = 'I', long)]
    onuidlast: Option<u16>,

    /// Whether to use/support extended messages.
    #[arg(short, long)]
    extended: bool,

    /// File to which to dump hex messages.
    #[arg(short, long, num_args = 0..=1, default_missing_value = "dump.txt")]
    dumpfile: Option<String>,

    /// Logging level (0=errors+warnings, 1=info, 2=debug).
    #[arg(short, long, default_value_t = 0)]
    loglevel: u8,
}

fn init_logging(loglevel: u8) {
    let level = match loglevel {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_logging(args.loglevel);

    debug!("args {:?}", args);

    let cterm_name = CtermName::try_from(args.ctermname.as_str())
        .map_err(|()| format!("channel termination name {:?} exceeds 30 bytes", args.ctermname))?;

    let onuidlast = args.onuidlast.unwrap_or(args.onuidfirst);

    if onuidlast < args.onuidfirst {
        return Err(format!(
            "--onuidlast {} is below --onuidfirst {}",
            onuidlast, args.onuidfirst
        )
        .into());
    }

    let server_addr = (args.address.as_str(), args.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("can't resolve {:?}", args.address))?;

    let config = Config {
        server_addr,
        cterm_name,
        onu_ids: args.onuidfirst..=onuidlast,
        extended: args.extended,
        tr451: true,
        optional: true,
        dumpfile: args.dumpfile,
    };

    let server = Arc::new(Endpoint::server(config).await?);

    info!("start serving input commands ...");
    tokio::spawn(console::run(Arc::clone(&server)));

    info!("start serving REST requests ...");

    let http_port = std::env::var("http_port")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", http_port)).await?;

    let router = rest::router(Arc::clone(&server));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("REST listener failed: {}", e);
        }
    });

    info!("start serving received OMCI requests ...");
    server.serve().await?;

    Ok(())
}
