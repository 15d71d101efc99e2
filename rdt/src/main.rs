//! Entry point for `rdt-echo`.
//!
//! Listens on a UDP socket, accepts RDT connections and echoes every byte
//! received back to the sender.  A peer's FIN closes the connection.
//! `main.rs` owns only process setup (logging, signal handling, argument
//! parsing); the protocol lives in the library.

use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use clap::Parser;
use rdt::segment::{MAX_MSS, MSS};
use rdt::socket::UdpNetwork;
use rdt::{Config, Host};

/// Reliable data transport echo server over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local UDP address to bind.
    #[arg(short, long, default_value = "0.0.0.0:9000")]
    bind: SocketAddr,

    /// RDT port to accept connections on.
    #[arg(short, long, default_value_t = 7000)]
    port: u16,

    /// IPv4 address peers see for this host (checksum pseudo-header).
    #[arg(short, long)]
    address: Option<Ipv4Addr>,

    /// Maximum payload bytes per segment.
    #[arg(
        long,
        default_value_t = MSS as u64,
        value_parser = clap::value_parser!(u64).range(1..=MAX_MSS as u64),
    )]
    mss: u64,

    /// Accept segments without verifying their checksum.
    #[arg(long)]
    ignore_checksum: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), rdt::Error> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let mut config = Config::new(cli.port);
    // Bounded by the argument parser.
    config.mss = cli.mss as usize;
    config.verify_checksum = !cli.ignore_checksum;

    let network = Rc::new(UdpNetwork::bind(cli.bind, cli.address).await?);
    let mut host = Host::new(config, network.clone());
    log::info!(
        "Listening on {} (RDT port {}, address {})",
        network.socket_addr()?,
        host.demux().port(),
        network.local_addr
    );
    let receiver = network.spawn_receiver(host.events());

    host.demux_mut().register_accepted_connection_monitor(|conn| {
        log::info!("Accepted {}", conn.id());
        conn.register_receiver(|conn, data| {
            if data.is_empty() {
                log::info!("Peer closed {}", conn.id());
                conn.close();
            } else {
                conn.send(data);
            }
        });
    });

    tokio::select! {
        _ = host.run() => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            log::info!("Interrupted; shutting down");
        }
    }
    receiver.abort();
    Ok(())
}
