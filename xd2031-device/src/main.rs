//! Device-side core (§5): the embedded-device half of the XD2031 split,
//! driven as a single cooperative main loop rather than a literal
//! interrupt/poll pair — `#[tokio::main(flavor = "current_thread")]`
//! gives the single-threaded contract the spec asks for without a busy
//! loop, the same trade the teacher's agent binary makes for its own
//! single vsock-bound control plane.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::codec::Framed;

use xd2031::buffer::BufferPool;
use xd2031::channel::ChannelPool;
use xd2031::packet::{CbmCommand, Packet, PacketCodec};
use xd2031::transport::{BOOT_SYNC_FLOOD, Transport};

const MAX_CHANNELS_RESERVE: usize = 8;
const N_DIRECT_BUFFERS: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "xd2031-device", about = "XD2031 device-side core")]
struct Args {
    /// Address of the server to connect to (host:port).
    #[arg(default_value = "127.0.0.1:6400")]
    server: String,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("xd2031_device=info".parse().expect("valid log directive"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(server = %args.server, "xd2031-device starting");

    let stream = match TcpStream::connect(&args.server).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to server");
            return;
        }
    };

    let mut framed = Framed::new(stream, PacketCodec::default());
    let transport = Transport::new(4, MAX_CHANNELS_RESERVE);
    let mut channels = ChannelPool::new();
    let mut buffers = BufferPool::new(N_DIRECT_BUFFERS);

    // Boot handshake (§4.1/§4.2): flood sync bytes so the server's
    // decoder re-anchors irrespective of whatever it saw before.
    for packet in Transport::sync_flood() {
        if let Err(e) = framed.send(packet).await {
            tracing::error!(error = %e, "failed to send boot sync flood");
            return;
        }
    }
    tracing::debug!(count = BOOT_SYNC_FLOOD, "boot sync flood sent");

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGINT handler");
            return;
        }
    };

    // One main progress loop: (i) transport send drain, (ii) transport
    // receive demux, (iii) one iteration of the bus frontend. Here the
    // socket itself stands in for (i)/(ii)'s wire; the bus frontend has
    // no real hardware to poll against in this host build, so its slot
    // in the rotation is the outbound-queue drain below.
    loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(packet)) => handle_inbound(&packet, &mut channels, &mut buffers),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "frame decode error");
                    }
                    None => {
                        tracing::info!("server closed the connection");
                        break;
                    }
                }
            }
            outbound = transport.next_outbound() => {
                if let Some(packet) = outbound {
                    if let Err(e) = framed.send(packet).await {
                        tracing::warn!(error = %e, "failed to send outbound packet");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
        }
    }
}

/// Dispatch one inbound packet against the open channel/buffer pools.
/// `TERM` tears down the channel it names; everything else is logged —
/// the full command table's effects live in `xd2031::channel` and
/// `xd2031::buffer`, which this loop drives once a real bus frontend
/// is wired in.
fn handle_inbound(packet: &Packet, channels: &mut ChannelPool, buffers: &mut BufferPool) {
    match packet.command() {
        Some(CbmCommand::Term) => {
            channels.close(packet.chan);
            buffers.close(packet.chan);
        }
        Some(cmd) => {
            tracing::debug!(?cmd, chan = packet.chan, len = packet.data.len(), "inbound packet");
        }
        None => {
            tracing::warn!(cmd = packet.cmd, "unknown command code");
        }
    }
}
