use clap::Parser;
use tracing_subscriber::EnvFilter;

use xd2031::cli::{Cli, Command};
use xd2031::config;
use xd2031::directory;
use xd2031::geometry;
use xd2031::image::DiskImage;
use xd2031::integrity;
use xd2031::merge;
use xd2031::packet::PacketCodec;
use xd2031::progress::{OutputMode, StepProgress};
use xd2031::transport::Transport;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("xd2031=info".parse().expect("valid log directive"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Catalog { image } => catalog(&image)?,
        Command::Dump { image } => dump(&image)?,
        Command::Scan { image } => scan(&image)?,
        Command::Merge { out, weak_tag, images } => merge_images(&out, weak_tag, &images)?,
        Command::Serve => serve(&cli.config).await?,
    }

    Ok(())
}

fn catalog(path: &std::path::Path) -> miette::Result<()> {
    let image = DiskImage::load(path)?;
    let (name, id, ver) = image.header();
    let header = directory::header_line(&name, &id, &ver);
    println!("{} {}", header.line_number, String::from_utf8_lossy(&header.text));

    let (dir_track, dir_sector) = image.geometry.directory_location();
    let mut track = dir_track;
    let mut sector = dir_sector;
    loop {
        let block = image.read_ts(track, sector)?;
        for chunk in block.chunks(directory::ENTRY_SIZE) {
            let mut raw = [0u8; directory::ENTRY_SIZE];
            raw.copy_from_slice(chunk);
            if let Some(entry) = directory::parse_entry(&raw) {
                let line = directory::entry_to_basic_line(&entry, entry.blocks as u32 * 254);
                println!(
                    "{} {}",
                    line.line_number,
                    String::from_utf8_lossy(&line.text)
                );
            }
        }
        let next_track = block[0];
        let next_sector = block[1];
        if next_track == 0 {
            break;
        }
        track = next_track;
        sector = next_sector;
    }
    Ok(())
}

fn dump(path: &std::path::Path) -> miette::Result<()> {
    let image = DiskImage::load(path)?;
    let (name, id, ver) = image.header();
    println!("type:       {:?}", image.geometry.disk_type);
    println!("dos version:{} (image reports {})", image.geometry.dos_version, ver);
    println!("blocks:     {}", image.blocks_len());
    println!("rel blocks: {}", image.geometry.rel_blocks);
    println!("dir track:  {}", image.geometry.dir_track);
    println!("name:       {}", String::from_utf8_lossy(&name));
    println!("id:         {:02x}{:02x}", id[0], id[1]);
    println!("error table:{}", image.has_error_table());
    Ok(())
}

fn scan(path: &std::path::Path) -> miette::Result<()> {
    let image = DiskImage::load(path)?;
    let mut progress = StepProgress::new(1, OutputMode::Plain);
    let geometry = image.geometry;
    progress
        .run("scanning directory chain", |step| async move {
            let (dir_track, dir_sector) = geometry.directory_location();
            let mut track = dir_track;
            let mut sector = dir_sector;
            let mut checked = 0usize;
            let mut flagged = 0usize;
            loop {
                let Ok(block) = image.read_ts(track, sector) else {
                    break;
                };
                for chunk in block.chunks(directory::ENTRY_SIZE) {
                    let mut raw = [0u8; directory::ENTRY_SIZE];
                    raw.copy_from_slice(chunk);
                    let Some(entry) = directory::parse_entry(&raw) else {
                        continue;
                    };
                    checked += 1;
                    let report = if entry.file_type == directory::FILETYPE_REL {
                        integrity::verify_rel_file(&image, &entry, &geometry)
                    } else {
                        integrity::follow_link_chain(&image, &entry)
                    };
                    if !report.is_clean() {
                        flagged += 1;
                        step.log(&format!(
                            "{}: {:?}",
                            String::from_utf8_lossy(&entry.name),
                            report.issues
                        ));
                    }
                }
                let next_track = block[0];
                let next_sector = block[1];
                if next_track == 0 {
                    break;
                }
                track = next_track;
                sector = next_sector;
            }
            step.set_done_label(format!("{checked} files checked, {flagged} flagged"));
        })
        .await;
    Ok(())
}

fn merge_images(
    out: &std::path::Path,
    weak_tag: u8,
    inputs: &[std::path::PathBuf],
) -> miette::Result<()> {
    let images: Vec<DiskImage> = inputs
        .iter()
        .map(|p| DiskImage::load(p))
        .collect::<Result<_, _>>()?;
    let merged = merge::merge_repair(&images, weak_tag)?;
    std::fs::write(out, merged.into_bytes()).map_err(|source| xd2031::error::XdError::Io {
        context: format!("writing merged image {}", out.display()),
        source,
    })?;
    println!("wrote {}", out.display());
    Ok(())
}

async fn serve(config_path: &std::path::Path) -> miette::Result<()> {
    let cfg = config::load_config(config_path)?;
    let transport_cfg = cfg.transport.clone();
    tracing::info!(listen = %transport_cfg.listen, "starting xd2031 server");

    let listener = TcpListener::bind(&transport_cfg.listen)
        .await
        .map_err(|source| xd2031::error::XdError::Io {
            context: format!("binding {}", transport_cfg.listen),
            source,
        })?;

    let mut connection_id: u64 = 0;
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|source| xd2031::error::XdError::Io {
                context: "accepting connection".into(),
                source,
            })?;
        connection_id += 1;
        let id = connection_id;
        tracing::info!(%peer, id, "device connected");

        tokio::spawn(async move {
            let mut framed = Framed::new(stream, PacketCodec::default());
            for packet in Transport::sync_flood() {
                if framed.send(packet).await.is_err() {
                    return;
                }
            }
            while let Some(frame) = framed.next().await {
                match frame {
                    Ok(packet) => {
                        tracing::debug!(id, cmd = packet.cmd, chan = packet.chan, "received packet");
                    }
                    Err(err) => {
                        tracing::warn!(id, %err, "connection error");
                        break;
                    }
                }
            }
            tracing::info!(id, "device disconnected");
        });
    }
}
