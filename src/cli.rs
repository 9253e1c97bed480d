use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "xd2031", about = "XD2031 disk-image server and image tooling")]
pub struct Cli {
    /// Path to the server config file.
    #[arg(short, long, default_value = "xd2031.toml")]
    pub config: PathBuf,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a BASIC-style directory listing of a disk image.
    Catalog {
        /// Path to the D64/D71/D80/D81/D82 image.
        image: PathBuf,
    },

    /// Dump geometry, header, and BAM facts about an image.
    Dump {
        image: PathBuf,
    },

    /// Run the integrity scanner over every file on an image.
    Scan {
        image: PathBuf,
    },

    /// Merge-repair two or more images of identical geometry.
    Merge {
        /// Output path for the merged image.
        #[arg(short, long)]
        out: PathBuf,

        /// Error-table byte to tag weak (both-good-but-differing)
        /// blocks with.
        #[arg(long, default_value_t = 1)]
        weak_tag: u8,

        /// Two or more source images.
        images: Vec<PathBuf>,
    },

    /// Run the XD2031 server, accepting device connections and
    /// servicing the framed protocol (§4.1-§4.5).
    Serve,
}
