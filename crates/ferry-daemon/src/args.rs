use clap::Parser;

/// Scheduled file sync between local, SFTP and FTP storage.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (falls back to $FERRY_CONFIG, then ./config.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Transfer history file (overrides `[history] path` in the config)
    #[arg(long)]
    pub history: Option<String>,
}
