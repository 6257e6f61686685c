//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// ftrs - zero-copy point-to-point file transfer
#[derive(Parser, Debug)]
#[command(name = "ftrs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a receiver and send one file
    Send(SendArgs),
    /// Listen and receive files, one connection at a time
    Receive(ReceiveArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SendArgs {
    /// File to send (/dev/zero sends synthetic data and needs --size)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Bytes to send from /dev/zero (e.g. 1024K, 500M, 10G)
    #[arg(short, long)]
    pub size: Option<String>,

    /// Receiver address [default: localhost:8080]
    #[arg(short, long)]
    pub addr: Option<String>,

    /// TCP send buffer size (e.g. 4M)
    #[arg(long, value_parser = parse_buffer)]
    pub sndbuf: Option<usize>,

    /// Hint the kernel to read the file into the page cache first
    #[arg(long)]
    pub prewarm: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReceiveArgs {
    /// Directory to save files in (/dev/null discards)
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Listen address [default: localhost:8080]
    #[arg(short, long)]
    pub addr: Option<String>,

    /// Use buffered copies instead of splice
    #[arg(long)]
    pub no_splice: bool,

    /// TCP receive buffer size (e.g. 4M)
    #[arg(long, value_parser = parse_buffer)]
    pub rcvbuf: Option<usize>,

    /// Open destination files with O_DIRECT (Linux only)
    #[arg(long)]
    pub odirect: bool,

    /// Accept any received name, including absolute paths and `..`
    #[arg(long)]
    pub trust_names: bool,
}

fn parse_buffer(spec: &str) -> Result<usize, String> {
    let bytes = ftrs_data_channel::parse_size(spec).map_err(|e| e.to_string())?;
    usize::try_from(bytes).map_err(|_| format!("buffer size too large: {spec}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send() {
        let cli = Cli::try_parse_from([
            "ftrs", "send", "--file", "/dev/zero", "--size", "1G", "--sndbuf", "4M", "--prewarm",
        ])
        .unwrap();
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.file, PathBuf::from("/dev/zero"));
        assert_eq!(args.size.as_deref(), Some("1G"));
        assert_eq!(args.sndbuf, Some(4 * 1024 * 1024));
        assert!(args.prewarm);
        assert!(args.addr.is_none());
    }

    #[test]
    fn parses_receive_defaults() {
        let cli = Cli::try_parse_from(["ftrs", "-v", "receive"]).unwrap();
        assert!(cli.verbose);
        let Command::Receive(args) = cli.command else {
            panic!("expected receive");
        };
        assert_eq!(args.dir, PathBuf::from("."));
        assert!(!args.no_splice);
        assert!(!args.odirect);
        assert!(!args.trust_names);
    }

    #[test]
    fn rejects_bad_buffer_size() {
        assert!(Cli::try_parse_from(["ftrs", "receive", "--rcvbuf", "lots"]).is_err());
    }

    #[test]
    fn send_requires_file() {
        assert!(Cli::try_parse_from(["ftrs", "send"]).is_err());
    }
}
