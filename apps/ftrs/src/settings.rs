//! Optional TOML settings file.
//!
//! Every field is optional. Command-line flags take precedence over the
//! file, and the file over built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use ftrs_data_channel::{Destination, NamePolicy, ReceiveConfig, SendConfig, Source, TransferError};
use serde::Deserialize;

use crate::cli::{ReceiveArgs, SendArgs};

pub const DEFAULT_ADDR: &str = "localhost:8080";
pub const DEFAULT_FAILURE_LOG: &str = "failed_files.log";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub addr: Option<String>,
    pub send_buffer: Option<usize>,
    pub recv_buffer: Option<usize>,
    pub no_splice: bool,
    pub direct_io: bool,
    pub prewarm: bool,
    pub trust_names: bool,
    pub progress_interval_ms: Option<u64>,
    pub failure_log: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn failure_log(&self) -> PathBuf {
        self.failure_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FAILURE_LOG))
    }

    pub fn send_config(&self, args: &SendArgs) -> Result<SendConfig, TransferError> {
        let source = Source::resolve(&args.file, args.size.as_deref())?;
        let mut config = SendConfig::new(self.addr(args.addr.as_deref()), source);
        config.send_buffer = args.sndbuf.or(self.send_buffer);
        config.prewarm = args.prewarm || self.prewarm;
        if let Some(interval) = self.progress_interval() {
            config.progress_interval = interval;
        }
        Ok(config)
    }

    pub fn receive_config(&self, args: &ReceiveArgs) -> ReceiveConfig {
        let mut config = ReceiveConfig::new(Destination::resolve(&args.dir));
        config.use_splice = !(args.no_splice || self.no_splice);
        config.recv_buffer = args.rcvbuf.or(self.recv_buffer);
        config.direct_io = args.odirect || self.direct_io;
        if args.trust_names || self.trust_names {
            config.name_policy = NamePolicy::Trusted;
        }
        if let Some(interval) = self.progress_interval() {
            config.progress_interval = interval;
        }
        config
    }

    /// Resolves the network address: flag, then file, then default.
    pub fn addr(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.addr.clone())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string())
    }

    fn progress_interval(&self) -> Option<Duration> {
        self.progress_interval_ms.map(Duration::from_millis)
    }
}
