//! CLI argument definitions for logroute-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// logroute log routing daemon.
///
/// Loads label definitions, runs the routing engine with one buffered
/// sink worker per output, and forwards records read from stdin.
#[derive(Parser, Debug)]
#[command(name = "logroute-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logroute.toml configuration file.
    #[arg(short, long, default_value = "/etc/logroute/logroute.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the label definition directory.
    #[arg(long)]
    pub pipeline_dir: Option<PathBuf>,

    /// Validate configuration and label definitions, then exit.
    #[arg(long)]
    pub validate: bool,

    /// Read `<tag> <payload>` lines from stdin and ingest them.
    ///
    /// The daemon shuts down gracefully when stdin reaches EOF.
    #[arg(long)]
    pub stdin: bool,

    /// List quarantined chunks under the buffer storage path and exit.
    #[arg(long)]
    pub list_quarantine: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = DaemonCli::parse_from(["logroute-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/logroute/logroute.toml"));
        assert!(!cli.validate);
        assert!(!cli.stdin);
        assert!(cli.pipeline_dir.is_none());
    }

    #[test]
    fn overrides() {
        let cli = DaemonCli::parse_from([
            "logroute-daemon",
            "-c",
            "/tmp/lr.toml",
            "--log-format",
            "pretty",
            "--pipeline-dir",
            "/tmp/conf.d",
            "--stdin",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/lr.toml"));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert_eq!(cli.pipeline_dir, Some(PathBuf::from("/tmp/conf.d")));
        assert!(cli.stdin);
    }
}
