use std::path::PathBuf;

use clap::Parser;
use slotdex::config::ConfigOverrides;

#[derive(Debug, Parser)]
#[command(
    name = "slotdex",
    about = "Run index calls, one per line, against a single session"
)]
pub struct Cli {
    /// Script of calls to run; standard input when omitted
    pub script: Option<PathBuf>,

    /// Highest slot number accepted by `open`
    #[arg(long)]
    pub max_slots: Option<usize>,

    /// Number of indexes kept open before the least recently used is closed
    #[arg(long)]
    pub max_open: Option<usize>,

    /// Memory budget for each index writer, in MB
    #[arg(long)]
    pub writer_memory_mb: Option<usize>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_slots: self.max_slots,
            max_open: self.max_open,
            writer_memory_mb: self.writer_memory_mb,
            handle_base: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_limits_and_script() {
        let cli = Cli::parse_from([
            "slotdex",
            "--max-slots",
            "4",
            "--max-open",
            "2",
            "-vv",
            "calls.txt",
        ]);
        assert_eq!(cli.script, Some(PathBuf::from("calls.txt")));
        assert_eq!(cli.verbose, 2);
        let overrides = cli.config_overrides();
        assert_eq!(overrides.max_slots, Some(4));
        assert_eq!(overrides.max_open, Some(2));
        assert_eq!(overrides.writer_memory_mb, None);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["slotdex", "-q", "-v"]).is_err());
    }
}
