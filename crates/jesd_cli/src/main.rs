//! jesdsim: the command-line front end for the JESD204B link model.
//!
//! Provides `jesdsim init` to write a starter `link.toml`, `jesdsim check` to
//! validate and resolve a configuration, and `jesdsim run` to bring a link up
//! and report how it went.

#![warn(missing_docs)]

mod check;
mod init;
mod pipeline;
mod run;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// jesdsim, a cycle-level JESD204B transmit link simulator.
#[derive(Parser, Debug)]
#[command(name = "jesdsim", version, about = "JESD204B link simulator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print every link event while running.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `link.toml` file or the directory holding one.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a starter `link.toml`.
    Init {
        /// Link name. Defaults to the current directory's name.
        name: Option<String>,

        /// Number of lanes.
        #[arg(short, long, default_value_t = 4)]
        lanes: u32,
    },
    /// Validate and resolve the link configuration.
    Check(CheckArgs),
    /// Enable the link and run it for a while.
    Run(RunArgs),
}

/// Arguments for the `jesdsim check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Output format for the resolved configuration.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `jesdsim run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Simulated time to run (e.g., "100us", "2ms").
    #[arg(long, default_value = "2ms")]
    pub time: String,

    /// Write a VCD waveform to this path.
    #[arg(long)]
    pub vcd: Option<String>,

    /// Output format for the final report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Transmit the built-in short test pattern instead of the ramp payload.
    #[arg(long)]
    pub stpl: bool,

    /// Serializer PRBS select (1 = PRBS7, 2 = PRBS15, 3 = PRBS23, 4 = PRBS31).
    #[arg(long)]
    pub prbs: Option<u8>,

    /// Never assert JSYNC, leaving the link layer in code group sync.
    #[arg(long)]
    pub no_jsync: bool,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print every link event.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Init { name, lanes } => init::run(name, lanes, &global),
        Command::Check(ref args) => check::run(args, &global),
        Command::Run(ref args) => run::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_init_default() {
        let cli = Cli::parse_from(["jesdsim", "init"]);
        match cli.command {
            Command::Init { name, lanes } => {
                assert!(name.is_none());
                assert_eq!(lanes, 4);
            }
            _ => panic!("expected Init command"),
        }
    }

    #[test]
    fn parse_init_with_args() {
        let cli = Cli::parse_from(["jesdsim", "init", "dac0", "--lanes", "8"]);
        match cli.command {
            Command::Init { name, lanes } => {
                assert_eq!(name.as_deref(), Some("dac0"));
                assert_eq!(lanes, 8);
            }
            _ => panic!("expected Init command"),
        }
    }

    #[test]
    fn parse_check_json() {
        let cli = Cli::parse_from(["jesdsim", "check", "--format", "json"]);
        match cli.command {
            Command::Check(ref args) => assert_eq!(args.format, ReportFormat::Json),
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn parse_run_default() {
        let cli = Cli::parse_from(["jesdsim", "run"]);
        match cli.command {
            Command::Run(ref args) => {
                assert_eq!(args.time, "2ms");
                assert!(args.vcd.is_none());
                assert_eq!(args.format, ReportFormat::Text);
                assert!(!args.stpl);
                assert!(args.prbs.is_none());
                assert!(!args.no_jsync);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn parse_run_with_args() {
        let cli = Cli::parse_from([
            "jesdsim",
            "run",
            "--time",
            "500us",
            "--vcd",
            "out/link.vcd",
            "--format",
            "json",
            "--stpl",
            "--prbs",
            "2",
            "--no-jsync",
        ]);
        match cli.command {
            Command::Run(ref args) => {
                assert_eq!(args.time, "500us");
                assert_eq!(args.vcd.as_deref(), Some("out/link.vcd"));
                assert_eq!(args.format, ReportFormat::Json);
                assert!(args.stpl);
                assert_eq!(args.prbs, Some(2));
                assert!(args.no_jsync);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["jesdsim", "--quiet", "--config", "boards/link.toml", "check"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("boards/link.toml"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["jesdsim", "run", "--verbose"]);
        assert!(cli.verbose);
        assert!(!cli.quiet);
    }

    #[test]
    fn prbs_select_must_be_numeric() {
        assert!(Cli::try_parse_from(["jesdsim", "run", "--prbs", "seven"]).is_err());
    }
}
