//! Control-plane command layer: the line grammar, the ordered handler
//! table, and the two transports that feed lines into the dispatcher.

pub(crate) mod commands;
pub mod dispatch;
pub mod pipe;
pub mod socket;

/// Envelope prefixes written back to interactive clients.
pub const RESULT_PREFIX: &str = "RESULT\n";
pub const EXCEPTION_PREFIX: &str = "EXCEPTION\n";
pub const COMMAND_ERROR_PREFIX: &str = "COMMAND-ERROR\n";
/// Body returned for a cleanly parsed line no handler claims.
pub const UNKNOWN_COMMAND: &str = "?";

/// One parsed control line. Parsed exactly once per line, immutable after.
#[derive(Debug, clap::Parser)]
#[clap(
    name = "shepherd-ctl",
    no_binary_name = true,
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
pub struct ControlLine {
    #[clap(subcommand)]
    pub command: ControlCommand,
}

#[derive(Debug, Clone, PartialEq, clap::Subcommand)]
pub enum ControlCommand {
    /// Running summary plus the per-service status table.
    #[clap(disable_help_flag = true)]
    Status,
    /// Get or set the forced minimum log priority.
    #[clap(disable_help_flag = true)]
    Loglevel {
        #[clap(value_name = "level")]
        level: Option<String>,
    },
    #[clap(disable_help_flag = true)]
    Stop {
        #[clap(long)]
        force: bool,
        #[clap(long)]
        wait: bool,
        #[clap(long)]
        disable: bool,
        #[clap(value_name = "servname")]
        services: Vec<String>,
    },
    #[clap(disable_help_flag = true)]
    Start {
        #[clap(long)]
        force: bool,
        #[clap(long)]
        wait: bool,
        #[clap(long)]
        enable: bool,
        #[clap(value_name = "servname")]
        services: Vec<String>,
    },
    #[clap(disable_help_flag = true)]
    Reset {
        #[clap(long)]
        force: bool,
        #[clap(long)]
        wait: bool,
        #[clap(value_name = "servname")]
        services: Vec<String>,
    },
    #[clap(disable_help_flag = true)]
    Enable {
        #[clap(value_name = "servname")]
        services: Vec<String>,
    },
    #[clap(disable_help_flag = true)]
    Disable {
        #[clap(value_name = "servname")]
        services: Vec<String>,
    },
    /// Render the declared dependency edges.
    #[clap(disable_help_flag = true)]
    Dependencies,
    /// Schedule whole-supervisor termination.
    #[clap(disable_help_flag = true)]
    Shutdown {
        #[clap(value_name = "delay")]
        delay: Option<String>,
    },
}

/// A registered command handler: a match predicate over the parsed line
/// plus the interactive-only gate. Handlers are tried in table order and
/// the first match wins.
pub(crate) struct Handler {
    pub(crate) verb: &'static str,
    pub(crate) interactive_only: bool,
    matches: fn(&ControlCommand) -> bool,
}

impl Handler {
    pub(crate) fn matches(&self, command: &ControlCommand) -> bool {
        (self.matches)(command)
    }
}

/// Registration order mirrors the order commands were historically tried
/// in; the grammar is exclusive by verb so at most one entry matches.
pub(crate) const HANDLERS: &[Handler] = &[
    Handler {
        verb: "loglevel",
        interactive_only: false,
        matches: |c| matches!(c, ControlCommand::Loglevel { .. }),
    },
    Handler {
        verb: "shutdown",
        interactive_only: false,
        matches: |c| matches!(c, ControlCommand::Shutdown { .. }),
    },
    Handler {
        verb: "status",
        interactive_only: true,
        matches: |c| matches!(c, ControlCommand::Status),
    },
    Handler {
        verb: "stop",
        interactive_only: false,
        matches: |c| matches!(c, ControlCommand::Stop { .. }),
    },
    Handler {
        verb: "start",
        interactive_only: false,
        matches: |c| matches!(c, ControlCommand::Start { .. }),
    },
    Handler {
        verb: "reset",
        interactive_only: false,
        matches: |c| matches!(c, ControlCommand::Reset { .. }),
    },
    Handler {
        verb: "enable",
        interactive_only: false,
        matches: |c| matches!(c, ControlCommand::Enable { .. }),
    },
    Handler {
        verb: "disable",
        interactive_only: false,
        matches: |c| matches!(c, ControlCommand::Disable { .. }),
    },
    Handler {
        verb: "dependencies",
        interactive_only: true,
        matches: |c| matches!(c, ControlCommand::Dependencies),
    },
];
