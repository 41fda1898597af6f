use clap::{Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

/// Bellhop - blocking human-in-the-loop questions for agent sessions
#[derive(Parser)]
#[command(name = "bellhop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for list commands
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: CliOutputFormat,

    /// JSON output (shorthand for --format json)
    #[arg(long, global = true)]
    pub json: bool,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format.into()
        }
    }
}

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum CliOutputFormat {
    #[default]
    Table,
    Json,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Table => OutputFormat::Table,
            CliOutputFormat::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a blocking question and wait for the answer
    #[command(
        after_help = "EXAMPLES:\n    bellhop ask \"Pick a port\" --body \"Which port should the service bind?\"\n    bellhop ask \"Deploy?\" --timeout-minutes 10\n\nThe command blocks until the question is answered, times out, or is\ncancelled. The answer is printed to stdout; exit code 5 means timeout."
    )]
    Ask {
        /// Short title shown in chat and in session listings
        title: String,

        /// Full question text (defaults to the title)
        #[arg(long)]
        body: Option<String>,

        /// Extra context displayed beneath the question
        #[arg(long)]
        context: Option<String>,

        /// Minutes before the question times out
        #[arg(long)]
        timeout_minutes: Option<i64>,

        /// Project root the session registers under (defaults to cwd)
        #[arg(long, env = "BELLHOP_PROJECT")]
        project_root: Option<String>,
    },

    /// Record an answer for a pending question
    Answer {
        /// Question ID
        question_id: String,

        /// The answer text
        answer: String,
    },

    /// Cancel a pending question
    Cancel {
        /// Question ID
        question_id: String,

        /// Reason shown in the chat notice
        #[arg(long)]
        reason: Option<String>,
    },

    /// List connected sessions
    Sessions,

    /// List questions known to the daemon
    Questions {
        /// Only questions asked by this session
        #[arg(long)]
        session: Option<String>,
    },

    /// Show a single question
    Show {
        /// Question ID
        question_id: String,
    },

    /// Send a message to the chat channel
    Send {
        /// Message text
        text: String,

        /// Thread handle to post into
        #[arg(long)]
        thread: Option<String>,
    },

    /// Create a chat topic and print its thread handle
    Topic {
        /// Topic name
        name: String,
    },

    /// Daemon lifecycle management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Show daemon status
    Status,

    /// Start the daemon
    Start,

    /// Stop the daemon
    Stop,

    /// Restart the daemon
    Restart,

    /// Show daemon logs
    Logs {
        /// Follow the log like tail -f
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Open the config file in $EDITOR
    Edit,
}
