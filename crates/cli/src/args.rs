use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Pushwire — send and listen for realtime push notifications.
#[derive(Debug, Parser)]
#[command(name = "pushwire", version, about)]
pub struct Cli {
    /// API key (overrides the PUSHWIRE_API_KEY environment variable).
    #[arg(short = 'k', long, global = true)]
    pub key: Option<String>,

    /// Read the API key from a file (overrides --key).
    #[arg(long, global = true, value_name = "PATH")]
    pub key_file: Option<PathBuf>,

    /// More logging (info level).
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Full debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Errors only; also suppresses send confirmations.
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a push (a note, or a link when --url is given).
    Send {
        /// Push title.
        #[arg(short = 't', long)]
        title: Option<String>,

        /// Push body.
        #[arg(short = 'b', long)]
        body: Option<String>,

        /// Send a link push pointing at this URL.
        #[arg(short = 'u', long)]
        url: Option<String>,

        /// Nickname of the device to address the push to.
        #[arg(short = 'd', long)]
        device: Option<String>,

        /// File uploads are handled by the external transfer helper;
        /// this flag only reports that.
        #[arg(short = 'f', long, value_name = "PATH")]
        file: Option<PathBuf>,
    },

    /// Listen for pushes and run actions against each one.
    Listen {
        /// Print each push to stdout as JSON (the default action).
        #[arg(short = 'e', long)]
        echo: bool,

        /// Run a command per push; the record goes to its stdin as JSON
        /// and stdout may carry reply pushes.  Repeatable.
        #[arg(short = 'x', long = "exec", num_args = 1.., value_name = "CMD", action = ArgAction::Append)]
        exec: Vec<Vec<String>>,

        /// Like --exec but with a plain-text contract: title on line
        /// one, body after it.  Repeatable.
        #[arg(short = 's', long = "exec-simple", num_args = 1.., value_name = "CMD", action = ArgAction::Append)]
        exec_simple: Vec<Vec<String>>,

        /// Maximum dispatches per throttle window (0 disables).
        #[arg(long, default_value_t = 10, value_name = "N")]
        throttle_count: usize,

        /// Throttle window length in seconds.
        #[arg(long, default_value_t = 10, value_name = "SECS")]
        throttle_seconds: u64,

        /// Only handle broadcasts and pushes for this device nickname;
        /// the device is registered if it does not exist.
        #[arg(short = 'd', long)]
        device: Option<String>,

        /// Print the account's device nicknames and exit.
        #[arg(long)]
        list_devices: bool,
    },
}
