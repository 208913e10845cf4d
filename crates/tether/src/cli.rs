//! Clap derive structures for the `tether` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tether -- run and inspect bot sessions against a real-time chat service
#[derive(Debug, Parser)]
#[command(
    name = "tether",
    version,
    about = "Run and inspect bot sessions from the command line",
    long_about = "Logs a bot in over REST, keeps its gateway connection alive across\n\
        reconnects, and prints the events it receives.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Bot profile to use
    #[arg(long, short = 'p', env = "TETHER_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Bot token (overrides the profile)
    #[arg(long, env = "TETHER_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// REST base URL (overrides the profile)
    #[arg(long, env = "TETHER_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TETHER_OUTPUT",
        default_value = "text",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in, connect to the gateway and print events until Ctrl-C
    Run(RunArgs),

    /// Look up a user, guild or channel by id
    Resolve(ResolveArgs),

    /// Inspect and manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Event to print (repeatable, e.g. --event message_create). Default: all of ready, guild_create, message_create
    #[arg(long = "event", short = 'e', value_name = "NAME")]
    pub events: Vec<String>,

    /// Gateway intents bitfield (overrides the profile)
    #[arg(long)]
    pub intents: Option<u64>,

    /// Stop after this many consecutive loop errors
    #[arg(long, value_name = "N")]
    pub max_errors: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Entity type: user, guild or channel (any tag containing one of these)
    pub kind: String,

    /// Snowflake id
    pub id: u64,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the resolved settings of the active profile
    Show,

    /// Store the bot token in the system keyring
    SetToken,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
