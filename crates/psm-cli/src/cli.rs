use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const PSM_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const PSM_BEFORE_HELP: &str = concat!(
    "psm ",
    env!("CARGO_PKG_VERSION"),
    " – Privacy Services Manager\n\n",
    "\x1b[1;36mActions\x1b[0m\n",
    "  add / enable     Grant applications access to a service.\n",
    "  remove           Delete the applications' records for a service.\n",
    "  disable          Keep a record but deny access (no further prompts).\n",
    "  services         List the services and whether this OS has them.\n\n",
    "\x1b[1;36mServices\x1b[0m\n",
    "  contacts, calendar, reminders, icloud, accessibility, location\n",
    "  `location` with no applications toggles Location Services globally.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = PSM_BEFORE_HELP,
    help_template = PSM_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct PsmCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        short = 'n',
        long,
        help = "Log to stderr even when a log destination is configured",
        global = true
    )]
    pub no_log: bool,
    #[arg(
        short = 'l',
        long,
        value_name = "PATH",
        help = "Append log lines to PATH instead of stderr (env PSM_LOG_DEST)",
        global = true
    )]
    pub log_dest: Option<PathBuf>,
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

/// Which store a command edits.
#[derive(Args, Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct TargetArgs {
    #[arg(
        short,
        long,
        value_name = "NAME",
        help = "Edit NAME's permissions instead of the current user's",
        global = true
    )]
    pub user: Option<String>,
    #[arg(
        long,
        help = "Edit the OS user template used for new accounts (requires root)",
        conflicts_with = "user",
        global = true
    )]
    pub template: bool,
    #[arg(
        long,
        value_name = "LANG",
        default_value = psm_core::DEFAULT_LANGUAGE,
        help = "Template language, used with --template",
        global = true
    )]
    pub language: String,
    #[arg(
        long,
        help = "Allow creating and editing root's own permissions database",
        global = true
    )]
    pub forceroot: bool,
    #[arg(
        long,
        help = "Treat applications as filesystem paths instead of bundle lookups",
        global = true
    )]
    pub admin: bool,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Grant applications access to a service.",
        override_usage = "psm add <SERVICE> [APPLICATION ...]"
    )]
    Add(ServiceArgs),
    #[command(
        about = "Alias of `add`.",
        override_usage = "psm enable <SERVICE> [APPLICATION ...]"
    )]
    Enable(ServiceArgs),
    #[command(
        about = "Remove applications' records for a service.",
        override_usage = "psm remove <SERVICE> [APPLICATION ...]"
    )]
    Remove(ServiceArgs),
    #[command(
        about = "Deny applications access to a service without prompting again.",
        override_usage = "psm disable <SERVICE> [APPLICATION ...]"
    )]
    Disable(ServiceArgs),
    #[command(about = "List the known services and their availability.")]
    Services,
}

#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(value_name = "SERVICE", help = "Service key, e.g. contacts or location")]
    pub service: String,
    #[arg(
        value_name = "APPLICATION",
        help = "Bundle identifiers, application names or .app paths"
    )]
    pub apps: Vec<String>,
}
