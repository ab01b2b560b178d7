//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - scheduler: run, list, validate or trigger scheduled tasks
//! - watch / send: producer and sender processes
//! - approve / reject / enqueue: manual queue operations
//! - status / init: inspect or create the vault

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vaultflow::domain::Lane;

/// Vaultflow - folder-based workflow queue and task scheduler
#[derive(Parser, Debug)]
#[command(name = "vaultflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured vault path
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Options shared by every polling process
#[derive(Args, Debug, Clone, Default)]
pub struct PollArgs {
    /// Run a single poll pass then exit
    #[arg(long)]
    pub check_once: bool,

    /// Override the poll period
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scheduled tasks on their cron cadence
    Scheduler {
        /// List scheduled tasks and exit
        #[arg(long)]
        list: bool,

        /// Run one action immediately and exit
        #[arg(long, value_name = "NAME")]
        action: Option<String>,

        /// Check the schedule file and exit
        #[arg(long)]
        validate: bool,

        /// Schedule file to use instead of the configured one
        #[arg(long, value_name = "FILE")]
        schedule: Option<PathBuf>,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// Admit new items from a source (`inbox` or a configured source)
    Watch {
        /// Source to poll
        #[arg(default_value = "inbox")]
        source: String,

        /// List items awaiting action and exit
        #[arg(long)]
        list: bool,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// Deliver ready items through a configured sender
    Send {
        /// Sender name from the config
        sender: String,

        /// List items ready for this sender and exit
        #[arg(long)]
        list: bool,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// Release a reviewed item to its ready lane
    Approve {
        /// Item file name or path in Pending_Approval
        item: String,

        /// Destination lane, e.g. Ready_To_Send/Email (default: routed by item type)
        #[arg(long, value_name = "LANE")]
        to: Option<Lane>,
    },

    /// Move a reviewed item to Rejected
    Reject {
        /// Item file name or path in Pending_Approval
        item: String,
    },

    /// Add a hand-written item to the queue
    Enqueue {
        /// Item type (email, email_draft, linkedin_post, ...)
        #[arg(short = 't', long = "type")]
        item_type: String,

        /// Title; becomes part of the file name
        #[arg(long)]
        title: String,

        /// Origin tag in the file name
        #[arg(long, default_value = "manual")]
        origin: String,

        /// Entry lane: Inbox, Needs_Action or Pending_Approval[/CHANNEL] (default: Needs_Action)
        #[arg(long, value_name = "LANE")]
        lane: Option<Lane>,

        /// Extra header fields
        #[arg(short, long = "field", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,

        /// Body text
        #[arg(short, long)]
        body: Option<String>,

        /// Dedup id; enqueueing the same id twice is a no-op
        #[arg(long)]
        dedup_id: Option<String>,
    },

    /// Show item counts per lane
    Status,

    /// Create the vault folders and a starter schedule
    Init,
}

fn parse_key_value(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", text))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", text));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use vaultflow::domain::Stage;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["vaultflow"]).is_err());
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from(["vaultflow", "status", "-v", "-c", "/etc/vaultflow.yml", "--vault", "/srv/v"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/etc/vaultflow.yml")));
        assert_eq!(cli.vault.as_ref(), Some(&PathBuf::from("/srv/v")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_scheduler_defaults() {
        let cli = Cli::try_parse_from(["vaultflow", "scheduler"]).unwrap();
        match cli.command {
            Commands::Scheduler {
                list,
                action,
                validate,
                schedule,
                poll,
            } => {
                assert!(!list && !validate && !poll.check_once);
                assert!(action.is_none() && schedule.is_none() && poll.interval.is_none());
            }
            _ => panic!("Expected scheduler command"),
        }
    }

    #[test]
    fn test_scheduler_flags() {
        let cli = Cli::try_parse_from([
            "vaultflow",
            "scheduler",
            "--action",
            "daily_report",
            "--check-once",
            "--interval",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Scheduler { action, poll, .. } => {
                assert_eq!(action.as_deref(), Some("daily_report"));
                assert!(poll.check_once);
                assert_eq!(poll.interval, Some(30));
            }
            _ => panic!("Expected scheduler command"),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Cli::try_parse_from(["vaultflow", "watch", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_watch_defaults_to_inbox() {
        let cli = Cli::try_parse_from(["vaultflow", "watch"]).unwrap();
        match cli.command {
            Commands::Watch { source, .. } => assert_eq!(source, "inbox"),
            _ => panic!("Expected watch command"),
        }
    }

    #[test]
    fn test_approve_with_lane() {
        let cli = Cli::try_parse_from(["vaultflow", "approve", "x.md", "--to", "Ready_To_Post/LinkedIn"]).unwrap();
        match cli.command {
            Commands::Approve { item, to } => {
                assert_eq!(item, "x.md");
                assert_eq!(to, Some(Lane::with_channel(Stage::ReadyToPost, "LinkedIn")));
            }
            _ => panic!("Expected approve command"),
        }
        assert!(Cli::try_parse_from(["vaultflow", "approve", "x.md", "--to", "Nowhere"]).is_err());
    }

    #[test]
    fn test_enqueue_fields() {
        let cli = Cli::try_parse_from([
            "vaultflow",
            "enqueue",
            "-t",
            "email_draft",
            "--title",
            "Proposal",
            "-f",
            "to=client@example.com",
            "--field",
            "subject = Proposal",
            "--lane",
            "Pending_Approval/Email",
        ])
        .unwrap();
        match cli.command {
            Commands::Enqueue {
                item_type,
                origin,
                fields,
                lane,
                ..
            } => {
                assert_eq!(item_type, "email_draft");
                assert_eq!(origin, "manual");
                assert_eq!(
                    fields,
                    vec![
                        ("to".to_string(), "client@example.com".to_string()),
                        ("subject".to_string(), "Proposal".to_string()),
                    ]
                );
                assert_eq!(lane, Some(Lane::with_channel(Stage::PendingApproval, "Email")));
            }
            _ => panic!("Expected enqueue command"),
        }
    }

    #[test]
    fn test_parse_key_value_errors() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
