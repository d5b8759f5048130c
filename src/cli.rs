use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{filters::FeedFilters, project::ProjectStatus};

#[derive(Debug, Parser)]
#[command(
    name = "agrosync",
    about = "Project feed and farmer/investor messaging over a sync backend"
)]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON seed file for the in-memory backend (overrides backend.seed_file)
    #[arg(long, global = true)]
    pub seed: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Browse the project feed
    Feed(FeedArgs),
    /// Open a conversation and optionally send messages
    Chat(ChatArgs),
    /// List a user's conversations
    Inbox(InboxArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct FeedArgs {
    /// Viewing user; needed for likes and --followed
    #[arg(long)]
    pub viewer: Option<String>,

    /// pending, funding, in_production or completed
    #[arg(long)]
    pub status: Option<ProjectStatus>,

    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub district: Option<String>,

    #[arg(long)]
    pub commune: Option<String>,

    #[arg(long)]
    pub culture: Option<String>,

    /// Only projects by farmers the viewer follows
    #[arg(long)]
    pub followed: bool,

    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    /// Toggle the viewer's like on a project (repeatable)
    #[arg(long = "like", value_name = "PROJECT_ID")]
    pub likes: Vec<String>,

    /// Keep the feed open and read commands from stdin
    #[arg(short, long)]
    pub interactive: bool,
}

impl FeedArgs {
    pub fn filters(&self) -> FeedFilters {
        FeedFilters {
            status: self.status,
            region: self.region.clone(),
            district: self.district.clone(),
            commune: self.commune.clone(),
            culture: self.culture.clone(),
            followed_users_only: self.followed,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    /// Current user
    #[arg(long)]
    pub user: String,

    /// Other participant; the conversation is created if missing
    #[arg(long, required_unless_present = "conversation")]
    pub with: Option<String>,

    /// Open an existing conversation by id
    #[arg(long, conflicts_with = "with")]
    pub conversation: Option<String>,

    /// Message to send (repeatable)
    #[arg(long = "send", value_name = "TEXT")]
    pub messages: Vec<String>,

    /// Keep the conversation open and send each stdin line
    #[arg(short, long)]
    pub interactive: bool,
}

#[derive(Debug, Clone, Args)]
pub struct InboxArgs {
    #[arg(long)]
    pub user: String,

    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pub pages: usize,
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Feed(FeedArgs {
                pages: 1,
                ..FeedArgs::default()
            }))
    }
}
