//! Line commands for the interactive feed and chat screens.

use thiserror::Error;

use crate::domain::{
    filters::FeedFilters,
    project::{ProjectStatus, UnknownProjectStatus},
};

pub const FEED_HELP: &str =
    "commands: more, refresh, like <id>, status|region|district|commune|culture [value], followed on|off, dismiss, quit";
pub const CHAT_HELP: &str = "type a message to send, or /reload, /dismiss, /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    More,
    Refresh,
    Like(String),
    Filter(FilterChange),
    Dismiss,
    Quit,
}

/// One filter key set to a value, or cleared when the value is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Status(Option<ProjectStatus>),
    Region(Option<String>),
    District(Option<String>),
    Commune(Option<String>),
    Culture(Option<String>),
    Followed(bool),
}

impl FilterChange {
    pub fn apply(self, filters: &mut FeedFilters) {
        match self {
            Self::Status(status) => filters.status = status,
            Self::Region(value) => filters.region = value,
            Self::District(value) => filters.district = value,
            Self::Commune(value) => filters.commune = value,
            Self::Culture(value) => filters.culture = value,
            Self::Followed(on) => filters.followed_users_only = on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    Reload,
    Dismiss,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("expected on or off, got `{0}`")]
    InvalidToggle(String),
    #[error(transparent)]
    InvalidStatus(#[from] UnknownProjectStatus),
}

/// Parses one feed line. Blank lines yield `None`.
pub fn parse_feed_command(line: &str) -> Result<Option<FeedCommand>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest = words.collect::<Vec<_>>().join(" ");
    let argument = (!rest.is_empty()).then_some(rest);

    let command = match verb {
        "more" => FeedCommand::More,
        "refresh" => FeedCommand::Refresh,
        "like" => FeedCommand::Like(argument.ok_or(CommandError::MissingArgument("like"))?),
        "status" => FeedCommand::Filter(FilterChange::Status(
            argument.as_deref().map(str::parse).transpose()?,
        )),
        "region" => FeedCommand::Filter(FilterChange::Region(argument)),
        "district" => FeedCommand::Filter(FilterChange::District(argument)),
        "commune" => FeedCommand::Filter(FilterChange::Commune(argument)),
        "culture" => FeedCommand::Filter(FilterChange::Culture(argument)),
        "followed" => FeedCommand::Filter(FilterChange::Followed(parse_toggle(argument)?)),
        "dismiss" => FeedCommand::Dismiss,
        "quit" | "exit" => FeedCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(Some(command))
}

/// Parses one chat line. Anything not starting with `/` is a message.
pub fn parse_chat_command(line: &str) -> Result<Option<ChatCommand>, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let command = match trimmed {
        "/reload" => ChatCommand::Reload,
        "/dismiss" => ChatCommand::Dismiss,
        "/quit" | "/exit" => ChatCommand::Quit,
        other if other.starts_with('/') => return Err(CommandError::Unknown(other.to_owned())),
        _ => ChatCommand::Send(line.to_owned()),
    };
    Ok(Some(command))
}

fn parse_toggle(argument: Option<String>) -> Result<bool, CommandError> {
    match argument.as_deref() {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        Some(other) => Err(CommandError::InvalidToggle(other.to_owned())),
        None => Err(CommandError::MissingArgument("followed")),
    }
}
