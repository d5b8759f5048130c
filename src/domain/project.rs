use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;

/// Lifecycle stage of a funding campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Pending,
    Funding,
    InProduction,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Funding => "funding",
            Self::InProduction => "in_production",
            Self::Completed => "completed",
        }
    }

    pub fn display_label(self) -> &'static str {
        match self {
            Self::Pending => "Pending review",
            Self::Funding => "Funding",
            Self::InProduction => "In production",
            Self::Completed => "Completed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProjectStatus(pub String);

impl fmt::Display for UnknownProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown project status `{}` (expected pending, funding, in_production or completed)",
            self.0
        )
    }
}

impl std::error::Error for UnknownProjectStatus {}

impl FromStr for ProjectStatus {
    type Err = UnknownProjectStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "funding" => Ok(Self::Funding),
            "in_production" => Ok(Self::InProduction),
            "completed" => Ok(Self::Completed),
            _ => Err(UnknownProjectStatus(value.to_owned())),
        }
    }
}

/// A land/crop funding campaign published by a farmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub farmer_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub commune: Option<String>,
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default)]
    pub target_amount: u64,
    #[serde(default)]
    pub funded_amount: u64,
    #[serde(default)]
    pub likes_count: u32,
    /// Per-viewer flag derived from the likes table; never stored on the row.
    #[serde(default, skip_serializing)]
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for Project {
    const TABLE: &'static str = "projects";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Project {
    /// Flips the viewer's like and adjusts the counter to match.
    pub fn toggle_like(&mut self) {
        if self.is_liked {
            self.is_liked = false;
            self.likes_count = self.likes_count.saturating_sub(1);
        } else {
            self.is_liked = true;
            self.likes_count = self.likes_count.saturating_add(1);
        }
    }

    /// Share of the target already funded, capped at 100.
    pub fn funding_progress_percent(&self) -> u8 {
        if self.target_amount == 0 {
            return 0;
        }

        let percent = self.funded_amount.saturating_mul(100) / self.target_amount;
        percent.min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::project;

    #[test]
    fn toggle_like_increments_then_restores_count() {
        let mut item = project("p1", 0);
        item.likes_count = 4;

        item.toggle_like();
        assert!(item.is_liked);
        assert_eq!(item.likes_count, 5);

        item.toggle_like();
        assert!(!item.is_liked);
        assert_eq!(item.likes_count, 4);
    }

    #[test]
    fn unlike_never_underflows_counter() {
        let mut item = project("p1", 0);
        item.is_liked = true;
        item.likes_count = 0;

        item.toggle_like();

        assert_eq!(item.likes_count, 0);
    }

    #[test]
    fn funding_progress_is_capped_and_safe_on_zero_target() {
        let mut item = project("p1", 0);
        item.target_amount = 0;
        assert_eq!(item.funding_progress_percent(), 0);

        item.target_amount = 2_000;
        item.funded_amount = 500;
        assert_eq!(item.funding_progress_percent(), 25);

        item.funded_amount = 5_000;
        assert_eq!(item.funding_progress_percent(), 100);
    }

    #[test]
    fn status_parses_cli_spellings() {
        assert_eq!("in-production".parse(), Ok(ProjectStatus::InProduction));
        assert_eq!(" Funding ".parse(), Ok(ProjectStatus::Funding));
        assert!("harvested".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn is_liked_is_not_serialized() {
        let mut item = project("p1", 0);
        item.is_liked = true;

        let value = serde_json::to_value(&item).expect("project should serialize");

        assert!(value.get("is_liked").is_none());
        assert_eq!(value["status"], "funding");
    }
}
