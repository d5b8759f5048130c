use serde::{Deserialize, Serialize};

use super::record::Record;

/// A viewer's like on a project. One row per (project, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub project_id: String,
    pub user_id: String,
}

impl Like {
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            project_id: project_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl Record for Like {
    const TABLE: &'static str = "likes";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub follower_id: String,
    pub followed_id: String,
}

impl Record for Follow {
    const TABLE: &'static str = "follows";

    fn id(&self) -> &str {
        &self.id
    }
}
