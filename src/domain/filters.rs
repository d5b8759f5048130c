use super::project::ProjectStatus;

/// Project feed filter set. Two sets are the same filter when every key
/// holds the same value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedFilters {
    pub status: Option<ProjectStatus>,
    pub region: Option<String>,
    pub district: Option<String>,
    pub commune: Option<String>,
    pub culture: Option<String>,
    pub followed_users_only: bool,
}

impl FeedFilters {
    /// Column/value pairs for the location and crop keys that are set,
    /// with blank values treated as unset.
    pub fn text_criteria(&self) -> Vec<(&'static str, &str)> {
        [
            ("region", self.region.as_deref()),
            ("district", self.district.as_deref()),
            ("commune", self.commune.as_deref()),
            ("culture", self.culture.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, value)| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| (column, value))
        })
        .collect()
    }
}

#[cfg(test)]
impl FeedFilters {
    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn followed_only(mut self) -> Self {
        self.followed_users_only = true;
        self
    }
}
