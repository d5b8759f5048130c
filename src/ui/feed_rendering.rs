//! Project feed and inbox rendering for the terminal.

use crate::{
    domain::{conversation::Conversation, project::Project},
    usecases::paged_cache::PageSnapshot,
};

const PROGRESS_BAR_WIDTH: usize = 20;

/// Card lines for one project.
pub fn project_lines(project: &Project) -> Vec<String> {
    let like_marker = if project.is_liked { "[liked]" } else { "[like]" };
    let location = [
        project.region.as_deref(),
        project.district.as_deref(),
        project.commune.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" / ");

    let mut lines = vec![format!(
        "{} ({}) {}",
        project.title,
        project.status.display_label(),
        project.id
    )];

    let mut details = Vec::new();
    if let Some(culture) = project.culture.as_deref() {
        details.push(culture.to_owned());
    }
    if !location.is_empty() {
        details.push(location);
    }
    if !details.is_empty() {
        lines.push(format!("  {}", details.join(", ")));
    }

    lines.push(format!(
        "  {} {}% of {}",
        progress_bar(project.funding_progress_percent()),
        project.funding_progress_percent(),
        project.target_amount
    ));
    lines.push(format!("  {} {} likes", like_marker, project.likes_count));
    lines
}

/// Whole feed: cards, then status and paging hints.
pub fn feed_lines(snapshot: &PageSnapshot<Project>) -> Vec<String> {
    let mut lines = Vec::new();
    if snapshot.loading {
        lines.push("Loading projects...".to_owned());
    }
    if let Some(error) = snapshot.error.as_deref() {
        lines.push(format!("Error: {error}"));
    }
    if !snapshot.loading && snapshot.items.is_empty() && snapshot.error.is_none() {
        lines.push("No projects match these filters.".to_owned());
    }

    for project in &snapshot.items {
        lines.extend(project_lines(project));
    }

    if snapshot.loading_more {
        lines.push("Loading more...".to_owned());
    } else if snapshot.has_more {
        lines.push("More projects available.".to_owned());
    }
    lines
}

/// One inbox row: the other participant and the last activity.
pub fn conversation_line(conversation: &Conversation, viewer_id: &str) -> String {
    let counterpart = conversation.counterpart(viewer_id).unwrap_or("?");
    let activity = conversation
        .last_activity_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "no messages yet".to_owned());

    format!("{}  with {counterpart}  ({activity})", conversation.id)
}

fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent) * PROGRESS_BAR_WIDTH / 100;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}
