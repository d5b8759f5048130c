use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    backend::MemoryBackend,
    domain::{
        conversation::Conversation,
        message::Message,
        project::{Project, ProjectStatus},
    },
};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
        .single()
        .expect("fixed fixture time should be valid")
}

/// A funding project created `minute` minutes after the fixture epoch.
pub fn project(id: &str, minute: i64) -> Project {
    Project {
        id: id.to_owned(),
        farmer_id: "farmer-1".to_owned(),
        title: format!("Project {id}"),
        description: String::new(),
        status: ProjectStatus::Funding,
        region: Some("Analamanga".to_owned()),
        district: None,
        commune: None,
        culture: Some("rice".to_owned()),
        target_amount: 1_000,
        funded_amount: 250,
        likes_count: 3,
        is_liked: false,
        created_at: base_time() + Duration::minutes(minute),
    }
}

/// A message in conversation `c1`, sent `minute` minutes after the epoch.
pub fn message(id: &str, sender: &str, body: &str, minute: i64) -> Message {
    let recipient = if sender == "u1" { "u2" } else { "u1" };
    Message {
        id: id.to_owned(),
        conversation_id: "c1".to_owned(),
        sender_id: sender.to_owned(),
        recipient_id: recipient.to_owned(),
        body: body.to_owned(),
        sent_at: base_time() + Duration::minutes(minute),
        read: false,
    }
}

pub fn conversation(id: &str, a: &str, b: &str) -> Conversation {
    Conversation {
        id: id.to_owned(),
        participant_a: a.to_owned(),
        participant_b: b.to_owned(),
        last_activity_at: None,
    }
}

/// Backend shaped like the production schema.
pub fn backend() -> MemoryBackend {
    crate::infra::seed::configure(MemoryBackend::new())
}

/// Projects `p1..=pN`, newest first by `created_at`.
pub fn projects(count: usize) -> Vec<Project> {
    (1..=count)
        .map(|n| project(&format!("p{n}"), (count - n) as i64))
        .collect()
}

/// Lets spawned tasks drain their queues on the current-thread runtime.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
