use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod answer;
pub mod events;
pub mod health;
pub mod leaderboard;
pub mod quiz;
pub mod stats;

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
