use chrono::{DateTime, Local, Utc};

/// Human-friendly age of `timestamp` relative to `now`.
pub fn relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(timestamp);
    let mins = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    let plural = |n: i64| if n > 1 { "s" } else { "" };

    if mins < 1 {
        "Just now".to_string()
    } else if mins < 60 {
        format!("{mins} minute{} ago", plural(mins))
    } else if hours < 24 {
        format!("{hours} hour{} ago", plural(hours))
    } else if days < 7 {
        format!("{days} day{} ago", plural(days))
    } else {
        timestamp.with_timezone(&Local).format("%Y-%m-%d").to_string()
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

pub fn mask(secret: &str) -> String {
    "•".repeat(secret.chars().count())
}
