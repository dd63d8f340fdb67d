use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Sunday;

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?)/|.*[?&]v=)|youtu\.be/)([^"&?/\s]{11})"#,
    )
    .expect("video id pattern is valid")
});

pub fn format_sunday(sunday: Sunday) -> &'static str {
    match sunday {
        Sunday::First => "First Sunday",
        Sunday::Second => "Second Sunday",
        Sunday::Third => "Third Sunday",
        Sunday::Fourth => "Fourth Sunday",
        Sunday::Fifth => "Fifth Sunday",
    }
}

pub fn sunday_order(sunday: Sunday) -> u8 {
    match sunday {
        Sunday::First => 1,
        Sunday::Second => 2,
        Sunday::Third => 3,
        Sunday::Fourth => 4,
        Sunday::Fifth => 5,
    }
}

/// Pulls the 11-character video token out of a YouTube watch, embed, short
/// or channel-path URL.
pub fn extract_video_id(url: &str) -> Option<&str> {
    VIDEO_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/mqdefault.jpg", video_id)
}
