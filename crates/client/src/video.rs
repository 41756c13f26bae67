use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Seed, VideoReference};

static YOUTUBE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?(?:m\.)?(?:youtube\.com|youtu\.be)/(?:watch\?v=|embed/|v/|shorts/)?([A-Za-z0-9_\-]{6,})",
    )
    .expect("youtube url pattern is valid")
});

/// Shape-check a YouTube link and pull out the video id.
pub fn parse_video_url(raw: &str) -> Option<VideoReference> {
    let raw = raw.trim();
    let captures = YOUTUBE_URL.captures(raw)?;
    let video_id = captures.get(1)?.as_str().to_string();
    Some(VideoReference {
        video_id,
        url: Some(raw.to_string()),
    })
}

pub fn video_seed(raw: &str) -> Option<Seed> {
    parse_video_url(raw).map(Seed::Video)
}
