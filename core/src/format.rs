use regex::Regex;
use std::sync::LazyLock;

use crate::types::MessageFormat;

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:https?://[^\s<>]+|www\.[^\s<>]+|[a-z0-9][a-z0-9.\-]*\.(?:com|net|org|edu|gov|io|tv|be|co|uk|de|fr|me|app|dev)\b(?:/[^\s<>]*)?)",
    )
    .unwrap_or_else(|e| panic!("url pattern does not compile: {e}"))
});

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "tiff", "gif", "bmp", "exif", "svg", "bpg", "ppm", "pgm", "pbm",
];

const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vevo.com",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "metacafe.com",
];

/// Classifies a message body by the first URL it contains.
pub fn classify(body: &str) -> MessageFormat {
    let Some(url) = first_url(body) else {
        return MessageFormat::Text;
    };

    let (host, path) = split_url(url);
    if has_image_extension(&path) {
        MessageFormat::Image
    } else if is_video_host(&host) {
        MessageFormat::Video
    } else {
        MessageFormat::Link
    }
}

pub fn first_url(body: &str) -> Option<&str> {
    URL.find(body).map(|m| m.as_str().trim_end_matches(['.', ',', ')', '!', '?', ';', ':']))
}

fn split_url(url: &str) -> (String, String) {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (host, path) = match without_scheme.find('/') {
        Some(idx) => without_scheme.split_at(idx),
        None => (without_scheme, ""),
    };
    let host = host.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let path = path.split(['?', '#']).next().unwrap_or_default();
    (host.to_ascii_lowercase(), path.to_ascii_lowercase())
}

fn is_video_host(host: &str) -> bool {
    let host = host.strip_prefix("www.").unwrap_or(host);
    VIDEO_HOSTS
        .iter()
        .any(|video| host == *video || host.ends_with(&format!(".{video}")))
}

fn has_image_extension(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext))
}
