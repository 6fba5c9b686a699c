use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref VIDEO_URL_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?:v=|youtu\.be/|embed/|shorts/)([\w-]{11})").unwrap(),
        Regex::new(r"youtube\.com/watch\?.*?v=([\w-]{11})").unwrap(),
    ];
    static ref BARE_VIDEO_ID: Regex = Regex::new(r"^[\w-]{11}$").unwrap();
    static ref VIDEO_KEY: Regex = Regex::new(r"^[\w-]+$").unwrap();
}

/// Resolve a YouTube watch/short/embed URL or a bare 11-character id.
pub fn extract_youtube_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    for pattern in VIDEO_URL_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(input) {
            return captures.get(1).map(|m| m.as_str().to_string());
        }
    }

    if BARE_VIDEO_ID.is_match(input) {
        return Some(input.to_string());
    }
    None
}

/// True for ids safe to use as a storage key and as an image filename prefix.
pub fn is_video_key(video_id: &str) -> bool {
    VIDEO_KEY.is_match(video_id)
}

/// "MM:SS" -> seconds. Surrounding brackets are tolerated since models tend to
/// echo the "[MM:SS]" notation from the prompt.
pub fn mmss_to_seconds(clock: &str) -> Option<u32> {
    let clock = strip_brackets(clock);
    let (minutes, seconds) = clock.split_once(':')?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    let seconds: u32 = seconds.trim().parse().ok()?;
    minutes.checked_mul(60)?.checked_add(seconds)
}

pub fn strip_brackets(clock: &str) -> &str {
    clock.trim().trim_start_matches('[').trim_end_matches(']').trim()
}

pub fn seconds_to_mmss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Pull a JSON array out of free-form model output.
///
/// The first `[` from which a complete array parses wins; when no such
/// substring exists the whole response is parsed as JSON instead.
pub fn extract_json_array(raw: &str) -> Result<Value, serde_json::Error> {
    for (idx, _) in raw.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&raw[idx..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Array(_))) = stream.next() {
            return Ok(value);
        }
    }
    serde_json::from_str(raw.trim())
}
