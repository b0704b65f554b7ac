use chrono::Utc;
use rand::Rng;

/// Maximum length kept from the sanitized original name.
const MAX_NAME_COMPONENT: usize = 120;

/// Replace path-hostile characters in a client-supplied file name.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
/// Leading dots are stripped so a stored name can never be hidden or walk
/// out of the store directory.
pub fn sanitize_file_name(original: &str) -> String {
    let cleaned: String = original
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();

    let mut cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        cleaned = "file".to_string();
    }
    cleaned.truncate(MAX_NAME_COMPONENT);
    cleaned
}

/// Generate a unique on-disk name for an uploaded file.
///
/// Layout: `{epoch millis}-{random hex}-{sanitized original name}`. The
/// original name is kept in the suffix so files on disk stay recognizable.
pub fn generate_stored_name(original: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let entropy: u32 = rand::rng().random();
    format!("{millis}-{entropy:08x}-{}", sanitize_file_name(original))
}
