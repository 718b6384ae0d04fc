//! Profile pictures live under `uploads/profiles/`, but older registration
//! records stored either a bare filename or a `profiles/`-prefixed path.
//! Both historical conventions are tolerated on the read side; nothing here
//! writes files.

const UPLOADS_PREFIX: &str = "uploads/profiles/";
const LEGACY_PREFIX: &str = "profiles/";

pub fn resolve_profile_picture(stored: &str) -> Option<String> {
    let trimmed = stored.trim();
    if trimmed.is_empty() {
        return None;
    }

    let file_name = trimmed
        .strip_prefix(UPLOADS_PREFIX)
        .or_else(|| trimmed.strip_prefix(LEGACY_PREFIX))
        .unwrap_or(trimmed);

    if file_name.is_empty() {
        return None;
    }

    Some(format!("/{}{}", UPLOADS_PREFIX, file_name))
}
