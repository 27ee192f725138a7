//! Recognition of web.archive.org snapshot URLs stored in the link table.

/// Prefix every archive snapshot URL starts with: the snapshot timestamp and
/// the original URL follow it.
pub const ARCHIVE_PREFIX: &str = "http://web.archive.org/web/";

/// Derived from a stored link URL that points at an archive snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMatch {
    /// The original URL recovered from the snapshot path, scheme-normalized.
    pub recovered_url: String,
}

/// Match a stored link URL against the archive-snapshot form
/// `http://web.archive.org/web/<YEAR><DIGITS>/<RECOVERED>`.
///
/// `year` restricts the snapshot timestamp to ones beginning with that
/// literal string; an empty `year` matches any timestamp. The match is
/// unanchored, so a snapshot URL embedded mid-string still counts. At least
/// one timestamp digit must follow the year, and the recovered remainder
/// must be non-empty.
pub fn match_archive_url(target_url: &str, year: &str) -> Option<ArchiveMatch> {
    // Try every prefix occurrence, leftmost first: a URL can embed the
    // prefix more than once and only a later one carry a valid timestamp.
    let mut search_from = 0;
    while let Some(found) = target_url[search_from..].find(ARCHIVE_PREFIX) {
        let start = search_from + found;
        if let Some(matched) = match_after_prefix(&target_url[start + ARCHIVE_PREFIX.len()..], year)
        {
            return Some(matched);
        }
        search_from = start + 1;
    }
    None
}

fn match_after_prefix(rest: &str, year: &str) -> Option<ArchiveMatch> {
    let rest = rest.strip_prefix(year)?;

    let digit_count = rest.chars().take_while(char::is_ascii_digit).count();
    if digit_count == 0 {
        return None;
    }
    let recovered = rest[digit_count..].strip_prefix('/')?;
    if recovered.is_empty() {
        return None;
    }

    Some(ArchiveMatch {
        recovered_url: normalize_scheme(recovered),
    })
}

/// Prepend `http://` when the recovered URL carries no scheme. Snapshot
/// paths from the oldest archive entries stored the target without one.
pub fn normalize_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}
