//! Classification of user-entered follow links.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::RoomId;

// #room:server.tld or !room:server.tld at the end of the input
const MATRIX_FQID: &str = r"[!#]\w+:[\w.-]+\.\w+$";

// matrix.to permalink or bare room id / alias, optionally with query parameters
const MATRIX_CATCHALL: &str =
    r"^(https?://matrix\.to/#/)?[!#]([a-zA-Z0-9=_\-/]+):([a-zA-Z0-9._-]+)?(\?.*)?$";

const URL_SCHEME: &str = r"^https?://[^\s/$.?#].[^\s]*$";

fn matrix_fqid() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MATRIX_FQID).expect("valid regex"))
}

fn matrix_catchall() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MATRIX_CATCHALL).expect("valid regex"))
}

fn url_scheme() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_SCHEME).expect("valid regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Not something we can follow.
    None,
    /// A Matrix room id, alias, or matrix.to permalink.
    Matrix,
    /// Any other http(s) URL, assumed to be an iCalendar feed.
    Ical,
}

pub fn classify_url(input: &str) -> LinkKind {
    let input = input.trim();
    if matrix_catchall().is_match(input) {
        LinkKind::Matrix
    } else if url_scheme().is_match(input) {
        LinkKind::Ical
    } else {
        LinkKind::None
    }
}

/// Extract the trailing `!room:server.tld` / `#alias:server.tld` of a link.
pub fn matrix_room_id(input: &str) -> Option<RoomId> {
    matrix_fqid()
        .find(input.trim())
        .map(|m| RoomId::new(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permalinks_and_bare_ids_are_matrix() {
        for input in [
            "https://matrix.to/#/#gigs:example.org",
            "https://matrix.to/#/!abc123:matrix.org",
            "http://matrix.to/#/!abc123:matrix.org?via=matrix.org",
            "#gigs:example.org",
            "!abc123:matrix.org",
        ] {
            assert_eq!(classify_url(input), LinkKind::Matrix, "{input}");
        }
    }

    #[test]
    fn other_urls_are_ical() {
        assert_eq!(
            classify_url("https://calendar.example.org/feeds/gigs.ics"),
            LinkKind::Ical
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(classify_url(""), LinkKind::None);
        assert_eq!(classify_url("gigs"), LinkKind::None);
        assert_eq!(classify_url("ftp://example.org/x"), LinkKind::None);
    }

    #[test]
    fn room_id_is_extracted_from_permalink() {
        assert_eq!(
            matrix_room_id("https://matrix.to/#/!abc123:matrix.org"),
            Some(RoomId::new("!abc123:matrix.org"))
        );
        assert_eq!(
            matrix_room_id("#gigs:example.org"),
            Some(RoomId::new("#gigs:example.org"))
        );
        assert_eq!(matrix_room_id("https://example.org/feed.ics"), None);
    }
}
