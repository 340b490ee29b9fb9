//! Splits a raw artist credit into main and featured performers.
//!
//! The credit goes through four passes:
//!
//! 1. Edge-case rewriting: "duet with" becomes "&", and a parenthesized
//!    clause opening with a featuring/with/& marker is unwrapped in place.
//! 2. The first "feat."/"featuring"/"with" marker splits the credit into a
//!    main segment and a featuring segment.
//! 3. "& The", "& His", "& Her" and "& Original" are rewritten to "and" so
//!    group names such as "Diana Ross & The Supremes" stay in one piece.
//! 4. Each segment is split on "&", "/", "+", "," and a standalone "x".
//!
//! The function is total: a credit matching none of the patterns comes back
//! as a single main artist.

use crate::chart::NormalizedArtistGroup;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // "(A Duet With X)" -> "(& X)"
    static ref PAREN_DUET_WITH: Regex =
        Regex::new(r"\(\s*(?i:a\s+)?(?i:duet\s+with)\s+").expect("valid duet regex");

    // Only a lowercase article is absorbed so "Artist A duet with B" keeps its "A".
    static ref DUET_WITH: Regex =
        Regex::new(r"(?:\s+a)?\s+(?i:duet\s+with)\s+").expect("valid duet regex");

    static ref SECONDARY_PARENTHETICAL: Regex = Regex::new(
        r"\(\s*((?i:featuring|feat\.?|ft\.|with)\s+[^()]*|&[^()]*)\)"
    )
    .expect("valid parenthetical regex");

    static ref SECONDARY_MARKER: Regex =
        Regex::new(r"(?i)\s+(?:featuring|feat\.?|ft\.|with)\s+").expect("valid marker regex");

    static ref GROUP_AMPERSAND: Regex =
        Regex::new(r"&(\s+)((?i:the|his|her|original)\b)").expect("valid group regex");

    static ref SEPARATOR: Regex =
        Regex::new(r"\s*[&/+,]\s*|\s+[xX]\s+").expect("valid separator regex");

    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
}

/// Normalize one raw credit string.
pub fn normalize_artist_credit(credit: &str) -> NormalizedArtistGroup {
    let rewritten = rewrite_edge_cases(credit);
    if rewritten.is_empty() {
        return NormalizedArtistGroup::default();
    }

    let (main_segment, featuring_segment) = split_secondary(&rewritten);

    let main = split_same_class(main_segment);
    if main.is_empty() {
        return NormalizedArtistGroup {
            main: vec![rewritten],
            featuring: vec![],
        };
    }

    // Any further markers in the featuring part list more guests.
    let featuring = featuring_segment
        .map(|segment| {
            SECONDARY_MARKER
                .split(segment)
                .flat_map(split_same_class)
                .collect()
        })
        .unwrap_or_default();

    NormalizedArtistGroup { main, featuring }
}

fn rewrite_edge_cases(credit: &str) -> String {
    let collapsed = collapse_whitespace(credit);
    let duets = PAREN_DUET_WITH.replace_all(&collapsed, "(& ");
    let duets = DUET_WITH.replace_all(&duets, " & ");
    let unwrapped = SECONDARY_PARENTHETICAL.replace_all(&duets, " ${1} ");
    collapse_whitespace(&unwrapped)
}

fn split_secondary(credit: &str) -> (&str, Option<&str>) {
    match SECONDARY_MARKER.find(credit) {
        Some(marker) => (&credit[..marker.start()], Some(&credit[marker.end()..])),
        None => (credit, None),
    }
}

fn split_same_class(segment: &str) -> Vec<String> {
    let protected = GROUP_AMPERSAND.replace_all(segment, "and${1}${2}");
    SEPARATOR
        .split(&protected)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}
