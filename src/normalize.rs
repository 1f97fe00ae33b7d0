//! Raw record normalization.
//!
//! Canonicalizes scraped artist/title text into comparison keys used for
//! exact matching and candidate scoring. Pure functions, no side effects:
//! malformed input yields an empty-key record, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Featured artists in brackets: "(feat. Artist)", "[ft. Someone]".
static FEAT_BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring)\s+([^)\]]+)[\)\]]").unwrap());

/// Featured artists without brackets: "Song feat. Artist".
static FEAT_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+(.+)$").unwrap());

/// Remix/version suffix in brackets: "(Artist Remix)", "[Radio Edit]",
/// "(Extended Mix)", "(Dub)".
static REMIX_BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[\(\[]([^)\]]*(?:remix|rework|re-?edit|edit|dub|mix|version))[\)\]]\s*$")
        .unwrap()
});

/// Remix/version suffix after a dash: "Song - Artist Remix".
static REMIX_DASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[-–—]\s*([^-–—]*(?:remix|rework|re-?edit|dub|mix))\s*$").unwrap()
});

/// Collapse runs of whitespace into a single space.
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Scrape-side fallback strings that carry no identity. The scraper emits
/// "Unknown Artist"/"Unknown Title" when a segment is missing its spans.
const PLACEHOLDER_KEYS: &[&str] = &["unknown artist", "unknown title", "unknown"];

/// A scraped playlist line reduced to comparison keys, with the original
/// strings preserved for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub raw_artist: String,
    pub raw_title: String,
    /// Lowercased, punctuation-stripped, diacritic-folded artist key.
    /// Empty when the input was empty or a scraper placeholder.
    pub artist_key: String,
    /// Same folding applied to the title, with featuring/remix annotations
    /// removed.
    pub title_key: String,
    /// Featuring credit extracted from the title or artist, folded.
    pub featured: Option<String>,
    /// Remix/version annotation extracted from the title, folded.
    pub remix: Option<String>,
}

impl NormalizedRecord {
    /// Explicit empty-input marker: a record that cannot be matched because
    /// either side of the key is missing.
    pub fn is_empty(&self) -> bool {
        self.artist_key.is_empty() || self.title_key.is_empty()
    }
}

/// Check if a character is a Unicode combining mark (diacritical mark).
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold text into key form: NFKD-decompose and drop combining marks
/// ("Beyoncé" → "beyonce"), lowercase, keep alphanumerics and spaces,
/// collapse whitespace, strip a leading "the ".
pub fn fold_key(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered: String = stripped
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut key = MULTI_SPACE.replace_all(lowered.trim(), " ").to_string();
    if key.starts_with("the ") && key.len() > 4 {
        key = key[4..].to_string();
    }
    key
}

/// Remove featuring annotations from `text`, folding each captured credit
/// into `featured`. Bracketed form first so a bare trailing "feat." never
/// re-captures it.
fn extract_featuring(text: &str, featured: &mut Vec<String>) -> String {
    let mut out = text.to_string();
    if let Some(caps) = FEAT_BRACKETED.captures(&out) {
        featured.push(fold_key(&caps[1]));
        out = FEAT_BRACKETED.replace_all(&out, "").to_string();
    }
    if let Some(caps) = FEAT_BARE.captures(&out) {
        featured.push(fold_key(&caps[1]));
        out = FEAT_BARE.replace(&out, "").to_string();
    }
    out
}

/// Normalize one scraped playlist line. Infallible: empty or placeholder
/// input yields empty keys (`is_empty() == true`) rather than an error.
/// Idempotent: folding a produced key is a fixed point.
pub fn normalize_record(raw_artist: &str, raw_title: &str) -> NormalizedRecord {
    let mut featured: Vec<String> = Vec::new();

    // Artist: pull featuring credits out, then fold.
    let artist = extract_featuring(raw_artist, &mut featured);

    // Title: featuring first, then remix/version suffixes.
    let mut title = extract_featuring(raw_title, &mut featured);

    let mut remix: Option<String> = None;
    if let Some(caps) = REMIX_BRACKETED.captures(&title) {
        remix = Some(fold_key(&caps[1]));
        title = REMIX_BRACKETED.replace(&title, "").to_string();
    } else if let Some(caps) = REMIX_DASH.captures(&title) {
        remix = Some(fold_key(&caps[1]));
        title = REMIX_DASH.replace(&title, "").to_string();
    }

    let mut artist_key = fold_key(&artist);
    let mut title_key = fold_key(&title);

    // Scraper placeholders carry no identity.
    if PLACEHOLDER_KEYS.contains(&artist_key.as_str()) {
        artist_key = String::new();
    }
    if PLACEHOLDER_KEYS.contains(&title_key.as_str()) {
        title_key = String::new();
    }

    featured.retain(|f| !f.is_empty());
    featured.dedup();

    NormalizedRecord {
        raw_artist: raw_artist.to_string(),
        raw_title: raw_title.to_string(),
        artist_key,
        title_key,
        featured: if featured.is_empty() {
            None
        } else {
            Some(featured.join(", "))
        },
        remix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_punctuation_and_diacritics() {
        assert_eq!(fold_key("Röyksopp"), "royksopp");
        assert_eq!(fold_key("Don't Stop!"), "don t stop");
        assert_eq!(fold_key("  Two   Spaces "), "two spaces");
        assert_eq!(fold_key("The Beatles"), "beatles");
    }

    #[test]
    fn fold_key_is_a_fixed_point() {
        for input in ["Four Tet", "Baby (feat. X)", "Motörhead", "The XX", "03 - Song"] {
            let once = fold_key(input);
            assert_eq!(fold_key(&once), once, "not a fixed point for {input:?}");
        }
    }

    #[test]
    fn extracts_bracketed_featuring() {
        let rec = normalize_record("four tet", "baby (feat. x)");
        assert_eq!(rec.artist_key, "four tet");
        assert_eq!(rec.title_key, "baby");
        assert_eq!(rec.featured.as_deref(), Some("x"));
    }

    #[test]
    fn extracts_bare_featuring_from_artist() {
        let rec = normalize_record("Drake feat. Rihanna", "Take Care");
        assert_eq!(rec.artist_key, "drake");
        assert_eq!(rec.featured.as_deref(), Some("rihanna"));
    }

    #[test]
    fn extracts_remix_suffix() {
        let rec = normalize_record("Caribou", "Odessa (Four Tet Remix)");
        assert_eq!(rec.title_key, "odessa");
        assert_eq!(rec.remix.as_deref(), Some("four tet remix"));

        let rec = normalize_record("Caribou", "Odessa - Daphni Mix");
        assert_eq!(rec.title_key, "odessa");
        assert_eq!(rec.remix.as_deref(), Some("daphni mix"));
    }

    #[test]
    fn normalized_keys_renormalize_to_themselves() {
        let rec = normalize_record("The Chemical Brothers", "Galvanize (feat. Q-Tip) (Extended Mix)");
        let again = normalize_record(&rec.artist_key, &rec.title_key);
        assert_eq!(again.artist_key, rec.artist_key);
        assert_eq!(again.title_key, rec.title_key);
    }

    #[test]
    fn empty_input_yields_empty_marker() {
        assert!(normalize_record("", "").is_empty());
        assert!(normalize_record("   ", "\t").is_empty());
        assert!(normalize_record("!!!---", "???").is_empty());
        assert!(!normalize_record("Four Tet", "Baby").is_empty());
    }

    #[test]
    fn scraper_placeholders_are_empty() {
        assert!(normalize_record("Unknown Artist", "Baby").is_empty());
        assert!(normalize_record("Four Tet", "Unknown Title").is_empty());
    }
}
