//! Script detection for bilingual quiz pages.

/// Share of Devanagari letters at or above which text counts as Hindi.
const DEVANAGARI_THRESHOLD: f64 = 0.3;

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

/// `true` unless at least 30% of the letters are Devanagari.
/// Text with no letters counts as English.
pub fn is_english(text: &str) -> bool {
    let (devanagari, latin) = text.chars().fold((0usize, 0usize), |(d, l), c| {
        if is_devanagari(c) {
            (d + 1, l)
        } else if c.is_ascii_alphabetic() {
            (d, l + 1)
        } else {
            (d, l)
        }
    });

    let total = devanagari + latin;
    if total == 0 {
        return true;
    }
    (devanagari as f64 / total as f64) < DEVANAGARI_THRESHOLD
}
