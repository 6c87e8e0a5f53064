//! Dominant-language detection over recent user input.
//!
//! Czech is scored by diacritics and a fixed keyword table; English by the
//! remaining longer words. Both scores are normalized by total character
//! count and one language must lead by a factor of 1.5 to win.

use colloquy_types::context::Language;

const CZECH_DIACRITICS: &str = "áčďéěíňóřšťúůýž";

const CZECH_KEYWORDS: &[&str] = &[
    "ahoj", "ano", "ne", "jak", "co", "je", "to", "se", "na", "si", "mi", "ten", "jsem", "jsi",
    "jsme", "máte", "mám", "chci", "potřebuji", "prosím", "děkuji", "díky", "dobrý", "den",
    "proč", "kde", "kdy", "který", "která", "které", "můžeš", "můžete", "pomoc", "pomoct",
    "práce", "projekt", "úkol", "zítra", "dnes", "včera", "taky", "také", "nebo", "ale",
];

/// Minimum ratio lead for a language to be declared dominant.
const DOMINANCE: f64 = 1.5;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Detect the dominant language of the given texts.
pub fn detect_language<S: AsRef<str>>(texts: &[S]) -> Language {
    let mut czech_score = 0usize;
    let mut english_score = 0usize;
    let mut total_chars = 0usize;

    for text in texts {
        let text = text.as_ref();
        total_chars += text.chars().count();
        czech_score += 3 * text
            .to_lowercase()
            .chars()
            .filter(|c| CZECH_DIACRITICS.contains(*c))
            .count();
        for word in words(text) {
            if CZECH_KEYWORDS.contains(&word.as_str()) {
                czech_score += 2 * word.chars().count();
            } else if word.chars().count() > 3 {
                english_score += 1;
            }
        }
    }

    if total_chars == 0 {
        return Language::Mixed;
    }
    let czech_ratio = czech_score as f64 / total_chars as f64;
    let english_ratio = english_score as f64 / total_chars as f64;

    if czech_ratio > DOMINANCE * english_ratio {
        Language::Czech
    } else if english_ratio > DOMINANCE * czech_ratio {
        Language::English
    } else {
        Language::Mixed
    }
}
