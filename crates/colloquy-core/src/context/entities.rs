//! Regex-based entity extraction.
//!
//! Every field of [`ExtractedEntities`] is filled from a fixed pattern list.
//! Matches are returned verbatim and deduplicated, grouped by pattern.

use std::sync::LazyLock;

use colloquy_types::context::ExtractedEntities;
use regex::Regex;

#[derive(Debug, Clone, Copy)]
enum Field {
    Dates,
    Times,
    People,
    Projects,
    Tasks,
    Organizations,
}

const PATTERNS: &[(Field, &str)] = &[
    (Field::Dates, r"\b\d{4}-\d{2}-\d{2}\b"),
    (Field::Dates, r"\b\d{1,2}[./]\s?\d{1,2}[./]\s?\d{2,4}\b"),
    (
        Field::Dates,
        r"(?i)\b\d{1,2}(?:st|nd|rd|th)?\s+(?:january|february|march|april|may|june|july|august|september|october|november|december)\b",
    ),
    (
        Field::Dates,
        r"(?i)\b(?:today|tomorrow|yesterday|dnes|zítra|včera|pozítří)\b",
    ),
    (Field::Times, r"(?i)\b(?:[01]?\d|2[0-3]):[0-5]\d(?:\s?[ap]m)?\b"),
    (Field::Times, r"(?i)\b(?:1[0-2]|0?[1-9])\s?[ap]m\b"),
    (
        Field::People,
        r"\b(?:Mr|Mrs|Ms|Dr|pan|paní)\.?\s+[A-ZÁČĎÉĚÍŇÓŘŠŤÚŮÝŽ][a-záčďéěíňóřšťúůýž]+",
    ),
    (Field::People, r"@[A-Za-z][\w.]*"),
    (
        Field::Projects,
        r#"\b(?i:project|projekt)\s+["']?[\p{Lu}\d][\w-]*"#,
    ),
    (Field::Tasks, r"(?i)\b(?:todo|task|úkol)\s*:\s*[^.;!?\n]+"),
    (
        Field::Organizations,
        r"\b\p{Lu}[\w&]*(?:\s+\p{Lu}[\w&]*)*\s+(?:Inc|Ltd|LLC|Corp|GmbH|s\.r\.o|a\.s)\b\.?",
    ),
];

static COMPILED: LazyLock<Vec<(Field, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(field, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*field, re)),
            Err(e) => {
                tracing::error!(pattern, error = %e, "Invalid entity pattern");
                None
            }
        })
        .collect()
});

/// Extract dates, times, people, projects, tasks and organizations.
pub fn extract_entities(message: &str) -> ExtractedEntities {
    let mut entities = ExtractedEntities::default();
    for (field, re) in COMPILED.iter() {
        let target = match field {
            Field::Dates => &mut entities.dates,
            Field::Times => &mut entities.times,
            Field::People => &mut entities.people,
            Field::Projects => &mut entities.projects,
            Field::Tasks => &mut entities.tasks,
            Field::Organizations => &mut entities.organizations,
        };
        for m in re.find_iter(message) {
            let text = m.as_str().trim().to_string();
            if !target.contains(&text) {
                target.push(text);
            }
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(COMPILED.len(), PATTERNS.len());
    }

    #[test]
    fn test_empty_message_yields_empty_record() {
        assert!(extract_entities("").is_empty());
        assert!(extract_entities("nothing interesting here").is_empty());
    }

    #[test]
    fn test_dates_and_times() {
        let e = extract_entities("Let's meet tomorrow at 14:30 or on 2025-03-01 at 9am");
        assert_eq!(e.dates, vec!["2025-03-01", "tomorrow"]);
        assert_eq!(e.times, vec!["14:30", "9am"]);
    }

    #[test]
    fn test_czech_date_format() {
        let e = extract_entities("Schůzka je 15.3.2025, zítra ne.");
        assert_eq!(e.dates, vec!["15.3.2025", "zítra"]);
    }

    #[test]
    fn test_people_projects_tasks_orgs() {
        let e = extract_entities(
            "Ask Dr. Novak about project Apollo. TODO: send the report to Acme Corp",
        );
        assert_eq!(e.people, vec!["Dr. Novak"]);
        assert_eq!(e.projects, vec!["project Apollo"]);
        assert_eq!(e.tasks, vec!["TODO: send the report to Acme Corp"]);
        assert_eq!(e.organizations, vec!["Acme Corp"]);
    }

    #[test]
    fn test_mentions_are_people() {
        let e = extract_entities("cc @jana.k please");
        assert_eq!(e.people, vec!["@jana.k"]);
    }
}
