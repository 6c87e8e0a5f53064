//! Keyword-table topic extraction.

use std::collections::HashSet;

/// Topic name to trigger terms. Terms are matched against whole lower-cased
/// words.
const TOPICS: &[(&str, &[&str])] = &[
    (
        "programming",
        &[
            "code", "coding", "rust", "python", "javascript", "typescript", "bug", "function",
            "compile", "kód", "programování", "program",
        ],
    ),
    (
        "work",
        &["work", "job", "meeting", "deadline", "office", "práce", "schůzka", "porada"],
    ),
    (
        "project",
        &["project", "task", "milestone", "sprint", "projekt", "úkol", "úkoly"],
    ),
    (
        "learning",
        &["learn", "study", "course", "tutorial", "exam", "učit", "kurz", "zkouška"],
    ),
    (
        "health",
        &["health", "exercise", "sleep", "diet", "doctor", "zdraví", "cvičení", "lékař"],
    ),
    (
        "travel",
        &["travel", "trip", "flight", "hotel", "vacation", "cesta", "dovolená", "letenka"],
    ),
    (
        "finance",
        &["money", "budget", "invoice", "price", "salary", "peníze", "rozpočet", "faktura"],
    ),
    (
        "technology",
        &["computer", "software", "hardware", "ai", "server", "počítač", "aplikace"],
    ),
];

/// Topics mentioned in `messages`, in the order they are first matched.
pub fn extract_topics<S: AsRef<str>>(messages: &[S]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for message in messages {
        let words: HashSet<String> = message
            .as_ref()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        for (topic, terms) in TOPICS {
            if found.iter().any(|t| t == topic) {
                continue;
            }
            if terms.iter().any(|term| words.contains(*term)) {
                found.push((*topic).to_string());
            }
        }
    }
    found
}
