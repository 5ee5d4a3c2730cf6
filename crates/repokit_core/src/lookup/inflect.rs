//! Naming conventions shared by class lookup and table naming.
//!
//! Only the handful of English rules the conventions need; irregular nouns
//! should be registered explicitly instead.

use once_cell::sync::Lazy;
use regex::Regex;

static ACRONYM_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid regex"));
static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z\d])([A-Z])").expect("valid regex"));

/// `post_comment` -> `PostComment`.
pub fn camelize(word: &str) -> String {
    word.split(['_', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `PostComment` -> `post_comment`.
pub fn underscore(word: &str) -> String {
    let word = ACRONYM_BOUNDARY.replace_all(word, "${1}_${2}");
    let word = WORD_BOUNDARY.replace_all(&word, "${1}_${2}");
    word.replace('-', "_").to_ascii_lowercase()
}

/// Last underscore-separated word of a class name: `UserRecord` -> `record`.
pub fn last_word(class_name: &str) -> String {
    underscore(class_name)
        .rsplit('_')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ses", "xes", "zes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") {
        return word.to_string();
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}

/// `posts` -> `Post`, `post_comments` -> `PostComment`.
pub fn classify(name: &str) -> String {
    camelize(&singularize(name))
}

/// Table name for a record class name: `FooRecord` -> `foos`.
///
/// The `Record` suffix never reaches the table name.
pub fn table_name(record_class_name: &str) -> String {
    let base = record_class_name
        .strip_suffix("Record")
        .filter(|base| !base.is_empty())
        .unwrap_or(record_class_name);
    let underscored = underscore(base);
    match underscored.rsplit_once('_') {
        Some((head, last)) => format!("{head}_{}", pluralize(last)),
        None => pluralize(&underscored),
    }
}
