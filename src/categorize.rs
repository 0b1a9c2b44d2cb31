//! Collapses noisy OCR strings into stable package labels.
//!
//! Two grouping strategies:
//! - common-text: exact identity of the normalized string;
//! - longest-match: dictionary-recognized (or spell-corrected) words seed
//!   the category keys and every string joins the key it shares the longest
//!   contiguous substring with.
//!
//! Boxes ride along with the strings elsewhere in the pipeline; the grouping
//! itself only looks at text.

use std::str::FromStr;

use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;

use crate::detection::detector::{Dictionary, SpellingSource};
use crate::error::ScanError;

/// Minimum length for a word to seed a category in longest-match mode.
/// Shorter fragments are OCR noise more often than labels.
const MIN_KEY_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
pub enum CategorizeMode {
    /// Group by exact normalized-string identity.
    CommonText,
    /// Merge fragments under dictionary-backed keys by longest common
    /// substring.
    LongestMatch,
}

impl FromStr for CategorizeMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, ScanError> {
        match s.to_ascii_lowercase().as_str() {
            "common-text" | "commontext" => Ok(CategorizeMode::CommonText),
            "longest-match" | "longestmatch" => Ok(CategorizeMode::LongestMatch),
            other => Err(ScanError::UnsupportedMode(other.to_string())),
        }
    }
}

/// One category: a canonical key and the indices of the strings assigned to
/// it, in assignment order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub key: String,
    pub members: Vec<usize>,
}

/// Categories in first-seen key order. Key order matters: longest-match
/// ties break toward the earliest registered key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Categories {
    categories: Vec<Category>,
}

impl Categories {
    pub fn as_slice(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.key == key)
    }

    /// Key of the category containing string `index`, if assigned to one.
    pub fn label_of(&self, index: usize) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.members.contains(&index))
            .map(|c| c.key.as_str())
    }

    fn register(&mut self, key: &str) {
        if self.get(key).is_none() {
            self.categories.push(Category {
                key: key.to_string(),
                members: Vec::new(),
            });
        }
    }

    fn assign(&mut self, key: &str, index: usize) {
        match self.categories.iter().position(|c| c.key == key) {
            Some(at) => self.categories[at].members.push(index),
            None => self.categories.push(Category {
                key: key.to_string(),
                members: vec![index],
            }),
        }
    }
}

pub struct TextCategorizer {
    mode: CategorizeMode,
    dictionary: Option<Box<dyn Dictionary>>,
    speller: Option<Box<dyn SpellingSource>>,
    strip: Regex,
}

impl TextCategorizer {
    pub fn new(mode: CategorizeMode) -> Self {
        Self {
            mode,
            dictionary: None,
            speller: None,
            strip: Regex::new(r"\W+").expect("static pattern"),
        }
    }

    /// Attaches the word backends used by longest-match mode.
    pub fn with_backends(
        mut self,
        dictionary: Box<dyn Dictionary>,
        speller: Option<Box<dyn SpellingSource>>,
    ) -> Self {
        self.dictionary = Some(dictionary);
        self.speller = speller;
        self
    }

    pub fn mode(&self) -> CategorizeMode {
        self.mode
    }

    /// Lower-cases and strips whitespace and non-word characters, the same
    /// cleanup the OCR output goes through.
    pub fn normalize(&self, text: &str) -> String {
        self.strip.replace_all(&text.to_lowercase(), "").into_owned()
    }

    /// Groups `texts` into categories. Indices in the result refer to
    /// positions in `texts`. Strings that normalize to nothing are left out.
    pub fn categorize(&self, texts: &[String]) -> Categories {
        match self.mode {
            CategorizeMode::CommonText => self.by_common_text(texts),
            CategorizeMode::LongestMatch => self.by_longest_match(texts),
        }
    }

    fn by_common_text(&self, texts: &[String]) -> Categories {
        let mut categories = Categories::default();
        for (index, text) in texts.iter().enumerate() {
            let normalized = self.normalize(text);
            if normalized.is_empty() {
                continue;
            }
            categories.assign(&normalized, index);
        }
        categories
    }

    fn by_longest_match(&self, texts: &[String]) -> Categories {
        // Without a dictionary there is nothing to seed keys from; fall
        // back to exact grouping rather than fail the frame.
        let Some(dictionary) = self.dictionary.as_deref() else {
            return self.by_common_text(texts);
        };
        let mut categories = Categories::default();

        // First pass: recognized or spell-corrected words become keys.
        for text in texts {
            let normalized = self.normalize(text);
            if normalized.is_empty() {
                continue;
            }
            if dictionary.is_valid_word(&normalized) {
                if normalized.chars().count() >= MIN_KEY_LEN {
                    categories.register(&normalized);
                }
            } else if let Some(speller) = self.speller.as_deref() {
                if let Some(suggestion) = speller.suggest(&normalized).into_iter().next() {
                    if suggestion.chars().count() >= MIN_KEY_LEN {
                        categories.register(&suggestion);
                    }
                }
            }
        }

        // Second pass: every string joins the key it shares the longest
        // contiguous substring with. No overlap at all leaves it unassigned.
        for (index, text) in texts.iter().enumerate() {
            let normalized = self.normalize(text);
            if normalized.is_empty() {
                continue;
            }
            let mut best: Option<(usize, usize)> = None; // (category, length)
            for (ci, category) in categories.as_slice().iter().enumerate() {
                let length = longest_common_substring(&normalized, &category.key);
                if length > 0 && best.map_or(true, |(_, l)| length > l) {
                    best = Some((ci, length));
                }
            }
            if let Some((ci, _)) = best {
                let key = categories.as_slice()[ci].key.clone();
                categories.assign(&key, index);
            }
        }
        categories
    }
}

/// Length of the longest common contiguous substring of `a` and `b`.
pub fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // Rolling single-row DP over suffix-match lengths.
    let mut row = vec![0usize; b.len() + 1];
    let mut best = 0;
    for &ca in &a {
        let mut prev_diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let current = row[j + 1];
            row[j + 1] = if ca == cb { prev_diag + 1 } else { 0 };
            best = best.max(row[j + 1]);
            prev_diag = current;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WordList(Vec<&'static str>);

    impl Dictionary for WordList {
        fn is_valid_word(&self, word: &str) -> bool {
            self.0.contains(&word)
        }
    }

    struct FixedSpeller(Vec<(&'static str, &'static str)>);

    impl SpellingSource for FixedSpeller {
        fn suggest(&self, word: &str) -> Vec<String> {
            self.0
                .iter()
                .filter(|(from, _)| *from == word)
                .map(|(_, to)| to.to_string())
                .collect()
        }
    }

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_longest_common_substring() {
        assert_eq!(longest_common_substring("coffee", "toffee"), 5);
        assert_eq!(longest_common_substring("abc", "abc"), 3);
        assert_eq!(longest_common_substring("abc", "xyz"), 0);
        assert_eq!(longest_common_substring("", "abc"), 0);
    }

    #[test]
    fn test_common_text_groups_case_insensitively() {
        let categorizer = TextCategorizer::new(CategorizeMode::CommonText);
        let categories = categorizer.categorize(&strings(&["abc", "ABC", "xyz"]));
        assert_eq!(categories.get("abc").unwrap().members, vec![0, 1]);
        assert_eq!(categories.get("xyz").unwrap().members, vec![2]);
        assert_eq!(categories.len(), 2);
    }

    #[test]
    fn test_normalization_strips_punctuation_and_whitespace() {
        let categorizer = TextCategorizer::new(CategorizeMode::CommonText);
        assert_eq!(categorizer.normalize(" Wid-Get! "), "widget");
        let categories = categorizer.categorize(&strings(&["wid get", "WIDGET?", "!!"]));
        assert_eq!(categories.get("widget").unwrap().members, vec![0, 1]);
        assert_eq!(categories.len(), 1);
    }

    #[test]
    fn test_longest_match_merges_fragments_under_valid_word() {
        let categorizer = TextCategorizer::new(CategorizeMode::LongestMatch).with_backends(
            Box::new(WordList(vec!["coffee", "chocolate"])),
            None,
        );
        let categories =
            categorizer.categorize(&strings(&["coffee", "cofee", "chocolate", "chocolat"]));
        assert_eq!(categories.get("coffee").unwrap().members, vec![0, 1]);
        assert_eq!(categories.get("chocolate").unwrap().members, vec![2, 3]);
    }

    #[test]
    fn test_longest_match_uses_spelling_suggestion_for_unknown_words() {
        let categorizer = TextCategorizer::new(CategorizeMode::LongestMatch).with_backends(
            Box::new(WordList(vec![])),
            Some(Box::new(FixedSpeller(vec![("rosters", "roasters")]))),
        );
        let categories = categorizer.categorize(&strings(&["rosters"]));
        assert_eq!(categories.get("roasters").unwrap().members, vec![0]);
    }

    #[test]
    fn test_longest_match_tie_breaks_to_first_seen_key() {
        let categorizer = TextCategorizer::new(CategorizeMode::LongestMatch)
            .with_backends(Box::new(WordList(vec!["abcd", "bcde"])), None);
        // "bc" overlaps both keys with length 2; the earlier key wins.
        let categories = categorizer.categorize(&strings(&["abcd", "bcde", "bc"]));
        assert_eq!(categories.get("abcd").unwrap().members, vec![0, 2]);
        assert_eq!(categories.get("bcde").unwrap().members, vec![1]);
    }

    #[test]
    fn test_longest_match_leaves_disjoint_strings_unassigned() {
        let categorizer = TextCategorizer::new(CategorizeMode::LongestMatch)
            .with_backends(Box::new(WordList(vec!["coffee"])), None);
        let categories = categorizer.categorize(&strings(&["coffee", "zzz"]));
        assert_eq!(categories.get("coffee").unwrap().members, vec![0]);
        assert_eq!(categories.label_of(1), None);
    }

    #[test]
    fn test_longest_match_without_backend_degrades_to_common_text() {
        let categorizer = TextCategorizer::new(CategorizeMode::LongestMatch);
        let categories = categorizer.categorize(&strings(&["abc", "ABC", "xyz"]));
        assert_eq!(categories.get("abc").unwrap().members, vec![0, 1]);
        assert_eq!(categories.get("xyz").unwrap().members, vec![2]);
    }

    #[test]
    fn test_short_words_do_not_seed_keys() {
        let categorizer = TextCategorizer::new(CategorizeMode::LongestMatch)
            .with_backends(Box::new(WordList(vec!["ab", "abc"])), None);
        let categories = categorizer.categorize(&strings(&["ab", "abc"]));
        assert!(categories.get("ab").is_none());
        assert!(categories.get("abc").is_some());
    }
}
