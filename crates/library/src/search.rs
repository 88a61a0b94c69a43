use std::collections::{BTreeSet, HashSet};

use crate::CollectionIndex;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchOptions {
    pub min_query_chars: usize,
    pub max_query_chars: usize,
    /// How many close matches each fuzzy pass keeps.
    pub fuzzy_limit: usize,
    /// Similarity floor in `[0, 1]`.
    pub fuzzy_cutoff: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_query_chars: 3,
            max_query_chars: 100,
            fuzzy_limit: 3,
            fuzzy_cutoff: 0.6,
        }
    }
}

/// Resolves a free-text query to a sorted, deduplicated list of captions.
///
/// Runs an exact case-insensitive substring pass plus three fuzzy passes
/// (whole caption, title, author) and returns the union. Results are not
/// ranked.
pub fn search(index: &CollectionIndex, query: &str, options: &SearchOptions) -> Vec<String> {
    if query.chars().count() < options.min_query_chars {
        return Vec::new();
    }
    let query: String = query.chars().take(options.max_query_chars).collect();

    let mut found: BTreeSet<String> = BTreeSet::new();
    found.extend(search_exact(index, &query));
    found.extend(search_fuzzy_caption(index, &query, options));
    found.extend(search_fuzzy_title(index, &query, options));
    found.extend(search_fuzzy_author(index, &query, options));
    found.into_iter().collect()
}

pub fn search_exact(index: &CollectionIndex, query: &str) -> Vec<String> {
    let needle = query.to_lowercase();
    let mut out: Vec<String> = index
        .records()
        .filter(|record| record.caption.to_lowercase().contains(&needle))
        .map(|record| record.caption.clone())
        .collect();
    out.sort();
    out
}

fn search_fuzzy_caption(
    index: &CollectionIndex,
    query: &str,
    options: &SearchOptions,
) -> Vec<String> {
    close_matches(
        query,
        index.records().map(|record| record.caption.as_str()),
        options.fuzzy_limit,
        options.fuzzy_cutoff,
    )
    .into_iter()
    .map(|caption| caption.to_string())
    .collect()
}

fn search_fuzzy_title(index: &CollectionIndex, query: &str, options: &SearchOptions) -> Vec<String> {
    let titles: HashSet<&str> = close_matches(
        query,
        index.records().map(|record| record.title.as_str()),
        options.fuzzy_limit,
        options.fuzzy_cutoff,
    )
    .into_iter()
    .collect();
    index
        .records()
        .filter(|record| titles.contains(record.title.as_str()))
        .map(|record| record.caption.clone())
        .collect()
}

fn search_fuzzy_author(index: &CollectionIndex, query: &str, options: &SearchOptions) -> Vec<String> {
    let authors: HashSet<&str> = close_matches(
        query,
        index.records().map(|record| record.author.as_str()),
        options.fuzzy_limit,
        options.fuzzy_cutoff,
    )
    .into_iter()
    .collect();
    index
        .records()
        .filter(|record| authors.contains(record.author.as_str()))
        .map(|record| record.caption.clone())
        .collect()
}

/// Up to `limit` distinct non-empty candidates whose similarity to `query`
/// reaches `cutoff`, most similar first.
pub fn close_matches<'a>(
    query: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    limit: usize,
    cutoff: f64,
) -> Vec<&'a str> {
    if limit == 0 {
        return Vec::new();
    }
    let query = query.to_lowercase();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut scored: Vec<(f64, &str)> = Vec::new();
    for candidate in candidates {
        if candidate.trim().is_empty() || !seen.insert(candidate) {
            continue;
        }
        let score = similarity(&query, &candidate.to_lowercase());
        if score >= cutoff {
            scored.push((score, candidate));
        }
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.truncate(limit);
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Edit-distance ratio over chars, so Cyrillic and Latin captions score alike.
fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{caption_hash, TrackRecord};
    use std::path::PathBuf;

    fn record(author: &str, title: &str) -> TrackRecord {
        let caption = if author.is_empty() {
            title.to_string()
        } else {
            format!("{} - {}", author, title)
        };
        TrackRecord {
            hash: caption_hash(&caption),
            path: PathBuf::from(format!("/music/{}.mp3", caption)),
            filename: format!("{}.mp3", caption),
            caption,
            author: author.to_string(),
            title: title.to_string(),
            album: None,
            length: 60,
        }
    }

    fn sample_index() -> CollectionIndex {
        CollectionIndex::from_records(vec![
            record("Pushkin", "Eugene Onegin"),
            record("Pushkin", "The Captain's Daughter"),
            record("Lermontov", "A Hero of Our Time"),
            record("Gogol", "Dead Souls (Part 1)"),
            record("Gogol", "Dead Souls (Part 2)"),
            record("", "Anonymous Tales"),
        ])
    }

    #[test]
    fn short_queries_return_nothing() {
        let index = sample_index();
        let options = SearchOptions::default();
        assert!(search(&index, "", &options).is_empty());
        assert!(search(&index, "Pu", &options).is_empty());
        assert!(search(&index, "Го", &options).is_empty());
    }

    #[test]
    fn exact_substring_is_case_insensitive() {
        let index = sample_index();
        let results = search(&index, "dead souls", &SearchOptions::default());
        assert!(results.contains(&"Gogol - Dead Souls (Part 1)".to_string()));
        assert!(results.contains(&"Gogol - Dead Souls (Part 2)".to_string()));
    }

    #[test]
    fn exact_matches_are_subset_of_results() {
        let index = sample_index();
        let options = SearchOptions::default();
        for query in ["push", "Hero", "tales", "souls (part", "xyz"] {
            let all = search(&index, query, &options);
            for caption in search_exact(&index, query) {
                assert!(all.contains(&caption), "{caption} missing for {query}");
            }
        }
    }

    #[test]
    fn author_typo_finds_all_author_tracks() {
        let index = sample_index();
        let results = search(&index, "Puskin", &SearchOptions::default());
        assert_eq!(
            results,
            vec![
                "Pushkin - Eugene Onegin".to_string(),
                "Pushkin - The Captain's Daughter".to_string(),
            ]
        );
    }

    #[test]
    fn title_typo_maps_back_to_caption() {
        let index = sample_index();
        let results = search(&index, "Eugene Onegn", &SearchOptions::default());
        assert!(results.contains(&"Pushkin - Eugene Onegin".to_string()));
    }

    #[test]
    fn results_are_sorted_and_unique() {
        let index = sample_index();
        let results = search(&index, "Gogol", &SearchOptions::default());
        let mut sorted = results.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(results, sorted);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn long_queries_are_truncated() {
        let index = sample_index();
        let options = SearchOptions::default();
        let head = "Pushkin ".repeat(13);
        let head: String = head.chars().take(100).collect();
        let long = format!("{}{}", head, "tail that should be ignored entirely");
        assert_eq!(search(&index, &long, &options), search(&index, &head, &options));
    }

    #[test]
    fn close_matches_respects_limit_and_cutoff() {
        let candidates = ["apple", "apples", "applet", "appliance", "banana"];
        let matches = close_matches("apple", candidates, 2, 0.6);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0], "apple");
        assert!(close_matches("apple", candidates, 3, 0.99) == vec!["apple"]);
        assert!(close_matches("zzz", candidates, 3, 0.6).is_empty());
    }

    #[test]
    fn close_matches_skips_empty_and_duplicate_candidates() {
        let matches = close_matches("Gogol", ["", "Gogol", "Gogol", "  "], 3, 0.6);
        assert_eq!(matches, vec!["Gogol"]);
    }
}
