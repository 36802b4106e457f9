//! Splitting documents into named blocks.
//!
//! [`BlockSegmenter`] is the seam: anything that maps text to keyed,
//! 1-indexed inclusive line spans can drive the pipeline.
//! [`MarkdownSegmenter`] is the implementation shipped with the crate.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::Block;

/// ATX heading: up to three spaces of indent, 1-6 hashes, then the title.
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*))?$").expect("Invalid regex"));

/// Key of the text before the first heading.
pub const PREAMBLE_KEY: &str = "#";

/// Splits document text into blocks.
///
/// Keys are unique within one document. Spans are not required to be
/// disjoint.
pub trait BlockSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<Block>;
}

/// Heading-based markdown segmentation.
///
/// Every heading opens a block keyed by its heading path (`#Intro#Setup`)
/// that runs until the line before the next heading of any level. Text before
/// the first heading becomes the `#` block. Repeated paths get a `[n]` suffix.
/// Headings inside fenced code are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownSegmenter;

impl MarkdownSegmenter {
    pub fn new() -> Self {
        Self
    }
}

impl BlockSegmenter for MarkdownSegmenter {
    fn segment(&self, text: &str) -> Vec<Block> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        // (line number, heading path)
        let mut starts: Vec<(u32, String)> = Vec::new();
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut fence: Option<(char, usize)> = None;

        for (index, line) in lines.iter().enumerate() {
            let line_number = index as u32 + 1;

            if let Some(marker) = fence_marker(line) {
                match fence {
                    None => fence = Some(marker),
                    Some((ch, len)) if marker.0 == ch && marker.1 >= len => fence = None,
                    Some(_) => {}
                }
                continue;
            }
            if fence.is_some() {
                continue;
            }

            let Some(caps) = HEADING.captures(line) else {
                continue;
            };
            let level = caps[1].len();
            let title = caps.get(2).map(|m| strip_closing_hashes(m.as_str())).unwrap_or("");

            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            stack.push((level, title.to_string()));

            let path: String = stack.iter().map(|(_, t)| format!("#{t}")).collect();
            starts.push((line_number, path));
        }

        let last_line = lines.len() as u32;
        let mut blocks = Vec::with_capacity(starts.len() + 1);

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut used: HashSet<String> = HashSet::new();
        let first_heading = starts.first().map_or(last_line + 1, |(line, _)| *line);
        if first_heading > 1 {
            blocks.push(Block::new(PREAMBLE_KEY, 1, first_heading - 1));
            seen.insert(PREAMBLE_KEY.to_string(), 1);
            used.insert(PREAMBLE_KEY.to_string());
        }

        for (i, (start, path)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(last_line, |(next, _)| next - 1);

            let mut count = seen.get(path).copied().unwrap_or(0) + 1;
            let mut key = unique_key(path, count);
            // A literal title like "Notes[2]" can already own the suffixed key
            while used.contains(&key) {
                count += 1;
                key = unique_key(path, count);
            }
            seen.insert(path.clone(), count);
            used.insert(key.clone());

            blocks.push(Block::new(key, *start, end));
        }

        blocks
    }
}

fn unique_key(path: &str, occurrence: usize) -> String {
    if occurrence == 1 {
        path.to_string()
    } else {
        format!("{path}[{occurrence}]")
    }
}

/// Returns the fence character and run length if `line` opens or closes a
/// fenced code block.
fn fence_marker(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == ch).count();
    (run >= 3).then_some((ch, run))
}

/// Drops an optional closing sequence (`## Title ##`) and surrounding space.
fn strip_closing_hashes(title: &str) -> &str {
    let trimmed = title.trim();
    let without = trimmed.trim_end_matches('#');
    if without.len() == trimmed.len() {
        return trimmed;
    }
    if without.is_empty() || without.ends_with([' ', '\t']) {
        without.trim_end()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_and_spans(text: &str) -> Vec<(String, u32, u32)> {
        MarkdownSegmenter::new()
            .segment(text)
            .into_iter()
            .map(|b| (b.key, b.span.start, b.span.end))
            .collect()
    }

    #[test]
    fn test_empty_document_has_no_blocks() {
        assert!(MarkdownSegmenter::new().segment("").is_empty());
    }

    #[test]
    fn test_document_without_headings_is_one_block() {
        assert_eq!(
            keys_and_spans("just\nsome\ntext"),
            vec![("#".to_string(), 1, 3)]
        );
    }

    #[test]
    fn test_heading_paths_and_spans() {
        let text = "intro line\n# Intro\nbody\n## Setup\nsteps\nmore\n# Usage\nrun it";
        assert_eq!(
            keys_and_spans(text),
            vec![
                ("#".to_string(), 1, 1),
                ("#Intro".to_string(), 2, 3),
                ("#Intro#Setup".to_string(), 4, 6),
                ("#Usage".to_string(), 7, 8),
            ]
        );
    }

    #[test]
    fn test_heading_on_first_line_has_no_preamble() {
        let blocks = keys_and_spans("# Title\ntext");
        assert_eq!(blocks, vec![("#Title".to_string(), 1, 2)]);
    }

    #[test]
    fn test_duplicate_paths_get_suffix() {
        let text = "# Notes\na\n# Notes\nb\n# Notes\nc";
        let keys: Vec<String> = keys_and_spans(text).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec!["#Notes", "#Notes[2]", "#Notes[3]"]);
    }

    #[test]
    fn test_literal_suffix_in_title_stays_unique() {
        let text = "# Notes\n# Notes\n# Notes[2]";
        let keys: Vec<String> = keys_and_spans(text).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec!["#Notes", "#Notes[2]", "#Notes[2][2]"]);
    }

    #[test]
    fn test_headings_inside_fences_are_ignored() {
        let text = "# Code\n```sh\n# not a heading\n```\nafter\n~~~~\n## nope\n~~~~\n# Next";
        let keys: Vec<String> = keys_and_spans(text).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec!["#Code", "#Next"]);
    }

    #[test]
    fn test_empty_heading_does_not_clash_with_preamble() {
        let keys: Vec<String> = keys_and_spans("text\n#\nbody")
            .into_iter()
            .map(|(k, _, _)| k)
            .collect();
        assert_eq!(keys, vec!["#", "#[2]"]);
    }

    #[test]
    fn test_sibling_after_deeper_heading_pops_the_path() {
        let text = "# A\n## B\n### C\n## D";
        let keys: Vec<String> = keys_and_spans(text).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec!["#A", "#A#B", "#A#B#C", "#A#D"]);
    }

    #[test]
    fn test_closing_hashes_and_non_headings() {
        let text = "## Title ##\n#hashtag\n####### seven\n# C#";
        let keys: Vec<String> = keys_and_spans(text).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec!["#Title", "#C#"]);
    }
}
