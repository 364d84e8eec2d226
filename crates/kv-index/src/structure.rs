//! Markdown heading structure extraction.
//!
//! Walks `#`-style headings in normalized text and builds, for any
//! character offset, a slash-joined path of the heading stack in effect at
//! that point — e.g. `/introduction/background`.

const MAX_SLUG_LEN: usize = 50;

struct Heading {
    level: usize,
    slug: String,
    start_offset: usize,
}

/// Precomputed heading stack snapshots, queryable by character offset.
pub struct StructureIndex {
    headings: Vec<Heading>,
}

impl StructureIndex {
    /// Scan `normalized_text` for ATX-style (`#`..`######`) headings.
    pub fn build(normalized_text: &str) -> Self {
        let mut headings = Vec::new();
        let mut offset = 0usize;
        for line in normalized_text.split_inclusive('\n') {
            let trimmed = line.trim_end_matches('\n');
            if let Some((level, text)) = parse_heading(trimmed) {
                headings.push(Heading {
                    level,
                    slug: slugify(text),
                    start_offset: offset,
                });
            }
            offset += line.chars().count();
        }
        Self { headings }
    }

    /// Structure path in effect at `char_offset`: the heading stack as of
    /// the last heading beginning at or before that offset. Empty document
    /// (or an offset before the first heading) yields `/`.
    pub fn path_at(&self, char_offset: usize) -> String {
        let mut stack: Vec<&Heading> = Vec::new();
        for heading in &self.headings {
            if heading.start_offset > char_offset {
                break;
            }
            while let Some(top) = stack.last() {
                if top.level >= heading.level {
                    stack.pop();
                } else {
                    break;
                }
            }
            stack.push(heading);
        }
        if stack.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", stack.iter().map(|h| h.slug.as_str()).collect::<Vec<_>>().join("/"))
        }
    }
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some((hashes, rest.trim_start()))
}

fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut last_was_dash = false;
    for ch in lowered.chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    slug.chars().take(MAX_SLUG_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_root() {
        let idx = StructureIndex::build("");
        assert_eq!(idx.path_at(0), "/");
    }

    #[test]
    fn single_heading_path() {
        let idx = StructureIndex::build("# Introduction\nsome text");
        assert_eq!(idx.path_at(20), "/introduction");
    }

    #[test]
    fn nested_headings_build_a_path() {
        let text = "# Intro\n## Background\nbody text here";
        let idx = StructureIndex::build(text);
        let offset_in_body = text.find("body").unwrap();
        assert_eq!(idx.path_at(offset_in_body), "/intro/background");
    }

    #[test]
    fn sibling_heading_pops_previous_level() {
        let text = "# A\n## B\n# C\ntext";
        let idx = StructureIndex::build(text);
        let offset = text.find("text").unwrap();
        assert_eq!(idx.path_at(offset), "/c");
    }

    #[test]
    fn slug_strips_non_alphanumerics_and_collapses_dashes() {
        assert_eq!(slugify("Hello, World!!"), "hello-world");
    }

    #[test]
    fn slug_truncates_to_fifty_chars() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn offset_before_first_heading_is_root() {
        let idx = StructureIndex::build("preamble text\n# Intro\nbody");
        assert_eq!(idx.path_at(0), "/");
    }
}
