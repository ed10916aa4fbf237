//! Wildcard Matcher
//!
//! Expands shell-style patterns (`*`, `?`, `[...]`) segment by segment over
//! the remote tree. At every level a child whose name equals the pattern
//! segment literally takes precedence over wildcard expansion, because entry
//! names may themselves contain glob metacharacters.

use glob::{MatchOptions, Pattern};

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::path;
use crate::session::Session;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// One compiled pattern segment
#[derive(Debug, Clone)]
pub struct SegmentPattern {
    raw: String,
    pattern: Pattern,
}

impl SegmentPattern {
    /// Compile a segment.
    ///
    /// Runs of `*` collapse to one. A segment whose brackets do not form a
    /// valid class is retried with every bracket taken literally; if that
    /// still fails the segment is rejected as an invalid query path.
    pub fn compile(segment: &str) -> Result<Self> {
        let collapsed = collapse_stars(segment);
        let pattern = Pattern::new(&collapsed)
            .or_else(|_| Pattern::new(&escape_brackets(&collapsed)))
            .map_err(|e| {
                Error::InvalidArgument(format!("query path invalid: '{segment}': {e}"))
            })?;
        Ok(Self {
            raw: segment.to_string(),
            pattern,
        })
    }

    /// The segment as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Exact, literal name equality
    pub fn is_literal_match(&self, name: &str) -> bool {
        self.raw == name
    }

    /// Shell glob match
    pub fn is_glob_match(&self, name: &str) -> bool {
        self.pattern.matches_with(name, MATCH_OPTIONS)
    }
}

fn collapse_stars(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut prev_star = false;
    for c in segment.chars() {
        if c == '*' && prev_star {
            continue;
        }
        prev_star = c == '*';
        out.push(c);
    }
    out
}

fn escape_brackets(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 8);
    for c in segment.chars() {
        match c {
            '[' => out.push_str("[[]"),
            ']' => out.push_str("[]]"),
            other => out.push(other),
        }
    }
    out
}

/// Compile every segment of an absolute pattern
pub fn compile_pattern(pattern: &str) -> Result<Vec<SegmentPattern>> {
    let (_, segments) = path::absolute_segments(pattern)?;
    segments.iter().map(|s| SegmentPattern::compile(s)).collect()
}

impl Session {
    /// Expand an absolute glob pattern into every matching entry.
    ///
    /// The empty pattern and `/` yield the root. A file reached before the
    /// pattern is exhausted prunes that branch silently; an empty folder
    /// contributes nothing. Results come back in depth-first order, which is
    /// not part of the contract.
    pub async fn glob(&self, pattern: &str) -> Result<Vec<Entry>> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Ok(vec![self.root()]);
        }
        let segments = compile_pattern(pattern)?;
        if segments.is_empty() {
            return Ok(vec![self.root()]);
        }

        let mut results = Vec::new();
        // Depth-first over (entry, index of the next segment to match)
        let mut stack = vec![(self.root(), 0usize)];

        while let Some((current, index)) = stack.pop() {
            if index == segments.len() {
                results.push(current);
                continue;
            }
            if !current.is_folder {
                continue;
            }

            let segment = &segments[index];
            let children = self.list_all(&current.id).await?;
            if children.is_empty() {
                continue;
            }

            let parent_path = current.path.clone();
            let with_path = |mut child: Entry| {
                child.path = path::join(&parent_path, &child.name);
                child.parent_id = current.id.clone();
                child
            };

            if let Some(literal) = children
                .iter()
                .find(|c| segment.is_literal_match(&c.name))
            {
                tracing::debug!("glob: literal match '{}' under {parent_path}", segment.as_str());
                stack.push((with_path(literal.clone()), index + 1));
                continue;
            }

            let matched: Vec<Entry> = children
                .into_iter()
                .filter(|c| segment.is_glob_match(&c.name))
                .map(with_path)
                .collect();
            tracing::debug!(
                "glob: '{}' matched {} entries under {parent_path}",
                segment.as_str(),
                matched.len()
            );
            // Reverse so the first match is expanded first
            stack.extend(matched.into_iter().rev().map(|e| (e, index + 1)));
        }

        Ok(results)
    }

    /// Expand several patterns, failing when any of them matches nothing
    pub async fn glob_all(&self, patterns: &[&str]) -> Result<Vec<Entry>> {
        let mut all = Vec::new();
        for pattern in patterns {
            let found = self.glob(pattern).await?;
            if found.is_empty() {
                return Err(Error::NotFound(format!("no entry matches '{pattern}'")));
            }
            all.extend(found);
        }
        Ok(all)
    }
}
