//! Matching declared container paths against entry names.
//!
//! Declared paths are either literal entry names or glob patterns:
//!
//! - `*` and `?` match within one path component
//! - `[...]` is a character class only in a pattern that also uses `*` or
//!   `?`; otherwise brackets are part of the name, as in `[Content_Types].xml`
//! - `**` spans directories, and a trailing `/**` matches everything below
//! - `{a,b}` alternation is expanded before matching
//! - `{containerFileName}` stands for the container's own name without its
//!   last extension
//!
//! Directory entries (names ending in `/`) only ever match literally.

use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use glob::{MatchOptions, Pattern};
use log::warn;
use lru::LruCache;

use crate::config::PathCase;
use crate::source::file_name_of;
use crate::sync::lock_or_recover;

/// Placeholder replaced by the container's file name stem.
pub const CONTAINER_NAME_PLACEHOLDER: &str = "{containerFileName}";

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Matches declared path patterns against container entry names.
///
/// Compiled patterns are cached, so one matcher is meant to be shared by
/// every request of a container identifier.
///
/// # Example
///
/// ```rust
/// use formatsig::container::PathMatcher;
/// use formatsig::PathCase;
///
/// let matcher = PathMatcher::new(PathCase::Sensitive);
/// assert!(matcher.file_matches("word/*.xml", "word/document.xml", None));
/// assert!(!matcher.file_matches("word/*.xml", "word/media/a.xml", None));
/// assert!(matcher.file_matches("{containerFileName}.xml", "report.xml", Some("report.docx")));
/// ```
pub struct PathMatcher {
    case: PathCase,
    cache: Mutex<LruCache<String, Arc<[Pattern]>>>,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("case", &self.case)
            .finish_non_exhaustive()
    }
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(PathCase::default())
    }
}

impl PathMatcher {
    /// Creates a matcher with the default cache capacity.
    pub fn new(case: PathCase) -> Self {
        Self::with_capacity(case, DEFAULT_CACHE_CAPACITY.get())
    }

    /// Creates a matcher caching up to `capacity` compiled patterns.
    pub fn with_capacity(case: PathCase, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            case,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Case handling of this matcher.
    pub fn path_case(&self) -> PathCase {
        self.case
    }

    /// Key under which a declared path is de-duplicated.
    ///
    /// Two declared paths with the same key always match the same entries.
    pub fn path_key<'p>(&self, path: &'p str) -> Cow<'p, str> {
        if self.case.is_sensitive() {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(path.to_lowercase())
        }
    }

    /// Returns true if the entry `actual` satisfies the declared `pattern`.
    ///
    /// `container_name` is the name of the container being identified, used
    /// to resolve the [`CONTAINER_NAME_PLACEHOLDER`]. A pattern using the
    /// placeholder never matches when the name is unknown.
    pub fn file_matches(&self, pattern: &str, actual: &str, container_name: Option<&str>) -> bool {
        if self.same(pattern, actual) {
            return true;
        }
        if actual.ends_with('/') || !is_pattern(pattern) {
            return false;
        }
        let stem = if pattern.contains(CONTAINER_NAME_PLACEHOLDER) {
            let Some(name) = container_name else {
                return false;
            };
            let stem = container_stem(name);
            if self.same(&pattern.replace(CONTAINER_NAME_PLACEHOLDER, stem), actual) {
                return true;
            }
            Some(stem)
        } else {
            None
        };
        let options = MatchOptions {
            case_sensitive: self.case.is_sensitive(),
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.compiled(pattern, stem)
            .iter()
            .any(|p| p.matches_with(actual, options))
    }

    fn same(&self, a: &str, b: &str) -> bool {
        if self.case.is_sensitive() {
            a == b
        } else {
            a.chars()
                .flat_map(char::to_lowercase)
                .eq(b.chars().flat_map(char::to_lowercase))
        }
    }

    fn compiled(&self, pattern: &str, stem: Option<&str>) -> Arc<[Pattern]> {
        let key = match stem {
            Some(stem) => format!("{}\0{}", pattern, stem),
            None => pattern.to_string(),
        };
        let mut cache = lock_or_recover(&self.cache, "PathMatcher cache");
        if let Some(patterns) = cache.get(&key) {
            return Arc::clone(patterns);
        }
        let patterns: Arc<[Pattern]> = compile(pattern, stem).into();
        cache.put(key, Arc::clone(&patterns));
        patterns
    }
}

/// Name of `container_name` without directories or its last extension.
///
/// A leading dot does not start an extension.
pub fn container_stem(container_name: &str) -> &str {
    let name = file_name_of(container_name);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

fn is_pattern(pattern: &str) -> bool {
    pattern.contains(['*', '?', '{'])
}

/// Escapes brackets in a pattern without wildcards.
fn literal_brackets(pattern: String) -> String {
    if pattern.contains(['*', '?']) || !pattern.contains(['[', ']']) {
        return pattern;
    }
    pattern
        .chars()
        .fold(String::with_capacity(pattern.len() + 4), |mut out, c| {
            match c {
                '[' => out.push_str("[[]"),
                ']' => out.push_str("[]]"),
                c => out.push(c),
            }
            out
        })
}

fn compile(pattern: &str, stem: Option<&str>) -> Vec<Pattern> {
    let escaped_stem = stem.map(Pattern::escape);
    let mut compiled = Vec::new();
    for alternative in expand_braces(pattern) {
        let mut alternative = literal_brackets(alternative);
        if let Some(stem) = &escaped_stem {
            alternative = alternative.replace(CONTAINER_NAME_PLACEHOLDER, stem);
        }
        let rewritten = match alternative.strip_suffix("**") {
            Some(prefix) if prefix.is_empty() || prefix.ends_with('/') => format!("{}**/*", prefix),
            _ => alternative,
        };
        match Pattern::new(&rewritten) {
            Ok(p) => compiled.push(p),
            Err(err) => warn!("Ignoring invalid container path pattern {:?}: {}", rewritten, err),
        }
    }
    compiled
}

/// Expands `{a,b}` alternation. Unbalanced braces are kept literally.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close)) = find_group(pattern) else {
        return vec![pattern.to_string()];
    };
    let prefix = &pattern[..open];
    let body = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    let mut out = Vec::new();
    for alternative in split_alternatives(body) {
        out.extend(expand_braces(&format!("{}{}{}", prefix, alternative, suffix)));
    }
    out
}

/// Byte offsets of the first brace group that is not the placeholder.
fn find_group(pattern: &str) -> Option<(usize, usize)> {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(CONTAINER_NAME_PLACEHOLDER.as_bytes()) {
            i += CONTAINER_NAME_PLACEHOLDER.len();
            continue;
        }
        if bytes[i] == b'{' {
            let mut depth = 0usize;
            let mut j = i;
            while j < bytes.len() {
                if bytes[j..].starts_with(CONTAINER_NAME_PLACEHOLDER.as_bytes()) {
                    j += CONTAINER_NAME_PLACEHOLDER.len();
                    continue;
                }
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some((i, j));
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            return None;
        }
        i += 1;
    }
    None
}

fn split_alternatives(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(CONTAINER_NAME_PLACEHOLDER.as_bytes()) {
            i += CONTAINER_NAME_PLACEHOLDER.len();
            continue;
        }
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&body[start..]);
    parts
}
