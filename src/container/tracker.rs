//! Per-request container match state.
//!
//! A [`ContainerSignatureMatchCollection`] is created fresh for every
//! container being identified. It holds one [`ContainerSignatureMatch`] per
//! candidate signature, each tracking the declared files not yet satisfied.
//! Entries are fed in as they are streamed:
//!
//! 1. [`is_required`](ContainerSignatureMatchCollection::is_required) filters
//!    entries no signature cares about.
//! 2. [`needs_binary_match`](ContainerSignatureMatchCollection::needs_binary_match)
//!    tells the caller whether the entry content must be loaded.
//! 3. [`match_file_entry`](ContainerSignatureMatchCollection::match_file_entry)
//!    and [`match_binary_content`](ContainerSignatureMatchCollection::match_binary_content)
//!    remove satisfied files.
//!
//! Removal is monotonic: a satisfied file is never required again within
//! the request, so feeding the same entry twice changes nothing.

use super::model::{ContainerFile, ContainerSignature};
use super::path::PathMatcher;
use crate::Result;
use crate::config::ScanLimit;
use crate::source::ByteSource;

#[derive(Debug, Clone, Copy)]
struct MatchContext<'a> {
    matcher: &'a PathMatcher,
    container_name: Option<&'a str>,
    limit: ScanLimit,
}

impl MatchContext<'_> {
    fn matches(&self, file: &ContainerFile, path: &str) -> bool {
        self.matcher.file_matches(file.path(), path, self.container_name)
    }
}

/// Match state of one container signature within one request.
#[derive(Debug)]
pub struct ContainerSignatureMatch<'a> {
    signature: &'a ContainerSignature,
    unmatched: Vec<&'a ContainerFile>,
    context: MatchContext<'a>,
}

impl<'a> ContainerSignatureMatch<'a> {
    /// Starts tracking `signature` with every declared file unmatched.
    pub fn new(
        signature: &'a ContainerSignature,
        matcher: &'a PathMatcher,
        container_name: Option<&'a str>,
        limit: ScanLimit,
    ) -> Self {
        Self {
            signature,
            unmatched: signature.files().iter().collect(),
            context: MatchContext {
                matcher,
                container_name,
                limit,
            },
        }
    }

    /// The tracked signature.
    pub fn signature(&self) -> &'a ContainerSignature {
        self.signature
    }

    /// Declared paths still unsatisfied.
    pub fn unmatched_paths(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.unmatched.iter().map(|f| f.path())
    }

    /// Number of declared files still unsatisfied.
    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }

    /// Returns true once every declared file is satisfied.
    ///
    /// A signature declaring no files never matches.
    pub fn is_match(&self) -> bool {
        !self.signature.files().is_empty() && self.unmatched.is_empty()
    }

    /// Returns true if an unsatisfied file matching `path` needs its content
    /// checked against nested binary signatures.
    pub fn needs_binary_match(&self, path: &str) -> bool {
        self.unmatched
            .iter()
            .any(|f| f.compiled_signatures().is_some() && self.context.matches(f, path))
    }

    /// Satisfies files matching `path` that have no usable nested signature.
    pub fn match_file_entry(&mut self, path: &str) {
        let context = self.context;
        self.unmatched
            .retain(|f| !(f.compiled_signatures().is_none() && context.matches(f, path)));
    }

    /// Satisfies files matching `path` whose nested signatures match
    /// `content`. Files without usable nested signatures are satisfied by
    /// presence.
    pub fn match_binary_content<S: ByteSource + ?Sized>(&mut self, path: &str, content: &S) -> Result<()> {
        self.match_content(path, content, true)
    }

    /// Like [`match_binary_content`](Self::match_binary_content) when
    /// `prefix` holds only the leading bytes of the entry.
    pub fn match_content_prefix<S: ByteSource + ?Sized>(&mut self, path: &str, prefix: &S) -> Result<()> {
        self.match_content(path, prefix, false)
    }

    /// Bytes from the start of entry `path` its nested signatures can reach,
    /// or `None` when they may need the whole entry.
    pub fn content_reach(&self, path: &str) -> Option<u64> {
        self.unmatched
            .iter()
            .filter(|f| self.context.matches(f, path))
            .filter_map(|f| f.compiled_signatures())
            .try_fold(0u64, |acc, signatures| Some(acc.max(signatures.max_reach()?)))
    }

    fn match_content<S: ByteSource + ?Sized>(&mut self, path: &str, content: &S, complete: bool) -> Result<()> {
        let limit = self.context.limit;
        let mut index = 0;
        while index < self.unmatched.len() {
            let file = self.unmatched[index];
            let satisfied = self.context.matches(file, path)
                && match file.compiled_signatures() {
                    Some(signatures) if complete => signatures.any_matches(content, limit)?,
                    Some(signatures) => signatures.any_matches_prefix(content, limit)?,
                    None => true,
                };
            if satisfied {
                self.unmatched.remove(index);
            } else {
                index += 1;
            }
        }
        Ok(())
    }
}

/// Match state of every candidate signature of one container type within
/// one request.
#[derive(Debug)]
pub struct ContainerSignatureMatchCollection<'a> {
    matches: Vec<ContainerSignatureMatch<'a>>,
    required_paths: &'a [String],
    matcher: &'a PathMatcher,
    container_name: Option<&'a str>,
}

impl<'a> ContainerSignatureMatchCollection<'a> {
    /// Starts tracking `signatures`.
    ///
    /// `required_paths` is the de-duplicated list of declared paths across
    /// the signatures, as returned by [`unique_required_paths`].
    pub fn new<I>(
        signatures: I,
        required_paths: &'a [String],
        limit: ScanLimit,
        matcher: &'a PathMatcher,
        container_name: Option<&'a str>,
    ) -> Self
    where
        I: IntoIterator<Item = &'a ContainerSignature>,
    {
        let matches = signatures
            .into_iter()
            .map(|s| ContainerSignatureMatch::new(s, matcher, container_name, limit))
            .collect();
        Self {
            matches,
            required_paths,
            matcher,
            container_name,
        }
    }

    /// Returns true if any declared path matches the entry `path`.
    pub fn is_required(&self, path: &str) -> bool {
        self.required_paths
            .iter()
            .any(|p| self.matcher.file_matches(p, path, self.container_name))
    }

    /// Returns true if some signature needs the content of entry `path`.
    pub fn needs_binary_match(&self, path: &str) -> bool {
        self.matches.iter().any(|m| m.needs_binary_match(path))
    }

    /// Records the presence of entry `path` in every signature.
    pub fn match_file_entry(&mut self, path: &str) {
        for m in &mut self.matches {
            m.match_file_entry(path);
        }
    }

    /// Checks the content of entry `path` in every signature that needs it.
    pub fn match_binary_content<S: ByteSource + ?Sized>(&mut self, path: &str, content: &S) -> Result<()> {
        for m in &mut self.matches {
            if m.needs_binary_match(path) {
                m.match_binary_content(path, content)?;
            }
        }
        Ok(())
    }

    /// Like [`match_binary_content`](Self::match_binary_content) when
    /// `prefix` holds only the leading bytes of the entry.
    pub fn match_content_prefix<S: ByteSource + ?Sized>(&mut self, path: &str, prefix: &S) -> Result<()> {
        for m in &mut self.matches {
            if m.needs_binary_match(path) {
                m.match_content_prefix(path, prefix)?;
            }
        }
        Ok(())
    }

    /// Bytes from the start of entry `path` that any signature needing its
    /// content can reach, or `None` when the whole entry may be needed.
    pub fn content_reach(&self, path: &str) -> Option<u64> {
        self.matches
            .iter()
            .filter(|m| m.needs_binary_match(path))
            .try_fold(0u64, |acc, m| Some(acc.max(m.content_reach(path)?)))
    }

    /// Returns true when every signature that can match has matched.
    pub fn all_matched(&self) -> bool {
        self.matches
            .iter()
            .filter(|m| !m.signature.files().is_empty())
            .all(ContainerSignatureMatch::is_match)
    }

    /// Signatures whose declared files are all satisfied.
    pub fn matched_signatures(&self) -> impl Iterator<Item = &'a ContainerSignature> + '_ {
        self.matches
            .iter()
            .filter(|m| m.is_match())
            .map(|m| m.signature)
    }

    /// Per-signature state.
    pub fn matches(&self) -> &[ContainerSignatureMatch<'a>] {
        &self.matches
    }

    /// Unsatisfied files across all signatures.
    pub fn unmatched_count(&self) -> usize {
        self.matches.iter().map(ContainerSignatureMatch::unmatched_count).sum()
    }
}

/// De-duplicated declared paths of `signatures`, in first-seen order.
///
/// Paths are compared with [`PathMatcher::path_key`], so the list is
/// consistent with how entries are matched.
pub fn unique_required_paths<'s, I>(signatures: I, matcher: &PathMatcher) -> Vec<String>
where
    I: IntoIterator<Item = &'s ContainerSignature>,
{
    let mut seen = std::collections::HashSet::new();
    let mut paths = Vec::new();
    for file in signatures.into_iter().flat_map(|s| s.files()) {
        if seen.insert(matcher.path_key(file.path()).into_owned()) {
            paths.push(file.path().to_string());
        }
    }
    paths
}
