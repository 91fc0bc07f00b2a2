//! Download sources and per-platform selection.

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

// ============================================================================
// Source
// ============================================================================

/// One downloadable artifact, optionally tied to an OS and/or architecture.
///
/// Empty `os`/`arch` mean "any". A source with neither set is the fallback
/// used when nothing more specific matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    os: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exec_path: Option<String>,
}

impl Source {
    /// Creates a source pointing at `url` that matches any platform.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Ties the source to an OS (`linux`, `macos`/`darwin`, `windows`/`win32`, ...).
    pub fn os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Ties the source to an architecture (`x86_64`/`x64`, `aarch64`/`arm64`, ...).
    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Overrides the executable's path relative to the destination directory.
    pub fn exec_path(mut self, path: impl Into<String>) -> Self {
        self.exec_path = Some(path.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn os_constraint(&self) -> Option<&str> {
        (!self.os.is_empty()).then_some(self.os.as_str())
    }

    pub fn arch_constraint(&self) -> Option<&str> {
        (!self.arch.is_empty()).then_some(self.arch.as_str())
    }

    pub fn exec_path_override(&self) -> Option<&str> {
        self.exec_path.as_deref().filter(|p| !p.is_empty())
    }

    /// Returns how specifically this source matches `platform`.
    ///
    /// `Some(3)` for an OS + arch match, `Some(2)` for OS only, `Some(1)` for
    /// arch only, `Some(0)` for the unconstrained fallback, `None` otherwise.
    fn specificity(&self, os_names: &[&str], arch_names: &[&str]) -> Option<u8> {
        let os_match = self.os_constraint().map(|os| os_names.contains(&os));
        let arch_match = self.arch_constraint().map(|arch| arch_names.contains(&arch));

        match (os_match, arch_match) {
            (Some(true), Some(true)) => Some(3),
            (Some(true), None) => Some(2),
            (None, Some(true)) => Some(1),
            (None, None) => Some(0),
            _ => None,
        }
    }
}

// ============================================================================
// Source Set
// ============================================================================

/// Ordered collection of sources. Declaration order breaks ties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceSet(Vec<Source>);

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Source) {
        self.0.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Source> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Picks the most specific source for `platform`.
    ///
    /// See [`select_source`].
    pub fn select(&self, platform: &Platform) -> Option<&Source> {
        select_source(&self.0, platform)
    }
}

impl From<Vec<Source>> for SourceSet {
    fn from(sources: Vec<Source>) -> Self {
        Self(sources)
    }
}

impl FromIterator<Source> for SourceSet {
    fn from_iter<I: IntoIterator<Item = Source>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SourceSet {
    type Item = &'a Source;
    type IntoIter = std::slice::Iter<'a, Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Selects the source that best matches `platform`.
///
/// Tiers, most specific first: OS and arch both match, OS matches with no
/// arch constraint, arch matches with no OS constraint, unconstrained
/// fallback. Within a tier the first declared source wins. Returns `None`
/// when the platform is unsupported.
pub fn select_source<'a>(sources: &'a [Source], platform: &Platform) -> Option<&'a Source> {
    let os_names = platform.os_candidates();
    let arch_names = platform.arch_candidates();

    let mut best: Option<(u8, &Source)> = None;
    for source in sources {
        let Some(rank) = source.specificity(&os_names, &arch_names) else {
            continue;
        };
        if best.map_or(true, |(best_rank, _)| rank > best_rank) {
            best = Some((rank, source));
        }
    }

    best.map(|(_, source)| source)
}
