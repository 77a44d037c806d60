use crate::types::{PkgVersion, SourcePackage};

use std::fmt;

/// One node of the package graph: what providers say about a package, and
/// what we have built of it.
///
/// Source observations are kept in provider configuration order. The first
/// one is the upstream reference, the last one is what we build against.
#[derive(Clone, Debug)]
pub struct Package {
    id: String,
    sources: Vec<SourcePackage>,
    build: Option<SourcePackage>,
}

/// Single word summary of a package, for listings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkgStatus {
    Excluded,
    NotBuilt,
    Removed,
    UpToDate,
    OutOfDate,
    /// Built and sourced, but the versions can't be ordered
    Unknown,
}

impl fmt::Display for PkgStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PkgStatus::Excluded => "excluded",
            PkgStatus::NotBuilt => "not-built",
            PkgStatus::Removed => "removed",
            PkgStatus::UpToDate => "up-to-date",
            PkgStatus::OutOfDate => "out-of-date",
            PkgStatus::Unknown => "error-unknown",
        };
        f.write_str(s)
    }
}

impl Package {
    pub fn new(id: String) -> Self {
        Package {
            id,
            sources: Vec::new(),
            build: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_source(&mut self, spkg: SourcePackage) {
        self.sources.push(spkg);
    }

    /// Only one build is tracked, a later one replaces the former
    pub fn set_build(&mut self, build: SourcePackage) {
        self.build = Some(build);
    }

    /// The effective source observation
    pub fn source(&self) -> Option<&SourcePackage> {
        self.sources.last()
    }

    pub fn current_build(&self) -> Option<&SourcePackage> {
        self.build.as_ref()
    }

    pub fn built(&self) -> bool {
        self.build.is_some()
    }

    pub fn excluded(&self) -> bool {
        self.source().map(|s| s.excluded).unwrap_or(false)
    }

    pub fn removed(&self) -> bool {
        self.sources.is_empty()
    }

    /// Versions of the build and the effective source, when both should be compared
    fn comparable(&self) -> Option<(&PkgVersion, &PkgVersion)> {
        let source = self.source().filter(|s| !s.excluded)?;
        let build = self.build.as_ref()?;
        Some((build.version.as_ref()?, source.version.as_ref()?))
    }

    pub fn out_of_date(&self) -> bool {
        matches!(self.comparable(), Some((built, source)) if built < source)
    }

    pub fn up_to_date(&self) -> bool {
        matches!(self.comparable(), Some((built, source)) if built >= source)
    }

    /// Some provider offers an older version than the one before it
    pub fn source_outdated(&self) -> bool {
        if self.sources.len() < 2 || self.excluded() {
            return false;
        }
        let versions: Vec<&PkgVersion> =
            self.sources.iter().filter_map(|s| s.version.as_ref()).collect();
        versions.windows(2).any(|w| w[1] < w[0])
    }

    pub fn upstream_version(&self) -> Option<&PkgVersion> {
        self.sources.first().and_then(|s| s.version.as_ref())
    }

    pub fn ready_for_build(&self) -> bool {
        !self.excluded() && !self.removed() && (!self.built() || self.out_of_date())
    }

    pub fn status(&self) -> PkgStatus {
        if self.excluded() {
            PkgStatus::Excluded
        } else if self.removed() {
            PkgStatus::Removed
        } else if !self.built() {
            PkgStatus::NotBuilt
        } else if self.out_of_date() {
            PkgStatus::OutOfDate
        } else if self.up_to_date() {
            PkgStatus::UpToDate
        } else {
            PkgStatus::Unknown
        }
    }
}
