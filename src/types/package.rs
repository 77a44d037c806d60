use super::{DependencySpec, PkgVersion};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A binary package produced by building a [`SourcePackage`]
#[derive(Clone, Debug, Serialize)]
pub struct BinaryPackage {
    pub name: String,
    pub version: PkgVersion,
    pub description: String,
    pub depends: HashSet<DependencySpec>,
    pub optdepends: HashSet<DependencySpec>,
    pub groups: BTreeSet<String>,
    /// Name of the owning source package
    pub base: String,
}

impl BinaryPackage {
    pub fn new(base: &SourcePackage, name: &str) -> Self {
        BinaryPackage {
            name: name.to_owned(),
            // Excluded sources never own binaries
            version: base
                .version
                .clone()
                .unwrap_or_else(|| PkgVersion::new(None, "0")),
            description: String::new(),
            depends: HashSet::new(),
            optdepends: HashSet::new(),
            groups: BTreeSet::new(),
            base: base.name.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SourcePackage {
    pub name: String,
    pub repo: String,
    /// `None` only for excluded entries
    pub version: Option<PkgVersion>,
    pub checkdepends: HashSet<DependencySpec>,
    pub makedepends: HashSet<DependencySpec>,
    pub binaries: BTreeMap<String, BinaryPackage>,
    pub excluded: bool,
}

impl SourcePackage {
    pub fn new(repo: &str, name: &str, version: PkgVersion) -> Self {
        SourcePackage {
            name: name.to_owned(),
            repo: repo.to_owned(),
            version: Some(version),
            checkdepends: HashSet::new(),
            makedepends: HashSet::new(),
            binaries: BTreeMap::new(),
            excluded: false,
        }
    }

    /// A source that a provider explicitly marks as "do not build"
    pub fn excluded(repo: &str, name: &str) -> Self {
        SourcePackage {
            version: None,
            excluded: true,
            ..SourcePackage::new(repo, name, PkgVersion::new(None, "0"))
        }
    }

    /// `<repo>/<name>`, unique within one architecture
    pub fn id(&self) -> String {
        format!("{}/{}", self.repo, self.name)
    }

    pub fn add_binary(&mut self, binary: BinaryPackage) {
        self.binaries.insert(binary.name.clone(), binary);
    }
}
