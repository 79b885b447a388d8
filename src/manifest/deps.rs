//! Dependency documents and transitive resolution
//!
//! A dependency document lists dependers (boards or libraries); each depender
//! version names the dependees it needs at specific versions. Lookups go
//! through an index built on first use. Code that mutates `dependers` must
//! call [`DependencyDocument::invalidate_index`] afterwards.

use crate::error::CatalogResult;
use crate::manifest::schema::{parse_xml, VersionList};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// `<dependencies>` document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencyDocument {
    #[serde(rename = "@version", default)]
    pub version: String,

    #[serde(rename = "depender", default)]
    pub dependers: Vec<Depender>,

    #[serde(skip)]
    index: OnceLock<GraphIndex>,
}

/// One component and its per-version requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Depender {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub versions: VersionList<DependerVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DependerVersion {
    #[serde(default)]
    pub commit: String,

    #[serde(default)]
    pub dependees: DependeeList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DependeeList {
    #[serde(rename = "dependee", default)]
    pub items: Vec<Dependee>,
}

/// A required component at a required version
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Dependee {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub commit: String,
}

impl Depender {
    pub fn versions(&self) -> &[DependerVersion] {
        &self.versions.items
    }

    pub fn version(&self, commit: &str) -> Option<&DependerVersion> {
        self.versions.items.iter().rev().find(|v| v.commit == commit)
    }
}

impl DependerVersion {
    pub fn dependees(&self) -> &[Dependee] {
        &self.dependees.items
    }
}

/// Lookup tables derived from `dependers`
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    /// depender id -> position in `dependers` (last wins)
    by_id: HashMap<String, usize>,
    /// depender id -> commit -> position in that depender's versions
    versions: HashMap<String, HashMap<String, usize>>,
    /// dependee id -> depender ids that use it, first-seen order
    libraries: HashMap<String, Vec<String>>,
}

impl GraphIndex {
    fn build(dependers: &[Depender]) -> Self {
        let mut index = Self::default();
        for (pos, depender) in dependers.iter().enumerate() {
            index.by_id.insert(depender.id.clone(), pos);

            let commits = index.versions.entry(depender.id.clone()).or_default();
            commits.clear();
            for (vpos, version) in depender.versions().iter().enumerate() {
                commits.insert(version.commit.clone(), vpos);
            }
        }

        for depender in dependers {
            for dependee in depender.versions().iter().flat_map(|v| v.dependees()) {
                let users = index.libraries.entry(dependee.id.clone()).or_default();
                if !users.contains(&depender.id) {
                    users.push(depender.id.clone());
                }
            }
        }
        index
    }
}

impl DependencyDocument {
    pub fn parse(bytes: &[u8]) -> CatalogResult<Self> {
        parse_xml("dependency", bytes)
    }

    pub fn new(version: impl Into<String>, dependers: Vec<Depender>) -> Self {
        Self {
            version: version.into(),
            dependers,
            index: OnceLock::new(),
        }
    }

    /// Lookup tables, built on first call
    pub fn index(&self) -> &GraphIndex {
        self.index.get_or_init(|| GraphIndex::build(&self.dependers))
    }

    /// Discard the lookup tables after `dependers` changed
    pub fn invalidate_index(&mut self) {
        self.index.take();
    }

    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    /// Append a depender and drop stale lookup tables
    pub fn push(&mut self, depender: Depender) {
        self.dependers.push(depender);
        self.invalidate_index();
    }

    pub fn depender(&self, id: &str) -> Option<&Depender> {
        self.index()
            .by_id
            .get(id)
            .and_then(|&pos| self.dependers.get(pos))
    }

    pub fn versions(&self, id: &str) -> Option<&[DependerVersion]> {
        self.depender(id).map(Depender::versions)
    }

    /// Dependees of `id` at `version`, if that pair is in the graph
    pub fn dependees(&self, id: &str, version: &str) -> Option<&[Dependee]> {
        let depender = self.depender(id)?;
        let pos = *self.index().versions.get(id)?.get(version)?;
        depender.versions().get(pos).map(DependerVersion::dependees)
    }

    /// Depender ids in document order
    pub fn depender_ids(&self) -> Vec<&str> {
        self.dependers.iter().map(|d| d.id.as_str()).collect()
    }

    /// Dependers that require `library` at any version
    pub fn dependers_using(&self, library: &str) -> &[String] {
        self.index()
            .libraries
            .get(library)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every component needed by `id` at `version`, including itself.
    ///
    /// Depth-first pre-order; each id appears once even with cycles or
    /// diamonds. A dependee whose version is not in the graph is listed
    /// but not expanded.
    pub fn resolve_transitive(&self, id: &str, version: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.visit(id, version, &mut visited, &mut out);
        out
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        version: &'a str,
        visited: &mut HashSet<&'a str>,
        out: &mut Vec<String>,
    ) {
        if !visited.insert(id) {
            return;
        }
        out.push(id.to_string());

        if let Some(dependees) = self.dependees(id, version) {
            for dependee in dependees {
                self.visit(&dependee.id, &dependee.commit, visited, out);
            }
        }
    }
}

impl PartialEq for DependencyDocument {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.dependers == other.dependers
    }
}
