//! Catalog document types
//!
//! XML documents are read with `quick-xml`'s serde support: attributes are
//! `@`-prefixed fields, repeated child elements are `Vec`s. Unknown elements
//! and attributes are ignored. The capability dictionary is JSON.
//!
//! Fields marked `#[serde(skip)]` are filled in while the tree is assembled.

use crate::capability::CapabilityRequirement;
use crate::error::{CatalogError, CatalogResult};
use crate::manifest::deps::Depender;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Deserialize an XML document, naming `document` in errors
pub(crate) fn parse_xml<T: DeserializeOwned>(document: &'static str, bytes: &[u8]) -> CatalogResult<T> {
    quick_xml::de::from_reader(bytes).map_err(|e| CatalogError::parse(document, e))
}

/// Treat empty and `N/A` auxiliary URLs as absent
fn aux_url(url: &str) -> Option<&str> {
    let url = url.trim();
    (!url.is_empty() && url != "N/A").then_some(url)
}

/// Wrapper for `<versions><version>...</version></versions>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionList<T> {
    #[serde(rename = "version", default)]
    pub items: Vec<T>,
}

impl<T> Default for VersionList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

// ----------------------------------------------------------------------------
// Root document
// ----------------------------------------------------------------------------

/// `<super-manifest>` root document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootManifest {
    #[serde(rename = "@version", default)]
    pub version: String,

    #[serde(rename = "board-manifest-list", default)]
    pub board_list: BoardManifestList,

    #[serde(rename = "app-manifest-list", default)]
    pub app_list: AppManifestList,

    #[serde(rename = "middleware-manifest-list", default)]
    pub middleware_list: MiddlewareManifestList,
}

impl RootManifest {
    pub fn parse(bytes: &[u8]) -> CatalogResult<Self> {
        parse_xml("root manifest", bytes)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardManifestList {
    #[serde(rename = "board-manifest", default)]
    pub manifests: Vec<BoardManifestRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppManifestList {
    #[serde(rename = "app-manifest", default)]
    pub manifests: Vec<AppManifestRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MiddlewareManifestList {
    #[serde(rename = "middleware-manifest", default)]
    pub manifests: Vec<MiddlewareManifestRef>,
}

/// Reference to a board document and its auxiliary documents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardManifestRef {
    #[serde(rename = "@dependency-url", default)]
    pub dependency_url: String,

    #[serde(rename = "@capability-url", default)]
    pub capability_url: String,

    #[serde(default)]
    pub uri: String,

    /// Parsed board document, once fetched
    #[serde(skip)]
    pub document: Option<BoardDocument>,
}

impl BoardManifestRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn dependency_source(&self) -> Option<&str> {
        aux_url(&self.dependency_url)
    }

    pub fn capability_source(&self) -> Option<&str> {
        aux_url(&self.capability_url)
    }

    pub fn boards(&self) -> &[Board] {
        self.document.as_ref().map_or(&[], |d| d.boards.as_slice())
    }
}

/// Reference to an app document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppManifestRef {
    #[serde(default)]
    pub uri: String,

    #[serde(skip)]
    pub document: Option<AppDocument>,
}

impl AppManifestRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            document: None,
        }
    }

    pub fn apps(&self) -> &[App] {
        self.document.as_ref().map_or(&[], |d| d.apps.as_slice())
    }
}

/// Reference to a middleware document and its dependency document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MiddlewareManifestRef {
    #[serde(rename = "@dependency-url", default)]
    pub dependency_url: String,

    #[serde(default)]
    pub uri: String,

    #[serde(skip)]
    pub document: Option<MiddlewareDocument>,
}

impl MiddlewareManifestRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn dependency_source(&self) -> Option<&str> {
        aux_url(&self.dependency_url)
    }

    pub fn items(&self) -> &[MiddlewareItem] {
        self.document.as_ref().map_or(&[], |d| d.items.as_slice())
    }
}

// ----------------------------------------------------------------------------
// Boards
// ----------------------------------------------------------------------------

/// `<boards>` document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardDocument {
    #[serde(rename = "board", default)]
    pub boards: Vec<Board>,
}

impl BoardDocument {
    pub fn parse(bytes: &[u8]) -> CatalogResult<Self> {
        parse_xml("board", bytes)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Board {
    #[serde(rename = "@default_location", default)]
    pub default_location: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub board_uri: String,

    #[serde(default)]
    pub chips: Chips,

    #[serde(default, alias = "n")]
    pub name: String,

    #[serde(default)]
    pub summary: String,

    /// Space-separated capability tokens this board provides
    #[serde(default)]
    pub prov_capabilities: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub documentation_url: String,

    #[serde(default)]
    pub versions: VersionList<BoardVersion>,

    /// Index of the board reference this board came from
    #[serde(skip)]
    pub origin: Option<usize>,

    #[serde(skip)]
    pub dependencies: Option<Depender>,

    #[serde(skip)]
    pub capabilities: Option<Arc<CapabilitiesDocument>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Chips {
    #[serde(default)]
    pub mcu: Vec<String>,

    #[serde(default)]
    pub radio: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BoardVersion {
    #[serde(rename = "@flow_version", default)]
    pub flow_version: String,

    /// Tokens provided in addition to the board's own
    #[serde(rename = "@prov_capabilities_per_version", default)]
    pub prov_capabilities_per_version: String,

    #[serde(default)]
    pub num: String,

    #[serde(default)]
    pub commit: String,
}

impl Board {
    pub fn versions(&self) -> &[BoardVersion] {
        &self.versions.items
    }

    pub fn provided_capabilities(&self) -> HashSet<&str> {
        self.prov_capabilities.split_whitespace().collect()
    }

    /// Board tokens plus those added by the version with this commit or number
    pub fn capabilities_for_version(&self, version: &str) -> HashSet<&str> {
        let mut caps = self.provided_capabilities();
        if let Some(v) = self
            .versions()
            .iter()
            .find(|v| v.commit == version || v.num == version)
        {
            caps.extend(v.prov_capabilities_per_version.split_whitespace());
        }
        caps
    }
}

// ----------------------------------------------------------------------------
// Apps
// ----------------------------------------------------------------------------

/// `<apps>` document; `version="2.0"` marks the v2 format
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppDocument {
    #[serde(rename = "@version", default)]
    pub version: String,

    #[serde(rename = "app", default)]
    pub apps: Vec<App>,
}

impl AppDocument {
    pub fn parse(bytes: &[u8]) -> CatalogResult<Self> {
        parse_xml("app", bytes)
    }

    pub fn is_v2(&self) -> bool {
        self.version == "2.0"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct App {
    /// Comma-separated
    #[serde(rename = "@keywords", default)]
    pub keywords: String,

    #[serde(rename = "@req_capabilities", default)]
    pub req_capabilities_attr: String,

    #[serde(rename = "@req_capabilities_v2", default)]
    pub req_capabilities_v2: String,

    #[serde(default, alias = "n")]
    pub name: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub req_capabilities: String,

    #[serde(default)]
    pub versions: VersionList<AppVersion>,

    #[serde(skip)]
    pub origin: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppVersion {
    #[serde(rename = "@flow_version", default)]
    pub flow_version: String,

    #[serde(rename = "@tools_min_version", default)]
    pub tools_min_version: String,

    #[serde(rename = "@tools_max_version", default)]
    pub tools_max_version: String,

    #[serde(rename = "@req_capabilities_per_version", default)]
    pub req_capabilities_per_version: String,

    #[serde(rename = "@req_capabilities_per_version_v2", default)]
    pub req_capabilities_per_version_v2: String,

    #[serde(default)]
    pub num: String,

    #[serde(default)]
    pub commit: String,
}

/// Tools version bound attached to an app version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolsVersion<'a> {
    AtLeast(&'a str),
    AtMost(&'a str),
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

impl App {
    pub fn versions(&self) -> &[AppVersion] {
        &self.versions.items
    }

    /// Bracketed requirement if present, otherwise the legacy one
    pub fn requirement(&self) -> CapabilityRequirement {
        CapabilityRequirement::parse(first_non_empty(&[
            self.req_capabilities_v2.as_str(),
            self.req_capabilities_attr.as_str(),
            self.req_capabilities.as_str(),
        ]))
    }

    pub fn keywords(&self) -> Vec<&str> {
        self.keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }
}

impl AppVersion {
    pub fn requirement(&self) -> CapabilityRequirement {
        CapabilityRequirement::parse(first_non_empty(&[
            self.req_capabilities_per_version_v2.as_str(),
            self.req_capabilities_per_version.as_str(),
        ]))
    }

    /// Minimum tools version if set, otherwise the maximum
    pub fn tools_version(&self) -> Option<ToolsVersion<'_>> {
        if !self.tools_min_version.is_empty() {
            Some(ToolsVersion::AtLeast(&self.tools_min_version))
        } else if !self.tools_max_version.is_empty() {
            Some(ToolsVersion::AtMost(&self.tools_max_version))
        } else {
            None
        }
    }
}

// ----------------------------------------------------------------------------
// Middleware
// ----------------------------------------------------------------------------

/// `<middleware>` document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MiddlewareDocument {
    #[serde(rename = "middleware", default)]
    pub items: Vec<MiddlewareItem>,
}

impl MiddlewareDocument {
    pub fn parse(bytes: &[u8]) -> CatalogResult<Self> {
        parse_xml("middleware", bytes)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MiddlewareItem {
    #[serde(rename = "@type", default)]
    pub kind: String,

    #[serde(rename = "@hidden", default)]
    pub hidden: String,

    #[serde(rename = "@req_capabilities_v2", default)]
    pub req_capabilities_v2: String,

    #[serde(default, alias = "n")]
    pub name: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub desc: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub req_capabilities: String,

    #[serde(default)]
    pub versions: VersionList<MiddlewareVersion>,

    /// Index of the middleware reference this item came from
    #[serde(skip)]
    pub origin: Option<usize>,

    #[serde(skip)]
    pub dependencies: Option<Depender>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MiddlewareVersion {
    #[serde(rename = "@flow_version", default)]
    pub flow_version: String,

    #[serde(rename = "@tools_min_version", default)]
    pub tools_min_version: String,

    #[serde(default)]
    pub num: String,

    #[serde(default)]
    pub commit: String,

    #[serde(default)]
    pub desc: String,
}

impl MiddlewareItem {
    pub fn versions(&self) -> &[MiddlewareVersion] {
        &self.versions.items
    }

    pub fn requirement(&self) -> CapabilityRequirement {
        CapabilityRequirement::parse(first_non_empty(&[
            self.req_capabilities_v2.as_str(),
            self.req_capabilities.as_str(),
        ]))
    }

    pub fn is_hidden(&self) -> bool {
        matches!(
            self.hidden.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        )
    }
}

// ----------------------------------------------------------------------------
// Capability dictionary
// ----------------------------------------------------------------------------

/// JSON dictionary describing every capability token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesDocument {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub token: String,

    /// Where the token applies: "chip", "board", "generation"
    #[serde(default)]
    pub types: Vec<String>,
}

/// Explanation used for tokens missing from the dictionary
pub const UNKNOWN_CAPABILITY: &str = "Unknown capability";

impl CapabilitiesDocument {
    pub fn parse(bytes: &[u8]) -> CatalogResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CatalogError::parse("capability", e))
    }

    pub fn capability(&self, token: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.token == token)
    }

    pub fn is_known(&self, token: &str) -> bool {
        self.capability(token).is_some()
    }

    pub fn by_category(&self, category: &str) -> Vec<&Capability> {
        self.capabilities
            .iter()
            .filter(|c| c.category == category)
            .collect()
    }

    pub fn by_type(&self, kind: &str) -> Vec<&Capability> {
        self.capabilities
            .iter()
            .filter(|c| c.types.iter().any(|t| t == kind))
            .collect()
    }

    /// Distinct categories, sorted
    pub fn categories(&self) -> Vec<&str> {
        self.capabilities
            .iter()
            .map(|c| c.category.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Case-insensitive substring match over name, token and description
    pub fn search(&self, query: &str) -> Vec<&Capability> {
        let query = query.to_lowercase();
        self.capabilities
            .iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&query)
                    || c.token.to_lowercase().contains(&query)
                    || c.description.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Description for each token
    pub fn explain<'a, I>(&self, tokens: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        tokens
            .into_iter()
            .map(|token| {
                let text = self
                    .capability(token)
                    .map_or(UNKNOWN_CAPABILITY, |c| c.description.as_str());
                (token.to_string(), text.to_string())
            })
            .collect()
    }
}
