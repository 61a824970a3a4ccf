//! Domain types for synchronized content.
//!
//! Two content kinds share one shape: a named item owned by a set (template
//! set or stylesheet theme). Reserved set ids form the inheritance tiers; every
//! other id is a named set that only stores the items it overrides.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tier constants
// ---------------------------------------------------------------------------

/// Base tier for templates: canonical default content for every item name.
pub const TEMPLATE_BASE_SET: SetId = SetId(-2);

/// Shared tier for templates: items visible to every named set.
pub const TEMPLATE_SHARED_SET: SetId = SetId(-1);

/// Base tier for stylesheets.
pub const STYLESHEET_BASE_THEME: SetId = SetId(1);

/// Group used for templates that carry no group metadata.
pub const DEFAULT_GROUP: &str = "ungrouped";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a template set or stylesheet theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetId(pub i64);

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Row identifier of a single content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Content kind
// ---------------------------------------------------------------------------

/// The closed set of content kinds the engine synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Template,
    Stylesheet,
}

impl ContentKind {
    /// Top-level directory of this kind inside the working tree.
    pub fn root_dir(self) -> &'static str {
        match self {
            ContentKind::Template => "template_sets",
            ContentKind::Stylesheet => "styles",
        }
    }

    /// File extension (without the dot) used for items of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            ContentKind::Template => "html",
            ContentKind::Stylesheet => "css",
        }
    }

    pub fn base_set(self) -> SetId {
        match self {
            ContentKind::Template => TEMPLATE_BASE_SET,
            ContentKind::Stylesheet => STYLESHEET_BASE_THEME,
        }
    }

    pub fn shared_set(self) -> Option<SetId> {
        match self {
            ContentKind::Template => Some(TEMPLATE_SHARED_SET),
            ContentKind::Stylesheet => None,
        }
    }

    /// `true` for the base and shared tier ids of this kind.
    pub fn is_reserved(self, id: SetId) -> bool {
        id == self.base_set() || self.shared_set() == Some(id)
    }

    /// Human label for the owning collection ("template set" / "theme").
    pub fn set_label(self) -> &'static str {
        match self {
            ContentKind::Template => "template set",
            ContentKind::Stylesheet => "theme",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Template => write!(f, "template"),
            ContentKind::Stylesheet => write!(f, "stylesheet"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "template" | "templates" => Ok(ContentKind::Template),
            "stylesheet" | "stylesheets" | "style" | "styles" => Ok(ContentKind::Stylesheet),
            other => Err(format!(
                "unknown content kind '{other}'; expected: template, stylesheet"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A template set or stylesheet theme as known to the data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRecord {
    pub id: SetId,
    pub name: String,
}

/// A stored template or stylesheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub kind: ContentKind,
    pub set_id: SetId,
    pub name: String,
    /// Placement folder; always `None` for stylesheets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub body: String,
    /// Starts at 1 and increments on every body change.
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for [`crate::store::ContentStore::insert_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub set_id: SetId,
    pub name: String,
    pub group: Option<String>,
    pub body: String,
}

impl NewItem {
    pub fn new(set_id: SetId, name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            set_id,
            name: name.into(),
            group: None,
            body: body.into(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
