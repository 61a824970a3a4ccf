//! Path routing between the working tree and content descriptors.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   template_sets/<set_name>/<group_name>/<item_name>.html
//!   styles/<theme_name>/<item_name>.css
//! ```
//!
//! [`parse`] is purely structural (segment count and extension, no I/O).
//! Anything outside the two layouts becomes [`Descriptor::Unrecognized`],
//! which callers drop silently. [`build_path`] is the left-inverse of
//! [`parse`] for every recognized descriptor.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::ContentKind;

/// Typed identity of a file in the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Descriptor {
    Template {
        set_name: String,
        group_name: String,
        item_name: String,
    },
    Stylesheet {
        theme_name: String,
        item_name: String,
    },
    Unrecognized {
        raw_path: PathBuf,
    },
}

impl Descriptor {
    pub fn template(
        set_name: impl Into<String>,
        group_name: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        Descriptor::Template {
            set_name: set_name.into(),
            group_name: group_name.into(),
            item_name: item_name.into(),
        }
    }

    pub fn stylesheet(theme_name: impl Into<String>, item_name: impl Into<String>) -> Self {
        Descriptor::Stylesheet {
            theme_name: theme_name.into(),
            item_name: item_name.into(),
        }
    }

    pub fn kind(&self) -> Option<ContentKind> {
        match self {
            Descriptor::Template { .. } => Some(ContentKind::Template),
            Descriptor::Stylesheet { .. } => Some(ContentKind::Stylesheet),
            Descriptor::Unrecognized { .. } => None,
        }
    }

    pub fn item_name(&self) -> Option<&str> {
        match self {
            Descriptor::Template { item_name, .. } | Descriptor::Stylesheet { item_name, .. } => {
                Some(item_name)
            }
            Descriptor::Unrecognized { .. } => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Descriptor::Unrecognized { .. })
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Template {
                set_name,
                group_name,
                item_name,
            } => write!(f, "template {set_name}/{group_name}/{item_name}"),
            Descriptor::Stylesheet {
                theme_name,
                item_name,
            } => write!(f, "stylesheet {theme_name}/{item_name}"),
            Descriptor::Unrecognized { raw_path } => {
                write!(f, "unrecognized {}", raw_path.display())
            }
        }
    }
}

/// Classify a path relative to the sync root.
pub fn parse(relative: &Path) -> Descriptor {
    let unrecognized = || Descriptor::Unrecognized {
        raw_path: relative.to_path_buf(),
    };

    let Some(segments) = normal_segments(relative) else {
        return unrecognized();
    };

    let template_root = ContentKind::Template.root_dir();
    let style_root = ContentKind::Stylesheet.root_dir();

    match segments.as_slice() {
        [root, set, group, file] if *root == template_root => {
            match strip_extension(file, ContentKind::Template) {
                Some(item) if is_valid_segment(set) && is_valid_segment(group) => {
                    Descriptor::template(*set, *group, item)
                }
                _ => unrecognized(),
            }
        }
        [root, theme, file] if *root == style_root => {
            match strip_extension(file, ContentKind::Stylesheet) {
                Some(item) if is_valid_segment(theme) => Descriptor::stylesheet(*theme, item),
                _ => unrecognized(),
            }
        }
        _ => unrecognized(),
    }
}

/// Relative path for a descriptor; `None` for unrecognized or invalid ones.
pub fn build_path(descriptor: &Descriptor) -> Option<PathBuf> {
    match descriptor {
        Descriptor::Template {
            set_name,
            group_name,
            item_name,
        } => {
            if !(is_valid_segment(set_name)
                && is_valid_segment(group_name)
                && is_valid_segment(item_name))
            {
                return None;
            }
            Some(
                set_dir(ContentKind::Template, set_name)
                    .join(group_name)
                    .join(file_name(ContentKind::Template, item_name)),
            )
        }
        Descriptor::Stylesheet {
            theme_name,
            item_name,
        } => {
            if !(is_valid_segment(theme_name) && is_valid_segment(item_name)) {
                return None;
            }
            Some(
                set_dir(ContentKind::Stylesheet, theme_name)
                    .join(file_name(ContentKind::Stylesheet, item_name)),
            )
        }
        Descriptor::Unrecognized { .. } => None,
    }
}

/// `<kind root>/<set_name>` relative to the sync root.
pub fn set_dir(kind: ContentKind, set_name: &str) -> PathBuf {
    Path::new(kind.root_dir()).join(set_name)
}

/// A name usable as a single path segment: non-empty, no separators, not a
/// relative component, no NUL.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

fn file_name(kind: ContentKind, item_name: &str) -> String {
    format!("{item_name}.{}", kind.extension())
}

fn strip_extension(file: &str, kind: ContentKind) -> Option<&str> {
    let item = file.strip_suffix(kind.extension())?.strip_suffix('.')?;
    is_valid_segment(item).then_some(item)
}

fn normal_segments(path: &Path) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(os) => segments.push(os.to_str()?),
            Component::CurDir => continue,
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => return None,
        }
    }
    Some(segments)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_template_path() {
        let d = parse(Path::new("template_sets/Dark/header/header_welcome.html"));
        assert_eq!(d, Descriptor::template("Dark", "header", "header_welcome"));
        assert_eq!(d.kind(), Some(ContentKind::Template));
    }

    #[test]
    fn parses_stylesheet_path_with_dotted_item() {
        let d = parse(Path::new("styles/Default/global.css.css"));
        assert_eq!(d, Descriptor::stylesheet("Default", "global.css"));
    }

    #[rstest]
    #[case("template_sets/Dark/header.html")]
    #[case("template_sets/Dark/a/b/header.html")]
    #[case("template_sets/Dark/header/header.css")]
    #[case("template_sets/Dark/header/.html")]
    #[case("styles/Default/sub/global.css")]
    #[case("styles/Default/global.html")]
    #[case("scripts/Default/app.js")]
    #[case("/template_sets/Dark/header/x.html")]
    #[case("template_sets/../header/x.html")]
    #[case("")]
    fn malformed_layouts_are_unrecognized(#[case] raw: &str) {
        let d = parse(Path::new(raw));
        assert!(!d.is_recognized(), "{raw} should be unrecognized, got {d}");
        assert_eq!(
            d,
            Descriptor::Unrecognized {
                raw_path: PathBuf::from(raw)
            }
        );
    }

    #[test]
    fn build_path_uses_exact_layout() {
        let path = build_path(&Descriptor::template("Dark", "footer", "footer")).unwrap();
        assert_eq!(path, PathBuf::from("template_sets/Dark/footer/footer.html"));

        let path = build_path(&Descriptor::stylesheet("Dark", "global.css")).unwrap();
        assert_eq!(path, PathBuf::from("styles/Dark/global.css.css"));
    }

    #[test]
    fn build_path_rejects_unusable_segments() {
        assert!(build_path(&Descriptor::template("Dark", "", "x")).is_none());
        assert!(build_path(&Descriptor::stylesheet("..", "x")).is_none());
        assert!(build_path(&Descriptor::stylesheet("a/b", "x")).is_none());
        assert!(build_path(&Descriptor::Unrecognized {
            raw_path: PathBuf::from("x")
        })
        .is_none());
    }
}
