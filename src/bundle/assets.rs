//! Passthrough files of a bundle: metadata descriptor and stylesheet.

use std::fs;
use std::path::Path;

use log::{debug, info};
use quick_xml::escape::escape;

use super::error::{BundleError, Result};

/// Stylesheet used when neither an explicit file nor a sibling `.css` exists.
pub const DEFAULT_STYLESHEET: &str = "\
h1 { font-size: 1.2em; font-weight: bold; color: #333; }
.definition { margin: 10px 0; line-height: 1.5; }
a { color: #0066cc; text-decoration: none; }
a:hover { text-decoration: underline; }
";

/// Bytes written verbatim as `metadata.plist` and `stylesheet.css`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleAssets {
    pub metadata: Vec<u8>,
    pub stylesheet: Vec<u8>,
}

impl BundleAssets {
    pub fn new(metadata: impl Into<Vec<u8>>, stylesheet: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: metadata.into(),
            stylesheet: stylesheet.into(),
        }
    }

    /// Generated metadata and the built-in stylesheet.
    pub fn generated(title: &str, description: Option<&str>) -> Self {
        Self::new(default_metadata(title, description), DEFAULT_STYLESHEET)
    }

    /// Resolves the assets of a conversion of `source`.
    ///
    /// Explicit files win. Otherwise the metadata is generated from `title`
    /// and `description`, and the stylesheet is `<source>.css` when present,
    /// else [`DEFAULT_STYLESHEET`].
    pub fn resolve(
        source: &Path,
        title: &str,
        description: Option<&str>,
        metadata_file: Option<&Path>,
        stylesheet_file: Option<&Path>,
    ) -> Result<Self> {
        let metadata = match metadata_file {
            Some(path) => fs::read(path).map_err(BundleError::io(path))?,
            None => default_metadata(title, description).into_bytes(),
        };

        let sibling = source.with_extension("css");
        let stylesheet = match stylesheet_file {
            Some(path) => fs::read(path).map_err(BundleError::io(path))?,
            None if sibling.is_file() => {
                info!("Using stylesheet {}", sibling.display());
                fs::read(&sibling).map_err(BundleError::io(&sibling))?
            }
            None => {
                debug!("No stylesheet next to {}, using the default", source.display());
                DEFAULT_STYLESHEET.as_bytes().to_vec()
            }
        };

        Ok(Self {
            metadata,
            stylesheet,
        })
    }
}

/// Reverse-DNS identifier derived from the title.
fn bundle_identifier(title: &str) -> String {
    let slug: String = title
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            ' ' | '-' | '_' | '.' => Some('-'),
            _ => None,
        })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "org.mdict-bundle.dictionary".to_string()
    } else {
        format!("org.mdict-bundle.{}", slug)
    }
}

/// Property list describing a dictionary bundle.
pub fn default_metadata(title: &str, description: Option<&str>) -> String {
    let title = title.trim();
    let name = if title.is_empty() { "Dictionary" } else { title };
    let copyright = description.map(str::trim).filter(|d| !d.is_empty()).unwrap_or(name);

    let identifier = bundle_identifier(name);
    let entries = [
        ("CFBundleDevelopmentRegion", "English"),
        ("CFBundleIdentifier", identifier.as_str()),
        ("CFBundleName", name),
        ("CFBundleDisplayName", name),
        ("CFBundleShortVersionString", "1.0"),
        ("DCSDictionaryCopyright", copyright),
    ];

    let mut plist = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
        "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
        "<plist version=\"1.0\">\n<dict>\n"
    ));
    for (key, value) in entries {
        plist.push_str(&format!(
            "    <key>{}</key>\n    <string>{}</string>\n",
            key,
            escape(value)
        ));
    }
    plist.push_str("</dict>\n</plist>\n");
    plist
}
