//! Package manifest (.nuspec) parsing
//!
//! Reads the `<metadata>` block of a nuspec document into a
//! [`PackageEntry`]. Namespaces are ignored; only local element names are
//! matched, since nuspec files in the wild use several schema versions.

use crate::resource::{DependencyRef, PackageEntry};
use crate::version::{Version, VersionConstraint};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Errors that can occur while reading a nuspec document
#[derive(Debug, Error)]
pub enum NuspecError {
    /// Document is not well-formed XML
    #[error("XML error at position {position}: {message}")]
    Xml { position: u64, message: String },

    /// Required metadata field missing
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Version field could not be parsed
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),
}

/// Parse a nuspec document
pub fn parse_nuspec(xml: &str) -> Result<PackageEntry, NuspecError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Element names from the document root down to the current element
    let mut path: Vec<String> = Vec::new();
    let mut fields = MetadataFields::default();

    loop {
        let event = reader.read_event().map_err(|e| NuspecError::Xml {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(ref e) => {
                let name = local_name(e);
                if name == "dependency" {
                    fields.push_dependency(e);
                }
                path.push(name);
            }
            Event::Empty(ref e) => {
                if local_name(e) == "dependency" {
                    fields.push_dependency(e);
                }
            }
            Event::Text(ref e) => {
                let text = e.unescape().map_err(|err| NuspecError::Xml {
                    position: reader.buffer_position() as u64,
                    message: err.to_string(),
                })?;
                fields.set(&path, text.trim());
            }
            Event::CData(ref e) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                fields.set(&path, text.trim());
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    fields.into_entry()
}

/// Split a space or comma separated tag list
pub(crate) fn split_tags(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a declared dependency, logging and dropping unusable ranges
pub(crate) fn dependency_ref(name: &str, range: &str) -> Option<DependencyRef> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match VersionConstraint::parse_dependency_range(range) {
        Ok(constraint) => Some(DependencyRef::new(name, constraint)),
        Err(e) => {
            tracing::warn!(
                dependency = name,
                range,
                error = %e,
                "Ignoring dependency with invalid range"
            );
            None
        }
    }
}

/// Append `dep` unless a dependency of the same name is already present
pub(crate) fn push_unique(dependencies: &mut Vec<DependencyRef>, dep: DependencyRef) {
    if !dependencies
        .iter()
        .any(|d| d.name.eq_ignore_ascii_case(&dep.name))
    {
        dependencies.push(dep);
    }
}

pub(crate) fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

pub(crate) fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .filter_map(Result::ok)
        .find(|attr| attr.key.local_name().as_ref() == key.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.to_string()))
}

#[derive(Default)]
struct MetadataFields {
    id: Option<String>,
    version: Option<String>,
    authors: Option<String>,
    description: Option<String>,
    tags: Option<String>,
    project_url: Option<String>,
    license_url: Option<String>,
    published: Option<String>,
    dependencies: Vec<DependencyRef>,
}

impl MetadataFields {
    fn set(&mut self, path: &[String], text: &str) {
        // Only direct children of package/metadata carry fields
        let [.., parent, field] = path else {
            return;
        };
        if parent != "metadata" || text.is_empty() {
            return;
        }

        let slot = match field.as_str() {
            "id" => &mut self.id,
            "version" => &mut self.version,
            "authors" => &mut self.authors,
            "description" => &mut self.description,
            "tags" => &mut self.tags,
            "projectUrl" => &mut self.project_url,
            "licenseUrl" => &mut self.license_url,
            "published" => &mut self.published,
            _ => return,
        };
        *slot = Some(text.to_string());
    }

    fn push_dependency(&mut self, e: &BytesStart<'_>) {
        let Some(id) = attribute(e, "id") else {
            return;
        };
        let range = attribute(e, "version").unwrap_or_default();
        if let Some(dep) = dependency_ref(&id, &range) {
            push_unique(&mut self.dependencies, dep);
        }
    }

    fn into_entry(self) -> Result<PackageEntry, NuspecError> {
        let name = self.id.ok_or(NuspecError::MissingField("id"))?;
        let raw_version = self.version.ok_or(NuspecError::MissingField("version"))?;
        let version =
            Version::parse(&raw_version).map_err(|_| NuspecError::InvalidVersion(raw_version))?;

        Ok(PackageEntry {
            name,
            version,
            tags: self.tags.as_deref().map(split_tags).unwrap_or_default(),
            dependencies: self.dependencies,
            authors: self.authors,
            description: self.description,
            project_uri: self.project_url,
            license_uri: self.license_url,
            published: self.published,
            item_type: None,
            package_content: None,
        })
    }
}
