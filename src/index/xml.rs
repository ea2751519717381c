// src/index/xml.rs

//! Persisted package index codec
//!
//! The index is an XML document:
//!
//! ```xml
//! <WideIndex>
//!   <Package Type="..." Id="..." Name="..." Version="..." Description="...">
//!     <Component Name="..." Compression="...">
//!       <File Path="..." Hash="..."/>
//!     </Component>
//!   </Package>
//! </WideIndex>
//! ```
//!
//! Indentation is cosmetic. Nodes tagged `Removed` and containers left
//! without live children are not written. Decoded nodes are `Unchanged`.

use super::{Component, File, Package, PackageIndex, State};
use crate::error::{Error, Result, io_err};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::path::Path;
use tracing::{debug, info};

const ROOT: &str = "WideIndex";
const PACKAGE: &str = "Package";
const COMPONENT: &str = "Component";
const FILE: &str = "File";

/// Load a persisted index
///
/// Returns `None` when no index exists at `path` yet.
pub fn load(path: &Path) -> Result<Option<PackageIndex>> {
    if !path.exists() {
        debug!("No package index at {}", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let index = decode(&content).map_err(|reason| Error::MalformedIndex {
        path: path.to_path_buf(),
        reason,
    })?;

    info!(
        "Loaded package index {} ({} packages)",
        path.display(),
        index.len()
    );
    Ok(Some(index))
}

/// Persist an index
///
/// Writes `<path>.tmp` first, then renames it over `path`.
pub fn save(index: &PackageIndex, path: &Path) -> Result<()> {
    let bytes = encode(index).map_err(|e| io_err(path, std::io::Error::other(e.to_string())))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    std::fs::write(tmp, &bytes).map_err(|e| io_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    info!("Wrote package index {}", path.display());
    Ok(())
}

/// Encode an index to XML bytes
pub fn encode(index: &PackageIndex) -> std::result::Result<Vec<u8>, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT)))?;

    for package in index.packages.iter().filter(|p| p.state != State::Removed) {
        let components: Vec<&Component> = package
            .components
            .iter()
            .filter(|c| c.state != State::Removed && c.current_files().next().is_some())
            .collect();
        if components.is_empty() {
            continue;
        }

        let element = BytesStart::new(PACKAGE).with_attributes([
            ("Type", package.package_type.as_str()),
            ("Id", package.id.as_str()),
            ("Name", package.name.as_str()),
            ("Version", package.version.as_str()),
            ("Description", package.description.as_str()),
        ]);
        writer.write_event(Event::Start(element))?;

        for component in components {
            let element = BytesStart::new(COMPONENT).with_attributes([
                ("Name", component.name.as_str()),
                ("Compression", component.compression.as_str()),
            ]);
            writer.write_event(Event::Start(element))?;

            for file in component.current_files() {
                let element = BytesStart::new(FILE)
                    .with_attributes([("Path", file.path.as_str()), ("Hash", file.hash.as_str())]);
                writer.write_event(Event::Empty(element))?;
            }

            writer.write_event(Event::End(BytesEnd::new(COMPONENT)))?;
        }

        writer.write_event(Event::End(BytesEnd::new(PACKAGE)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(ROOT)))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode an index from XML text
pub fn decode(xml: &str) -> std::result::Result<PackageIndex, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut decoder = Decoder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => decoder.open(&e, false)?,
            Ok(Event::Empty(e)) => decoder.open(&e, true)?,
            Ok(Event::End(e)) => decoder.close(e.name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    if !decoder.seen_root {
        return Err(format!("Missing root element <{}>", ROOT));
    }

    Ok(decoder.index)
}

/// Element nesting state while decoding
#[derive(Default)]
struct Decoder {
    index: PackageIndex,
    seen_root: bool,
    in_root: bool,
    package: Option<Package>,
    component: Option<Component>,
}

impl Decoder {
    fn open(&mut self, e: &BytesStart, is_empty: bool) -> std::result::Result<(), String> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let attrs = read_attributes(e)?;

        match tag.as_str() {
            ROOT if !self.seen_root => {
                self.seen_root = true;
                self.in_root = !is_empty;
            }
            PACKAGE if self.in_root && self.package.is_none() => {
                let package = Package::new(
                    required(&attrs, PACKAGE, "Id")?,
                    optional(&attrs, "Name"),
                    optional(&attrs, "Description"),
                    optional(&attrs, "Type"),
                    optional(&attrs, "Version"),
                );
                if is_empty {
                    self.index.packages.push(package);
                } else {
                    self.package = Some(package);
                }
            }
            COMPONENT if self.component.is_none() => {
                let package = self
                    .package
                    .as_mut()
                    .ok_or_else(|| "Component element outside of a Package".to_string())?;
                let component = Component::new(
                    required(&attrs, COMPONENT, "Name")?,
                    optional(&attrs, "Compression"),
                );
                if is_empty {
                    package.components.push(component);
                } else {
                    self.component = Some(component);
                }
            }
            FILE => {
                let component = self
                    .component
                    .as_mut()
                    .ok_or_else(|| "File element outside of a Component".to_string())?;
                component.push_file(File::new(
                    required(&attrs, FILE, "Path")?,
                    optional(&attrs, "Hash"),
                ));
            }
            _ => return Err(format!("Unexpected element <{}>", tag)),
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"Component" => {
                if let (Some(package), Some(component)) =
                    (self.package.as_mut(), self.component.take())
                {
                    package.components.push(component);
                }
            }
            b"Package" => {
                if let Some(package) = self.package.take() {
                    self.index.packages.push(package);
                }
            }
            b"WideIndex" => self.in_root = false,
            _ => {}
        }
    }
}

fn read_attributes(e: &BytesStart) -> std::result::Result<Vec<(String, String)>, String> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("Invalid attribute: {}", e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| format!("Invalid value for attribute {}: {}", key, e))?
            .to_string();
        attrs.push((key, value));
    }
    Ok(attrs)
}

fn optional(attrs: &[(String, String)], key: &str) -> String {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

fn required(
    attrs: &[(String, String)],
    element: &str,
    key: &str,
) -> std::result::Result<String, String> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| format!("<{}> is missing the {} attribute", element, key))
}
