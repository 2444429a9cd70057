//! RPM/DNF repository publishing: `Packages/` hardlinks, regenerated
//! `primary.xml`/`repomd.xml`, and filtered-mode `updateinfo`/`filelists`/
//! `other` regeneration (§4.8.1). Grounded on
//! `original_source/plugins/rpm/publisher.py`.

use std::collections::HashSet;
use std::path::Path;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use sha2::{Digest, Sha256};

use crate::compression::{self, Codec};
use crate::error::{ChantalError, Result};

use super::updateinfo::{self, Update};
use super::RpmPackage;

/// A metadata file ready to be listed in `repomd.xml`: its `<data type=...>`
/// name and the final bytes as written to `repodata/`.
pub struct MetadataFile {
    pub file_type: String,
    pub filename: String,
    pub content: Vec<u8>,
}

/// Renders `primary.xml`, compressed with `codec`, as the §4.8.1
/// "Compression for regenerated files" step names (matches upstream's
/// `_generate_primary_xml`, minus the file-time stamp it can't reproduce
/// deterministically without access to real wall-clock time here).
pub fn generate_primary_xml(packages: &[RpmPackage], codec: Codec) -> Result<MetadataFile> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)))
        .ok();

    let mut metadata_start = BytesStart::new("metadata");
    metadata_start.push_attribute(("xmlns", "http://linux.duke.edu/metadata/common"));
    metadata_start.push_attribute(("xmlns:rpm", "http://linux.duke.edu/metadata/rpm"));
    metadata_start.push_attribute(("packages", packages.len().to_string().as_str()));
    writer.write_event(Event::Start(metadata_start.clone())).into_xml_err()?;

    for pkg in packages {
        let mut pkg_start = BytesStart::new("package");
        pkg_start.push_attribute(("type", "rpm"));
        writer.write_event(Event::Start(pkg_start)).into_xml_err()?;

        write_text_elem(&mut writer, "name", &pkg.name)?;
        write_text_elem(&mut writer, "arch", &pkg.arch)?;

        let mut version = BytesStart::new("version");
        if !pkg.epoch.is_empty() {
            version.push_attribute(("epoch", pkg.epoch.as_str()));
        }
        version.push_attribute(("ver", pkg.version.as_str()));
        version.push_attribute(("rel", pkg.release.as_str()));
        writer.write_event(Event::Empty(version)).into_xml_err()?;

        let mut checksum = BytesStart::new("checksum");
        checksum.push_attribute(("type", "sha256"));
        checksum.push_attribute(("pkgid", "YES"));
        writer.write_event(Event::Start(checksum.clone())).into_xml_err()?;
        writer.write_event(Event::Text(BytesText::new(&pkg.sha256))).into_xml_err()?;
        writer.write_event(Event::End(checksum.to_end())).into_xml_err()?;

        if let Some(summary) = &pkg.summary {
            write_text_elem(&mut writer, "summary", summary)?;
        }
        if let Some(description) = &pkg.description {
            write_text_elem(&mut writer, "description", description)?;
        }

        let mut location = BytesStart::new("location");
        location.push_attribute(("href", format!("Packages/{}", pkg.location.rsplit('/').next().unwrap_or(&pkg.location)).as_str()));
        writer.write_event(Event::Empty(location)).into_xml_err()?;

        let mut size = BytesStart::new("size");
        size.push_attribute(("package", pkg.size_bytes.to_string().as_str()));
        writer.write_event(Event::Empty(size)).into_xml_err()?;

        if let Some(build_time) = pkg.build_time {
            let mut time = BytesStart::new("time");
            time.push_attribute(("build", build_time.to_string().as_str()));
            writer.write_event(Event::Empty(time)).into_xml_err()?;
        }

        if pkg.group.is_some() || pkg.license.is_some() || pkg.vendor.is_some() || pkg.sourcerpm.is_some() {
            writer.write_event(Event::Start(BytesStart::new("format"))).into_xml_err()?;
            if let Some(group) = &pkg.group {
                write_text_elem(&mut writer, "rpm:group", group)?;
            }
            if let Some(license) = &pkg.license {
                write_text_elem(&mut writer, "rpm:license", license)?;
            }
            if let Some(vendor) = &pkg.vendor {
                write_text_elem(&mut writer, "rpm:vendor", vendor)?;
            }
            if let Some(sourcerpm) = &pkg.sourcerpm {
                write_text_elem(&mut writer, "rpm:sourcerpm", sourcerpm)?;
            }
            writer.write_event(Event::End(BytesStart::new("format").to_end())).into_xml_err()?;
        }

        writer.write_event(Event::End(BytesStart::new("package").to_end())).into_xml_err()?;
    }

    writer.write_event(Event::End(metadata_start.to_end())).into_xml_err()?;

    let xml = writer.into_inner();
    let compressed = compression::compress_with(codec, &xml)?;
    let filename = format!("primary.xml.{}", codec.extension());
    Ok(MetadataFile {
        file_type: "primary".to_string(),
        filename,
        content: compressed,
    })
}

fn write_text_elem<W: std::io::Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    let start = BytesStart::new(tag);
    writer.write_event(Event::Start(start.clone())).into_xml_err()?;
    writer.write_event(Event::Text(BytesText::new(text))).into_xml_err()?;
    writer.write_event(Event::End(start.to_end())).into_xml_err()?;
    Ok(())
}

trait IntoXmlErr<T> {
    fn into_xml_err(self) -> Result<T>;
}
impl<T> IntoXmlErr<T> for std::result::Result<T, quick_xml::Error> {
    fn into_xml_err(self) -> Result<T> {
        self.map_err(|e| ChantalError::Parse {
            what: "primary.xml".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Writes `repomd.xml`, listing every published metadata file with its
/// compressed/open checksums and sizes.
pub fn generate_repomd_xml(files: &[MetadataFile], timestamp: i64) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)))
        .ok();

    let mut repomd = BytesStart::new("repomd");
    repomd.push_attribute(("xmlns", "http://linux.duke.edu/metadata/repo"));
    repomd.push_attribute(("xmlns:rpm", "http://linux.duke.edu/metadata/rpm"));
    writer.write_event(Event::Start(repomd.clone())).into_xml_err()?;

    write_text_elem(&mut writer, "revision", &timestamp.to_string())?;

    for file in files {
        let file_sha256 = hex_sha256(&file.content);
        let open_data = compression::decompress(&file.filename, &file.content).unwrap_or_else(|_| file.content.clone());
        let open_sha256 = hex_sha256(&open_data);

        let mut data = BytesStart::new("data");
        data.push_attribute(("type", file.file_type.as_str()));
        writer.write_event(Event::Start(data.clone())).into_xml_err()?;

        let mut checksum = BytesStart::new("checksum");
        checksum.push_attribute(("type", "sha256"));
        writer.write_event(Event::Start(checksum.clone())).into_xml_err()?;
        writer.write_event(Event::Text(BytesText::new(&file_sha256))).into_xml_err()?;
        writer.write_event(Event::End(checksum.to_end())).into_xml_err()?;

        let mut open_checksum = BytesStart::new("open-checksum");
        open_checksum.push_attribute(("type", "sha256"));
        writer.write_event(Event::Start(open_checksum.clone())).into_xml_err()?;
        writer.write_event(Event::Text(BytesText::new(&open_sha256))).into_xml_err()?;
        writer.write_event(Event::End(open_checksum.to_end())).into_xml_err()?;

        let mut location = BytesStart::new("location");
        location.push_attribute(("href", format!("repodata/{}", file.filename).as_str()));
        writer.write_event(Event::Empty(location)).into_xml_err()?;

        write_text_elem(&mut writer, "timestamp", &timestamp.to_string())?;
        write_text_elem(&mut writer, "size", &file.content.len().to_string())?;
        write_text_elem(&mut writer, "open-size", &open_data.len().to_string())?;

        writer.write_event(Event::End(data.to_end())).into_xml_err()?;
    }

    writer.write_event(Event::End(repomd.to_end())).into_xml_err()?;

    Ok(writer.into_inner())
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    faster_hex::hex_string(&hasher.finalize())
}

/// Filters `updateinfo.xml` down to updates with at least one available
/// package, recompressing it in its original codec (§4.10).
pub fn filter_updateinfo(content: &[u8], filename: &str, available: &[RpmPackage]) -> Result<Vec<u8>> {
    let codec = Codec::detect(filename, content)?;
    let xml = compression::decompress_with(codec, content)?;
    let updates = updateinfo::parse_updateinfo(&xml)?;
    let nvras: HashSet<String> = available.iter().map(|p| p.nvra()).collect();
    let filtered: Vec<Update> = updateinfo::filter_updates(updates, &nvras);
    let regenerated = updateinfo::generate_xml(&filtered);
    compression::compress_with(codec, &regenerated)
}

/// Removes `<package pkgid="...">` subtrees from a `filelists.xml`/
/// `other.xml`-shaped document whose `pkgid` isn't in `available_pkgids`,
/// and updates the root's `packages` count attribute. Both files share this
/// exact shape upstream (`_filter_and_regenerate_filelists`/`_other`), so
/// one function serves both.
pub fn filter_packages_by_pkgid(content: &[u8], filename: &str, available_pkgids: &HashSet<String>) -> Result<Vec<u8>> {
    let codec = Codec::detect(filename, content)?;
    let xml = compression::decompress_with(codec, content)?;

    let mut reader = quick_xml::reader::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());

    let mut buf = Vec::new();
    let mut depth_in_dropped_package = 0u32;
    let mut kept = 0u64;
    let mut root_rewritten = false;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| ChantalError::Parse {
            what: filename.to_string(),
            reason: e.to_string(),
        })?;
        match &event {
            Event::Eof => break,
            Event::Start(e) if local_tag(e.name().as_ref()) == b"package" => {
                let pkgid = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"pkgid")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                let keep = pkgid.map(|id| available_pkgids.contains(&id)).unwrap_or(false);
                if keep {
                    kept += 1;
                    writer.write_event(clone_owned(&event)).ok();
                } else {
                    depth_in_dropped_package = 1;
                }
            }
            Event::End(e) if local_tag(e.name().as_ref()) == b"package" => {
                if depth_in_dropped_package > 0 {
                    depth_in_dropped_package = 0;
                } else {
                    writer.write_event(clone_owned(&event)).ok();
                }
            }
            Event::Start(e) | Event::Empty(e) => {
                if depth_in_dropped_package > 0 {
                    // still inside a dropped <package>; nothing to write
                } else if !root_rewritten && e.attributes().any(|a| a.map(|a| a.key.as_ref() == b"packages").unwrap_or(false)) {
                    let mut rewritten = e.to_owned();
                    rewritten.clear_attributes();
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"packages" {
                            // placeholder; corrected below once count is known
                            rewritten.push_attribute(("packages", "__COUNT__"));
                        } else {
                            rewritten.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
                        }
                    }
                    root_rewritten = true;
                    writer.write_event(Event::Start(rewritten)).ok();
                } else {
                    writer.write_event(clone_owned(&event)).ok();
                }
            }
            _ => {
                if depth_in_dropped_package == 0 {
                    writer.write_event(clone_owned(&event)).ok();
                }
            }
        }
        buf.clear();
    }

    let written = writer.into_inner();
    let placeholder = "packages=\"__COUNT__\"".to_string();
    let replacement = format!("packages=\"{kept}\"");
    let fixed = String::from_utf8_lossy(&written).replacen(&placeholder, &replacement, 1).into_owned();

    compression::compress_with(codec, fixed.as_bytes())
}

fn local_tag(qname: &[u8]) -> &[u8] {
    match qname.iter().position(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    }
}

fn clone_owned<'a>(event: &Event<'a>) -> Event<'a> {
    event.clone()
}

/// Parses `.treeinfo`'s target path: `.treeinfo` itself publishes at the
/// repository root, everything else (`images/boot.iso`, ...) under its
/// `original_path` relative to the repository root (§4.8.1 kickstart files).
pub fn kickstart_target_path(repo_root: &Path, file_type: &str, original_path: &str) -> std::path::PathBuf {
    if file_type == "treeinfo" {
        repo_root.join(".treeinfo")
    } else {
        repo_root.join(original_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> RpmPackage {
        RpmPackage {
            name: name.to_string(),
            version: "1.0".to_string(),
            release: "1".to_string(),
            epoch: String::new(),
            arch: "x86_64".to_string(),
            sha256: "a".repeat(64),
            size_bytes: 100,
            location: format!("{name}.rpm"),
            summary: None,
            description: None,
            build_time: None,
            group: None,
            license: None,
            vendor: None,
            sourcerpm: None,
        }
    }

    #[test]
    fn generates_well_formed_primary_xml() {
        let file = generate_primary_xml(&[pkg("httpd")], Codec::None).unwrap();
        let xml = String::from_utf8(file.content).unwrap();
        assert!(xml.contains("<name>httpd</name>"));
        assert!(xml.contains("packages=\"1\""));
    }

    #[test]
    fn repomd_lists_every_metadata_file() {
        let primary = generate_primary_xml(&[pkg("httpd")], Codec::None).unwrap();
        let repomd = generate_repomd_xml(&[primary], 1700000000).unwrap();
        let xml = String::from_utf8(repomd).unwrap();
        assert!(xml.contains("type=\"primary\""));
        assert!(xml.contains("repodata/primary.xml"));
    }
}
