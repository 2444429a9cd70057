//! Upstream RPM metadata parsing: `repomd.xml`, `primary.xml`, `.treeinfo`.
//! Grounded on `original_source/plugins/rpm/parsers.py`.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{ChantalError, Result};

use super::RpmPackage;

/// One `<data>` entry from `repomd.xml` (§4.4 RPM "`repomd.xml` → list of
/// metadata files").
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    pub file_type: String,
    pub location: String,
    pub checksum: String,
    pub size: u64,
    pub open_checksum: Option<String>,
    pub open_size: Option<u64>,
}

fn local_name(qname: &[u8]) -> &[u8] {
    match qname.iter().position(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    }
}

/// Parses `repomd.xml`'s `<data>` entries. Namespace-agnostic: matches on
/// the element's local name regardless of whatever prefix is bound to it.
pub fn parse_repomd_xml(content: &[u8]) -> Result<Vec<MetadataEntry>> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut in_data = false;
    let mut file_type = None;
    let mut location = None;
    let mut checksum = None;
    let mut size = None;
    let mut open_checksum = None;
    let mut open_size = None;
    let mut current_text_target: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| ChantalError::Parse {
            what: "repomd.xml".to_string(),
            reason: e.to_string(),
        })? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    b"data" => {
                        in_data = true;
                        file_type = None;
                        location = None;
                        checksum = None;
                        size = None;
                        open_checksum = None;
                        open_size = None;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"type" {
                                file_type = Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    b"location" if in_data => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                location = Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    b"checksum" if in_data => current_text_target = Some("checksum"),
                    b"open-checksum" if in_data => current_text_target = Some("open-checksum"),
                    b"size" if in_data => current_text_target = Some("size"),
                    b"open-size" if in_data => current_text_target = Some("open-size"),
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(target) = current_text_target {
                    let text = t.unescape().unwrap_or_default().into_owned();
                    match target {
                        "checksum" => checksum = Some(text),
                        "open-checksum" => open_checksum = Some(text),
                        "size" => size = text.parse().ok(),
                        "open-size" => open_size = text.parse().ok(),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref());
                current_text_target = None;
                if name == b"data" && in_data {
                    in_data = false;
                    if let (Some(file_type), Some(location), Some(checksum)) =
                        (file_type.take(), location.take(), checksum.take())
                    {
                        entries.push(MetadataEntry {
                            file_type,
                            location,
                            checksum,
                            size: size.take().unwrap_or(0),
                            open_checksum: open_checksum.take(),
                            open_size: open_size.take(),
                        });
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

/// Parses `primary.xml` into [`RpmPackage`] records. Incomplete entries
/// (missing name/arch/version/checksum/location) are skipped, matching the
/// upstream parser's leniency.
pub fn parse_primary_xml(content: &[u8]) -> Result<Vec<RpmPackage>> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();

    let mut in_package = false;
    let mut in_format = false;
    let mut current_text_target: Option<&'static str> = None;
    let mut fields: HashMap<&'static str, String> = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| ChantalError::Parse {
            what: "primary.xml".to_string(),
            reason: e.to_string(),
        })? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    b"package" => {
                        in_package = true;
                        fields.clear();
                    }
                    b"format" if in_package => in_format = true,
                    b"name" if in_package && !in_format => current_text_target = Some("name"),
                    b"arch" if in_package && !in_format => current_text_target = Some("arch"),
                    b"summary" if in_package => current_text_target = Some("summary"),
                    b"description" if in_package => current_text_target = Some("description"),
                    b"version" if in_package => {
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).into_owned();
                            match attr.key.as_ref() {
                                b"ver" => {
                                    fields.insert("version", value);
                                }
                                b"rel" => {
                                    fields.insert("release", value);
                                }
                                b"epoch" => {
                                    fields.insert("epoch", value);
                                }
                                _ => {}
                            }
                        }
                    }
                    b"checksum" if in_package => current_text_target = Some("checksum"),
                    b"size" if in_package => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"package" {
                                fields.insert("size_bytes", String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    b"location" if in_package => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                fields.insert("location", String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    b"time" if in_package => {
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).into_owned();
                            match attr.key.as_ref() {
                                b"build" => {
                                    fields.insert("build_time", value);
                                }
                                b"file" => {
                                    fields.insert("file_time", value);
                                }
                                _ => {}
                            }
                        }
                    }
                    b"group" if in_format => current_text_target = Some("group"),
                    b"license" if in_format => current_text_target = Some("license"),
                    b"vendor" if in_format => current_text_target = Some("vendor"),
                    b"sourcerpm" if in_format => current_text_target = Some("sourcerpm"),
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(target) = current_text_target {
                    let text = t.unescape().unwrap_or_default().into_owned();
                    fields.insert(target, text);
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref());
                current_text_target = None;
                match name {
                    b"format" => in_format = false,
                    b"package" => {
                        in_package = false;
                        if let (Some(name), Some(arch), Some(version), Some(sha256), Some(location)) = (
                            fields.get("name").cloned(),
                            fields.get("arch").cloned(),
                            fields.get("version").cloned(),
                            fields.get("checksum").cloned(),
                            fields.get("location").cloned(),
                        ) {
                            packages.push(RpmPackage {
                                name,
                                version,
                                release: fields.get("release").cloned().unwrap_or_default(),
                                epoch: fields.get("epoch").cloned().unwrap_or_default(),
                                arch,
                                sha256,
                                size_bytes: fields.get("size_bytes").and_then(|v| v.parse().ok()).unwrap_or(0),
                                location,
                                summary: fields.get("summary").cloned(),
                                description: fields.get("description").cloned(),
                                build_time: fields.get("build_time").and_then(|v| v.parse().ok()),
                                group: fields.get("group").cloned(),
                                license: fields.get("license").cloned(),
                                vendor: fields.get("vendor").cloned(),
                                sourcerpm: fields.get("sourcerpm").cloned(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
}

/// Installer file (`images/boot.iso`, `images/pxeboot/vmlinuz`, ...) found
/// in `.treeinfo`'s `images-<arch>` section, cross-referenced against its
/// `checksums` section.
#[derive(Debug, Clone)]
pub struct InstallerFile {
    pub path: String,
    pub file_type: String,
    pub sha256: Option<String>,
}

/// Parses `.treeinfo` (an INI file) via the `ini` crate, the way the
/// upstream parser used `configparser`.
pub fn parse_treeinfo(content: &str) -> Result<Vec<InstallerFile>> {
    let ini = ini::Ini::load_from_str(content).map_err(|e| ChantalError::Parse {
        what: ".treeinfo".to_string(),
        reason: e.to_string(),
    })?;

    let mut checksums = HashMap::new();
    if let Some(section) = ini.section(Some("checksums")) {
        for (key, value) in section.iter() {
            if let Some(sha256) = value.split("sha256:").nth(1) {
                checksums.insert(key.to_string(), sha256.trim().to_string());
            }
        }
    }

    let arch = ini
        .section(Some("general"))
        .and_then(|s| s.get("arch"))
        .unwrap_or("x86_64");
    let images_section = format!("images-{arch}");

    let mut files = Vec::new();
    if let Some(section) = ini.section(Some(images_section.as_str())) {
        for (file_type, file_path) in section.iter() {
            files.push(InstallerFile {
                path: file_path.to_string(),
                file_type: file_type.to_string(),
                sha256: checksums.get(file_path).cloned(),
            });
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
  <package type="rpm">
    <name>httpd</name>
    <arch>x86_64</arch>
    <version epoch="0" ver="2.4.57" rel="5.el9"/>
    <checksum type="sha256" pkgid="YES">abc123</checksum>
    <summary>Apache HTTP server</summary>
    <location href="Packages/httpd-2.4.57-5.el9.x86_64.rpm"/>
    <size package="123456"/>
    <time build="1700000000" file="1700000001"/>
    <format>
      <rpm:group>System Environment/Daemons</rpm:group>
      <rpm:license>ASL 2.0</rpm:license>
      <rpm:vendor>AlmaLinux</rpm:vendor>
    </format>
  </package>
</metadata>"#;

    #[test]
    fn parses_a_single_primary_xml_package() {
        let packages = parse_primary_xml(PRIMARY_XML.as_bytes()).unwrap();
        assert_eq!(packages.len(), 1);
        let pkg = &packages[0];
        assert_eq!(pkg.name, "httpd");
        assert_eq!(pkg.version, "2.4.57");
        assert_eq!(pkg.release, "5.el9");
        assert_eq!(pkg.sha256, "abc123");
        assert_eq!(pkg.group.as_deref(), Some("System Environment/Daemons"));
        assert_eq!(pkg.build_time, Some(1700000000));
    }

    const REPOMD_XML: &str = r#"<?xml version="1.0"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">deadbeef</checksum>
    <open-checksum type="sha256">cafebabe</open-checksum>
    <location href="repodata/deadbeef-primary.xml.gz"/>
    <size>100</size>
    <open-size>400</open-size>
  </data>
</repomd>"#;

    #[test]
    fn parses_repomd_data_entries() {
        let entries = parse_repomd_xml(REPOMD_XML.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_type, "primary");
        assert_eq!(entries[0].checksum, "deadbeef");
        assert_eq!(entries[0].open_size, Some(400));
    }

    #[test]
    fn parses_treeinfo_images_section() {
        let content = "[general]\narch = x86_64\n\n\
             [checksums]\nimages/boot.iso = sha256:abc123\n\n\
             [images-x86_64]\nboot.iso = images/boot.iso\n";
        let files = parse_treeinfo(content).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "images/boot.iso");
        assert_eq!(files[0].sha256.as_deref(), Some("abc123"));
    }
}
