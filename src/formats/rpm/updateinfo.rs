//! `updateinfo.xml` (errata) parsing, filtering, and regeneration (§4.10).
//! Grounded on `original_source/plugins/rpm/updateinfo.py`. Unlike the
//! original, which keeps each `<update>`'s original `ElementTree.Element`
//! around for faithful regeneration, this parser keeps the update's raw
//! inner XML bytes and replays them verbatim — same effect, no live DOM to
//! carry past the parse.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{ChantalError, Result};

#[derive(Debug, Clone)]
pub struct UpdatePackage {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: String,
    pub arch: String,
    pub filename: String,
}

impl UpdatePackage {
    pub fn nvra(&self) -> String {
        format!("{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
    }
}

#[derive(Debug, Clone)]
pub struct Update {
    pub update_id: String,
    pub update_type: String,
    pub status: String,
    pub packages: Vec<UpdatePackage>,
    /// Raw `<update>...</update>` bytes, replayed as-is on regeneration.
    pub raw_xml: Vec<u8>,
}

fn local_name(qname: &[u8]) -> &[u8] {
    match qname.iter().position(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    }
}

fn attr_value(start: &BytesStart, key: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Parses `<updates>...</updates>` into a list of [`Update`]s.
pub fn parse_updateinfo(content: &[u8]) -> Result<Vec<Update>> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut updates = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| ChantalError::Parse {
            what: "updateinfo.xml".to_string(),
            reason: e.to_string(),
        })? {
            Event::Eof => break,
            Event::Start(e) if local_name(e.name().as_ref()) == b"update" => {
                if let Some(update) = parse_single_update(&mut reader, &e)? {
                    updates.push(update);
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(updates)
}

fn parse_single_update<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
) -> Result<Option<Update>> {
    let update_type = attr_value(start, b"type").unwrap_or_else(|| "bugfix".to_string());
    let status = attr_value(start, b"status").unwrap_or_default();

    let mut raw = Writer::new(Vec::new());
    raw.write_event(Event::Start(start.to_owned())).ok();

    let mut update_id = None;
    let mut packages = Vec::new();

    let mut in_pkglist = false;
    let mut current_text_target: Option<&'static str> = None;
    let mut current_pkg: Option<(String, String, String, String, String)> = None;
    let mut filename = String::new();

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| ChantalError::Parse {
            what: "updateinfo.xml".to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(event, Event::Eof) {
            raw.write_event(clone_event(&event)).ok();
        }

        match &event {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    b"id" => current_text_target = Some("id"),
                    b"pkglist" => in_pkglist = true,
                    b"package" if in_pkglist => {
                        let name = attr_value(e, b"name").unwrap_or_default();
                        let version = attr_value(e, b"version").unwrap_or_default();
                        let release = attr_value(e, b"release").unwrap_or_default();
                        let epoch = attr_value(e, b"epoch").unwrap_or_else(|| "0".to_string());
                        let arch = attr_value(e, b"arch").unwrap_or_default();
                        filename.clear();
                        if matches!(event, Event::Empty(_)) {
                            packages.push(UpdatePackage {
                                name,
                                version,
                                release,
                                epoch,
                                arch,
                                filename: String::new(),
                            });
                        } else {
                            current_pkg = Some((name, version, release, epoch, arch));
                        }
                    }
                    b"filename" if current_pkg.is_some() => current_text_target = Some("filename"),
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(target) = current_text_target {
                    let text = t.unescape().unwrap_or_default().into_owned();
                    match target {
                        "id" => update_id = Some(text),
                        "filename" => filename = text,
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref());
                match name {
                    b"pkglist" => in_pkglist = false,
                    b"package" => {
                        if let Some((name, version, release, epoch, arch)) = current_pkg.take() {
                            packages.push(UpdatePackage {
                                name,
                                version,
                                release,
                                epoch,
                                arch,
                                filename: std::mem::take(&mut filename),
                            });
                        }
                    }
                    b"update" => break,
                    _ => {}
                }
                current_text_target = None;
            }
            _ => {}
        }
        buf.clear();
    }

    let Some(update_id) = update_id else {
        return Ok(None);
    };

    Ok(Some(Update {
        update_id,
        update_type,
        status,
        packages,
        raw_xml: raw.into_inner(),
    }))
}

fn clone_event<'a>(event: &Event<'a>) -> Event<'a> {
    event.clone()
}

/// Keeps only updates that reference at least one package present in
/// `available_nvras` (§4.10).
pub fn filter_updates(updates: Vec<Update>, available_nvras: &HashSet<String>) -> Vec<Update> {
    updates
        .into_iter()
        .filter(|update| update.packages.iter().any(|p| available_nvras.contains(&p.nvra())))
        .collect()
}

/// Replays the filtered updates' raw XML back into a full `<updates>`
/// document.
pub fn generate_xml(updates: &[Update]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(br#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.extend_from_slice(b"\n<updates>\n");
    for update in updates {
        out.extend_from_slice(&update.raw_xml);
        out.push(b'\n');
    }
    out.extend_from_slice(b"</updates>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPDATEINFO_XML: &str = r#"<?xml version="1.0"?>
<updates>
  <update type="security" status="final">
    <id>ALSA-2024:0001</id>
    <title>Important: httpd security update</title>
    <issued date="2024-01-01"/>
    <pkglist>
      <collection>
        <package name="httpd" version="2.4.57" release="5.el9" epoch="0" arch="x86_64">
          <filename>httpd-2.4.57-5.el9.x86_64.rpm</filename>
        </package>
      </collection>
    </pkglist>
  </update>
</updates>"#;

    #[test]
    fn parses_one_update_with_one_package() {
        let updates = parse_updateinfo(UPDATEINFO_XML.as_bytes()).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, "ALSA-2024:0001");
        assert_eq!(updates[0].packages.len(), 1);
        assert_eq!(updates[0].packages[0].nvra(), "httpd-2.4.57-5.el9.x86_64");
    }

    #[test]
    fn filter_drops_updates_with_no_available_package() {
        let updates = parse_updateinfo(UPDATEINFO_XML.as_bytes()).unwrap();
        let available = HashSet::new();
        assert!(filter_updates(updates, &available).is_empty());
    }

    #[test]
    fn filter_keeps_updates_with_an_available_package() {
        let updates = parse_updateinfo(UPDATEINFO_XML.as_bytes()).unwrap();
        let mut available = HashSet::new();
        available.insert("httpd-2.4.57-5.el9.x86_64".to_string());
        assert_eq!(filter_updates(updates, &available).len(), 1);
    }
}
