//! Beacon injection into ZIP+XML document packages.
//!
//! A beacon is a Word `INCLUDEPICTURE` field pointing at `{base}/{id}`. Word
//! silently fetches the target whenever the document is opened or its fields
//! refresh, which is what reveals the copy.
//!
//! Detection parses the body part and inspects each `w:instrText` node on its
//! own. Insertion never reserializes the parsed tree: the fragment is spliced
//! into the raw XML text before the last `</w:body>` so everything the parser
//! does not model survives byte for byte. Every other archive entry is copied
//! raw, and the file on disk is only replaced once the new package is fully
//! built.

use crate::error::{Error, Result};
use crate::tag::{Tag, TagId};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Path of the body part inside a Word package.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Field instruction keyword identifying a beacon.
pub const FIELD_MARKER: &str = "INCLUDEPICTURE";

const BODY_END: &str = "</w:body>";
const INSTR_TEXT: &[u8] = b"w:instrText";

/// Builds beacon URLs of the shape `{base}/{id}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconUrl {
    base: String,
}

impl BeaconUrl {
    /// Create a builder for the given base URL.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// The URL a document tagged with `id` will fetch.
    pub fn url_for(&self, id: &TagId) -> String {
        format!("{}/{}", self.base, id)
    }

    /// Get the normalized base URL.
    pub fn base(&self) -> &str {
        &self.base
    }
}

/// Embed a beacon for `candidate` in the document at `path`, or recover the
/// identity of a beacon that is already there.
///
/// Re-tagging a beaconed document is a no-op that returns the existing id
/// and the URL embedded in the document, whatever `beacon` currently is.
/// On a fresh insertion the returned tag has `hash` and `username` empty for
/// the caller to fill in.
pub fn inject_or_detect(
    path: impl AsRef<Path>,
    beacon: &BeaconUrl,
    candidate: &TagId,
) -> Result<Tag> {
    inject_at(path.as_ref(), beacon, candidate)
}

/// Look for an existing beacon without touching the file.
pub fn detect(path: impl AsRef<Path>) -> Result<Option<TagId>> {
    let mut archive = open_package(path.as_ref())?;
    let xml = read_part(&mut archive, DOCUMENT_PART)?;
    Ok(find_beacon(&xml)?.map(|found| found.id))
}

/// Count the beacon fields in a body part.
pub fn count_beacons(xml: &str) -> Result<usize> {
    Ok(instruction_texts(xml)?
        .iter()
        .filter(|text| is_beacon(text).is_some())
        .count())
}

#[instrument(skip_all, fields(path = %path.display(), candidate = %candidate))]
fn inject_at(path: &Path, beacon: &BeaconUrl, candidate: &TagId) -> Result<Tag> {
    let file_path = path.to_string_lossy().into_owned();

    let package = {
        let mut archive = open_package(path)?;
        let xml = read_part(&mut archive, DOCUMENT_PART)?;

        if let Some(existing) = find_beacon(&xml)? {
            tracing::info!(id = %existing.id, "document already carries a beacon");
            let url = existing
                .url
                .unwrap_or_else(|| beacon.url_for(&existing.id));
            return Ok(Tag::recovered(&existing.id, file_path, url));
        }

        let fragment = beacon_fragment(&beacon.url_for(candidate));
        let updated = splice_before_body_end(&xml, &fragment)?;
        rebuild_package(&mut archive, &updated)?
        // archive (and its file handle) dropped here, before the replace
    };

    replace_atomically(path, &package)?;
    tracing::info!(size = package.len(), "beacon inserted");

    Ok(Tag::new(candidate, file_path, beacon.url_for(candidate)))
}

fn open_package(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path)?;
    // The file opened fine, so anything the archive reader rejects is a
    // format problem rather than a transport one.
    ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::Format(format!("not a document package: {e}")))
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(Error::Format(format!("{name} not found in package")));
        }
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::Format(format!("{name} is not valid UTF-8")))
}

/// A beacon found in the body part.
#[derive(Debug, PartialEq, Eq)]
struct FoundBeacon {
    id: TagId,
    /// Quoted field target, when the instruction carries one.
    url: Option<String>,
}

fn find_beacon(xml: &str) -> Result<Option<FoundBeacon>> {
    Ok(instruction_texts(xml)?.iter().find_map(|text| {
        is_beacon(text).map(|id| FoundBeacon {
            id,
            url: field_target(text),
        })
    }))
}

/// The first double-quoted argument after the field marker.
fn field_target(text: &str) -> Option<String> {
    let (_, rest) = text.split_once(FIELD_MARKER)?;
    let (_, rest) = rest.split_once('"')?;
    let (target, _) = rest.split_once('"')?;
    let target = target.trim();
    (!target.is_empty()).then(|| target.to_string())
}

fn is_beacon(text: &str) -> Option<TagId> {
    if text.contains(FIELD_MARKER) {
        TagId::find_in(text)
    } else {
        None
    }
}

/// Parse the whole part and collect the text of every `w:instrText` node.
///
/// Text is accumulated per node; sibling nodes are never joined.
fn instruction_texts(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut texts = Vec::new();
    let mut current: Option<String> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                saw_root = true;
                depth += 1;
                if e.name().as_ref() == INSTR_TEXT {
                    current = Some(String::new());
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref() == INSTR_TEXT
                    && let Some(text) = current.take()
                {
                    texts.push(text);
                }
            }
            Event::Empty(_) => saw_root = true,
            Event::Text(t) => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(text) = current.as_mut() {
                    let raw = std::str::from_utf8(&c)
                        .map_err(|_| Error::Format("CDATA is not valid UTF-8".to_string()))?;
                    text.push_str(raw);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(Error::Format("document XML has no root element".to_string()));
    }
    if depth != 0 {
        return Err(Error::Format(format!(
            "document XML ends with {depth} unclosed element(s)"
        )));
    }

    Ok(texts)
}

fn beacon_fragment(url: &str) -> String {
    let url = quick_xml::escape::escape(url);
    format!(
        concat!(
            "<w:p>",
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText xml:space="preserve">INCLUDEPICTURE "{url}" \d</w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#,
            "<w:r><w:t> </w:t></w:r>",
            r#"<w:r><w:fldChar w:fldCharType="end"/></w:r>"#,
            "</w:p>",
        ),
        url = url
    )
}

fn splice_before_body_end(xml: &str, fragment: &str) -> Result<String> {
    let pos = xml
        .rfind(BODY_END)
        .ok_or_else(|| Error::Format(format!("{BODY_END} not found in {DOCUMENT_PART}")))?;

    let mut updated = String::with_capacity(xml.len() + fragment.len());
    updated.push_str(&xml[..pos]);
    updated.push_str(fragment);
    updated.push_str(&xml[pos..]);
    Ok(updated)
}

/// Rebuild the package in memory, raw-copying every entry except the body.
fn rebuild_package<R: Read + Seek>(archive: &mut ZipArchive<R>, body: &str) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        if entry.name() == DOCUMENT_PART {
            drop(entry);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(DOCUMENT_PART, options)?;
            writer.write_all(body.as_bytes())?;
        } else {
            writer.raw_copy_file(entry)?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

/// Replace `path` with `contents` via temp file, fsync and rename.
fn replace_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Format(format!("not a file path: {}", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        Uuid::new_v4()
    ));
    let permissions = fs::metadata(path)?.permissions();

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::set_permissions(&temp_path, permissions)?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}
