//! Streaming XMLTV channel reader
//!
//! Walks a (possibly very large) XMLTV document with quick-xml and yields one
//! [`XmltvChannel`] per `<channel>` element. `<programme>` elements are
//! skipped wholesale without being materialised, so memory stays bounded by
//! the size of a single channel fragment.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::XmltvChannel;

const SOURCE_TYPE: &str = "xmltv";

enum Step {
    Channel(String),
    Skip(Vec<u8>),
    Continue,
}

/// Pull parser yielding channel fragments from an XMLTV document
pub struct XmltvChannelReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    skip_buf: Vec<u8>,
    finished: bool,
    skipped_programmes: u64,
}

impl XmltvChannelReader<BufReader<File>> {
    /// Open a downloaded listing file
    pub fn open(path: &Path) -> AppResult<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> XmltvChannelReader<R> {
    pub fn from_reader(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::new(),
            skip_buf: Vec::new(),
            finished: false,
            skipped_programmes: 0,
        }
    }

    /// Number of `<programme>` elements skipped so far
    pub fn skipped_programmes(&self) -> u64 {
        self.skipped_programmes
    }

    fn next_channel(&mut self) -> AppResult<Option<XmltvChannel>> {
        loop {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"channel" => Step::Channel(channel_id(&e)?),
                    b"programme" => Step::Skip(e.name().as_ref().to_vec()),
                    _ => Step::Continue,
                },
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"channel" => {
                    return Ok(Some(XmltvChannel {
                        id: channel_id(&e)?,
                        display_names: Vec::new(),
                        icon_src: None,
                    }));
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => Step::Continue,
                Err(e) => return Err(xml_error(e)),
            };

            match step {
                Step::Channel(id) => return self.read_channel_body(id).map(Some),
                Step::Skip(name) => {
                    self.skip_buf.clear();
                    self.reader
                        .read_to_end_into(QName(&name), &mut self.skip_buf)
                        .map_err(xml_error)?;
                    self.skipped_programmes += 1;
                }
                Step::Continue => {}
            }
        }
    }

    /// Consume events up to the matching `</channel>`
    fn read_channel_body(&mut self, id: String) -> AppResult<XmltvChannel> {
        let mut channel = XmltvChannel {
            id,
            display_names: Vec::new(),
            icon_src: None,
        };
        let mut text: Option<String> = None;

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"display-name" => text = Some(String::new()),
                    b"icon" => set_icon(&mut channel, &e),
                    _ => {}
                },
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"icon" => {
                    set_icon(&mut channel, &e)
                }
                Ok(Event::Text(e)) => {
                    if let Some(text) = text.as_mut() {
                        let raw = std::str::from_utf8(&e).map_err(|e| {
                            AppError::parse_error(SOURCE_TYPE, format!("Invalid UTF-8 in text: {e}"))
                        })?;
                        text.push_str(&unescape_lossy(raw));
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(text) = text.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if let Some(text) = text.as_mut() {
                        let name = String::from_utf8_lossy(&e);
                        match resolve_entity(&name) {
                            Some(resolved) => text.push_str(&resolved),
                            None => {
                                text.push('&');
                                text.push_str(&name);
                                text.push(';');
                            }
                        }
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"display-name" => {
                        if let Some(name) = text.take() {
                            let name = name.trim();
                            if !name.is_empty() {
                                channel.display_names.push(name.to_string());
                            }
                        }
                    }
                    b"channel" => return Ok(channel),
                    _ => {}
                },
                Ok(Event::Eof) => {
                    return Err(AppError::parse_error(
                        SOURCE_TYPE,
                        format!("Unexpected end of document inside channel '{}'", channel.id),
                    ))
                }
                Ok(_) => {}
                Err(e) => return Err(xml_error(e)),
            }
        }
    }
}

impl<R: BufRead> Iterator for XmltvChannelReader<R> {
    type Item = AppResult<XmltvChannel>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_channel() {
            Ok(Some(channel)) => Some(Ok(channel)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every channel fragment from `path` on the blocking pool
pub async fn read_channels(path: PathBuf) -> AppResult<Vec<XmltvChannel>> {
    tokio::task::spawn_blocking(move || {
        let mut reader = XmltvChannelReader::open(&path)?;
        let channels = reader.by_ref().collect::<AppResult<Vec<_>>>()?;
        debug!(
            "Parsed {} channels from {} (skipped {} programmes)",
            channels.len(),
            path.display(),
            reader.skipped_programmes()
        );
        Ok(channels)
    })
    .await
    .map_err(|e| AppError::internal(format!("XMLTV parser task failed: {e}")))?
}

fn channel_id(element: &BytesStart) -> AppResult<String> {
    parse_attributes(element)
        .remove("id")
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::parse_error(SOURCE_TYPE, "<channel> element without an id"))
}

fn set_icon(channel: &mut XmltvChannel, element: &BytesStart) {
    if channel.icon_src.is_none() {
        channel.icon_src = parse_attributes(element).remove("src");
    }
}

/// Parse XML attributes into a HashMap, decoding entity references
fn parse_attributes(element: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();

    for attr in element.attributes().flatten() {
        if let (Ok(key), Ok(value)) = (
            std::str::from_utf8(attr.key.as_ref()),
            std::str::from_utf8(&attr.value),
        ) {
            attrs.insert(key.to_string(), unescape_lossy(value));
        }
    }
    attrs
}

fn unescape_lossy(raw: &str) -> String {
    match quick_xml::escape::unescape(raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Resolve a predefined or numeric character reference (`amp`, `#38`, `#x26`)
fn resolve_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}

fn xml_error(e: quick_xml::Error) -> AppError {
    AppError::parse_error(SOURCE_TYPE, format!("XML parsing error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="f3932e75f691561adbe3b68a1d2c2254">
    <display-name>BBC One Lon</display-name>
    <display-name lang="en">BBC One London</display-name>
    <icon src="/logos/bbc1.png"/>
  </channel>
  <programme start="20181008000000 +0000" stop="20181008010000 +0000" channel="f3932e75f691561adbe3b68a1d2c2254">
    <title>News</title>
    <channel id="not-a-real-channel"/>
  </programme>
  <channel id="ucb">
    <display-name>UCB &amp; Friends &#38; Co</display-name>
  </channel>
  <channel id="empty"/>
</tv>"#;

    fn read_all(xml: &str) -> AppResult<Vec<XmltvChannel>> {
        XmltvChannelReader::from_reader(Cursor::new(xml.as_bytes().to_vec())).collect()
    }

    #[test]
    fn test_reads_channels_and_skips_programmes() {
        let mut reader = XmltvChannelReader::from_reader(Cursor::new(SAMPLE.as_bytes().to_vec()));
        let channels = reader.by_ref().collect::<AppResult<Vec<_>>>().unwrap();

        assert_eq!(reader.skipped_programmes(), 1);
        let ids: Vec<_> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["f3932e75f691561adbe3b68a1d2c2254", "ucb", "empty"]);

        let bbc = &channels[0];
        assert_eq!(bbc.display_names, vec!["BBC One Lon", "BBC One London"]);
        assert_eq!(bbc.icon_src.as_deref(), Some("/logos/bbc1.png"));
        assert!(channels[2].display_names.is_empty());
    }

    #[test]
    fn test_entities_are_decoded() {
        let channels = read_all(SAMPLE).unwrap();
        assert_eq!(channels[1].display_names, vec!["UCB & Friends & Co"]);
    }

    #[test]
    fn test_truncated_document_is_an_error() {
        let result = read_all("<tv><channel id=\"a\"><display-name>A</display-name>");
        assert!(matches!(result, Err(AppError::Parse { .. })));
    }

    #[test]
    fn test_channel_without_id_is_an_error() {
        let result = read_all("<tv><channel><display-name>A</display-name></channel></tv>");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_read_channels_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let channels = read_channels(path).await.unwrap();
        assert_eq!(channels.len(), 3);
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp").as_deref(), Some("&"));
        assert_eq!(resolve_entity("#x41").as_deref(), Some("A"));
        assert_eq!(resolve_entity("#66").as_deref(), Some("B"));
        assert_eq!(resolve_entity("nbsp"), None);
    }
}
