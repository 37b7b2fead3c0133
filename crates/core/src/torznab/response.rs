//! Parsers for Torznab XML documents: the `t=caps` capability document and
//! RSS 2.0 search responses.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::metainfo::InfoHash;

use super::types::{Candidate, Capabilities, IdKind, TorznabError};

/// Parse a `t=caps` response.
pub fn parse_caps(xml: &str) -> Result<Capabilities, TorznabError> {
    let mut reader = Reader::from_str(xml);
    let mut caps = Capabilities::default();
    let mut saw_caps_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"caps" => saw_caps_element = true,
                b"search" => apply_search_mode(&e, &mut caps.search, &mut caps.id_params)?,
                b"tv-search" => apply_search_mode(&e, &mut caps.tv_search, &mut caps.id_params)?,
                b"movie-search" => {
                    apply_search_mode(&e, &mut caps.movie_search, &mut caps.id_params)?
                }
                b"category" => {
                    let id = attr_value(&e, b"id")?;
                    let name = attr_value(&e, b"name")?;
                    if let (Some(id), Some(name)) = (id.and_then(|v| v.parse().ok()), name) {
                        caps.categories.push((id, name));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(TorznabError::MalformedXml(e.to_string())),
        }
    }

    if !saw_caps_element {
        return Err(TorznabError::MissingField("caps"));
    }
    Ok(caps)
}

fn apply_search_mode(
    element: &BytesStart<'_>,
    available: &mut bool,
    id_params: &mut std::collections::BTreeSet<IdKind>,
) -> Result<(), TorznabError> {
    if attr_value(element, b"available")?.as_deref() == Some("yes") {
        *available = true;
    }
    if let Some(params) = attr_value(element, b"supportedParams")? {
        for param in params.split(',') {
            match param.trim() {
                "imdbid" => {
                    id_params.insert(IdKind::Imdb);
                }
                "tmdbid" => {
                    id_params.insert(IdKind::Tmdb);
                }
                "tvdbid" => {
                    id_params.insert(IdKind::Tvdb);
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Parse an RSS search response into candidates, preserving declared order.
pub fn parse_search(xml: &str, indexer_id: &str) -> Result<Vec<Candidate>, TorznabError> {
    let mut reader = Reader::from_str(xml);
    let mut candidates = Vec::new();

    let mut in_item = false;
    let mut capture: Option<&'static str> = None;
    let mut item = PartialItem::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => {
                    in_item = true;
                    item = PartialItem::default();
                }
                b"title" if in_item => capture = Some("title"),
                b"guid" if in_item => capture = Some("guid"),
                b"link" if in_item => capture = Some("link"),
                b"pubDate" if in_item => capture = Some("pubDate"),
                b"size" if in_item => capture = Some("size"),
                _ => {}
            },
            Ok(Event::Empty(e)) if in_item => match e.name().as_ref() {
                b"torznab:attr" => {
                    let name = attr_value(&e, b"name")?;
                    let value = attr_value(&e, b"value")?;
                    if let (Some(name), Some(value)) = (name, value) {
                        item.apply_attr(&name, &value);
                    }
                }
                b"enclosure" => {
                    if item.link.is_none() {
                        item.link = attr_value(&e, b"url")?;
                    }
                    if item.size.is_none() {
                        item.size = attr_value(&e, b"length")?.and_then(|v| v.parse().ok());
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(field) = capture {
                    let text = t
                        .unescape()
                        .map_err(|e| TorznabError::MalformedXml(e.to_string()))?
                        .trim()
                        .to_string();
                    if !text.is_empty() {
                        item.apply_text(field, text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                capture = None;
                if e.name().as_ref() == b"item" {
                    in_item = false;
                    candidates.push(item.finish(indexer_id)?);
                    item = PartialItem::default();
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(TorznabError::MalformedXml(e.to_string())),
        }
    }

    Ok(candidates)
}

#[derive(Default)]
struct PartialItem {
    title: Option<String>,
    guid: Option<String>,
    link: Option<String>,
    pub_date: Option<String>,
    size: Option<u64>,
    info_hash: Option<String>,
}

impl PartialItem {
    fn apply_text(&mut self, field: &str, text: String) {
        match field {
            "title" => self.title = Some(text),
            "guid" => self.guid = Some(text),
            "link" => self.link = Some(text),
            "pubDate" => self.pub_date = Some(text),
            "size" => {
                if self.size.is_none() {
                    self.size = text.parse().ok();
                }
            }
            _ => {}
        }
    }

    fn apply_attr(&mut self, name: &str, value: &str) {
        match name {
            // The torznab attribute is authoritative over the RSS <size>.
            "size" => self.size = value.parse().ok().or(self.size),
            "infohash" => self.info_hash = Some(value.to_string()),
            _ => {}
        }
    }

    fn finish(self, indexer_id: &str) -> Result<Candidate, TorznabError> {
        let name = self.title.ok_or(TorznabError::MissingField("item.title"))?;
        let link = self.link.ok_or(TorznabError::MissingField("item.link"))?;
        let guid = self.guid.unwrap_or_else(|| link.clone());
        let size = self.size.ok_or(TorznabError::MissingField("item.size"))?;

        Ok(Candidate {
            indexer_id: indexer_id.to_string(),
            guid,
            name,
            size,
            link,
            pub_date: self.pub_date.as_deref().and_then(parse_pub_date),
            info_hash_hint: self.info_hash.as_deref().and_then(|h| InfoHash::from_hex(h).ok()),
        })
    }
}

fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn attr_value(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, TorznabError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| TorznabError::MalformedXml(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| TorznabError::MalformedXml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
