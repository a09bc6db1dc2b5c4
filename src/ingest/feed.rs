// src/ingest/feed.rs
//! Syndication document parsing.
//!
//! The format is detected once from the root element (`rss` / `rdf:RDF` for
//! item-list feeds, `feed` for entry-list feeds) and the document is read into a
//! [`FeedDocument`]. Both variants lower into the same [`RawItem`] shape, which is
//! the only thing the normalizer looks at.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// RSS 2.0 / RSS 1.0 (RDF): `<item>` elements.
    ItemList,
    /// Atom: `<entry>` elements.
    EntryList,
}

impl FeedFormat {
    fn from_root(local_name: &[u8]) -> Option<Self> {
        match local_name {
            b"rss" | b"RDF" => Some(Self::ItemList),
            b"feed" => Some(Self::EntryList),
            _ => None,
        }
    }

    fn entry_tag(self) -> &'static [u8] {
        match self {
            Self::ItemList => b"item",
            Self::EntryList => b"entry",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub pub_date: Option<String>,
    pub dc_date: Option<String>,
    pub description: Option<String>,
    pub content_encoded: Option<String>,
    pub guid: Option<String>,
    /// RSS 2.0 treats a guid as a permalink unless `isPermaLink="false"`.
    pub guid_is_permalink: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomLink {
    pub href: String,
    pub rel: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomEntry {
    pub title: Option<String>,
    pub links: Vec<AtomLink>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedDocument {
    ItemList(Vec<RssEntry>),
    EntryList(Vec<AtomEntry>),
}

/// Format-independent entry handed to the normalizer. Text fields are still raw
/// (may contain markup and entities).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: Option<String>,
    pub published: Option<String>,
    pub body: String,
    pub guid: Option<String>,
}

impl FeedDocument {
    pub fn format(&self) -> FeedFormat {
        match self {
            Self::ItemList(_) => FeedFormat::ItemList,
            Self::EntryList(_) => FeedFormat::EntryList,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::ItemList(v) => v.len(),
            Self::EntryList(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_raw_items(self) -> Vec<RawItem> {
        match self {
            Self::ItemList(v) => v.into_iter().map(RssEntry::into_raw).collect(),
            Self::EntryList(v) => v.into_iter().map(AtomEntry::into_raw).collect(),
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn longer(a: Option<String>, b: Option<String>) -> String {
    match (non_empty(a), non_empty(b)) {
        (Some(a), Some(b)) => {
            if b.len() > a.len() {
                b
            } else {
                a
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => String::new(),
    }
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}

impl RssEntry {
    fn into_raw(self) -> RawItem {
        let guid = non_empty(self.guid);
        let link = non_empty(self.link).or_else(|| {
            guid.as_ref()
                .filter(|g| self.guid_is_permalink && looks_like_url(g))
                .cloned()
        });
        RawItem {
            title: non_empty(self.title).unwrap_or_default(),
            link,
            published: non_empty(self.pub_date).or_else(|| non_empty(self.dc_date)),
            body: longer(self.description, self.content_encoded),
            guid,
        }
    }
}

impl AtomEntry {
    fn into_raw(self) -> RawItem {
        let alternate = self
            .links
            .iter()
            .find(|l| {
                !l.href.trim().is_empty()
                    && matches!(l.rel.as_deref(), None | Some("alternate"))
            })
            .or_else(|| self.links.iter().find(|l| !l.href.trim().is_empty()))
            .map(|l| l.href.trim().to_string());
        RawItem {
            title: non_empty(self.title).unwrap_or_default(),
            link: alternate,
            published: non_empty(self.published).or_else(|| non_empty(self.updated)),
            body: longer(self.summary, self.content),
            guid: non_empty(self.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    PubDate,
    DcDate,
    Description,
    ContentEncoded,
    Guid,
    Published,
    Updated,
    Summary,
    Content,
    Id,
}

enum Entry {
    Rss(RssEntry),
    Atom(AtomEntry),
}

impl Entry {
    fn new(format: FeedFormat) -> Self {
        match format {
            FeedFormat::ItemList => Entry::Rss(RssEntry {
                guid_is_permalink: true,
                ..RssEntry::default()
            }),
            FeedFormat::EntryList => Entry::Atom(AtomEntry::default()),
        }
    }

    fn field_for(&self, qname: &[u8], local: &[u8]) -> Option<Field> {
        match self {
            Entry::Rss(_) => match qname {
                b"content:encoded" => Some(Field::ContentEncoded),
                b"dc:date" => Some(Field::DcDate),
                _ => match local {
                    b"title" => Some(Field::Title),
                    b"link" => Some(Field::Link),
                    b"pubDate" => Some(Field::PubDate),
                    b"description" => Some(Field::Description),
                    b"guid" => Some(Field::Guid),
                    _ => None,
                },
            },
            Entry::Atom(_) => match local {
                b"title" => Some(Field::Title),
                b"published" => Some(Field::Published),
                b"updated" => Some(Field::Updated),
                b"summary" => Some(Field::Summary),
                b"content" => Some(Field::Content),
                b"id" => Some(Field::Id),
                _ => None,
            },
        }
    }

    fn set(&mut self, field: Field, value: String) {
        match self {
            Entry::Rss(e) => match field {
                Field::Title => e.title = Some(value),
                Field::Link => e.link = Some(value),
                Field::PubDate => e.pub_date = Some(value),
                Field::DcDate => e.dc_date = Some(value),
                Field::Description => e.description = Some(value),
                Field::ContentEncoded => e.content_encoded = Some(value),
                Field::Guid => e.guid = Some(value),
                _ => {}
            },
            Entry::Atom(e) => match field {
                Field::Title => e.title = Some(value),
                Field::Published => e.published = Some(value),
                Field::Updated => e.updated = Some(value),
                Field::Summary => e.summary = Some(value),
                Field::Content => e.content = Some(value),
                Field::Id => e.id = Some(value),
                _ => {}
            },
        }
    }

    /// Attribute-carrying children: Atom `<link href rel>` and RSS `<guid isPermaLink>`.
    fn absorb_attributes(&mut self, local: &[u8], start: &BytesStart<'_>) {
        match self {
            Entry::Atom(e) if local == b"link" => {
                let mut link = AtomLink::default();
                for attr in start.attributes().with_checks(false).flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                    match attr.key.local_name().as_ref() {
                        b"href" => link.href = value,
                        b"rel" => link.rel = Some(value),
                        _ => {}
                    }
                }
                e.links.push(link);
            }
            Entry::Rss(e) if local == b"guid" => {
                for attr in start.attributes().with_checks(false).flatten() {
                    if attr.key.local_name().as_ref() == b"isPermaLink" {
                        e.guid_is_permalink = !attr.value.eq_ignore_ascii_case(b"false");
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(self, format_items: &mut DocumentItems) {
        match (self, format_items) {
            (Entry::Rss(e), DocumentItems::Rss(v)) => v.push(e),
            (Entry::Atom(e), DocumentItems::Atom(v)) => v.push(e),
            _ => {}
        }
    }
}

enum DocumentItems {
    Rss(Vec<RssEntry>),
    Atom(Vec<AtomEntry>),
}

/// Detect the format from structural markers and read all entries.
pub fn parse_document(xml: &str) -> Result<FeedDocument> {
    let xml = xml.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(xml);

    let mut format: Option<FeedFormat> = None;
    let mut items: Option<DocumentItems> = None;
    let mut depth = 0usize;
    let mut current: Option<(Entry, usize)> = None;
    let mut capture: Option<(Field, usize)> = None;
    let mut buf = String::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            PipelineError::parse(
                "feed xml",
                format!("at byte {}: {e}", reader.buffer_position()),
            )
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = e.local_name();
                let local = local.as_ref();

                if format.is_none() {
                    let detected = FeedFormat::from_root(local).ok_or_else(|| {
                        PipelineError::parse(
                            "format detection",
                            format!(
                                "unrecognized root element <{}>",
                                String::from_utf8_lossy(e.name().as_ref())
                            ),
                        )
                    })?;
                    format = Some(detected);
                    items = Some(match detected {
                        FeedFormat::ItemList => DocumentItems::Rss(Vec::new()),
                        FeedFormat::EntryList => DocumentItems::Atom(Vec::new()),
                    });
                }
                let fmt = format.unwrap_or(FeedFormat::ItemList);

                if !is_empty {
                    depth += 1;
                }

                if current.is_none() {
                    if !is_empty && local == fmt.entry_tag() {
                        current = Some((Entry::new(fmt), depth));
                    }
                } else if capture.is_none() {
                    if let Some((entry, entry_depth)) = current.as_mut() {
                        let child_depth = if is_empty { depth + 1 } else { depth };
                        if child_depth == *entry_depth + 1 {
                            entry.absorb_attributes(local, e);
                            if !is_empty {
                                if let Some(field) = entry.field_for(e.name().as_ref(), local) {
                                    capture = Some((field, depth));
                                    buf.clear();
                                }
                            }
                        }
                    }
                }
            }
            Event::Text(t) => {
                if capture.is_some() {
                    let raw = String::from_utf8_lossy(&t);
                    buf.push_str(&html_escape::decode_html_entities(&raw));
                }
            }
            Event::CData(c) => {
                if capture.is_some() {
                    buf.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                if let Some((field, field_depth)) = capture {
                    if field_depth == depth {
                        if let Some((entry, _)) = current.as_mut() {
                            entry.set(field, std::mem::take(&mut buf));
                        }
                        capture = None;
                    } else {
                        // Markup nested inside a captured field keeps words apart.
                        buf.push(' ');
                    }
                }
                if matches!(current, Some((_, d)) if d == depth) {
                    if let (Some((entry, _)), Some(out)) = (current.take(), items.as_mut()) {
                        entry.finish(out);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => {
                if current.is_some() || depth > 0 {
                    tracing::warn!(
                        open_elements = depth,
                        entry_open = current.is_some(),
                        "feed document ended early; unfinished entry dropped"
                    );
                }
                break;
            }
            _ => {}
        }
    }

    match items {
        Some(DocumentItems::Rss(v)) => Ok(FeedDocument::ItemList(v)),
        Some(DocumentItems::Atom(v)) => Ok(FeedDocument::EntryList(v)),
        None => Err(PipelineError::parse(
            "format detection",
            "document has no root element",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example</title>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/a</link>
      <pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate>
      <description><![CDATA[<p>Short</p>]]></description>
      <content:encoded><![CDATA[<p>Much longer body text</p>]]></content:encoded>
      <guid isPermaLink="false">abc</guid>
    </item>
    <item>
      <title>Permalink only</title>
      <guid>https://example.com/b</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <entry>
    <title type="html">Atom &lt;b&gt;entry&lt;/b&gt;</title>
    <link rel="edit" href="https://example.com/edit/1"/>
    <link rel="alternate" href="https://example.com/post/1"/>
    <id>urn:uuid:1</id>
    <updated>2025-06-10T04:00:00Z</updated>
    <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Hello</p><p>world</p></div></content>
  </entry>
</feed>"#;

    #[test]
    fn detects_item_list_and_reads_fields() {
        let doc = parse_document(RSS).unwrap();
        assert_eq!(doc.format(), FeedFormat::ItemList);
        let raw = doc.into_raw_items();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].title, "First & foremost");
        assert_eq!(raw[0].link.as_deref(), Some("https://example.com/a"));
        assert_eq!(raw[0].guid.as_deref(), Some("abc"));
        assert_eq!(raw[0].body, "<p>Much longer body text</p>");
        assert_eq!(raw[1].link.as_deref(), Some("https://example.com/b"));
    }

    #[test]
    fn detects_entry_list_and_prefers_alternate_link() {
        let doc = parse_document(ATOM).unwrap();
        assert_eq!(doc.format(), FeedFormat::EntryList);
        let raw = doc.into_raw_items();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].link.as_deref(), Some("https://example.com/post/1"));
        assert_eq!(raw[0].published.as_deref(), Some("2025-06-10T04:00:00Z"));
        assert!(raw[0].body.contains("Hello"));
        assert!(raw[0].body.contains("world"));
        assert_eq!(raw[0].title, "Atom <b>entry</b>");
    }

    #[test]
    fn truncated_document_keeps_finished_entries() {
        let xml = "<rss><channel>\
            <item><title>done</title><link>https://e/done</link></item>\
            <item><title>x</title><link>https://e/a</link>";
        let raw = parse_document(xml).unwrap().into_raw_items();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].link.as_deref(), Some("https://e/done"));
    }

    #[test]
    fn unknown_root_is_a_parse_error() {
        let err = parse_document("<html><body>nope</body></html>").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_document("<rss><channel><item></channel></rss>").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn empty_document_is_a_parse_error() {
        assert!(parse_document("   ").is_err());
    }
}
