//! RSS 2.0 parsing
//!
//! Only the fields the pipeline uses are extracted from each `<item>`.

use chrono::DateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex_lite::Regex;
use std::sync::OnceLock;

/// One raw `<item>` from a feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

impl FeedItem {
    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
        }
    }
}

/// Parse the `<item>` elements of an RSS document.
///
/// Entities that cannot be unescaped (HTML ones such as `&nbsp;` are common
/// in feeds) are kept verbatim and cleaned up by [`strip_html`].
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    current = Some(FeedItem::default());
                } else if current.is_some() {
                    field = Field::from_tag(name.as_ref());
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                field = None;
            }
            Ok(Event::Text(t)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&t).into_owned(),
                    };
                    item.field_mut(f).push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.field_mut(f).push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.error_position(),
                    e
                ))
            }
        }
    }

    Ok(items)
}

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"))
}

fn whitespace_pattern() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Remove markup and common HTML entities, collapsing whitespace
pub fn strip_html(html: &str) -> String {
    let text = tag_pattern().replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#8217;", "'")
        .replace("&#8216;", "'")
        .replace("&#8220;", "\"")
        .replace("&#8221;", "\"")
        .replace("&#8211;", "-")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    whitespace_pattern().replace_all(&text, " ").trim().to_string()
}

/// Epoch seconds for an RSS date (RFC 2822, falling back to RFC 3339)
pub fn parse_pub_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Smart Property Investment</title>
    <link>https://www.smartpropertyinvestment.com.au</link>
    <item>
      <title>Brisbane values climb &amp; listings fall</title>
      <link>https://example.com/brisbane-values</link>
      <description><![CDATA[<p>Values in <b>Brisbane</b> rose&nbsp;1.2% in May.</p>]]></description>
      <pubDate>Mon, 03 Jun 2024 09:00:00 +1000</pubDate>
    </item>
    <item>
      <title>National rents</title>
      <link>https://example.com/rents</link>
      <description>Rents steady</description>
      <pubDate>2024-06-01T08:00:00Z</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_items() {
        let items = parse_feed(SAMPLE).unwrap();
        assert_eq!(items.len(), 2);
        // The channel title is not an item
        assert_eq!(items[0].title, "Brisbane values climb & listings fall");
        assert_eq!(items[0].link, "https://example.com/brisbane-values");
        assert_eq!(strip_html(&items[0].description), "Values in Brisbane rose 1.2% in May.");
        assert_eq!(items[1].description, "Rents steady");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_feed("<rss><channel><item><title>x</item></rss>").is_err());
        assert!(parse_feed("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_pub_date() {
        assert_eq!(parse_pub_date("Mon, 03 Jun 2024 09:00:00 +1000"), Some(1_717_369_200));
        assert_eq!(parse_pub_date("2024-06-01T08:00:00Z"), Some(1_717_228_800));
        assert_eq!(parse_pub_date("yesterday"), None);
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<div>a\n\n  b</div>"), "a b");
        assert_eq!(strip_html("Tom &amp; Jerry&#8217;s"), "Tom & Jerry's");
    }
}
