use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use thiserror::Error;

use crate::feed::model::{
    parse_duration, parse_keywords, parse_timestamp, Channel, Enclosure, Feed, Guid, Image, Item,
    Owner, Timestamp,
};

/// Errors that fail the whole document. Anything softer (a bad pubDate, a
/// malformed attribute) is logged and decoded to the field's zero value.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("feed document has no <channel>")]
    MissingChannel,

    #[error("unexpected end of document inside <{0}>")]
    UnexpectedEof(&'static str),
}

/// Decodes a raw feed document into a [`Feed`].
///
/// Elements are matched on their local name, so `itunes:`-prefixed and plain
/// RSS elements both resolve. Unknown elements are skipped structurally;
/// absent optional channel children (owner, image, category) are not errors.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, ParseError> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut channel: Option<Channel> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"channel" => {
                channel = Some(parse_channel(&mut reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    channel
        .map(|channel| Feed { channel })
        .ok_or(ParseError::MissingChannel)
}

fn parse_channel(reader: &mut Reader<&[u8]>) -> Result<Channel, ParseError> {
    let mut channel = Channel::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"item" => channel.items.push(parse_item(reader)?),
                b"title" => channel.title = read_element_text(reader, e.name())?,
                b"description" => channel.description = read_element_text(reader, e.name())?,
                b"author" => channel.author = read_element_text(reader, e.name())?,
                b"link" => channel.link = read_element_text(reader, e.name())?,
                b"language" => channel.language = read_element_text(reader, e.name())?,
                b"copyright" => channel.copyright = read_element_text(reader, e.name())?,
                b"subtitle" => channel.subtitle = read_element_text(reader, e.name())?,
                b"summary" => channel.summary = read_element_text(reader, e.name())?,
                b"explicit" => channel.explicit = read_element_text(reader, e.name())?,
                b"owner" => channel.owner = Some(parse_owner(reader)?),
                b"category" => {
                    // itunes categories carry a text attribute (possibly with
                    // nested sub-categories); plain RSS categories carry text
                    if let Some(text) = attr_value(reader, &e, b"text")? {
                        channel.categories.push(text);
                        reader.read_to_end(e.name())?;
                    } else {
                        channel.categories.push(read_element_text(reader, e.name())?);
                    }
                }
                b"lastBuildDate" => {
                    channel.last_build = tolerant_timestamp(reader, e.name(), "lastBuildDate")?;
                }
                b"pubDate" => {
                    channel.pub_date = tolerant_timestamp(reader, e.name(), "pubDate")?;
                }
                // Everything else, including the RSS-style <image> block
                // (only the itunes href form is kept), is skipped structurally
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"image" => {
                    if let Some(href) = attr_value(reader, &e, b"href")? {
                        channel.image = Some(Image { href });
                    }
                }
                b"category" => {
                    if let Some(text) = attr_value(reader, &e, b"text")? {
                        channel.categories.push(text);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"channel" => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("channel")),
            _ => {}
        }
    }
    Ok(channel)
}

fn parse_item(reader: &mut Reader<&[u8]>) -> Result<Item, ParseError> {
    let mut item = Item::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"title" => item.title = read_element_text(reader, e.name())?,
                b"author" => item.author = read_element_text(reader, e.name())?,
                b"category" => item.category = read_element_text(reader, e.name())?,
                b"description" => item.description = read_element_text(reader, e.name())?,
                b"pubDate" => {
                    item.pub_date = tolerant_timestamp(reader, e.name(), "pubDate")?;
                }
                b"duration" => {
                    let raw = read_element_text(reader, e.name())?;
                    match parse_duration(&raw) {
                        Ok(d) => item.duration = Some(d),
                        Err(err) => {
                            tracing::warn!(value = %raw, error = %err, "Unparseable duration, leaving unset");
                        }
                    }
                }
                b"keywords" => {
                    item.keywords = parse_keywords(&read_element_text(reader, e.name())?);
                }
                b"guid" => {
                    let is_permalink = attr_value(reader, &e, b"isPermaLink")?
                        .map(|v| v != "false")
                        .unwrap_or(true);
                    let value = read_element_text(reader, e.name())?;
                    item.guid = Some(Guid {
                        value,
                        is_permalink,
                    });
                }
                b"enclosure" => {
                    item.enclosure = Some(parse_enclosure(reader, &e));
                    reader.read_to_end(e.name())?;
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"enclosure" {
                    item.enclosure = Some(parse_enclosure(reader, &e));
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"item" => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("item")),
            _ => {}
        }
    }
    Ok(item)
}

fn parse_owner(reader: &mut Reader<&[u8]>) -> Result<Owner, ParseError> {
    let mut owner = Owner::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => owner.name = read_element_text(reader, e.name())?,
                b"email" => owner.email = read_element_text(reader, e.name())?,
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"owner" => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("owner")),
            _ => {}
        }
    }
    Ok(owner)
}

fn parse_enclosure(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Enclosure {
    let mut enclosure = Enclosure::default();
    let decoder = reader.decoder();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed enclosure attribute");
                continue;
            }
        };
        let value = match attr.decode_and_unescape_value(decoder) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping undecodable enclosure attribute");
                continue;
            }
        };
        match attr.key.as_ref() {
            b"url" => enclosure.url = value.to_string(),
            b"type" => enclosure.mime_type = value.to_string(),
            b"length" => enclosure.length = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    enclosure
}

/// Collects the text (and CDATA) content of an element, skipping any nested
/// markup, and consumes through the matching end tag.
fn read_element_text(reader: &mut Reader<&[u8]>, end: QName<'_>) -> Result<String, ParseError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(quick_xml::Error::from)?),
            Event::CData(t) => text.push_str(&String::from_utf8_lossy(&t.into_inner())),
            Event::Start(nested) => {
                reader.read_to_end(nested.name())?;
            }
            Event::End(e) if e.name() == end => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("element")),
            _ => {}
        }
    }
    Ok(text.trim().to_string())
}

fn tolerant_timestamp(
    reader: &mut Reader<&[u8]>,
    end: QName<'_>,
    element: &str,
) -> Result<Option<Timestamp>, ParseError> {
    let raw = read_element_text(reader, end)?;
    match parse_timestamp(&raw) {
        Ok(ts) => Ok(Some(ts)),
        Err(err) => {
            tracing::warn!(element = element, value = %raw, error = %err, "Unparseable timestamp, leaving unset");
            Ok(None)
        }
    }
}

fn attr_value(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    name: &[u8],
) -> Result<Option<String>, ParseError> {
    let decoder = reader.decoder();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        if attr.key.as_ref() == name {
            return Ok(Some(attr.decode_and_unescape_value(decoder)?.to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" version="2.0">
  <channel>
    <title>Night Shift Radio</title>
    <link>https://nightshift.example.com</link>
    <description>Stories from after dark.</description>
    <language>en-us</language>
    <itunes:author>Night Shift Productions</itunes:author>
    <itunes:subtitle>After-dark stories</itunes:subtitle>
    <itunes:summary>Long-form audio stories.</itunes:summary>
    <itunes:explicit>no</itunes:explicit>
    <itunes:owner>
      <itunes:name>Dana Okafor</itunes:name>
      <itunes:email>dana@nightshift.example.com</itunes:email>
    </itunes:owner>
    <itunes:image href="https://nightshift.example.com/cover.jpg"/>
    <itunes:category text="Society &amp; Culture">
      <itunes:category text="Documentary"/>
    </itunes:category>
    <lastBuildDate>Fri, 10 Mar 2023 08:00:00 -0500</lastBuildDate>
    <item>
      <title>episode-101: the long commute</title>
      <itunes:author>Dana Okafor</itunes:author>
      <category>Documentary</category>
      <description><![CDATA[A story about <em>trains</em>.]]></description>
      <pubDate>Fri, 10 Mar 2023 06:00:00 -0500</pubDate>
      <itunes:duration>1:02:03</itunes:duration>
      <itunes:keywords>trains, commuting , night</itunes:keywords>
      <guid isPermaLink="false">nsr-101</guid>
      <enclosure url="https://cdn.example.com/nsr/101.mp3" type="audio/mpeg" length="44100000"/>
    </item>
    <item>
      <title>episode-102: closing time</title>
      <pubDate>Fri, 17 Mar 2023 06:00:00 -0500</pubDate>
      <itunes:duration>45:10</itunes:duration>
      <guid>https://nightshift.example.com/102</guid>
      <enclosure url="https://cdn.example.com/nsr/102.mp3" type="audio/mpeg" length="32000000"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_full_feed() {
        let feed = parse_feed(FULL_FEED.as_bytes()).unwrap();
        let channel = &feed.channel;

        assert_eq!(channel.title, "Night Shift Radio");
        assert_eq!(channel.description, "Stories from after dark.");
        assert_eq!(channel.author, "Night Shift Productions");
        assert_eq!(channel.language, "en-us");
        assert_eq!(channel.explicit, "no");
        assert_eq!(
            channel.owner.as_ref().unwrap().email,
            "dana@nightshift.example.com"
        );
        assert_eq!(
            channel.image.as_ref().unwrap().href,
            "https://nightshift.example.com/cover.jpg"
        );
        assert_eq!(channel.categories, vec!["Society & Culture", "Documentary"]);
        assert!(channel.last_build.is_some());
        assert_eq!(channel.items.len(), 2);
    }

    #[test]
    fn test_parse_item_fields() {
        let feed = parse_feed(FULL_FEED.as_bytes()).unwrap();
        let item = &feed.channel.items[0];

        assert_eq!(item.title, "episode-101: the long commute");
        assert_eq!(item.author, "Dana Okafor");
        assert_eq!(item.category, "Documentary");
        assert_eq!(item.description, "A story about <em>trains</em>.");
        assert_eq!(item.duration.unwrap().as_secs(), 3723);
        assert_eq!(item.keywords, vec!["trains", "commuting", "night"]);

        let guid = item.guid.as_ref().unwrap();
        assert_eq!(guid.value, "nsr-101");
        assert!(!guid.is_permalink);

        let enclosure = item.enclosure.as_ref().unwrap();
        assert_eq!(enclosure.url, "https://cdn.example.com/nsr/101.mp3");
        assert_eq!(enclosure.mime_type, "audio/mpeg");
        assert_eq!(enclosure.length, 44_100_000);
    }

    #[test]
    fn test_guid_defaults_to_permalink() {
        let feed = parse_feed(FULL_FEED.as_bytes()).unwrap();
        let guid = feed.channel.items[1].guid.as_ref().unwrap();
        assert!(guid.is_permalink);
        assert_eq!(guid.value, "https://nightshift.example.com/102");
    }

    #[test]
    fn test_minimal_channel_tolerated() {
        // No owner, image, category, or items: all optional
        let xml = r#"<rss version="2.0"><channel><title>Bare</title></channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.channel.title, "Bare");
        assert!(feed.channel.owner.is_none());
        assert!(feed.channel.image.is_none());
        assert!(feed.channel.categories.is_empty());
        assert!(feed.channel.items.is_empty());
    }

    #[test]
    fn test_item_without_enclosure_parses() {
        let xml = r#"<rss version="2.0"><channel><title>T</title>
            <item><title>no media</title></item>
        </channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.channel.items.len(), 1);
        assert!(feed.channel.items[0].enclosure.is_none());
    }

    #[test]
    fn test_invalid_pubdate_left_unset() {
        let xml = r#"<rss version="2.0"><channel><title>T</title>
            <item><title>x</title><pubDate>sometime in march</pubDate></item>
        </channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert!(feed.channel.items[0].pub_date.is_none());
    }

    #[test]
    fn test_invalid_duration_left_unset() {
        let xml = r#"<rss xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" version="2.0"><channel><title>T</title>
            <item><title>x</title><itunes:duration>about an hour</itunes:duration></item>
        </channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert!(feed.channel.items[0].duration.is_none());
    }

    #[test]
    fn test_missing_channel_is_error() {
        let xml = r#"<rss version="2.0"></rss>"#;
        let err = parse_feed(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::MissingChannel));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }

    #[test]
    fn test_unknown_elements_skipped() {
        let xml = r#"<rss version="2.0"><channel>
            <title>T</title>
            <fancyExtension><nested><deep>stuff</deep></nested></fancyExtension>
            <item><title>x</title><customTag>y</customTag></item>
        </channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.channel.title, "T");
        assert_eq!(feed.channel.items.len(), 1);
    }

    #[test]
    fn test_items_preserve_document_order() {
        let feed = parse_feed(FULL_FEED.as_bytes()).unwrap();
        let titles: Vec<&str> = feed
            .channel
            .items
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec!["episode-101: the long commute", "episode-102: closing time"]
        );
    }
}
