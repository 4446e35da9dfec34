//! Owned XML element tree
//!
//! The import/export pipelines work on a small owned tree rather than on
//! streaming events: documents are bounded (one week of schedule data), the
//! exporter needs random-access construction, and the pruner needs in-place
//! removal. Parsing and serialization are done with quick-xml events.

use quick_xml::Reader;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::error::{Result, ScheduleXmlError};

/// A single XML element: tag, attributes in document order, text content,
/// child elements in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((name.into(), value.into()));
    }

    /// First child element with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Text content of the first child with the given tag.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).map(|c| c.text.as_str())
    }

    /// Append a child element and return a mutable reference to it.
    pub fn add_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        self.children.last_mut().expect("push succeeded")
    }

    /// Convenience for the exporter: append `<tag>text</tag>`.
    pub fn add_text_child(&mut self, tag: impl Into<String>, text: impl Into<String>) {
        let mut child = Element::new(tag);
        child.text = text.into();
        self.children.push(child);
    }

    /// An element is recursively empty iff its own text content is empty
    /// and all of its children are recursively empty. Attributes do not
    /// count.
    pub fn is_recursively_empty(&self) -> bool {
        self.text.is_empty() && self.children.iter().all(Element::is_recursively_empty)
    }

    /// Remove recursively empty descendants, bottom-up. The element itself
    /// is never removed. Children are pruned first, then the survivors are
    /// re-checked, so a child whose entire subtree was empty goes away in
    /// the same pass. Idempotent.
    pub fn prune_empty(&mut self) {
        for child in &mut self.children {
            child.prune_empty();
        }
        self.children.retain(|c| !c.is_recursively_empty());
    }

    /// Tag with any namespace prefix stripped.
    pub fn local_tag(&self) -> &str {
        local_name(&self.tag)
    }
}

/// Strip a namespace prefix from an XML name ("xs:element" -> "element").
pub fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Parse an XML document into an element tree. Comments, processing
/// instructions and the declaration are discarded; whitespace-only text is
/// dropped.
pub fn parse(input: &str) -> Result<Element> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let map_err = |e: quick_xml::Error| ScheduleXmlError::Parse {
        details: e.to_string(),
    };

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(map_err)? {
            Event::Start(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(ScheduleXmlError::Parse {
                        details: "multiple root elements".to_string(),
                    });
                }
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| ScheduleXmlError::Parse {
                    details: "unbalanced end tag".to_string(),
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let unescaped = text.unescape().map_err(map_err)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            // Comments are stripped on import by contract; declarations
            // and processing instructions carry nothing the tree keeps.
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ScheduleXmlError::Parse {
            details: "unexpected end of document".to_string(),
        });
    }
    root.ok_or_else(|| ScheduleXmlError::Parse {
        details: "document has no root element".to_string(),
    })
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let map_err = |details: String| ScheduleXmlError::Parse { details };

    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| map_err(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| map_err(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(ScheduleXmlError::Parse {
                    details: "multiple root elements".to_string(),
                });
            }
            *root = Some(element);
            Ok(())
        }
    }
}

/// Serialize a tree as UTF-8, tab-indented, pretty-printed XML with an XML
/// declaration. Output is deterministic: the same tree always produces the
/// same bytes.
pub fn to_pretty_xml(root: &Element) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| ScheduleXmlError::Serialize {
            details: e.to_string(),
        })?;
    write_element(&mut writer, root)?;

    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|e| ScheduleXmlError::Serialize {
        details: e.to_string(),
    })
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let map_err = |e| ScheduleXmlError::Serialize {
        details: format!("{e}"),
    };

    let mut start = BytesStart::new(element.tag.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.text.is_empty() && element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(map_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(map_err)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(map_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.tag.as_str())))
        .map_err(map_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone_doc() -> &'static str {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<WeekSchedule>
    <!-- weekly grid -->
    <Mon>
        <Zone Name="Morning Show" Start="08:00:00">
            <Main>
                <Path>/srv/playlists/jazz.m3u</Path>
                <Shuffle>true</Shuffle>
            </Main>
        </Zone>
    </Mon>
    <Tue/>
</WeekSchedule>"#
    }

    #[test]
    fn test_parse_basic_structure() {
        let root = parse(zone_doc()).unwrap();
        assert_eq!(root.tag, "WeekSchedule");
        assert_eq!(root.children.len(), 2);

        let zone = root.children[0].child("Zone").unwrap();
        assert_eq!(zone.attr("Name"), Some("Morning Show"));
        assert_eq!(zone.attr("Start"), Some("08:00:00"));
        assert_eq!(
            zone.child("Main").unwrap().child_text("Path"),
            Some("/srv/playlists/jazz.m3u")
        );
    }

    #[test]
    fn test_parse_strips_comments() {
        let root = parse(zone_doc()).unwrap();
        // The comment between WeekSchedule and Mon leaves no trace.
        assert!(root.text.is_empty());
        assert_eq!(root.children[0].tag, "Mon");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("").is_err());
        assert!(parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_attribute_unescaping() {
        let root = parse(r#"<Zone Name="Rock &amp; Roll"/>"#).unwrap();
        assert_eq!(root.attr("Name"), Some("Rock & Roll"));
    }

    #[test]
    fn test_serialize_round_trip() {
        let root = parse(zone_doc()).unwrap();
        let xml = to_pretty_xml(&root).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains('\t'));
        assert!(xml.contains("<Tue/>"));

        let reparsed = parse(&xml).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn test_serialize_escapes_content() {
        let mut root = Element::new("Zone");
        root.set_attr("Name", "Rock & Roll");
        root.add_text_child("Comment", "a < b");

        let xml = to_pretty_xml(&root).unwrap();
        assert!(xml.contains("Rock &amp; Roll"));
        assert!(xml.contains("a &lt; b"));

        let reparsed = parse(&xml).unwrap();
        assert_eq!(reparsed.attr("Name"), Some("Rock & Roll"));
        assert_eq!(reparsed.child_text("Comment"), Some("a < b"));
    }

    #[test]
    fn test_recursive_emptiness() {
        let root = parse("<Zone><Fader><MinLevel></MinLevel></Fader></Zone>").unwrap();
        assert!(root.is_recursively_empty());

        let root = parse("<Zone><Fader><MinLevel>0.2</MinLevel></Fader></Zone>").unwrap();
        assert!(!root.is_recursively_empty());
    }

    #[test]
    fn test_prune_removes_empty_subtrees() {
        let mut root =
            parse("<Zone><Main><Path>/x.m3u</Path><Fader><MinLevel/></Fader></Main><Comment/></Zone>")
                .unwrap();
        root.prune_empty();

        let main = root.child("Main").unwrap();
        assert!(main.child("Fader").is_none());
        assert!(main.child("Path").is_some());
        assert!(root.child("Comment").is_none());
    }

    #[test]
    fn test_prune_is_idempotent() {
        let mut once = parse("<a><b><c/></b><d>x</d></a>").unwrap();
        once.prune_empty();
        let mut twice = once.clone();
        twice.prune_empty();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_prune_never_removes_self() {
        let mut root = parse("<a><b/></a>").unwrap();
        root.prune_empty();
        assert_eq!(root.tag, "a");
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("xs:element"), "element");
        assert_eq!(local_name("element"), "element");
    }
}
