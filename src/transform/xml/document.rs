//! Minimal mutable XML tree.
//!
//! Built from `quick-xml` events. DOCTYPE declarations are refused outright,
//! so no DTD is ever read and no external or custom entity is expanded; only
//! the five predefined entities and character references are unescaped.

use std::collections::HashSet;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

use crate::rewrite::RewriteError;
use crate::transform::xml::guard::ParseGuard;

const FORMAT: &str = "xml";

/// `<?xml … ?>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Qualified name, prefix included.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(idx).1)
    }

    /// Concatenated text and CDATA of direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) | XmlNode::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Depth-first visit of this element and all descendants.
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut XmlElement)) {
        f(self);
        for child in &mut self.children {
            if let XmlNode::Element(el) = child {
                el.visit_mut(f);
            }
        }
    }

    /// Attributes count against the guard like events do; duplicates are
    /// caught with a set so huge start tags stay linear.
    fn from_start(start: &BytesStart<'_>, guard: &ParseGuard) -> Result<Self, RewriteError> {
        let name = utf8(start.name().as_ref())?;
        let mut attributes = Vec::new();
        let mut seen = HashSet::new();
        for (i, attr) in start.attributes().with_checks(false).enumerate() {
            guard.check(i as u64)?;
            let attr = attr.map_err(|e| RewriteError::parse(FORMAT, e))?;
            let key = utf8(attr.key.as_ref())?;
            if !seen.insert(key.clone()) {
                return Err(RewriteError::parse(
                    FORMAT,
                    format!("duplicate attribute `{key}` on <{name}>"),
                ));
            }
            let value = attr
                .unescape_value()
                .map_err(|e| RewriteError::parse(FORMAT, e))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl XmlNode {
    fn write(&self, out: &mut String) {
        match self {
            Self::Element(el) => el.write(out),
            Self::Text(text) => out.push_str(&partial_escape(text.as_str())),
            Self::CData(data) => {
                out.push_str("<![CDATA[");
                out.push_str(&data.replace("]]>", "]]]]><![CDATA[>"));
                out.push_str("]]>");
            }
            Self::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Self::ProcessingInstruction(pi) => {
                out.push_str("<?");
                out.push_str(pi);
                out.push_str("?>");
            }
        }
    }
}

/// A parsed document: optional declaration, the root element and whatever
/// comments or processing instructions surround it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub declaration: Option<XmlDeclaration>,
    prolog: Vec<XmlNode>,
    root: XmlElement,
    epilog: Vec<XmlNode>,
}

impl XmlDocument {
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    /// Parse under the guard's deadline and cancellation flag.
    pub fn parse(text: &str, guard: &ParseGuard) -> Result<Self, RewriteError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut declaration = None;
        let mut nodes = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut events: u64 = 0;

        loop {
            guard.check(events)?;
            events += 1;

            let event = reader.read_event().map_err(|e| {
                RewriteError::parse(FORMAT, format!("{e} at byte {}", reader.error_position()))
            })?;
            match event {
                Event::Decl(decl) => declaration = Some(read_declaration(&decl)?),
                Event::DocType(_) => {
                    return Err(RewriteError::parse(FORMAT, "DOCTYPE declarations are not accepted"))
                }
                Event::Start(start) => stack.push(XmlElement::from_start(&start, guard)?),
                Event::Empty(start) => {
                    let el = XmlElement::from_start(&start, guard)?;
                    attach(&mut stack, &mut nodes, XmlNode::Element(el))?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| RewriteError::parse(FORMAT, "unexpected closing tag"))?;
                    attach(&mut stack, &mut nodes, XmlNode::Element(el))?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| RewriteError::parse(FORMAT, e))?
                        .into_owned();
                    attach(&mut stack, &mut nodes, XmlNode::Text(text))?;
                }
                Event::CData(data) => {
                    attach(&mut stack, &mut nodes, XmlNode::CData(utf8(&data)?))?;
                }
                Event::Comment(comment) => {
                    attach(&mut stack, &mut nodes, XmlNode::Comment(utf8(&comment)?))?;
                }
                Event::PI(pi) => {
                    attach(&mut stack, &mut nodes, XmlNode::ProcessingInstruction(utf8(&pi)?))?;
                }
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(RewriteError::parse(
                FORMAT,
                format!("unclosed element <{}>", open.name),
            ));
        }
        let root_at = nodes
            .iter()
            .position(|n| matches!(n, XmlNode::Element(_)))
            .ok_or_else(|| RewriteError::parse(FORMAT, "no root element"))?;
        let epilog = nodes.split_off(root_at + 1);
        let Some(XmlNode::Element(root)) = nodes.pop() else {
            return Err(RewriteError::parse(FORMAT, "no root element"));
        };
        Ok(Self {
            declaration,
            prolog: nodes,
            root,
            epilog,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if let Some(decl) = &self.declaration {
            out.push_str("<?xml version=\"");
            out.push_str(&decl.version);
            out.push('"');
            if let Some(encoding) = &decl.encoding {
                out.push_str(" encoding=\"");
                out.push_str(encoding);
                out.push('"');
            }
            if let Some(standalone) = &decl.standalone {
                out.push_str(" standalone=\"");
                out.push_str(standalone);
                out.push('"');
            }
            out.push_str("?>");
        }
        for node in &self.prolog {
            node.write(&mut out);
        }
        self.root.write(&mut out);
        for node in &self.epilog {
            node.write(&mut out);
        }
        out
    }
}

fn attach(
    stack: &mut [XmlElement],
    nodes: &mut Vec<XmlNode>,
    node: XmlNode,
) -> Result<(), RewriteError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match &node {
        XmlNode::Element(_) if nodes.iter().any(|n| matches!(n, XmlNode::Element(_))) => {
            Err(RewriteError::parse(FORMAT, "more than one root element"))
        }
        XmlNode::Text(text) if !text.trim().is_empty() => {
            Err(RewriteError::parse(FORMAT, "text outside the root element"))
        }
        XmlNode::CData(_) => Err(RewriteError::parse(FORMAT, "CDATA outside the root element")),
        _ => {
            nodes.push(node);
            Ok(())
        }
    }
}

fn read_declaration(decl: &BytesDecl<'_>) -> Result<XmlDeclaration, RewriteError> {
    let version = utf8(&decl.version().map_err(|e| RewriteError::parse(FORMAT, e))?)?;
    let encoding = decl
        .encoding()
        .transpose()
        .map_err(|e| RewriteError::parse(FORMAT, e))?
        .map(|v| utf8(&v))
        .transpose()?;
    let standalone = decl
        .standalone()
        .transpose()
        .map_err(|e| RewriteError::parse(FORMAT, e))?
        .map(|v| utf8(&v))
        .transpose()?;
    Ok(XmlDeclaration {
        version,
        encoding,
        standalone,
    })
}

fn utf8(bytes: &[u8]) -> Result<String, RewriteError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| RewriteError::parse(FORMAT, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn parse(text: &str) -> Result<XmlDocument, RewriteError> {
        XmlDocument::parse(text, &ParseGuard::unbounded())
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let text = concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<!-- caps --><wms:Capabilities xmlns:wms=\"http://www.opengis.net/wms\" version=\"1.3.0\">",
            "<Service><Title>Roads &amp; Rails</Title><Abstract><![CDATA[a < b]]></Abstract></Service>",
            "<Empty/></wms:Capabilities>"
        );
        let doc = parse(text).unwrap();
        assert_eq!(doc.root().local_name(), "Capabilities");
        assert_eq!(doc.root().attribute("version"), Some("1.3.0"));
        assert_eq!(doc.to_xml(), text);
    }

    #[test]
    fn test_mutation_is_serialized() {
        let mut doc = parse(r#"<a href="http://x"><b>t</b></a>"#).unwrap();
        doc.root_mut().set_attribute("href", "http://y?a=1&b=2");
        doc.root_mut().remove_attribute("missing");
        doc.root_mut().visit_mut(&mut |el: &mut XmlElement| {
            if el.name == "b" {
                el.children = vec![XmlNode::Text("<u>".into())];
            }
        });
        assert_eq!(
            doc.to_xml(),
            r#"<a href="http://y?a=1&amp;b=2"><b>&lt;u&gt;</b></a>"#
        );
    }

    #[test]
    fn test_doctype_rejected() {
        let text = r#"<?xml version="1.0"?><!DOCTYPE lolz [<!ENTITY lol "lol">]><lolz>&lol;</lolz>"#;
        let err = parse(text).unwrap_err();
        assert!(matches!(err, RewriteError::Parse { .. }));
    }

    #[test]
    fn test_unknown_entity_rejected() {
        assert!(parse("<a>&xxe;</a>").is_err());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("just text").is_err());
        assert!(parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let err = parse(r#"<a x="1" y="2" x="3"/>"#).unwrap_err();
        assert!(matches!(err, RewriteError::Parse { .. }));
    }

    #[test]
    fn test_attribute_loop_checks_guard() {
        let start = BytesStart::from_content(r#"layer a="1" b="2""#, 5);
        let guard = ParseGuard::new(Duration::ZERO, Default::default());
        let err = XmlElement::from_start(&start, &guard).unwrap_err();
        assert!(matches!(err, RewriteError::ParseTimeout { .. }));
    }

    #[test]
    fn test_wide_start_tag_is_bounded() {
        let mut text = String::from("<a");
        for i in 0..60_000 {
            text.push_str(&format!(" a{i}=\"\""));
        }
        text.push_str("/>");

        let started = Instant::now();
        let guard = ParseGuard::new(Duration::from_millis(50), Default::default());
        match XmlDocument::parse(&text, &guard) {
            Ok(doc) => assert_eq!(doc.root().attributes.len(), 60_000),
            Err(err) => assert!(matches!(err, RewriteError::ParseTimeout { .. })),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_expired_guard_times_out() {
        let guard = ParseGuard::new(Duration::ZERO, Default::default());
        let err = XmlDocument::parse("<a/>", &guard).unwrap_err();
        assert!(matches!(err, RewriteError::ParseTimeout { .. }));
    }
}
