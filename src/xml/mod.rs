//! Minimal document-tree layer for the vendor XML formats.
//!
//! The configuration and variable-set builders only ever need a handful of
//! DOM capabilities: create an element or text node, attach it, replace or
//! remove a child, and look nodes up by a slash-separated path of local names.
//! Those capabilities form the [`DocumentTree`] trait so the builders in
//! [`crate::services`] are written against the trait rather than against a
//! concrete XML library.
//!
//! [`XmlDocument`] is the implementation used by the crate: an arena of nodes
//! parsed from and serialized to text with `quick-xml`.
//!
//! Paths match on *local* names, so `Process/Mutators` finds
//! `<cf:Process><cf:Mutators/>` as well as an unprefixed `<Process><Mutators/>`.
//! New elements created through [`DocumentTree::append_element`] reuse the
//! namespace prefix of their parent, which keeps injected nodes in the
//! vendor namespace regardless of how a template declares it.

use crate::error::{PreflightError, Result};
use camino::Utf8Path;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;

/// Handle to a node inside an [`XmlDocument`]
pub type NodeId = usize;

/// DOM-like capability set used by the document builders.
pub trait DocumentTree {
    type Node: Copy + Eq + std::fmt::Debug;

    /// The document element
    fn root(&self) -> Self::Node;

    /// Create a detached element with a qualified name (`prefix:local` or `local`)
    fn create_element(&mut self, name: &str) -> Self::Node;

    /// Create a detached text node
    fn create_text(&mut self, text: &str) -> Self::Node;

    fn append_child(&mut self, parent: Self::Node, child: Self::Node);

    /// Put `new_child` at the position of `old_child` under `parent`
    fn replace_child(
        &mut self,
        parent: Self::Node,
        new_child: Self::Node,
        old_child: Self::Node,
    ) -> Result<()>;

    fn remove_child(&mut self, parent: Self::Node, child: Self::Node) -> Result<()>;

    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Qualified element name, `None` for text nodes
    fn name(&self, node: Self::Node) -> Option<&str>;

    /// Concatenated text of all descendant text nodes
    fn text(&self, node: Self::Node) -> String;

    /// Elements reached from `from` by following a slash-separated path of local names
    fn select(&self, from: Self::Node, path: &str) -> Vec<Self::Node> {
        let mut current = vec![from];

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let mut next = Vec::new();
            for node in current {
                for child in self.children(node) {
                    let matches = self
                        .name(child)
                        .is_some_and(|name| segment == "*" || local_name(name) == segment);
                    if matches {
                        next.push(child);
                    }
                }
            }
            current = next;
        }

        current
    }

    /// Exactly one element at `path`; anything else is a structural error
    fn select_one(&self, from: Self::Node, path: &str) -> Result<Self::Node> {
        let found = self.select(from, path);
        match found.as_slice() {
            [node] => Ok(*node),
            [] => Err(PreflightError::Structural(format!(
                "required element '{}' is missing",
                path
            ))),
            _ => Err(PreflightError::Structural(format!(
                "element '{}' must occur once, found {}",
                path,
                found.len()
            ))),
        }
    }

    /// First direct child element with the given local name
    fn find_child(&self, parent: Self::Node, local: &str) -> Option<Self::Node> {
        self.select(parent, local).into_iter().next()
    }

    /// Create `local` with the parent's namespace prefix, optionally holding text,
    /// and append it to `parent`
    fn append_element(
        &mut self,
        parent: Self::Node,
        local: &str,
        text: Option<&str>,
    ) -> Self::Node {
        let element = self.create_child_element(parent, local, text);
        self.append_child(parent, element);
        element
    }

    /// Like [`append_element`](Self::append_element) but leaves the element detached
    fn create_child_element(
        &mut self,
        parent: Self::Node,
        local: &str,
        text: Option<&str>,
    ) -> Self::Node {
        let name = match self.name(parent).and_then(prefix) {
            Some(p) => format!("{}:{}", p, local),
            None => local.to_string(),
        };
        let element = self.create_element(&name);
        if let Some(text) = text {
            let text_node = self.create_text(text);
            self.append_child(element, text_node);
        }
        element
    }

    /// Replace every child of `element` with a single text node
    fn set_text(&mut self, element: Self::Node, text: &str) -> Result<()> {
        for child in self.children(element) {
            self.remove_child(element, child)?;
        }
        let text_node = self.create_text(text);
        self.append_child(element, text_node);
        Ok(())
    }
}

/// Part of a qualified name after the prefix
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Namespace prefix of a qualified name, if any
pub fn prefix(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    /// Comment body, kept as written
    Comment(String),
    /// Target and content, e.g. `xml-stylesheet href="a.css"`
    ProcessingInstruction(String),
    DocType(String),
}

impl NodeKind {
    fn is_layout_whitespace(&self) -> bool {
        matches!(self, NodeKind::Text(text) if text.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed XML document.
///
/// Detached or removed nodes stay in the arena until the document is dropped;
/// documents here are small and short-lived.
///
/// Comments, processing instructions and a DOCTYPE survive a parse and
/// serialize cycle, including those outside the document element. Text is
/// kept exactly; only whitespace that merely indents element children is
/// dropped, and the serializer re-indents.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
    /// Nodes before the document element
    prolog: Vec<NodeId>,
    /// Nodes after the document element
    epilog: Vec<NodeId>,
}

impl XmlDocument {
    /// Empty document whose root element carries the given attributes
    pub fn new(root_name: &str, attributes: &[(&str, &str)]) -> Self {
        let root = NodeData {
            kind: NodeKind::Element {
                name: root_name.to_string(),
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: 0,
            prolog: Vec::new(),
            epilog: Vec::new(),
        }
    }

    /// Parse a document from text.
    ///
    /// Whitespace-only text is dropped from elements that also hold child
    /// elements; all other text is kept as written.
    pub fn parse(xml: &str) -> Result<Self> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);

        let mut doc: Option<XmlDocument> = None;
        let mut stack: Vec<NodeId> = Vec::new();
        let mut prolog: Vec<NodeKind> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = open_element(&mut doc, &stack, &e, &mut prolog)?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    open_element(&mut doc, &stack, &e, &mut prolog)?;
                }
                Ok(Event::End(_)) => {
                    if let (Some(d), Some(id)) = (doc.as_mut(), stack.pop()) {
                        d.drop_layout_whitespace(id);
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| PreflightError::Xml(err.to_string()))?
                        .into_owned();
                    push_text(&mut doc, &stack, text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    push_text(&mut doc, &stack, text);
                }
                Ok(Event::Comment(e)) => {
                    let body = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    push_markup(&mut doc, &stack, &mut prolog, NodeKind::Comment(body));
                }
                Ok(Event::PI(e)) => {
                    let body = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    push_markup(
                        &mut doc,
                        &stack,
                        &mut prolog,
                        NodeKind::ProcessingInstruction(body),
                    );
                }
                Ok(Event::DocType(e)) => {
                    let body = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    push_markup(&mut doc, &stack, &mut prolog, NodeKind::DocType(body));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PreflightError::Xml(format!(
                        "parse error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                // the declaration is regenerated on output
                Ok(Event::Decl(_)) => {}
            }
        }

        if !stack.is_empty() {
            return Err(PreflightError::Xml("unexpected end of document".to_string()));
        }

        doc.ok_or_else(|| PreflightError::Xml("document has no root element".to_string()))
    }

    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PreflightError::Filesystem(format!("failed to read {}: {}", path, e))
        })?;
        Self::parse(&content)
    }

    /// Serialize with an XML declaration and two-space indentation
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
        for &node in self.prolog.iter().chain([&self.root]).chain(&self.epilog) {
            self.write_node(&mut writer, node)?;
        }

        String::from_utf8(writer.into_inner()).map_err(|e| PreflightError::Xml(e.to_string()))
    }

    /// Serialize and write to `path`, replacing any existing file
    pub fn write_to(&self, path: &Utf8Path) -> Result<()> {
        let xml = self.to_xml_string()?;
        fs::write(path, xml).map_err(|e| {
            PreflightError::Filesystem(format!("failed to write {}: {}", path, e))
        })?;
        tracing::debug!("Wrote XML document to {}", path);
        Ok(())
    }

    /// Attribute value on an element
    pub fn attribute(&self, node: NodeId, key: &str) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Remove indentation text from an element that has non-text children
    fn drop_layout_whitespace(&mut self, element: NodeId) {
        let children = &self.nodes[element].children;
        if children
            .iter()
            .all(|&c| matches!(self.nodes[c].kind, NodeKind::Text(_)))
        {
            return;
        }

        let layout: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| self.nodes[c].kind.is_layout_whitespace())
            .collect();
        for child in layout {
            self.detach(child);
        }
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old_parent) = self.nodes[child].parent.take() {
            self.nodes[old_parent].children.retain(|&c| c != child);
        }
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, node: NodeId) -> Result<()> {
        let data = &self.nodes[node];
        match &data.kind {
            NodeKind::Text(text) => {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(write_error)?;
            }
            NodeKind::Comment(body) => {
                writer
                    .write_event(Event::Comment(BytesText::from_escaped(body.as_str())))
                    .map_err(write_error)?;
            }
            NodeKind::ProcessingInstruction(body) => {
                writer
                    .write_event(Event::PI(BytesPI::new(body.as_str())))
                    .map_err(write_error)?;
            }
            NodeKind::DocType(body) => {
                writer
                    .write_event(Event::DocType(BytesText::from_escaped(body.as_str())))
                    .map_err(write_error)?;
            }
            NodeKind::Element { name, attributes } => {
                let mut start = BytesStart::new(name.as_str());
                for (key, value) in attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }

                if data.children.is_empty() {
                    writer.write_event(Event::Empty(start)).map_err(write_error)?;
                } else {
                    writer.write_event(Event::Start(start)).map_err(write_error)?;
                    for &child in &data.children {
                        self.write_node(writer, child)?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new(name.as_str())))
                        .map_err(write_error)?;
                }
            }
        }
        Ok(())
    }
}

impl DocumentTree for XmlDocument {
    type Node = NodeId;

    fn root(&self) -> NodeId {
        self.root
    }

    fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_string(),
            attributes: Vec::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    fn replace_child(&mut self, parent: NodeId, new_child: NodeId, old_child: NodeId) -> Result<()> {
        if new_child == old_child {
            return if self.nodes[old_child].parent == Some(parent) {
                Ok(())
            } else {
                Err(PreflightError::Structural(
                    "node to replace is not a child of the parent".to_string(),
                ))
            };
        }

        let position = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == old_child)
            .ok_or_else(|| {
                PreflightError::Structural("node to replace is not a child of the parent".to_string())
            })?;

        self.detach(new_child);
        // detaching may have shifted the position when both share the parent
        let position = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == old_child)
            .unwrap_or(position);

        self.nodes[parent].children[position] = new_child;
        self.nodes[new_child].parent = Some(parent);
        self.nodes[old_child].parent = None;
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.nodes[child].parent != Some(parent) {
            return Err(PreflightError::Structural(
                "node to remove is not a child of the parent".to_string(),
            ));
        }
        self.detach(child);
        Ok(())
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node].children.clone()
    }

    fn name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node].kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    fn text(&self, node: NodeId) -> String {
        match &self.nodes[node].kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Element { .. } => self.nodes[node]
                .children
                .iter()
                .map(|&c| self.text(c))
                .collect(),
            _ => String::new(),
        }
    }
}

fn write_error(e: impl std::fmt::Display) -> PreflightError {
    PreflightError::Xml(format!("failed to serialize document: {}", e))
}

fn open_element(
    doc: &mut Option<XmlDocument>,
    stack: &[NodeId],
    start: &BytesStart<'_>,
    prolog: &mut Vec<NodeKind>,
) -> Result<NodeId> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| PreflightError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| PreflightError::Xml(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    if doc.is_none() {
        let mut d = XmlDocument {
            nodes: vec![NodeData {
                kind: NodeKind::Element { name, attributes },
                parent: None,
                children: Vec::new(),
            }],
            root: 0,
            prolog: Vec::new(),
            epilog: Vec::new(),
        };
        for kind in prolog.drain(..) {
            let id = d.push(kind);
            d.prolog.push(id);
        }
        let root = d.root;
        *doc = Some(d);
        return Ok(root);
    }

    let Some(&parent) = stack.last() else {
        return Err(PreflightError::Xml(format!(
            "second root element '{}'",
            name
        )));
    };

    let d = doc
        .as_mut()
        .ok_or_else(|| PreflightError::Xml("document has no root element".to_string()))?;
    let id = d.push(NodeKind::Element { name, attributes });
    d.append_child(parent, id);
    Ok(id)
}

/// Comment, processing instruction or DOCTYPE, inside or around the root
fn push_markup(
    doc: &mut Option<XmlDocument>,
    stack: &[NodeId],
    prolog: &mut Vec<NodeKind>,
    kind: NodeKind,
) {
    let Some(d) = doc.as_mut() else {
        prolog.push(kind);
        return;
    };
    let id = d.push(kind);
    match stack.last() {
        Some(&parent) => d.append_child(parent, id),
        None => d.epilog.push(id),
    }
}

fn push_text(doc: &mut Option<XmlDocument>, stack: &[NodeId], text: String) {
    if text.is_empty() {
        return;
    }
    if let (Some(d), Some(&parent)) = (doc.as_mut(), stack.last()) {
        let id = d.push(NodeKind::Text(text));
        d.append_child(parent, id);
    }
}
