//! Typed XML tree for NeuroML documents.
//!
//! A [`Node`] owns its children outright: appending moves the child into the
//! parent, so a node can never sit in two places of the tree at once.

use indexmap::IndexMap;
use std::fmt;
use std::io::{self, Write};

use crate::{NeuroMLError, Result};

/// Default namespace of the document root
pub const NEUROML_NAMESPACE: &str = "http://morphml.org/neuroml/schema";

/// Schema location advertised on the root element
pub const SCHEMA_LOCATION: &str =
    "http://morphml.org/neuroml/schema ../../Schemata/v1.5/Level3/NeuroML_Level3_v1.5.xsd";

// ============================================================================
// NAMESPACES
// ============================================================================

/// Namespace prefixes used in NeuroML Level 3 documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// XML Schema instance
    Xsi,
    /// MorphML (morphology)
    Mml,
    /// NetworkML (populations, projections)
    Net,
    /// Metadata (notes, groups)
    Meta,
    /// Biophysics
    Bio,
    /// ChannelML (channel and synapse types)
    Cml,
}

impl Namespace {
    /// Every prefix declared on the document root
    pub const ALL: [Namespace; 6] = [
        Namespace::Xsi,
        Namespace::Mml,
        Namespace::Net,
        Namespace::Meta,
        Namespace::Bio,
        Namespace::Cml,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Xsi => "xsi",
            Namespace::Mml => "mml",
            Namespace::Net => "net",
            Namespace::Meta => "meta",
            Namespace::Bio => "bio",
            Namespace::Cml => "cml",
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Namespace::Xsi => "http://www.w3.org/2001/XMLSchema-instance",
            Namespace::Mml => "http://morphml.org/morphml/schema",
            Namespace::Net => "http://morphml.org/networkml/schema",
            Namespace::Meta => "http://morphml.org/metadata/schema",
            Namespace::Bio => "http://morphml.org/biophysics/schema",
            Namespace::Cml => "http://morphml.org/channelml/schema",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Namespace::ALL.into_iter().find(|ns| ns.prefix() == prefix)
    }
}

// ============================================================================
// ATTRIBUTE VALUES
// ============================================================================

/// Conversion of attribute values to their canonical string form
pub trait AttrValue {
    fn to_attr(&self) -> String;
}

impl AttrValue for f64 {
    fn to_attr(&self) -> String {
        format_float(*self)
    }
}

impl AttrValue for bool {
    fn to_attr(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }
}

impl AttrValue for str {
    fn to_attr(&self) -> String {
        self.to_string()
    }
}

impl AttrValue for String {
    fn to_attr(&self) -> String {
        self.clone()
    }
}

impl<T: AttrValue + ?Sized> AttrValue for &T {
    fn to_attr(&self) -> String {
        (**self).to_attr()
    }
}

macro_rules! int_attr {
    ($($t:ty),*) => {
        $(impl AttrValue for $t {
            fn to_attr(&self) -> String {
                self.to_string()
            }
        })*
    };
}

int_attr!(i32, i64, u32, u64, usize);

/// Render a float the way the document expects numbers.
///
/// Shortest round-trip digits, integral values keep a trailing `.0`, very
/// small or very large magnitudes switch to scientific notation with at
/// least two exponent digits (`5e-05`, `1e+16`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.into();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let repr = format!("{:e}", value);
        if let Some((mantissa, exponent)) = repr.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let sign = if exponent < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
            }
        }
        return repr;
    }
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

// ============================================================================
// NODES
// ============================================================================

/// One element of the output tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    namespace: Option<Namespace>,
    name: String,
    attributes: IndexMap<String, String>,
    text: Option<String>,
    children: Vec<Node>,
}

impl Node {
    /// Element in a prefixed namespace
    pub fn new(namespace: Namespace, name: &str) -> Self {
        Self {
            namespace: Some(namespace),
            name: name.to_string(),
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Element in the default (NeuroML) namespace
    pub fn unqualified(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl AttrValue) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Set (or overwrite in place) an attribute
    pub fn set_attr(&mut self, name: &str, value: impl AttrValue) {
        self.attributes.insert(name.to_string(), value.to_attr());
    }

    /// Move `child` to the end of this node's children
    pub fn append_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Remove and return every child, leaving this node empty
    pub fn take_children(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.children)
    }

    pub fn namespace(&self) -> Option<Namespace> {
        self.namespace
    }

    /// Local name, without prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `prefix:name`, or just `name` for unqualified nodes
    pub fn qualified_name(&self) -> String {
        match self.namespace {
            Some(ns) => format!("{}:{}", ns.prefix(), self.name),
            None => self.name.clone(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// First child with the given qualified name
    pub fn child(&self, qualified_name: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|c| c.qualified_name() == qualified_name)
    }

    /// All children with the given qualified name
    pub fn children_named<'a>(
        &'a self,
        qualified_name: &'a str,
    ) -> impl Iterator<Item = &'a Node> + 'a {
        self.children
            .iter()
            .filter(move |c| c.qualified_name() == qualified_name)
    }

    /// Follow a `/`-separated path of qualified names, first match at each step
    pub fn find(&self, path: &str) -> Option<&Node> {
        path.split('/')
            .filter(|step| !step.is_empty())
            .try_fold(self, |node, step| node.child(step))
    }

    /// Number of nodes in this subtree, this one included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    fn write_start<W: Write>(&self, out: &mut W, indent: &str, tag: &str) -> io::Result<()> {
        write!(out, "{}<{}", indent, tag)?;
        for (name, value) in &self.attributes {
            write!(out, " {}=\"{}\"", name, escape(value))?;
        }
        Ok(())
    }

    fn write_xml<W: Write>(&self, out: &mut W, depth: usize) -> io::Result<()> {
        self.write_with(out, depth, &[])
    }

    /// Write this node as if `extra` were appended to its children
    fn write_with<W: Write>(&self, out: &mut W, depth: usize, extra: &[&Node]) -> io::Result<()> {
        let indent = "  ".repeat(depth);
        let tag = self.qualified_name();
        self.write_start(out, &indent, &tag)?;

        let childless = self.children.is_empty() && extra.is_empty();
        match (&self.text, childless) {
            (None, true) => writeln!(out, "/>"),
            (Some(text), true) => writeln!(out, ">{}</{}>", escape(text), tag),
            (text, false) => {
                writeln!(out, ">")?;
                if let Some(text) = text {
                    writeln!(out, "{}  {}", indent, escape(text))?;
                }
                for child in self.children.iter().chain(extra.iter().copied()) {
                    child.write_xml(out, depth + 1)?;
                }
                writeln!(out, "{}</{}>", indent, tag)
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.write_xml(&mut buffer, 0).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buffer))
    }
}

/// Build a node from a `prefix:name` string.
///
/// An empty prefix (`":cells"`) gives an unqualified node. The node is not
/// attached anywhere.
pub fn build_node(
    qualified_name: &str,
    text: Option<&str>,
    attributes: &[(&str, &dyn AttrValue)],
) -> Result<Node> {
    let (prefix, local) = qualified_name.split_once(':').ok_or_else(|| {
        NeuroMLError::InvalidArgument(format!(
            "node name {:?} is not of the form prefix:name",
            qualified_name
        ))
    })?;
    if local.is_empty() {
        return Err(NeuroMLError::InvalidArgument(format!(
            "node name {:?} has no local part",
            qualified_name
        )));
    }
    let mut node = if prefix.is_empty() {
        Node::unqualified(local)
    } else {
        let ns = Namespace::from_prefix(prefix).ok_or_else(|| {
            NeuroMLError::InvalidArgument(format!("unknown namespace prefix {:?}", prefix))
        })?;
        Node::new(ns, local)
    };
    for (name, value) in attributes {
        node.set_attr(name, *value);
    }
    if let Some(text) = text {
        node.text = Some(text.to_string());
    }
    Ok(node)
}

/// True when every character may appear in an XML 1.0 document
pub fn is_xml_text(text: &str) -> bool {
    text.chars().all(|c| {
        matches!(c, '\t' | '\n' | '\r')
            || ('\u{20}'..='\u{D7FF}').contains(&c)
            || ('\u{E000}'..='\u{FFFD}').contains(&c)
            || c >= '\u{10000}'
    })
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// A complete document: XML declaration plus root element
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Node,
}

impl Document {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Serialize with two-space indentation
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_document(out, &self.root, &[])
    }

    pub fn to_xml_string(&self) -> String {
        let mut buffer = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Serialize a document whose root element also holds `sections`.
///
/// Same output as building the tree and calling [`Document::write_to`],
/// without moving or copying the sections into the root.
pub fn write_document<W: Write>(out: &mut W, root: &Node, sections: &[&Node]) -> io::Result<()> {
    writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    root.write_with(out, 0, sections)
}

/// Root `neuroml` element with namespace declarations and schema location
pub fn neuroml_root() -> Node {
    let mut root = Node::unqualified("neuroml").with_attr("xmlns", NEUROML_NAMESPACE);
    for ns in Namespace::ALL {
        root.set_attr(&format!("xmlns:{}", ns.prefix()), ns.uri());
    }
    root.with_attr("xsi:schemaLocation", SCHEMA_LOCATION)
        .with_attr("lengthUnits", "micron")
}
