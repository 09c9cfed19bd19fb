//! HTML parser – converts template markup into a small DOM tree and back.
//!
//! This is not a browser-grade HTML5 parser. It handles the well-formed
//! markup templates are written in:
//! - elements with quoted, unquoted or bare attributes (order preserved)
//! - void elements (`img`, `br`, `meta`, `link`, …) with or without `/>`
//! - raw-text elements (`script`, `style`) whose content is kept verbatim
//! - doctype and comments, kept verbatim so serialization is faithful

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of an element, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Body,
    Table,
    Thead,
    Tbody,
    Tr,
    Th,
    Td,
    Img,
    Script,
    Style,
    InjectTable,
    InjectColumn,
    /// Any other element, kept by name.
    Other(String),
}

impl Tag {
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tr" => Tag::Tr,
            "th" => Tag::Th,
            "td" => Tag::Td,
            "img" => Tag::Img,
            "script" => Tag::Script,
            "style" => Tag::Style,
            "inject-table" => Tag::InjectTable,
            "inject-column" => Tag::InjectColumn,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Body => "body",
            Tag::Table => "table",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tr => "tr",
            Tag::Th => "th",
            Tag::Td => "td",
            Tag::Img => "img",
            Tag::Script => "script",
            Tag::Style => "style",
            Tag::InjectTable => "inject-table",
            Tag::InjectColumn => "inject-column",
            Tag::Other(name) => name,
        }
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        match self {
            Tag::Img => true,
            Tag::Other(name) => matches!(
                name.as_str(),
                "area" | "base" | "br" | "col" | "embed" | "hr" | "input" | "link" | "meta"
                    | "source" | "track" | "wbr"
            ),
            _ => false,
        }
    }

    /// Elements whose content is text up to the matching closing tag.
    pub fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Script | Tag::Style)
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
    /// Doctype, comments and processing instructions, serialized as-is.
    Raw(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn with_child(mut self, child: DomNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src")
    }

    /// All descendant elements with `tag`, in document order.
    pub fn descendants_with_tag<'a>(&'a self, tag: &Tag, out: &mut Vec<&'a ElementNode>) {
        for child in &self.children {
            if let DomNode::Element(e) = child {
                if &e.tag == tag {
                    out.push(e);
                }
                e.descendants_with_tag(tag, out);
            }
        }
    }

    /// Concatenated text content of this element.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => collect_text(&e.children, out),
            DomNode::Raw(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser::new(html);
    parser.parse_nodes(false)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parse siblings until EOF or an end tag. Inside an element any end tag
    /// stops the run and is left for the enclosing elements to match; at the
    /// top level an end tag has nothing to close and is dropped.
    fn parse_nodes(&mut self, inside_element: bool) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() {
            if self.starts_with("</") {
                if inside_element {
                    break;
                }
                self.skip_past(">");
                continue;
            }
            nodes.push(self.parse_node());
        }
        nodes
    }

    fn parse_node(&mut self) -> DomNode {
        if self.starts_with("<!--") {
            let start = self.pos;
            self.skip_past("-->");
            return DomNode::Raw(self.input[start..self.pos].to_string());
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            let start = self.pos;
            self.skip_past(">");
            return DomNode::Raw(self.input[start..self.pos].to_string());
        }
        if self.starts_with("<") && self.peek_is_name_start(1) {
            DomNode::Element(self.parse_element())
        } else {
            self.parse_text()
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // A lone '<' that does not open a tag is ordinary text.
        if self.starts_with("<") {
            self.advance(1);
        }
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self) -> ElementNode {
        self.advance(1); // '<'
        let name = self.parse_name();
        let mut elem = ElementNode::new(Tag::from_name(&name));

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let (key, value) = self.parse_attribute();
            if key.is_empty() {
                // Garbage inside the tag; skip a character to make progress.
                self.advance(1);
                continue;
            }
            elem.attributes.push((key.to_ascii_lowercase(), value));
        }

        if self.starts_with("/>") {
            self.advance(2);
            return elem;
        }
        if self.starts_with(">") {
            self.advance(1);
        }
        if elem.tag.is_void() {
            return elem;
        }

        let closing_name = elem.tag.name().to_string();
        if elem.tag.is_raw_text() {
            let close = format!("</{closing_name}");
            let start = self.pos;
            let end = self.find_ci(&close).unwrap_or(self.input.len());
            if end > start {
                elem.children
                    .push(DomNode::Text(self.input[start..end].to_string()));
            }
            self.pos = end;
        } else {
            elem.children = self.parse_nodes(true);
        }

        // Consume our closing tag if it is the one waiting.
        if self.starts_with("</") {
            let saved = self.pos;
            self.advance(2);
            let name = self.parse_name().to_ascii_lowercase();
            if name == closing_name {
                self.skip_past(">");
            } else {
                self.pos = saved;
            }
        }

        elem
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.advance(1); // skip '='
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.advance(1);
                let start = self.pos;
                while !self.eof() && !self.starts_with(quote) {
                    self.advance(1);
                }
                let val = self.input[start..self.pos].to_string();
                if !self.eof() {
                    self.advance(1);
                }
                return decode_entities(&val);
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' {
                break;
            }
            if self.starts_with("/>") {
                break;
            }
            self.advance(1);
        }
        decode_entities(&self.input[start..self.pos])
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    /// Move past the next occurrence of `marker`, or to EOF.
    fn skip_past(&mut self, marker: &str) {
        match self.input[self.pos..].find(marker) {
            Some(offset) => self.pos += offset + marker.len(),
            None => self.pos = self.input.len(),
        }
    }

    /// Byte position of the next case-insensitive occurrence of `needle`.
    fn find_ci(&self, needle: &str) -> Option<usize> {
        let haystack = self.input[self.pos..].to_ascii_lowercase();
        haystack.find(needle).map(|offset| self.pos + offset)
    }

    fn peek_is_name_start(&self, offset: usize) -> bool {
        self.input[self.pos..]
            .chars()
            .nth(offset)
            .is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self, n: usize) {
        // Advance by `n` characters (not bytes).
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Serialize nodes back to HTML. Text and attribute values are escaped;
/// raw-text element content and raw nodes are written verbatim.
pub fn to_html(nodes: &[DomNode]) -> String {
    let mut out = String::new();
    write_nodes(nodes, false, &mut out);
    out
}

fn write_nodes(nodes: &[DomNode], raw_text: bool, out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(text) if raw_text => out.push_str(text),
            DomNode::Text(text) => out.push_str(&escape_text(text)),
            DomNode::Raw(raw) => out.push_str(raw),
            DomNode::Element(e) => write_element(e, out),
        }
    }
}

fn write_element(e: &ElementNode, out: &mut String) {
    out.push('<');
    out.push_str(e.tag.name());
    for (key, value) in &e.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
    if e.tag.is_void() {
        return;
    }
    write_nodes(&e.children, e.tag.is_raw_text(), out);
    out.push_str("</");
    out.push_str(e.tag.name());
    out.push('>');
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\u{00A0}', "&nbsp;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the first element with `tag` anywhere in `nodes`.
pub fn find_element<'a>(nodes: &'a [DomNode], tag: &Tag) -> Option<&'a ElementNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if &e.tag == tag {
                return Some(e);
            }
            if let Some(found) = find_element(&e.children, tag) {
                return Some(found);
            }
        }
    }
    None
}

/// Mutable variant of [`find_element`].
pub fn find_element_mut<'a>(nodes: &'a mut [DomNode], tag: &Tag) -> Option<&'a mut ElementNode> {
    for node in nodes.iter_mut() {
        if let DomNode::Element(e) = node {
            if &e.tag == tag {
                return Some(e);
            }
            if let Some(found) = find_element_mut(&mut e.children, tag) {
                return Some(found);
            }
        }
    }
    None
}
