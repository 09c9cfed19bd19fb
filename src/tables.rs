//! Table-data serializer – the server half of the `<inject-table>` protocol.
//!
//! Table-bound properties are gathered into one ordered mapping
//! (`table key → rows`) and written as a JavaScript object literal assigned
//! to `tablesData` inside the in-page generator script. The generator reads
//! nothing else, so the literal is the whole interchange contract.

use serde_json::{Map, Value};

use crate::assets::Asset;
use crate::registry::TableBinding;

/// In-page generator source; `__TABLES_DATA__` is replaced by the literal.
pub const TABLE_GENERATOR_JS: &str = include_str!("../assets/table-generator.js");
/// Marker in [`TABLE_GENERATOR_JS`] that receives the data literal.
pub const TABLES_DATA_MARKER: &str = "__TABLES_DATA__";
/// Name of the binding the generator reads its data from.
pub const TABLES_DATA_BINDING: &str = "tablesData";
/// Document event that triggers table generation.
pub const START_EVENT: &str = "pdf-filler:start";

/// Ordered `table key → rows` mapping for one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    tables: Map<String, Value>,
}

impl TableData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every table-bound property from an instance's properties, in
    /// declaration order.
    ///
    /// A missing property contributes an empty table. Duplicate keys keep the
    /// last value; that is almost always a declaration mistake and is logged.
    pub fn collect(tables: &[TableBinding], properties: &Map<String, Value>) -> Self {
        let mut data = Self::new();
        for binding in tables {
            let rows = match properties.get(&binding.property_name) {
                Some(value) => {
                    if !value.is_array() {
                        log::warn!(
                            "Table property '{}' is not a sequence; table '{}' will be empty",
                            binding.property_name,
                            binding.table_key
                        );
                    }
                    value.clone()
                }
                None => Value::Array(Vec::new()),
            };
            data.insert(&binding.table_key, rows);
        }
        data
    }

    /// Add a table; an existing key is overwritten in place.
    pub fn insert(&mut self, key: &str, rows: Value) {
        if self.tables.insert(key.to_string(), rows).is_some() {
            log::warn!("Table key '{key}' declared more than once; the last value wins");
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tables.get(key)
    }

    /// Rows of a table, or an empty slice when the key is absent or the value
    /// is not a sequence.
    pub fn rows(&self, key: &str) -> &[Value] {
        self.tables
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.tables
    }

    /// The data as a JavaScript object literal.
    pub fn to_script_literal(&self) -> String {
        let mut out = String::new();
        write_object(&mut out, &self.tables);
        out
    }

    /// The generator script with this data embedded.
    pub fn to_script(&self) -> String {
        TABLE_GENERATOR_JS.replacen(TABLES_DATA_MARKER, &self.to_script_literal(), 1)
    }

    /// The generator script as an inline script asset.
    pub fn script_asset(&self) -> Asset {
        Asset::script(self.to_script())
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if is_identifier(key) {
            out.push_str(key);
        } else {
            write_string(out, key);
        }
        out.push_str(": ");
        write_value(out, value);
    }
    out.push('}');
}

/// Keys that can appear unquoted in an object literal.
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Single-quoted string literal, safe to embed in a `<script>` element.
fn write_string(out: &mut String, s: &str) {
    out.push('\'');
    let mut prev = '\0';
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '/' if prev == '<' => out.push_str("\\/"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
        prev = c;
    }
    out.push('\'');
}
