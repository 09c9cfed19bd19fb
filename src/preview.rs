//! Static table expansion – the `<inject-table>` protocol applied on the
//! server side.
//!
//! Mirrors `assets/table-generator.js` over the crate's own DOM so the
//! protocol can be checked against fixture documents without a browser, and
//! so a prepared document can be dumped as plain HTML for inspection.

use serde_json::Value;

use crate::dom::{parse_html, to_html, DomNode, ElementNode, Tag};
use crate::tables::TableData;

/// Attributes copied from `<inject-table>` onto the generated `<table>`.
const TABLE_ATTRS: &[&str] = &["class", "id", "style", "items"];
/// Attributes copied from `<inject-column>` onto the header cell.
const COLUMN_ATTRS: &[&str] = &["class", "id", "style", "prop"];

/// Resolve a dotted path against a row, one plain property lookup per
/// segment. Missing, `null` or non-object intermediates yield `None`.
pub fn resolve_path<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut value = row;
    for segment in path.split('.') {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Cell text the way the page renders it (`String(value)`, empty for
/// `null`/missing).
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => js_string(v),
    }
}

fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        // Array.prototype.toString joins with commas; null items are empty.
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".into(),
    }
}

fn copy_attributes(from: &ElementNode, to: &mut ElementNode, names: &[&str]) {
    for name in names {
        if let Some(value) = from.attr(name) {
            to.set_attr(name, value);
        }
    }
}

/// Build the `<table>` replacing one `<inject-table>`.
pub fn build_table(source: &ElementNode, data: &TableData) -> ElementNode {
    let mut table = ElementNode::new(Tag::Table);
    copy_attributes(source, &mut table, TABLE_ATTRS);

    let mut columns = Vec::new();
    source.descendants_with_tag(&Tag::InjectColumn, &mut columns);

    let mut head_row = ElementNode::new(Tag::Tr);
    for column in &columns {
        let mut cell = ElementNode::new(Tag::Th);
        copy_attributes(column, &mut cell, COLUMN_ATTRS);
        match column.attr("label") {
            Some(label) => cell.children.push(DomNode::Text(label.to_string())),
            None => {
                let style = match cell.attr("style") {
                    Some(existing) if !existing.trim().is_empty() => {
                        format!("{}; visibility: hidden", existing.trim_end_matches([';', ' ']))
                    }
                    _ => "visibility: hidden".to_string(),
                };
                cell.set_attr("style", style);
            }
        }
        head_row.children.push(DomNode::Element(cell));
    }

    let mut body = ElementNode::new(Tag::Tbody);
    let rows = source.attr("items").map(|key| data.rows(key)).unwrap_or(&[]);
    for row in rows {
        let mut tr = ElementNode::new(Tag::Tr);
        for column in &columns {
            let value = column.attr("prop").and_then(|path| resolve_path(row, path));
            let td = ElementNode::new(Tag::Td).with_child(DomNode::Text(cell_text(value)));
            tr.children.push(DomNode::Element(td));
        }
        body.children.push(DomNode::Element(tr));
    }

    let head = ElementNode::new(Tag::Thead).with_child(DomNode::Element(head_row));
    table.children.push(DomNode::Element(head));
    table.children.push(DomNode::Element(body));
    table
}

/// Replace every `<inject-table>` in `nodes` with a generated table.
/// Returns the number of tables generated.
pub fn materialize_tables(nodes: &mut [DomNode], data: &TableData) -> usize {
    let mut count = 0;
    for node in nodes.iter_mut() {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::InjectTable {
                *node = DomNode::Element(build_table(e, data));
                count += 1;
            } else {
                count += materialize_tables(&mut e.children, data);
            }
        }
    }
    count
}

/// Parse `html`, expand its tables and serialize it again.
pub fn expand_tables(html: &str, data: &TableData) -> String {
    let mut nodes = parse_html(html);
    let count = materialize_tables(&mut nodes, data);
    log::debug!("Expanded {count} inject-table element(s)");
    to_html(&nodes)
}
