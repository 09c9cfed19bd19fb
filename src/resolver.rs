//! Placeholder resolver – turns raw template text into final markup.
//!
//! Two passes run over the text:
//!
//! 1. `%%name%%` tokens are replaced by the HTML-escaped value of the bound
//!    property. Tokens without a matching binding are left untouched.
//! 2. `<img src="…">` references to local files are inlined as base64 data
//!    URIs. Unreadable files are logged and keep their `src` untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::registry::FieldBinding;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%%\s*([^%\s]+?)\s*%%").expect("placeholder pattern is valid"))
}

fn img_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<img\b[^>]*?\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("img src pattern is valid")
    })
}

/// Escape the characters that are significant in HTML text and attributes.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Text form of a bound property value: strings verbatim, numbers and
/// booleans in display form, `null` as empty, arrays/objects as JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Replace every `%%placeholder%%` that matches a field binding.
///
/// A declared field whose property is missing from `properties` renders as
/// the empty string.
pub fn substitute_placeholders(
    template: &str,
    fields: &[FieldBinding],
    properties: &Map<String, Value>,
) -> String {
    let values: HashMap<&str, String> = fields
        .iter()
        .map(|field| {
            let text = properties
                .get(&field.property_name)
                .map(scalar_text)
                .unwrap_or_else(|| {
                    log::debug!(
                        "Property '{}' is not set; '{}' renders empty",
                        field.property_name,
                        field.placeholder_name
                    );
                    String::new()
                });
            (field.placeholder_name.as_str(), escape_html(&text))
        })
        .collect();

    placeholder_re()
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Whether an `src` value names a local file that should be inlined.
fn is_local_reference(src: &str) -> bool {
    let lower = src.trim().to_ascii_lowercase();
    !(lower.is_empty()
        || lower.starts_with("data:")
        || lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("blob:")
        || lower.starts_with("//")
        || lower.contains("%%"))
}

/// Resolve an image reference against the template directory.
pub fn resolve_image_path(src: &str, base_dir: &Path) -> PathBuf {
    let trimmed = src.trim();
    let local = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    let path = Path::new(local);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Media type for an image file, from its extension.
pub fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == "svg" {
        return Some("image/svg+xml");
    }
    image::ImageFormat::from_extension(&ext).map(|format| format.to_mime_type())
}

/// Read an image and build its data URI. Failures are reported as a message
/// for the caller to log.
async fn data_uri_for(path: &Path) -> Result<String, String> {
    let mime = image_media_type(path)
        .ok_or_else(|| format!("no media type for '{}'", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
    Ok(format!("data:{mime};base64,{}", BASE64_STD.encode(bytes)))
}

/// Inline every local `<img src>` as a data URI.
pub async fn inline_images(markup: &str, base_dir: &Path) -> String {
    // (start, end) byte range of each src value, plus the value itself.
    let refs: Vec<(usize, usize, &str)> = img_src_re()
        .captures_iter(markup)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| (m.start(), m.end(), m.as_str()))
        .filter(|(_, _, src)| is_local_reference(src))
        .collect();

    if refs.is_empty() {
        return markup.to_string();
    }

    let mut cache: HashMap<&str, Option<String>> = HashMap::new();
    for (_, _, src) in &refs {
        if cache.contains_key(src) {
            continue;
        }
        let path = resolve_image_path(src, base_dir);
        let uri = match data_uri_for(&path).await {
            Ok(uri) => Some(uri),
            Err(e) => {
                log::warn!("Skipping image: {e}");
                None
            }
        };
        cache.insert(*src, uri);
    }

    let mut out = String::with_capacity(markup.len());
    let mut cursor = 0;
    for (start, end, src) in refs {
        if let Some(Some(uri)) = cache.get(&src) {
            out.push_str(&markup[cursor..start]);
            out.push_str(uri);
            cursor = end;
        }
    }
    out.push_str(&markup[cursor..]);
    out
}

/// Both passes: placeholders first (so `src="%%logo%%"` works), then images.
pub async fn resolve_template(
    template: &str,
    fields: &[FieldBinding],
    properties: &Map<String, Value>,
    base_dir: &Path,
) -> String {
    let substituted = substitute_placeholders(template, fields, properties);
    inline_images(&substituted, base_dir).await
}
