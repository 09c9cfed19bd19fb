//! Render options – page format, margins and print flags handed to the
//! engine's PDF capture.
//!
//! Options come from three layers: built-in defaults, the template type's
//! declared options and the per-call options. [`PdfOptions::resolve`] merges
//! them key by key (margins side by side) with the call layer winning.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FillerError, Result};

/// CSS pixels per inch, the unit bare numbers are expressed in.
const PX_PER_INCH: f64 = 96.0;

/// A length given either as CSS pixels or as a string with a unit
/// (`"2cm"`, `"10mm"`, `"1in"`, `"96px"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Length {
    Px(f64),
    Css(String),
}

impl Length {
    /// Convert to inches, the unit Chromium's print API expects.
    pub fn to_inches(&self) -> Result<f64> {
        match self {
            Length::Px(px) => Ok(px / PX_PER_INCH),
            Length::Css(raw) => {
                let text = raw.trim().to_ascii_lowercase();
                let split = text
                    .find(|c: char| c.is_ascii_alphabetic())
                    .unwrap_or(text.len());
                let (number, unit) = text.split_at(split);
                let value: f64 = number
                    .trim()
                    .parse()
                    .map_err(|_| FillerError::Options(format!("invalid length {raw:?}")))?;
                let inches = match unit {
                    "" | "px" => value / PX_PER_INCH,
                    "in" => value,
                    "cm" => value / 2.54,
                    "mm" => value / 25.4,
                    other => {
                        return Err(FillerError::Options(format!(
                            "unknown unit {other:?} in length {raw:?}"
                        )))
                    }
                };
                Ok(inches)
            }
        }
    }
}

impl From<&str> for Length {
    fn from(s: &str) -> Self {
        Length::Css(s.to_string())
    }
}

/// Page margins. Unset sides fall through to the lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Length>,
}

impl Margin {
    fn merge(&self, over: &Margin) -> Margin {
        Margin {
            top: over.top.clone().or_else(|| self.top.clone()),
            bottom: over.bottom.clone().or_else(|| self.bottom.clone()),
            left: over.left.clone().or_else(|| self.left.clone()),
            right: over.right.clone().or_else(|| self.right.clone()),
        }
    }
}

/// Named paper sizes, dimensions in inches (portrait).
const PAPER_FORMATS: &[(&str, f64, f64)] = &[
    ("letter", 8.5, 11.0),
    ("legal", 8.5, 14.0),
    ("tabloid", 11.0, 17.0),
    ("ledger", 17.0, 11.0),
    ("a0", 33.1, 46.8),
    ("a1", 23.4, 33.1),
    ("a2", 16.54, 23.4),
    ("a3", 11.7, 16.54),
    ("a4", 8.27, 11.7),
    ("a5", 5.83, 8.27),
    ("a6", 4.13, 5.83),
];

/// Look up a paper format by name (case-insensitive) and return its
/// `(width, height)` in inches.
pub fn paper_size(format: &str) -> Option<(f64, f64)> {
    let wanted = format.trim().to_ascii_lowercase();
    PAPER_FORMATS
        .iter()
        .find(|(name, _, _)| *name == wanted)
        .map(|(_, w, h)| (*w, *h))
}

/// Options for a single PDF capture.
///
/// Keys follow the browser print API (camelCase in JSON). Anything not
/// modelled here is kept in [`PdfOptions::extra`] and passed to the engine
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Margin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_header_footer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,
    #[serde(
        default,
        rename = "preferCSSPageSize",
        skip_serializing_if = "Option::is_none"
    )]
    pub prefer_css_page_size: Option<bool>,
    /// Engine-native options passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PdfOptions {
    /// Built-in defaults: A4, 2cm top/bottom, 1cm left/right, backgrounds on.
    pub fn defaults() -> Self {
        Self {
            format: Some("A4".into()),
            margin: Some(Margin {
                top: Some("2cm".into()),
                bottom: Some("2cm".into()),
                left: Some("1cm".into()),
                right: Some("1cm".into()),
            }),
            print_background: Some(true),
            ..Self::default()
        }
    }

    /// Overlay `over` on top of `self`; every key set in `over` wins.
    pub fn merge(&self, over: &PdfOptions) -> PdfOptions {
        let margin = match (&self.margin, &over.margin) {
            (Some(base), Some(top)) => Some(base.merge(top)),
            (base, top) => top.clone().or_else(|| base.clone()),
        };
        let mut extra = self.extra.clone();
        for (key, value) in &over.extra {
            extra.insert(key.clone(), value.clone());
        }

        PdfOptions {
            format: over.format.clone().or_else(|| self.format.clone()),
            width: over.width.clone().or_else(|| self.width.clone()),
            height: over.height.clone().or_else(|| self.height.clone()),
            landscape: over.landscape.or(self.landscape),
            scale: over.scale.or(self.scale),
            margin,
            print_background: over.print_background.or(self.print_background),
            display_header_footer: over.display_header_footer.or(self.display_header_footer),
            header_template: over
                .header_template
                .clone()
                .or_else(|| self.header_template.clone()),
            footer_template: over
                .footer_template
                .clone()
                .or_else(|| self.footer_template.clone()),
            page_ranges: over.page_ranges.clone().or_else(|| self.page_ranges.clone()),
            prefer_css_page_size: over.prefer_css_page_size.or(self.prefer_css_page_size),
            extra,
        }
    }

    /// Defaults, then class-level options, then call-level options.
    pub fn resolve(class: Option<&PdfOptions>, call: Option<&PdfOptions>) -> PdfOptions {
        let mut merged = Self::defaults();
        if let Some(class) = class {
            merged = merged.merge(class);
        }
        if let Some(call) = call {
            merged = merged.merge(call);
        }
        merged
    }

    /// Parse options from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Translate into the parameter object of Chromium's `Page.printToPDF`.
    ///
    /// Explicit `width`/`height` take precedence over `format`; `landscape`
    /// is forwarded and applied by the engine. Entries of
    /// [`PdfOptions::extra`] are copied last and override computed keys.
    pub fn to_print_params(&self) -> Result<Map<String, Value>> {
        let mut params = Map::new();

        let (mut paper_w, mut paper_h) = (None, None);
        if let Some(format) = &self.format {
            let (w, h) = paper_size(format)
                .ok_or_else(|| FillerError::Options(format!("unknown paper format {format:?}")))?;
            paper_w = Some(w);
            paper_h = Some(h);
        }
        if let Some(width) = &self.width {
            paper_w = Some(width.to_inches()?);
        }
        if let Some(height) = &self.height {
            paper_h = Some(height.to_inches()?);
        }
        if let Some(w) = paper_w {
            params.insert("paperWidth".into(), Value::from(w));
        }
        if let Some(h) = paper_h {
            params.insert("paperHeight".into(), Value::from(h));
        }

        if let Some(margin) = &self.margin {
            let sides = [
                ("marginTop", &margin.top),
                ("marginBottom", &margin.bottom),
                ("marginLeft", &margin.left),
                ("marginRight", &margin.right),
            ];
            for (key, side) in sides {
                if let Some(length) = side {
                    params.insert(key.into(), Value::from(length.to_inches()?));
                }
            }
        }

        if let Some(scale) = self.scale {
            if !(0.1..=2.0).contains(&scale) {
                return Err(FillerError::Options(format!(
                    "scale {scale} outside the supported range 0.1..=2"
                )));
            }
            params.insert("scale".into(), Value::from(scale));
        }

        let flags = [
            ("landscape", self.landscape),
            ("printBackground", self.print_background),
            ("displayHeaderFooter", self.display_header_footer),
            ("preferCSSPageSize", self.prefer_css_page_size),
        ];
        for (key, flag) in flags {
            if let Some(flag) = flag {
                params.insert(key.into(), Value::Bool(flag));
            }
        }

        let texts = [
            ("headerTemplate", &self.header_template),
            ("footerTemplate", &self.footer_template),
            ("pageRanges", &self.page_ranges),
        ];
        for (key, text) in texts {
            if let Some(text) = text {
                params.insert(key.into(), Value::String(text.clone()));
            }
        }

        for (key, value) in &self.extra {
            params.insert(key.clone(), value.clone());
        }

        Ok(params)
    }
}
