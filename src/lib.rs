//! # pdf-filler – data-bound HTML templates → PDF
//!
//! Types declare which template they render with and which of their
//! properties feed the template. Filling an instance runs these stages:
//!
//! 1. **Lookup** – find the type's bindings ([`registry`])
//! 2. **Resolve** – substitute `%%placeholders%%`, inline local images ([`resolver`])
//! 3. **Serialize** – table-bound properties → `tablesData` script ([`tables`])
//! 4. **Assemble** – default assets, class includes, table script ([`assets`])
//! 5. **Render** – headless Chromium prints the page ([`session`], [`chromium`])
//!
//! Inside the page, `assets/table-generator.js` expands every
//! `<inject-table>` into a real table once the session signals readiness.
//! [`preview`] applies the same expansion without a browser.

pub mod assets;
pub mod chromium;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod preview;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod tables;
pub mod templates;

// Re-exports for convenience
pub use assets::{Asset, AssetKind, AssetPipeline};
pub use config::EngineConfig;
pub use error::{FillerError, Result};
pub use options::{Length, Margin, PdfOptions};
pub use pipeline::{Filler, PreparedDocument};
pub use registry::{BindingRegistry, Declaration, Template, TemplateBinding, TemplateOptions};
pub use session::{RenderRequest, RenderSession, SessionState};
pub use tables::TableData;
