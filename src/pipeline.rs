//! Pipeline – ties together binding lookup, placeholder resolution, table
//! serialization, asset assembly, and rendering into a single call.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::assets::{Asset, AssetKind, AssetPipeline};
use crate::dom::{find_element_mut, parse_html, to_html, DomNode, ElementNode, Tag};
use crate::error::{FillerError, Result};
use crate::options::PdfOptions;
use crate::preview::materialize_tables;
use crate::registry::{declared_type_name, BindingRegistry, TemplateSource};
use crate::resolver::resolve_template;
use crate::session::{RenderRequest, RenderSession};
use crate::tables::TableData;

/// A document ready to hand to the render session.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    /// Template markup with placeholders substituted and images inlined.
    pub markup: String,
    /// Defaults, class includes, then the table script.
    pub assets: Vec<Asset>,
    /// Defaults merged with class and call options.
    pub options: PdfOptions,
    /// Table data, when the type declares table bindings.
    pub tables: Option<TableData>,
    /// Directory relative references were resolved against.
    pub base_dir: PathBuf,
}

impl PreparedDocument {
    pub fn into_request(self, timeout: Option<Duration>) -> RenderRequest {
        RenderRequest {
            markup: self.markup,
            assets: self.assets,
            options: self.options,
            timeout,
        }
    }

    /// The document as plain HTML, without a browser: tables are expanded in
    /// place and style assets are inlined into `<head>`. Scripts are left
    /// out.
    pub async fn to_static_html(&self) -> Result<String> {
        let mut nodes = parse_html(&self.markup);
        if let Some(tables) = &self.tables {
            materialize_tables(&mut nodes, tables);
        }

        let mut styles = Vec::new();
        for asset in &self.assets {
            if let Some(loaded) = asset.load().await? {
                if loaded.kind == AssetKind::Style {
                    let style =
                        ElementNode::new(Tag::Style).with_child(DomNode::Text(loaded.content));
                    styles.push(DomNode::Element(style));
                }
            }
        }

        if let Some(head) = find_element_mut(&mut nodes, &Tag::Head) {
            head.children.extend(styles);
            return Ok(to_html(&nodes));
        }
        styles.extend(nodes);
        Ok(to_html(&styles))
    }
}

/// Renders bound instances to PDF.
#[derive(Debug, Clone)]
pub struct Filler {
    registry: Arc<BindingRegistry>,
    session: RenderSession,
    assets: AssetPipeline,
    timeout: Option<Duration>,
}

impl Filler {
    pub fn new(registry: Arc<BindingRegistry>, session: RenderSession) -> Self {
        Self {
            registry,
            session,
            assets: AssetPipeline::default(),
            timeout: None,
        }
    }

    /// Replace the baseline assets.
    pub fn with_assets(mut self, assets: AssetPipeline) -> Self {
        self.assets = assets;
        self
    }

    /// Deadline applied to each render's page work.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    /// Resolve everything short of rendering.
    ///
    /// Fails with [`FillerError::Binding`] before any I/O when the type has
    /// no template or no field bindings.
    pub async fn prepare<T: Serialize + 'static>(
        &self,
        instance: &T,
        options: Option<&PdfOptions>,
    ) -> Result<PreparedDocument> {
        let type_name = declared_type_name::<T>();
        let bindings = self.registry.lookup(instance);
        let template = bindings.template.ok_or(FillerError::Binding {
            type_name,
            reason: "no template declared",
        })?;
        if bindings.fields.is_empty() {
            return Err(FillerError::Binding {
                type_name,
                reason: "no field bindings declared",
            });
        }

        let properties = match serde_json::to_value(instance)? {
            Value::Object(map) => map,
            _ => return Err(FillerError::NotAPropertyMap(type_name)),
        };

        let base_dir = template.resolve_base_dir();
        let raw = match &template.source {
            TemplateSource::Path(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| FillerError::Template {
                    path: path.clone(),
                    source,
                })?,
            TemplateSource::Inline(markup) => markup.clone(),
        };

        let markup = resolve_template(&raw, &bindings.fields, &properties, &base_dir).await;

        let tables = if bindings.tables.is_empty() {
            None
        } else {
            Some(TableData::collect(&bindings.tables, &properties))
        };

        let includes: Vec<Asset> = template
            .includes
            .iter()
            .map(|asset| asset.resolved_against(&base_dir))
            .collect();
        let assets = self
            .assets
            .assemble(&includes, tables.as_ref().map(TableData::script_asset));

        let options = PdfOptions::resolve(template.pdf_options.as_ref(), options);

        log::debug!(
            "Prepared {type_name}: {} field(s), {} table(s), {} asset(s)",
            bindings.fields.len(),
            tables.as_ref().map_or(0, TableData::len),
            assets.len()
        );

        Ok(PreparedDocument {
            markup,
            assets,
            options,
            tables,
            base_dir,
        })
    }

    /// Render `instance` to PDF bytes, also writing them to `output_path`
    /// when given. Nothing is written unless the render succeeds.
    pub async fn fill<T: Serialize + 'static>(
        &self,
        instance: &T,
        output_path: Option<&Path>,
        options: Option<&PdfOptions>,
    ) -> Result<Vec<u8>> {
        let prepared = self.prepare(instance, options).await?;
        let bytes = self
            .session
            .render(&prepared.into_request(self.timeout))
            .await?;

        if let Some(path) = output_path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, &bytes).await?;
            log::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        }
        Ok(bytes)
    }
}
