//! Binding registry – which template a type renders with, and which of its
//! properties feed `%%placeholders%%` and `<inject-table>` data.
//!
//! Bindings are keyed by the concrete Rust type (`TypeId`), so a declaration
//! made once at startup applies to every instance of that type. The registry
//! is a pure metadata store: it never touches the filesystem.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::assets::Asset;
use crate::options::PdfOptions;

/// Where the template markup lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Path(PathBuf),
    Inline(String),
}

/// Template-level configuration for a bound type.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateBinding {
    pub source: TemplateSource,
    /// Directory that relative image and include paths resolve against.
    /// Defaults to the template file's directory (or the working directory
    /// for inline templates).
    pub base_dir: Option<PathBuf>,
    pub pdf_options: Option<PdfOptions>,
    pub includes: Vec<Asset>,
}

/// Builder-style alias used at declaration sites.
pub type TemplateOptions = TemplateBinding;

impl TemplateBinding {
    /// Template read from a file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: TemplateSource::Path(path.into()),
            base_dir: None,
            pdf_options: None,
            includes: Vec::new(),
        }
    }

    /// Template given as markup.
    pub fn inline(markup: impl Into<String>) -> Self {
        Self {
            source: TemplateSource::Inline(markup.into()),
            base_dir: None,
            pdf_options: None,
            includes: Vec::new(),
        }
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn pdf_options(mut self, options: PdfOptions) -> Self {
        self.pdf_options = Some(options);
        self
    }

    /// Append an asset to the includes; order is kept.
    pub fn include(mut self, asset: Asset) -> Self {
        self.includes.push(asset);
        self
    }

    /// Directory relative references resolve against.
    pub fn resolve_base_dir(&self) -> PathBuf {
        if let Some(dir) = &self.base_dir {
            return dir.clone();
        }
        match &self.source {
            TemplateSource::Path(path) => path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            TemplateSource::Inline(_) => PathBuf::from("."),
        }
    }
}

/// A property substituted into a `%%placeholder%%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub property_name: String,
    pub placeholder_name: String,
}

/// A sequence property exposed to the table generator under `table_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    pub property_name: String,
    pub table_key: String,
}

/// Everything declared for one type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    pub template: Option<Arc<TemplateBinding>>,
    pub fields: Vec<FieldBinding>,
    pub tables: Vec<TableBinding>,
}

impl Bindings {
    pub fn is_empty(&self) -> bool {
        self.template.is_none() && self.fields.is_empty() && self.tables.is_empty()
    }
}

#[derive(Debug, Default)]
struct Entry {
    type_name: &'static str,
    bindings: Bindings,
}

/// Thread-safe store of declared bindings.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    entries: RwLock<HashMap<TypeId, Entry>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or replace) the template binding of `T`.
    pub fn declare_template<T: 'static>(&self, options: TemplateOptions) {
        self.with_entry::<T>(|entry| {
            if entry.bindings.template.is_some() {
                log::debug!("Replacing template binding of {}", entry.type_name);
            }
            entry.bindings.template = Some(Arc::new(options));
        });
    }

    /// Bind `property` to the placeholder `placeholder` (defaults to the
    /// property name). Re-declaring a property replaces its binding.
    pub fn declare_field<T: 'static>(&self, property: &str, placeholder: Option<&str>) {
        let binding = FieldBinding {
            property_name: property.to_string(),
            placeholder_name: placeholder.unwrap_or(property).to_string(),
        };
        self.with_entry::<T>(|entry| {
            let fields = &mut entry.bindings.fields;
            match fields.iter_mut().find(|f| f.property_name == property) {
                Some(existing) => *existing = binding,
                None => fields.push(binding),
            }
        });
    }

    /// Bind `property` to the table key `key` (defaults to the property
    /// name). Re-declaring a property replaces its binding.
    pub fn declare_table<T: 'static>(&self, property: &str, key: Option<&str>) {
        let binding = TableBinding {
            property_name: property.to_string(),
            table_key: key.unwrap_or(property).to_string(),
        };
        self.with_entry::<T>(|entry| {
            let tables = &mut entry.bindings.tables;
            match tables.iter_mut().find(|t| t.property_name == property) {
                Some(existing) => *existing = binding,
                None => tables.push(binding),
            }
        });
    }

    /// Run `T::declare` against this registry.
    pub fn register<T: Template>(&self) {
        let mut declaration = Declaration {
            registry: self,
            _type: PhantomData,
        };
        T::declare(&mut declaration);
    }

    /// Bindings declared for the type of `instance`.
    pub fn lookup<T: 'static>(&self, _instance: &T) -> Bindings {
        self.lookup_type::<T>()
    }

    /// Bindings declared for `T`; empty when nothing was declared.
    pub fn lookup_type<T: 'static>(&self) -> Bindings {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&TypeId::of::<T>())
            .map(|entry| entry.bindings.clone())
            .unwrap_or_default()
    }

    /// Whether anything is declared for `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(&TypeId::of::<T>())
    }

    fn with_entry<T: 'static>(&self, f: impl FnOnce(&mut Entry)) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(TypeId::of::<T>()).or_insert_with(|| Entry {
            type_name: type_name::<T>(),
            bindings: Bindings::default(),
        });
        f(entry);
    }
}

/// Types that declare their own bindings, registered once with
/// [`BindingRegistry::register`].
///
/// ```
/// use pdf_filler::registry::{BindingRegistry, Declaration, Template, TemplateOptions};
///
/// #[derive(serde::Serialize)]
/// struct Receipt {
///     number: u32,
/// }
///
/// impl Template for Receipt {
///     fn declare(d: &mut Declaration<'_, Self>) {
///         d.template(TemplateOptions::inline("<p>%%number%%</p>"));
///         d.field("number");
///     }
/// }
///
/// let registry = BindingRegistry::new();
/// registry.register::<Receipt>();
/// assert_eq!(registry.lookup_type::<Receipt>().fields.len(), 1);
/// ```
pub trait Template: 'static {
    fn declare(declaration: &mut Declaration<'_, Self>);
}

/// Declaration handle passed to [`Template::declare`].
pub struct Declaration<'a, T: ?Sized> {
    registry: &'a BindingRegistry,
    _type: PhantomData<fn() -> Box<T>>,
}

impl<T: Template> Declaration<'_, T> {
    pub fn template(&mut self, options: TemplateOptions) -> &mut Self {
        self.registry.declare_template::<T>(options);
        self
    }

    pub fn field(&mut self, property: &str) -> &mut Self {
        self.registry.declare_field::<T>(property, None);
        self
    }

    pub fn field_as(&mut self, property: &str, placeholder: &str) -> &mut Self {
        self.registry.declare_field::<T>(property, Some(placeholder));
        self
    }

    pub fn table(&mut self, property: &str) -> &mut Self {
        self.registry.declare_table::<T>(property, None);
        self
    }

    pub fn table_as(&mut self, property: &str, key: &str) -> &mut Self {
        self.registry.declare_table::<T>(property, Some(key));
        self
    }
}

/// Type name recorded at declaration time, for error messages.
pub(crate) fn declared_type_name<T: 'static>() -> &'static str {
    type_name::<T>()
}
