//! Integration tests for the fill pipeline.
//!
//! These tests validate:
//! - Bound instances resolve to the expected markup, assets and options
//! - Binding errors surface before any browser work
//! - Rendering drives the engine in order and writes output files
//! - The static table expansion matches the declared tables

mod support;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use pdf_filler::assets::{BASE_CSS, DOM_HELPERS_JS};
use pdf_filler::{
    Asset, BindingRegistry, Declaration, EngineConfig, Filler, FillerError, Margin, PdfOptions,
    RenderSession, Template, TemplateOptions,
};
use pdf_filler::templates;
use support::{FakeEngine, Op, FAKE_PDF};

// =====================================================================
// Helper
// =====================================================================

#[derive(Serialize)]
struct PrintForm {
    number: u32,
    name: String,
    surname: String,
}

impl Template for PrintForm {
    fn declare(d: &mut Declaration<'_, Self>) {
        d.template(TemplateOptions::inline(templates::form_template()))
            .field("number")
            .field("name")
            .field("surname");
    }
}

#[derive(Serialize)]
struct Row {
    index: u32,
    name: String,
}

#[derive(Serialize)]
struct PrintTable {
    number: u32,
    data: Vec<Row>,
}

fn filler_with(registry: BindingRegistry) -> (FakeEngine, Filler) {
    let engine = FakeEngine::new();
    let session = RenderSession::new(engine.clone(), EngineConfig::default());
    (engine, Filler::new(Arc::new(registry), session))
}

fn foo_table() -> PrintTable {
    PrintTable {
        number: 7,
        data: vec![Row {
            index: 1,
            name: "Foo".into(),
        }],
    }
}

fn table_registry(template: TemplateOptions) -> BindingRegistry {
    let registry = BindingRegistry::new();
    registry.declare_template::<PrintTable>(template);
    registry.declare_field::<PrintTable>("number", None);
    registry.declare_table::<PrintTable>("data", None);
    registry
}

const TWO_COLUMNS: &str =
    r##"<h1>%%number%%</h1><inject-table items="data"><inject-column prop="index" label="#"></inject-column><inject-column prop="name" label="Name"></inject-column></inject-table>"##;

// =====================================================================
// Placeholder scenarios
// =====================================================================

#[tokio::test]
async fn single_field_renders_its_value() {
    #[derive(Serialize)]
    struct Numbered {
        number: u32,
    }

    let registry = BindingRegistry::new();
    registry.declare_template::<Numbered>(TemplateOptions::inline("<p>%%number%%</p>"));
    registry.declare_field::<Numbered>("number", None);
    let (engine, filler) = filler_with(registry);

    let bytes = filler.fill(&Numbered { number: 2 }, None, None).await.unwrap();

    assert_eq!(bytes, FAKE_PDF);
    assert!(engine.ops().contains(&Op::SetContent("<p>2</p>".into())));
}

#[tokio::test]
async fn declared_placeholders_are_all_substituted() {
    let registry = BindingRegistry::new();
    registry.register::<PrintForm>();
    let (_, filler) = filler_with(registry);

    let form = PrintForm {
        number: 3,
        name: "Foo".into(),
        surname: "Bar & Baz".into(),
    };
    let prepared = filler.prepare(&form, None).await.unwrap();

    for name in ["number", "name", "surname"] {
        assert!(!prepared.markup.contains(&format!("%%{name}%%")), "{name} left over");
    }
    assert!(prepared.markup.contains("<title>Form 3</title>"));
    assert!(prepared.markup.contains("<p class=\"value\">Bar &amp; Baz</p>"));
    assert!(prepared.tables.is_none());
}

#[tokio::test]
async fn unresolved_placeholders_pass_through() {
    #[derive(Serialize)]
    struct Partial {
        number: u32,
    }

    let registry = BindingRegistry::new();
    registry.declare_template::<Partial>(TemplateOptions::inline("<p>%%number%% %%other%%</p>"));
    registry.declare_field::<Partial>("number", None);
    let (_, filler) = filler_with(registry);

    let prepared = filler.prepare(&Partial { number: 2 }, None).await.unwrap();
    assert_eq!(prepared.markup, "<p>2 %%other%%</p>");
}

#[tokio::test]
async fn placeholder_names_can_differ_from_properties() {
    #[derive(Serialize)]
    struct Renamed {
        customer_name: String,
    }

    let registry = BindingRegistry::new();
    registry.declare_template::<Renamed>(TemplateOptions::inline("<b>%%customer%%</b>"));
    registry.declare_field::<Renamed>("customer_name", Some("customer"));
    // Re-declaring replaces the binding instead of adding a second one.
    registry.declare_field::<Renamed>("customer_name", Some("customer"));
    assert_eq!(registry.lookup_type::<Renamed>().fields.len(), 1);

    let (_, filler) = filler_with(registry);
    let prepared = filler
        .prepare(&Renamed { customer_name: "Ada".into() }, None)
        .await
        .unwrap();
    assert_eq!(prepared.markup, "<b>Ada</b>");
}

// =====================================================================
// Binding errors
// =====================================================================

#[tokio::test]
async fn undeclared_type_is_a_binding_error() {
    let (engine, filler) = filler_with(BindingRegistry::new());
    let err = filler.fill(&foo_table(), None, None).await.unwrap_err();
    assert!(matches!(err, FillerError::Binding { .. }), "got {err:?}");
    assert_eq!(engine.launches(), 0);
}

#[tokio::test]
async fn template_without_fields_is_a_binding_error() {
    let registry = BindingRegistry::new();
    registry.declare_template::<PrintTable>(TemplateOptions::inline(TWO_COLUMNS));
    registry.declare_table::<PrintTable>("data", None);
    let (engine, filler) = filler_with(registry);

    let err = filler.fill(&foo_table(), None, None).await.unwrap_err();
    match err {
        FillerError::Binding { reason, .. } => assert_eq!(reason, "no field bindings declared"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(engine.launches(), 0);
}

#[tokio::test]
async fn fields_without_template_is_a_binding_error() {
    let registry = BindingRegistry::new();
    registry.declare_field::<PrintTable>("number", None);
    let (_, filler) = filler_with(registry);

    let err = filler.prepare(&foo_table(), None).await.unwrap_err();
    match err {
        FillerError::Binding { reason, type_name } => {
            assert_eq!(reason, "no template declared");
            assert!(type_name.ends_with("PrintTable"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn non_map_instance_is_rejected() {
    #[derive(Serialize)]
    struct Scalar(u32);

    let registry = BindingRegistry::new();
    registry.declare_template::<Scalar>(TemplateOptions::inline("<p>%%0%%</p>"));
    registry.declare_field::<Scalar>("0", None);
    let (_, filler) = filler_with(registry);

    let err = filler.prepare(&Scalar(1), None).await.unwrap_err();
    assert!(matches!(err, FillerError::NotAPropertyMap(_)), "got {err:?}");
}

// =====================================================================
// Template files, images and includes
// =====================================================================

#[tokio::test]
async fn template_file_images_resolve_against_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("form.html");
    std::fs::write(
        &template,
        r#"<img src="logo.png"><img src="missing.png"><p>%%number%%</p>"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let registry = BindingRegistry::new();
    registry.declare_template::<PrintTable>(TemplateOptions::from_path(&template));
    registry.declare_field::<PrintTable>("number", None);
    let (_, filler) = filler_with(registry);

    let prepared = filler.prepare(&foo_table(), None).await.unwrap();
    assert!(prepared.markup.contains(r#"<img src="data:image/png;base64,iVBORw=="#));
    assert!(prepared.markup.contains(r#"<img src="missing.png">"#));
    assert!(prepared.markup.ends_with("<p>7</p>"));
    assert_eq!(prepared.base_dir, dir.path());
}

#[tokio::test]
async fn missing_template_file_is_reported() {
    let registry = BindingRegistry::new();
    registry.declare_template::<PrintTable>(TemplateOptions::from_path("/nonexistent/t.html"));
    registry.declare_field::<PrintTable>("number", None);
    let (engine, filler) = filler_with(registry);

    let err = filler.fill(&foo_table(), None, None).await.unwrap_err();
    assert!(matches!(err, FillerError::Template { .. }), "got {err:?}");
    assert_eq!(engine.launches(), 0);
}

#[tokio::test]
async fn assets_are_defaults_then_includes_then_table_script() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("table.css"), "td { padding: 0 }").unwrap();

    let template = TemplateOptions::inline(TWO_COLUMNS)
        .base_dir(dir.path())
        .include(Asset::path("table.css"))
        .include(Asset::script("window.extra = true;"));
    let (engine, filler) = filler_with(table_registry(template));

    let prepared = filler.prepare(&foo_table(), None).await.unwrap();
    let table_script = prepared.tables.as_ref().unwrap().script_asset();
    assert_eq!(
        prepared.assets,
        vec![
            Asset::style(BASE_CSS),
            Asset::script(DOM_HELPERS_JS),
            Asset::path(dir.path().join("table.css")),
            Asset::script("window.extra = true;"),
            table_script.clone(),
        ]
    );

    filler.fill(&foo_table(), None, None).await.unwrap();
    let injected: Vec<Op> = engine
        .page_ops(0)
        .into_iter()
        .filter(|op| matches!(op, Op::Style(_) | Op::Script(_)))
        .collect();
    assert_eq!(injected.len(), 5);
    assert_eq!(injected[2], Op::Style("td { padding: 0 }".into()));
    assert!(matches!(&injected[4], Op::Script(js) if js.contains("tablesData")));
}

// =====================================================================
// Tables
// =====================================================================

#[tokio::test]
async fn table_data_is_serialized_into_the_generator_script() {
    let (_, filler) = filler_with(table_registry(TemplateOptions::inline(TWO_COLUMNS)));

    let prepared = filler.prepare(&foo_table(), None).await.unwrap();
    let tables = prepared.tables.as_ref().unwrap();
    assert_eq!(tables.rows("data"), &[json!({"index": 1, "name": "Foo"})]);

    let script = match &prepared.assets.last().unwrap().source {
        pdf_filler::assets::AssetSource::Content(js) => js.clone(),
        other => panic!("unexpected source {other:?}"),
    };
    assert!(script.contains("{data: [{index: 1, name: 'Foo'}]}"));
    assert!(!script.contains("__TABLES_DATA__"));
}

#[tokio::test]
async fn static_html_expands_two_column_table() {
    let (engine, filler) = filler_with(table_registry(TemplateOptions::inline(TWO_COLUMNS)));

    let html = filler
        .prepare(&foo_table(), None)
        .await
        .unwrap()
        .to_static_html()
        .await
        .unwrap();

    assert!(html.contains(
        "<thead><tr><th prop=\"index\">#</th><th prop=\"name\">Name</th></tr></thead>"
    ));
    assert!(html.contains("<tbody><tr><td>1</td><td>Foo</td></tr></tbody>"));
    assert!(html.starts_with("<style>"));
    // The base stylesheet still names the element in a selector.
    assert!(!html.contains("<inject-table"));
    assert!(!html.contains("<inject-column"));
    assert_eq!(engine.launches(), 0);
}

#[tokio::test]
async fn static_html_places_styles_in_head_and_resolves_nested_paths() {
    #[derive(Serialize)]
    struct People {
        number: u32,
        data: serde_json::Value,
    }

    let registry = BindingRegistry::new();
    registry.declare_template::<People>(TemplateOptions::inline(
        templates::nested_table_template(),
    ));
    registry.declare_field::<People>("number", None);
    registry.declare_table::<People>("data", None);
    let (_, filler) = filler_with(registry);

    let people = People {
        number: 1,
        data: json!([
            {
                "index": 1,
                "name": "A",
                "nestedObject": {"nestedName": "Foo", "anotherNestedObject": {"group": "G1"}}
            },
            {"index": 2, "name": "B", "nestedObject": null}
        ]),
    };
    let html = filler
        .prepare(&people, None)
        .await
        .unwrap()
        .to_static_html()
        .await
        .unwrap();

    let head_end = html.find("</head>").unwrap();
    assert!(html.find("<style>").unwrap() < head_end);
    assert!(html.contains("<td>1</td><td>A</td><td>Foo</td><td>G1</td>"));
    assert!(html.contains("<td>2</td><td>B</td><td></td><td></td>"));
    assert!(html.contains("<th prop=\"index\" style=\"visibility: hidden\"></th>"));
}

// =====================================================================
// Options
// =====================================================================

#[tokio::test]
async fn call_margin_overrides_class_margin_side_by_side() {
    let class_options = PdfOptions {
        margin: Some(Margin {
            top: Some("3cm".into()),
            ..Margin::default()
        }),
        ..PdfOptions::default()
    };
    let call_options = PdfOptions {
        margin: Some(Margin {
            top: Some("1cm".into()),
            ..Margin::default()
        }),
        ..PdfOptions::default()
    };
    let template = TemplateOptions::inline(TWO_COLUMNS).pdf_options(class_options);
    let (engine, filler) = filler_with(table_registry(template));

    filler
        .fill(&foo_table(), None, Some(&call_options))
        .await
        .unwrap();

    let expected = PdfOptions {
        margin: Some(Margin {
            top: Some("1cm".into()),
            bottom: Some("2cm".into()),
            left: Some("1cm".into()),
            right: Some("1cm".into()),
        }),
        ..PdfOptions::defaults()
    };
    assert!(engine.ops().contains(&Op::Pdf(expected)));
}

// =====================================================================
// Output
// =====================================================================

#[tokio::test]
async fn output_file_is_written_after_success() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("nested").join("form.pdf");

    let registry = BindingRegistry::new();
    registry.register::<PrintForm>();
    let (_, filler) = filler_with(registry);

    let form = PrintForm {
        number: 1,
        name: "Foo".into(),
        surname: "Bar".into(),
    };
    let bytes = filler.fill(&form, Some(output.as_path()), None).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), bytes);
}

#[tokio::test]
async fn output_file_is_not_written_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("form.pdf");

    let registry = BindingRegistry::new();
    registry.register::<PrintForm>();
    let (engine, filler) = filler_with(registry);
    engine.fail_next_launches(1);

    let form = PrintForm {
        number: 1,
        name: "Foo".into(),
        surname: "Bar".into(),
    };
    assert!(filler.fill(&form, Some(output.as_path()), None).await.is_err());
    assert!(!Path::new(&output).exists());
}

// =====================================================================
// Real browser
// =====================================================================

#[tokio::test]
#[ignore = "needs a local Chromium"]
async fn chromium_renders_form_and_table() {
    let registry = BindingRegistry::new();
    registry.register::<PrintForm>();
    registry.declare_template::<PrintTable>(TemplateOptions::inline(templates::table_template()));
    registry.declare_field::<PrintTable>("number", None);
    registry.declare_table::<PrintTable>("data", None);

    let session = RenderSession::chromium_from_env();
    let filler = Filler::new(Arc::new(registry), session.clone());

    let form = PrintForm {
        number: 2,
        name: "Foo".into(),
        surname: "Bar".into(),
    };
    let form_pdf = filler.fill(&form, None, None).await.unwrap();
    let table_pdf = filler.fill(&foo_table(), None, None).await.unwrap();
    session.stop().await.unwrap();

    assert_eq!(&form_pdf[0..5], b"%PDF-");
    assert_eq!(&table_pdf[0..5], b"%PDF-");
}

/// Header and cell texts of every generated table, in document order.
fn table_cells(html: &str) -> Vec<String> {
    let cell = regex::Regex::new(r"(?s)<t([hd])\b[^>]*>(.*?)</t[hd]>").unwrap();
    cell.captures_iter(html)
        .map(|c| format!("{}:{}", &c[1], &c[2]))
        .collect()
}

#[tokio::test]
#[ignore = "needs a local Chromium"]
async fn chromium_table_generator_matches_static_expansion() {
    #[derive(Serialize)]
    struct People {
        number: u32,
        data: serde_json::Value,
    }

    let registry = BindingRegistry::new();
    registry.register::<PrintForm>();
    registry.declare_template::<People>(TemplateOptions::inline(
        templates::nested_table_template(),
    ));
    registry.declare_field::<People>("number", None);
    registry.declare_table::<People>("data", None);

    let session = RenderSession::chromium_from_env();
    let filler = Filler::new(Arc::new(registry), session.clone());

    let form = PrintForm {
        number: 2,
        name: "Foo".into(),
        surname: "Bar".into(),
    };
    let form_dom = session
        .snapshot(&filler.prepare(&form, None).await.unwrap().into_request(None))
        .await
        .unwrap();

    let people = People {
        number: 3,
        data: json!([
            {
                "index": 1,
                "name": "Foo",
                "nestedObject": {"nestedName": "N", "anotherNestedObject": {"group": 4}}
            },
            {"index": 2, "name": "B<i>", "nestedObject": null, "tags": ["x", "y"]}
        ]),
    };
    let prepared = filler.prepare(&people, None).await.unwrap();
    let expected = prepared.to_static_html().await.unwrap();
    let table_dom = session
        .snapshot(&prepared.into_request(None))
        .await
        .unwrap();
    session.stop().await.unwrap();

    assert!(form_dom.contains("<h1>Form n. 2</h1>"), "{form_dom}");
    assert!(form_dom.contains("<p class=\"value\">Foo</p>"));
    assert!(!table_dom.contains("<inject-table"));
    assert!(table_dom.contains("<td>1</td><td>Foo</td>"));
    assert!(table_dom.contains("B&lt;i&gt;"));
    assert_eq!(table_cells(&table_dom), table_cells(&expected));
}
