//! pdf-filler – command-line template filler.
//!
//! Usage:
//!   pdf-filler <template.html> [output.pdf] [--data data.json]
//!              [--include asset]... [--options options.json]
//!              [--landscape] [--html]
//!
//! The data file is shaped `{ "fields": { … }, "tables": { … } }`: every
//! entry of `fields` fills the `%%placeholder%%` of the same name, every
//! entry of `tables` feeds the `<inject-table items="…">` of the same key.
//!
//! If the output path is omitted it is written next to the template with the
//! same stem (`.pdf`, or `.html` with `--html`).

use std::{env, path::PathBuf, process, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use pdf_filler::{
    Asset, BindingRegistry, Filler, PdfOptions, RenderSession, TemplateOptions,
};

/// Values read from `--data`.
#[derive(Debug, Default, Deserialize)]
struct DataFile {
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    tables: Map<String, Value>,
}

/// The bound instance: all fields and tables as one property map.
#[derive(Debug, Serialize)]
struct CliDocument {
    #[serde(flatten)]
    properties: Map<String, Value>,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> T {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("reading '{}': {e}", path.display())));
    serde_json::from_str(&text)
        .unwrap_or_else(|e| fail(format!("parsing '{}': {e}", path.display())))
}

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    data: Option<PathBuf>,
    options: Option<PathBuf>,
    includes: Vec<PathBuf>,
    landscape: bool,
    html_only: bool,
    help: bool,
}

/// Parse the arguments after the program name.
fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut input_path: Option<PathBuf> = None;
    let mut positional = 0usize;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .map(PathBuf::from)
                .ok_or_else(|| format!("Missing value for {flag}"))
        };
        match arg.as_str() {
            "--data" | "-d" => cli.data = Some(value(arg.as_str())?),
            "--options" => cli.options = Some(value(arg.as_str())?),
            "--include" | "-i" => cli.includes.push(value(arg.as_str())?),
            "--landscape" | "-l" => cli.landscape = true,
            "--html" => cli.html_only = true,
            "--help" | "-h" => cli.help = true,
            other if other.starts_with('-') => return Err(format!("Unknown flag: {other}")),
            path => {
                match positional {
                    0 => input_path = Some(PathBuf::from(path)),
                    1 => cli.output = Some(PathBuf::from(path)),
                    _ => return Err(format!("Unexpected argument: {path}")),
                }
                positional += 1;
            }
        }
    }

    if cli.help {
        return Ok(cli);
    }
    cli.input = input_path.ok_or("no template specified.")?;
    Ok(cli)
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let cli = match parse_args(&args[1..]) {
        Ok(cli) if cli.help => {
            print_usage(&args[0]);
            process::exit(0);
        }
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage(&args[0]);
            process::exit(1);
        }
    };
    let CliArgs {
        input,
        output: output_path,
        data: data_path,
        options: options_path,
        includes,
        landscape,
        html_only,
        ..
    } = cli;

    let output = output_path.unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension(if html_only { "html" } else { "pdf" });
        o
    });

    let data: DataFile = data_path.as_ref().map(read_json).unwrap_or_default();
    let mut options: PdfOptions = options_path.as_ref().map(read_json).unwrap_or_default();
    if landscape {
        options.landscape = Some(true);
    }

    // Includes given on the command line are relative to the working
    // directory, not the template.
    let mut template = TemplateOptions::from_path(&input);
    for include in includes {
        let path = std::path::absolute(&include).unwrap_or(include);
        template = template.include(Asset::path(path));
    }

    let registry = BindingRegistry::new();
    registry.declare_template::<CliDocument>(template);
    for key in data.fields.keys() {
        registry.declare_field::<CliDocument>(key, None);
    }
    for key in data.tables.keys() {
        registry.declare_table::<CliDocument>(key, None);
    }

    let mut properties = data.fields;
    properties.extend(data.tables);
    let document = CliDocument { properties };

    let session = RenderSession::chromium_from_env();
    let filler = Filler::new(Arc::new(registry), session.clone());

    if html_only {
        let html = match filler.prepare(&document, Some(&options)).await {
            Ok(prepared) => prepared.to_static_html().await,
            Err(e) => Err(e),
        };
        match html {
            Ok(html) => {
                if let Err(e) = tokio::fs::write(&output, &html).await {
                    fail(format!("writing '{}': {e}", output.display()));
                }
                eprintln!("Wrote '{}' ({} bytes)", output.display(), html.len());
            }
            Err(e) => fail(e),
        }
        return;
    }

    let result = filler.fill(&document, Some(output.as_path()), Some(&options)).await;
    if let Err(e) = session.stop().await {
        log::warn!("Browser did not shut down cleanly: {e}");
    }
    match result {
        Ok(bytes) => eprintln!("Wrote '{}' ({} bytes)", output.display(), bytes.len()),
        Err(e) => fail(format!("generating PDF: {e}")),
    }
}

fn print_usage(prog: &str) {
    eprintln!("pdf-filler – fill an HTML template with JSON data and print it to PDF");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <template.html> [output.pdf] [--data data.json] [--include asset]...");
    eprintln!("        [--options options.json] [--landscape] [--html]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <template.html>  Template with %%placeholders%% and <inject-table> markup");
    eprintln!("  [output.pdf]     Output path (default: same stem as the template)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --data, -d       JSON file: {{ \"fields\": {{…}}, \"tables\": {{…}} }}");
    eprintln!("  --include, -i    Extra .css/.js asset, injected after the defaults (repeatable)");
    eprintln!("  --options        JSON print options (format, margin, printBackground, …)");
    eprintln!("  --landscape      Landscape orientation");
    eprintln!("  --html           Write the filled HTML with tables expanded instead of a PDF");
    eprintln!("  --help           Print this message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PDF_FILLER_NO_SANDBOX=1   run Chromium without its sandbox");
    eprintln!("  PDF_FILLER_NO_HEADLESS=1  show the browser window");
    eprintln!("  PDF_FILLER_CHROME=path    browser executable");
    eprintln!("  RUST_LOG=debug            verbose logging");
}
