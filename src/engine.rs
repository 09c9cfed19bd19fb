//! Engine seam – the minimal surface the render session needs from a
//! headless browser.
//!
//! [`crate::chromium::ChromiumEngine`] is the production implementation.
//! Tests substitute a scripted fake so session behaviour (lazy start,
//! relaunch after a crash, page cleanup) can be checked without Chromium.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::options::PdfOptions;

/// Launches browsers.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Start a fresh browser process with the given configuration.
    async fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn Browser>>;
}

/// A running browser instance.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a new blank page.
    async fn new_page(&self) -> Result<Box<dyn Page>>;

    /// Whether the connection to the browser process is still alive.
    fn is_connected(&self) -> bool;

    /// Resolves once the browser disconnects, for any reason.
    async fn wait_disconnected(&self);

    /// Shut the browser down. Closing an already disconnected browser is not
    /// an error; its process is killed if it is still running.
    async fn close(&self) -> Result<()>;
}

/// One page, used for exactly one render.
#[async_trait]
pub trait Page: Send {
    /// Emulate a CSS media type (`"screen"` or `"print"`).
    async fn emulate_media(&mut self, media: &str) -> Result<()>;

    /// Replace the page document with `html`.
    async fn set_content(&mut self, html: &str) -> Result<()>;

    /// Add a `<style>` element. `origin` names the file it came from, if any.
    async fn add_style(&mut self, css: &str, origin: Option<&Path>) -> Result<()>;

    /// Add and execute a `<script>` element.
    async fn add_script(&mut self, js: &str, origin: Option<&Path>) -> Result<()>;

    /// Wait for the document and its fonts to load, then fire the start
    /// event that in-page scripts (the table generator) listen for.
    async fn wait_ready(&mut self) -> Result<()>;

    /// Serialize the current DOM, doctype included.
    async fn content(&mut self) -> Result<String>;

    /// Print the current document.
    async fn pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>>;

    /// Close the page, releasing its resources.
    async fn close(self: Box<Self>) -> Result<()>;
}
