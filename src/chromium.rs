//! Chromium over the DevTools protocol, via `chromiumoxide`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetEmulatedMediaParams;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig, Page as CdpPage};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::engine::{Browser, Engine, Page};
use crate::error::{FillerError, Result};
use crate::options::PdfOptions;
use crate::tables::START_EVENT;

fn engine_err(e: CdpError) -> FillerError {
    FillerError::Engine(e.to_string())
}

/// Launches headless Chromium processes.
#[derive(Debug, Default, Clone)]
pub struct ChromiumEngine;

impl ChromiumEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Engine for ChromiumEngine {
    async fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn Browser>> {
        let mut builder = BrowserConfig::builder()
            .args(config.launch_args())
            .launch_timeout(config.launch_timeout)
            .viewport(None);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(FillerError::EngineLaunch)?;

        log::info!(
            "Launching Chromium (headless: {}, sandbox: {})",
            config.headless,
            config.sandbox
        );
        let (browser, mut handler) = CdpBrowser::launch(browser_config)
            .await
            .map_err(|e| FillerError::EngineLaunch(e.to_string()))?;

        let (connected_tx, connected_rx) = watch::channel(true);
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                match event {
                    Ok(()) => {}
                    Err(CdpError::Ws(e)) => {
                        log::warn!("Browser connection lost: {e}");
                        break;
                    }
                    Err(e) => log::debug!("Ignoring browser event error: {e}"),
                }
            }
            let _ = connected_tx.send(false);
            log::info!("Browser disconnected");
        });

        Ok(Arc::new(ChromiumBrowser {
            browser: Mutex::new(browser),
            connected: connected_rx,
            events,
        }))
    }
}

/// A launched Chromium process plus the task pumping its protocol events.
pub struct ChromiumBrowser {
    browser: Mutex<CdpBrowser>,
    connected: watch::Receiver<bool>,
    events: JoinHandle<()>,
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        if !self.is_connected() {
            return Err(FillerError::EngineDisconnected);
        }
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(engine_err)?;
        Ok(Box::new(ChromiumPage { page }))
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn wait_disconnected(&self) {
        let mut connected = self.connected.clone();
        let _ = connected.wait_for(|up| !*up).await;
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if self.is_connected() {
            if let Err(e) = browser.close().await {
                log::warn!("Browser did not close cleanly: {e}");
            }
        } else if let Some(Err(e)) = browser.kill().await {
            // Connection gone but the process may still be alive.
            log::debug!("Killing disconnected browser: {e}");
        }
        if let Err(e) = browser.wait().await {
            log::debug!("Waiting for browser process: {e}");
        }
        self.events.abort();
        Ok(())
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.events.abort();
    }
}

struct ChromiumPage {
    page: CdpPage,
}

impl ChromiumPage {
    async fn evaluate(&self, expression: String) -> Result<()> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .build()
            .map_err(FillerError::Engine)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(engine_err)?;
        Ok(())
    }
}

/// Script appending an element with the given text to the document head.
fn append_element_script(tag: &str, text: &str) -> Result<String> {
    let text = serde_json::to_string(text)?;
    Ok(format!(
        "(() => {{ const el = document.createElement('{tag}'); el.textContent = {text}; \
         (document.head || document.documentElement).appendChild(el); }})()"
    ))
}

fn ready_script() -> String {
    format!(
        "new Promise(resolve => {{ \
           const start = () => document.fonts.ready.then(() => {{ \
             document.dispatchEvent(new Event('{START_EVENT}')); resolve(true); \
           }}); \
           if (document.readyState === 'complete') start(); \
           else window.addEventListener('load', start, {{ once: true }}); \
         }})"
    )
}

#[async_trait]
impl Page for ChromiumPage {
    async fn emulate_media(&mut self, media: &str) -> Result<()> {
        let params = SetEmulatedMediaParams::builder().media(media).build();
        self.page.execute(params).await.map_err(engine_err)?;
        Ok(())
    }

    async fn set_content(&mut self, html: &str) -> Result<()> {
        self.page.set_content(html).await.map_err(engine_err)?;
        Ok(())
    }

    async fn add_style(&mut self, css: &str, _origin: Option<&Path>) -> Result<()> {
        self.evaluate(append_element_script("style", css)?).await
    }

    async fn add_script(&mut self, js: &str, origin: Option<&Path>) -> Result<()> {
        let source = match origin {
            Some(path) => format!("{js}\n//# sourceURL={}", path.display()),
            None => js.to_string(),
        };
        self.evaluate(append_element_script("script", &source)?).await
    }

    async fn wait_ready(&mut self) -> Result<()> {
        self.evaluate(ready_script()).await
    }

    async fn content(&mut self) -> Result<String> {
        self.page.content().await.map_err(engine_err)
    }

    async fn pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>> {
        let params: PrintToPdfParams =
            serde_json::from_value(Value::Object(options.to_print_params()?))
                .map_err(|e| FillerError::Options(e.to_string()))?;
        self.page.pdf(params).await.map_err(engine_err)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.map_err(engine_err)
    }
}
