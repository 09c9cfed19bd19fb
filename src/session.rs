//! Render session – owns the browser process and turns render requests into
//! PDF bytes.
//!
//! One browser is shared by every render; each render gets its own page.
//! Launch, relaunch and shutdown are serialized behind an async mutex, and a
//! watcher task relaunches the browser when it disconnects on its own. A
//! launch generation counter keeps a stale watcher from relaunching after an
//! explicit [`RenderSession::stop`] or a newer launch.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::assets::{Asset, AssetKind, LoadedAsset};
use crate::chromium::ChromiumEngine;
use crate::config::EngineConfig;
use crate::engine::{Browser, Engine, Page};
use crate::error::{FillerError, Result};
use crate::options::PdfOptions;

/// Media type forced on every page so print-only rules don't hide content.
pub const RENDER_MEDIA: &str = "screen";

/// Observable lifecycle state of a [`RenderSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Ready,
    /// Ready, with at least one render in progress.
    Rendering,
}

const STOPPED: u8 = 0;
const STARTING: u8 = 1;
const READY: u8 = 2;

/// Everything one render needs: final markup, ordered assets and resolved
/// print options.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub markup: String,
    pub assets: Vec<Asset>,
    pub options: PdfOptions,
    /// Deadline for the page work. The page is closed either way.
    pub timeout: Option<Duration>,
}

impl RenderRequest {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            assets: Vec::new(),
            options: PdfOptions::defaults(),
            timeout: None,
        }
    }

    pub fn assets(mut self, assets: Vec<Asset>) -> Self {
        self.assets = assets;
        self
    }

    pub fn options(mut self, options: PdfOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct Lifecycle {
    browser: Option<Arc<dyn Browser>>,
    watcher: Option<JoinHandle<()>>,
    generation: u64,
}

struct Shared {
    engine: Arc<dyn Engine>,
    config: EngineConfig,
    lifecycle: Mutex<Lifecycle>,
    phase: AtomicU8,
    active: AtomicUsize,
}

/// Handle to a shared browser session. Clones share the same browser.
#[derive(Clone)]
pub struct RenderSession {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("state", &self.state())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl RenderSession {
    pub fn new(engine: impl Engine, config: EngineConfig) -> Self {
        Self::with_engine(Arc::new(engine), config)
    }

    pub fn with_engine(engine: Arc<dyn Engine>, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                config,
                lifecycle: Mutex::new(Lifecycle {
                    browser: None,
                    watcher: None,
                    generation: 0,
                }),
                phase: AtomicU8::new(STOPPED),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Chromium session configured from the process environment.
    pub fn chromium_from_env() -> Self {
        Self::new(ChromiumEngine::new(), EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        match self.shared.phase.load(Ordering::SeqCst) {
            STARTING => SessionState::Starting,
            READY if self.shared.active.load(Ordering::SeqCst) > 0 => SessionState::Rendering,
            READY => SessionState::Ready,
            _ => SessionState::Stopped,
        }
    }

    /// Launch the browser unless a connected one is already running.
    pub async fn start(&self) -> Result<()> {
        self.browser().await.map(|_| ())
    }

    /// Close the browser. A later render or [`start`](Self::start) launches
    /// a new one.
    pub async fn stop(&self) -> Result<()> {
        let mut life = self.shared.lifecycle.lock().await;
        life.generation += 1;
        if let Some(watcher) = life.watcher.take() {
            watcher.abort();
        }
        let result = match life.browser.take() {
            Some(browser) => {
                log::info!("Stopping browser");
                self.shared.close_browser(browser).await
            }
            None => Ok(()),
        };
        self.shared.set_phase(STOPPED);
        result
    }

    /// Render one document.
    ///
    /// Assets are loaded and options validated before a page is opened, so
    /// those failures never touch the browser. Once opened, the page is
    /// closed on every path, including when the caller drops this future.
    pub async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        self.run(request, Capture::Pdf).await
    }

    /// Run a render up to the point of printing and return the page's
    /// serialized DOM instead, after in-page scripts such as the table
    /// generator have run.
    pub async fn snapshot(&self, request: &RenderRequest) -> Result<String> {
        let bytes = self.run(request, Capture::Html).await?;
        String::from_utf8(bytes).map_err(|e| FillerError::Engine(e.to_string()))
    }

    async fn run(&self, request: &RenderRequest, capture: Capture) -> Result<Vec<u8>> {
        request.options.to_print_params()?;
        let mut assets = Vec::with_capacity(request.assets.len());
        for asset in &request.assets {
            if let Some(asset) = asset.load().await? {
                assets.push(asset);
            }
        }

        let browser = self.browser().await?;
        let active = ActiveRender::enter(Arc::clone(&self.shared));

        let page = browser.new_page().await.map_err(|e| {
            if browser.is_connected() {
                FillerError::EngineUnavailable(e.to_string())
            } else {
                FillerError::EngineDisconnected
            }
        })?;

        let job = PageJob {
            markup: request.markup.clone(),
            assets,
            options: request.options.clone(),
            timeout: request.timeout,
            capture,
        };
        // Detached from the caller: the task owns the page and closes it.
        let outcome = tokio::spawn(job.run(page, active))
            .await
            .unwrap_or_else(|e| Err(FillerError::Engine(format!("render task failed: {e}"))));

        match outcome {
            Err(e) if !browser.is_connected() && e.is_engine_failure() => {
                log::error!("Render failed, browser disconnected: {e}");
                Err(FillerError::EngineDisconnected)
            }
            Err(e) => Err(e),
            Ok(bytes) => {
                log::debug!("Captured {} byte(s)", bytes.len());
                Ok(bytes)
            }
        }
    }

    /// The connected browser, launching one first if needed.
    async fn browser(&self) -> Result<Arc<dyn Browser>> {
        let mut life = self.shared.lifecycle.lock().await;
        if let Some(browser) = &life.browser {
            if browser.is_connected() {
                return Ok(Arc::clone(browser));
            }
        }
        self.shared.launch(&mut life).await
    }
}

impl Shared {
    fn set_phase(&self, phase: u8) {
        self.phase.store(phase, Ordering::SeqCst);
    }

    /// Close a browser within `close_timeout`. A browser that does not go
    /// away in time is abandoned so the lifecycle lock is released.
    async fn close_browser(&self, browser: Arc<dyn Browser>) -> Result<()> {
        let limit = self.config.close_timeout;
        match tokio::time::timeout(limit, browser.close()).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Browser did not close within {limit:?}, abandoning it");
                Err(FillerError::Timeout(limit))
            }
        }
    }

    /// Replace whatever browser is held with a freshly launched one. The
    /// caller holds the lifecycle lock.
    async fn launch(self: &Arc<Self>, life: &mut Lifecycle) -> Result<Arc<dyn Browser>> {
        self.set_phase(STARTING);
        if let Some(watcher) = life.watcher.take() {
            watcher.abort();
        }
        if let Some(stale) = life.browser.take() {
            if let Err(e) = self.close_browser(stale).await {
                log::debug!("Closing stale browser: {e}");
            }
        }
        life.generation += 1;

        match self.engine.launch(&self.config).await {
            Ok(browser) => {
                life.watcher = Some(spawn_watcher(
                    Arc::downgrade(self),
                    Arc::clone(&browser),
                    life.generation,
                ));
                life.browser = Some(Arc::clone(&browser));
                self.set_phase(READY);
                log::info!("Browser ready (launch #{})", life.generation);
                Ok(browser)
            }
            Err(e) => {
                self.set_phase(STOPPED);
                log::error!("Browser launch failed: {e}");
                Err(e)
            }
        }
    }

    /// Relaunch after an unexpected disconnect, unless the session moved on.
    async fn recover(self: Arc<Self>, generation: u64) {
        let mut life = self.lifecycle.lock().await;
        if life.generation != generation || life.browser.is_none() {
            return;
        }
        log::warn!("Browser disconnected unexpectedly, relaunching");
        // This task is the watcher; detach its handle so launch doesn't abort it.
        life.watcher.take();
        if let Err(e) = self.launch(&mut life).await {
            log::error!("Relaunch failed, next render will retry: {e}");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(watcher) = self.lifecycle.get_mut().watcher.take() {
            watcher.abort();
        }
    }
}

fn spawn_watcher(
    shared: Weak<Shared>,
    browser: Arc<dyn Browser>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        browser.wait_disconnected().await;
        drop(browser);
        if let Some(shared) = shared.upgrade() {
            shared.recover(generation).await;
        }
    })
}

/// Counts a render as active for [`SessionState::Rendering`].
struct ActiveRender(Arc<Shared>);

impl ActiveRender {
    fn enter(shared: Arc<Shared>) -> Self {
        shared.active.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for ActiveRender {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a render takes from the page once it is ready.
#[derive(Debug, Clone, Copy)]
enum Capture {
    Pdf,
    Html,
}

/// Owned inputs of the page work, so it can outlive the caller's future.
struct PageJob {
    markup: String,
    assets: Vec<LoadedAsset>,
    options: PdfOptions,
    timeout: Option<Duration>,
    capture: Capture,
}

impl PageJob {
    async fn run(self, mut page: Box<dyn Page>, _active: ActiveRender) -> Result<Vec<u8>> {
        let work = self.drive(page.as_mut());
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or(Err(FillerError::Timeout(limit))),
            None => work.await,
        };

        if let Err(e) = page.close().await {
            log::debug!("Page did not close cleanly: {e}");
        }
        outcome
    }

    /// The strictly sequential page work of one render.
    async fn drive(&self, page: &mut dyn Page) -> Result<Vec<u8>> {
        page.emulate_media(RENDER_MEDIA).await?;
        page.set_content(&self.markup).await?;
        for asset in &self.assets {
            let origin = asset.origin.as_deref();
            match asset.kind {
                AssetKind::Style => page.add_style(&asset.content, origin).await?,
                AssetKind::Script => page.add_script(&asset.content, origin).await?,
            }
        }
        page.wait_ready().await?;
        match self.capture {
            Capture::Pdf => page.pdf(&self.options).await,
            Capture::Html => page.content().await.map(String::into_bytes),
        }
    }
}
