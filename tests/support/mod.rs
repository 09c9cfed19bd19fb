//! Scripted stand-in for the browser engine.
//!
//! Records every page operation so tests can assert on render order, and
//! exposes knobs for launch failures, slow captures and crashes.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use pdf_filler::engine::{Browser, Engine, Page};
use pdf_filler::{EngineConfig, FillerError, PdfOptions, Result};

pub const FAKE_PDF: &[u8] = b"%PDF-1.7 fake";

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    EmulateMedia(String),
    SetContent(String),
    Style(String),
    Script(String),
    WaitReady,
    Content,
    Pdf(PdfOptions),
    Close,
}

#[derive(Default)]
struct State {
    launches: AtomicUsize,
    fail_launches: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    crash_on_pdf: AtomicBool,
    hang_on_close: AtomicBool,
    pdf_delay: Mutex<Option<Duration>>,
    ops: Mutex<Vec<(usize, Op)>>,
    browsers: Mutex<Vec<Arc<watch::Sender<bool>>>>,
    configs: Mutex<Vec<EngineConfig>>,
}

/// Cloneable handle; clones observe the same engine.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.state.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.state.pages_closed.load(Ordering::SeqCst)
    }

    /// Make the next `n` launches fail.
    pub fn fail_next_launches(&self, n: usize) {
        self.state.fail_launches.store(n, Ordering::SeqCst);
    }

    pub fn set_pdf_delay(&self, delay: Duration) {
        *self.state.pdf_delay.lock().unwrap() = Some(delay);
    }

    /// Make the next capture kill the browser and fail.
    pub fn crash_on_next_pdf(&self) {
        self.state.crash_on_pdf.store(true, Ordering::SeqCst);
    }

    /// Make browser shutdown never finish, like a wedged process.
    pub fn hang_on_close(&self) {
        self.state.hang_on_close.store(true, Ordering::SeqCst);
    }

    /// Simulate the current browser process dying.
    pub fn disconnect_current(&self) {
        if let Some(browser) = self.state.browsers.lock().unwrap().last() {
            browser.send_replace(false);
        }
    }

    pub fn current_connected(&self) -> bool {
        self.state
            .browsers
            .lock()
            .unwrap()
            .last()
            .map(|b| *b.borrow())
            .unwrap_or(false)
    }

    pub fn configs(&self) -> Vec<EngineConfig> {
        self.state.configs.lock().unwrap().clone()
    }

    /// All recorded operations, in order.
    pub fn ops(&self) -> Vec<Op> {
        self.state.ops.lock().unwrap().iter().map(|(_, op)| op.clone()).collect()
    }

    /// Operations of one page (pages are numbered from 0 in opening order).
    pub fn page_ops(&self, page: usize) -> Vec<Op> {
        self.state
            .ops
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == page)
            .map(|(_, op)| op.clone())
            .collect()
    }

    /// Poll until `launches() >= n` or give up after two seconds.
    pub async fn wait_for_launches(&self, n: usize) -> bool {
        for _ in 0..200 {
            if self.launches() >= n && self.current_connected() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn Browser>> {
        self.state.configs.lock().unwrap().push(config.clone());
        let failing = self.state.fail_launches.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.fail_launches.store(failing - 1, Ordering::SeqCst);
            return Err(FillerError::EngineLaunch("scripted launch failure".into()));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        let (connected, _) = watch::channel(true);
        let connected = Arc::new(connected);
        self.state.browsers.lock().unwrap().push(Arc::clone(&connected));
        Ok(Arc::new(FakeBrowser {
            connected,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeBrowser {
    connected: Arc<watch::Sender<bool>>,
    state: Arc<State>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        if !self.is_connected() {
            return Err(FillerError::Engine("browser is gone".into()));
        }
        let id = self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            id,
            html: String::new(),
            connected: Arc::clone(&self.connected),
            state: Arc::clone(&self.state),
        }))
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn wait_disconnected(&self) {
        let mut rx = self.connected.subscribe();
        let _ = rx.wait_for(|up| !*up).await;
    }

    async fn close(&self) -> Result<()> {
        self.connected.send_replace(false);
        if self.state.hang_on_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

struct FakePage {
    id: usize,
    html: String,
    connected: Arc<watch::Sender<bool>>,
    state: Arc<State>,
}

impl FakePage {
    fn record(&self, op: Op) -> Result<()> {
        if !*self.connected.borrow() {
            return Err(FillerError::Engine("target closed".into()));
        }
        self.state.ops.lock().unwrap().push((self.id, op));
        Ok(())
    }
}

#[async_trait]
impl Page for FakePage {
    async fn emulate_media(&mut self, media: &str) -> Result<()> {
        self.record(Op::EmulateMedia(media.into()))
    }

    async fn set_content(&mut self, html: &str) -> Result<()> {
        self.record(Op::SetContent(html.into()))?;
        self.html = html.to_string();
        Ok(())
    }

    async fn add_style(&mut self, css: &str, _origin: Option<&Path>) -> Result<()> {
        self.record(Op::Style(css.into()))
    }

    async fn add_script(&mut self, js: &str, _origin: Option<&Path>) -> Result<()> {
        self.record(Op::Script(js.into()))
    }

    async fn wait_ready(&mut self) -> Result<()> {
        self.record(Op::WaitReady)
    }

    async fn content(&mut self) -> Result<String> {
        self.record(Op::Content)?;
        Ok(format!("<html><body>{}</body></html>", self.html))
    }

    async fn pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>> {
        let delay = *self.state.pdf_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.crash_on_pdf.swap(false, Ordering::SeqCst) {
            self.connected.send_replace(false);
            return Err(FillerError::Engine("target crashed".into()));
        }
        self.record(Op::Pdf(options.clone()))?;
        Ok(FAKE_PDF.to_vec())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        self.state.ops.lock().unwrap().push((self.id, Op::Close));
        Ok(())
    }
}
