#![allow(dead_code)]

use courier::{CourierError, ElementHandle, UiSession};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::Level;

/// Test helper to setup logging for debugging
pub fn setup_logging() {
    let _ = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub const REFERENCE_INSTRUCTION: &str =
    "send email to joe@example.com about Meeting saying 'Hello from automation'";

/// A session call, keyed by the label it concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ResolveControl(String),
    ResolveField(String),
    WaitVisible(String),
    Click(String),
    SetValue(String, String),
    Capture(String),
}

/// Misbehaviour injected for one label.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Resolution always answers not-found
    NeverResolves,
    /// Resolution succeeds only after this much time
    ResolvesAfter(Duration),
    /// Resolves, but never becomes visible
    NeverVisible,
    /// Resolution never returns
    Hangs,
    /// The click or fill is rejected
    InteractionFails,
}

/// Recording [`UiSession`] whose elements are all present and visible unless a fault
/// says otherwise.
pub struct MockSession {
    calls: Mutex<Vec<Call>>,
    faults: HashMap<String, Fault>,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    capture_fails: bool,
    started: Instant,
}

struct InFlight<'a>(&'a MockSession);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            faults: HashMap::new(),
            in_flight: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
            capture_fails: false,
            started: Instant::now(),
        }
    }

    pub fn with_fault(mut self, label: &str, fault: Fault) -> Self {
        self.faults.insert(label.to_string(), fault);
        self
    }

    pub fn failing_captures(mut self) -> Self {
        self.capture_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// True if two session operations were ever in progress at once.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn enter(&self, call: Call) -> InFlight<'_> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(call);
        InFlight(self)
    }

    fn fault(&self, label: &str) -> Option<Fault> {
        self.faults.get(label).copied()
    }

    async fn resolve(&self, label: &str) -> Result<ElementHandle, CourierError> {
        tokio::task::yield_now().await;
        match self.fault(label) {
            Some(Fault::NeverResolves) => {
                Err(CourierError::ElementNotFound(format!("no element for {label}")))
            }
            Some(Fault::ResolvesAfter(after)) if self.started.elapsed() < after => {
                Err(CourierError::ElementNotFound(format!("{label} not rendered yet")))
            }
            Some(Fault::Hangs) => std::future::pending().await,
            _ => Ok(ElementHandle::new(label, label)),
        }
    }
}

#[async_trait::async_trait]
impl UiSession for MockSession {
    async fn resolve_control(
        &self,
        _role: &str,
        name: &str,
        _fuzzy: bool,
    ) -> Result<ElementHandle, CourierError> {
        let _guard = self.enter(Call::ResolveControl(name.to_string()));
        self.resolve(name).await
    }

    async fn resolve_field(
        &self,
        label: &str,
        _fuzzy: bool,
    ) -> Result<ElementHandle, CourierError> {
        let _guard = self.enter(Call::ResolveField(label.to_string()));
        self.resolve(label).await
    }

    async fn wait_visible(
        &self,
        handle: &ElementHandle,
        timeout: Duration,
    ) -> Result<(), CourierError> {
        let _guard = self.enter(Call::WaitVisible(handle.id.clone()));
        match self.fault(&handle.id) {
            Some(Fault::NeverVisible) => {
                sleep(timeout).await;
                Err(CourierError::Timeout(format!("{} never became visible", handle.id)))
            }
            _ => Ok(()),
        }
    }

    async fn click(&self, handle: &ElementHandle) -> Result<(), CourierError> {
        let _guard = self.enter(Call::Click(handle.id.clone()));
        tokio::task::yield_now().await;
        match self.fault(&handle.id) {
            Some(Fault::InteractionFails) => Err(CourierError::Platform(
                "element detached from document".to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn set_value(&self, handle: &ElementHandle, text: &str) -> Result<(), CourierError> {
        let _guard = self.enter(Call::SetValue(handle.id.clone(), text.to_string()));
        tokio::task::yield_now().await;
        match self.fault(&handle.id) {
            Some(Fault::InteractionFails) => {
                Err(CourierError::Platform("field is read-only".to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn capture_diagnostic(&self, tag: &str) -> Result<PathBuf, CourierError> {
        let _guard = self.enter(Call::Capture(tag.to_string()));
        if self.capture_fails {
            Err(CourierError::Platform("screenshot backend unavailable".to_string()))
        } else {
            Ok(PathBuf::from(format!("diagnostics/{tag}.png")))
        }
    }
}
