//! Mock implementations for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kiln_core::config::ProjectConfig;
use kiln_core::project::LogCallback;
use kiln_core::resolve::{AssetResolver, AtlasEncoder, AtlasImage, Resolution, UntranslatedReporter};
use kiln_core::shorten::FileNameShortener;

/// Log callback that keeps every line
#[derive(Debug, Clone, Default)]
pub struct CapturingLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> LogCallback {
        let lines = self.lines.clone();
        Arc::new(move |line: &str| lines.lock().unwrap().push(line.to_string()))
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }

    pub fn count_containing(&self, text: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(text))
            .count()
    }
}

/// Claims assets whose name ends with `suffix` and answers with a fixed value
pub struct StaticResolver {
    name: String,
    suffix: String,
    value: String,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(name: &str, suffix: &str, value: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            suffix: suffix.to_string(),
            value: value.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetResolver for StaticResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_asset(
        &self,
        name: &str,
        _shortener: &mut FileNameShortener,
        _config: &ProjectConfig,
    ) -> Option<Resolution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        name.ends_with(&self.suffix)
            .then(|| Resolution::Ready(Ok(self.value.clone())))
    }
}

/// Claims every asset and answers later with a value derived from the name
pub struct DeferredResolver {
    name: String,
}

impl DeferredResolver {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl AssetResolver for DeferredResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_asset(
        &self,
        name: &str,
        shortener: &mut FileNameShortener,
        _config: &ProjectConfig,
    ) -> Option<Resolution> {
        let value = format!("deferred/{}", shortener.short_name(name));
        Some(Resolution::Deferred(Box::new(move || Ok(value))))
    }
}

/// Claims every asset and reports a failure
pub struct FailingResolver {
    name: String,
    message: String,
}

impl FailingResolver {
    pub fn new(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            message: message.to_string(),
        })
    }
}

impl AssetResolver for FailingResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_asset(
        &self,
        _name: &str,
        _shortener: &mut FileNameShortener,
        _config: &ProjectConfig,
    ) -> Option<Resolution> {
        Some(Resolution::Ready(Err(self.message.clone())))
    }
}

/// Encodes an atlas as a text description instead of pixels
#[derive(Debug, Default)]
pub struct MockAtlasEncoder {
    encoded: AtomicUsize,
}

impl MockAtlasEncoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn encoded(&self) -> usize {
        self.encoded.load(Ordering::SeqCst)
    }
}

impl AtlasEncoder for MockAtlasEncoder {
    fn encode(
        &self,
        image: &AtlasImage,
        read: &mut dyn FnMut(&str) -> Option<Arc<[u8]>>,
    ) -> Result<Vec<u8>, String> {
        self.encoded.fetch_add(1, Ordering::SeqCst);
        let mut out = format!("atlas {}x{}\n", image.width, image.height);
        for (key, placement) in &image.sprites {
            if read(&key.name).is_none() {
                return Err(format!("cannot read {}", key.name));
            }
            out.push_str(&format!(
                "{} {},{} {}x{}\n",
                key.name, placement.x, placement.y, placement.width, placement.height
            ));
        }
        Ok(out.into_bytes())
    }
}

/// Untranslated-text reporter that records `(message, file)` pairs
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    seen: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reporter(&self) -> UntranslatedReporter {
        let seen = self.seen.clone();
        Arc::new(move |message: &str, _hint: Option<&str>, file: &str| {
            seen.lock()
                .unwrap()
                .push((message.to_string(), file.to_string()))
        })
    }

    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}
