use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// Receives `(message, hint, file)` for every translatable literal.
pub type UntranslatedReporter = Arc<dyn Fn(&str, Option<&str>, &str) + Send + Sync>;

/// Assigns compact ids to translatable messages.
pub trait TranslationCompiler: Send {
    fn start_file(&mut self, file: &str);

    fn add_usage(&mut self, message: &str, with_params: bool, hint: Option<&str>) -> u32;

    fn finish_file(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
struct MessageKey {
    message: String,
    hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEntry {
    pub message: String,
    pub hint: Option<String>,
    pub with_params: bool,
    /// Files that used the message in their latest compilation
    pub files: Vec<String>,
}

/// In-memory message catalogue. The same message and hint always get the
/// same id; a file's usages are replaced each time it is compiled again.
#[derive(Debug, Default)]
pub struct MessageTable {
    messages: IndexMap<MessageKey, MessageEntry>,
    current_file: Option<String>,
}

impl MessageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn message(&self, id: u32) -> Option<&MessageEntry> {
        self.messages.get_index(id as usize).map(|(_, entry)| entry)
    }

    /// Catalogue as a JSON array indexed by id
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.messages.values().collect::<Vec<_>>())
            .unwrap_or(serde_json::Value::Null)
    }
}

impl TranslationCompiler for MessageTable {
    fn start_file(&mut self, file: &str) {
        for entry in self.messages.values_mut() {
            entry.files.retain(|f| f != file);
        }
        self.current_file = Some(file.to_string());
    }

    fn add_usage(&mut self, message: &str, with_params: bool, hint: Option<&str>) -> u32 {
        let key = MessageKey {
            message: message.to_string(),
            hint: hint.map(str::to_string),
        };
        let entry = self.messages.entry(key);
        let id = entry.index() as u32;
        let entry = entry.or_insert_with(|| MessageEntry {
            message: message.to_string(),
            hint: hint.map(str::to_string),
            with_params,
            files: Vec::new(),
        });
        entry.with_params |= with_params;
        if let Some(file) = &self.current_file {
            if !entry.files.contains(file) {
                entry.files.push(file.clone());
            }
        }
        id
    }

    fn finish_file(&mut self) {
        self.current_file = None;
    }
}
