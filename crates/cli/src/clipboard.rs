use parley_core::{Clipboard, Error, Result};
use std::sync::Mutex;

/// System clipboard backed by `arboard`
///
/// The handle is opened on first use and kept, since some platforms drop the
/// copied text when the owning handle goes away.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<arboard::Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if handle.is_none() {
            *handle = Some(arboard::Clipboard::new().map_err(|e| Error::Clipboard(e.to_string()))?);
        }

        match handle.as_mut() {
            Some(clipboard) => clipboard.set_text(text.to_string()).map_err(|e| Error::Clipboard(e.to_string())),
            None => Err(Error::Clipboard("clipboard unavailable".to_string())),
        }
    }
}
