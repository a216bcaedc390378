use serde::Serialize;

use crate::api::{ApiError, ApiErrorKind};

pub const STATUS_READY: &str = "Status: Ready";
pub const STATUS_TRANSLATING: &str = "Status: Translating...";
pub const STATUS_COMPLETE: &str = "Status: Translation Complete";
pub const STATUS_GENERATING: &str = "Status: Generating audio...";
pub const STATUS_PLAYING: &str = "Status: Playing Audio";
pub const STATUS_CLEARED: &str = "Status: Cleared";
pub const MSG_NO_TEXT: &str = "No text provided";
pub const MSG_NO_RESULT_TEXT: &str = "No translated text to play";
pub const MSG_BUSY: &str = "Request already in progress";
pub const MSG_REQUEST_FAILED: &str = "Error: Request failed";

#[derive(Debug, Clone, Serialize)]
pub struct TextFlowView {
    pub status: String,
    pub translated_text: String,
    pub audio_url: Option<String>,
    pub busy: bool,
}

/// The text translation flow: stateless request/response with a single
/// active-request slot shared by the translate and speech actions.
/// `epoch` fences late responses: a clear issued mid-flight bumps it and
/// the stale outcome is dropped.
pub struct TextFlow {
    status: String,
    translated_text: String,
    audio_url: Option<String>,
    busy: bool,
    epoch: u64,
}

impl TextFlow {
    pub fn new() -> Self {
        Self {
            status: STATUS_READY.to_string(),
            translated_text: String::new(),
            audio_url: None,
            busy: false,
            epoch: 0,
        }
    }

    pub fn view(&self) -> TextFlowView {
        TextFlowView {
            status: self.status.clone(),
            translated_text: self.translated_text.clone(),
            audio_url: self.audio_url.clone(),
            busy: self.busy,
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Guard + entry for the translate action. Returns the fencing epoch
    /// when the request may proceed.
    pub fn begin_translate(&mut self, text: &str) -> Option<u64> {
        if self.busy {
            self.status = MSG_BUSY.to_string();
            return None;
        }
        if text.trim().is_empty() {
            self.status = MSG_NO_TEXT.to_string();
            return None;
        }
        self.busy = true;
        self.status = STATUS_TRANSLATING.to_string();
        Some(self.epoch)
    }

    /// On success the result field is replaced; on an application error the
    /// field is left unchanged and the server message is shown verbatim.
    pub fn finish_translate(&mut self, epoch: u64, outcome: Result<String, ApiError>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.busy = false;
        match outcome {
            Ok(translated) => {
                self.translated_text = translated;
                self.status = STATUS_COMPLETE.to_string();
            }
            Err(e) => self.status = error_status(&e),
        }
        true
    }

    /// Guard + entry for the speech action: operates on the current result
    /// field, not the original input.
    pub fn begin_speech(&mut self) -> Option<(u64, String)> {
        if self.busy {
            self.status = MSG_BUSY.to_string();
            return None;
        }
        let text = self.translated_text.trim().to_string();
        if text.is_empty() {
            self.status = MSG_NO_RESULT_TEXT.to_string();
            return None;
        }
        self.busy = true;
        self.status = STATUS_GENERATING.to_string();
        Some((self.epoch, text))
    }

    pub fn finish_speech(&mut self, epoch: u64, outcome: Result<String, ApiError>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.busy = false;
        match outcome {
            Ok(audio_url) => {
                self.audio_url = Some(audio_url);
                self.status = STATUS_PLAYING.to_string();
            }
            Err(e) => self.status = error_status(&e),
        }
        true
    }

    /// Clear action: result and audio reference discarded. Idempotent. An
    /// in-flight request is orphaned: its outcome will be dropped.
    pub fn clear(&mut self) {
        self.translated_text.clear();
        self.audio_url = None;
        self.busy = false;
        self.epoch = self.epoch.wrapping_add(1);
        self.status = STATUS_CLEARED.to_string();
    }
}

fn error_status(e: &ApiError) -> String {
    match e.kind {
        ApiErrorKind::Application => format!("Error: {}", e.message),
        ApiErrorKind::Transport | ApiErrorKind::Protocol => MSG_REQUEST_FAILED.to_string(),
    }
}
