use serde::Serialize;

use crate::api::{ApiError, ApiErrorKind, AudioTranslation};
use crate::recorder::{ActiveCapture, RecordedClip};

pub const STATUS_IDLE: &str = "Status: Idle";
pub const STATUS_RECORDING: &str = "Status: Recording...";
pub const STATUS_STOPPED: &str = "Status: Recording stopped (ready)";
pub const STATUS_UPLOADING: &str = "Status: Uploading & Translating...";
pub const STATUS_COMPLETE: &str = "Status: Translation Complete";
pub const STATUS_CLEARED: &str = "Status: Cleared";
pub const MSG_MIC_DENIED: &str = "Error: Microphone access denied";
pub const MSG_RECORD_FAILED: &str = "Error: Recording failed";
pub const MSG_NO_CLIP_PLAY: &str = "No recorded audio";
pub const MSG_NO_CLIP_SUBMIT: &str = "Record audio first";
pub const MSG_NO_LANGUAGE: &str = "Select target language";
pub const MSG_STOP_FIRST: &str = "Stop recording first";
pub const MSG_UPLOAD_BUSY: &str = "Translation already in progress";
pub const MSG_UPLOAD_FAILED: &str = "Error: Upload failed";

/// Capture lifecycle, reified. Holding the live capture inside `Recording`
/// ties device ownership to the state tag: the device cannot outlive the
/// state that says it is held. `prev_clip` keeps the previous clip valid
/// until the new recording finishes.
pub enum CaptureState {
    Idle,
    Recording {
        capture: Box<dyn ActiveCapture>,
        prev_clip: Option<RecordedClip>,
        started_at_ms: i64,
    },
    Stopped {
        clip: RecordedClip,
    },
    Uploading {
        clip: RecordedClip,
    },
}

impl CaptureState {
    fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Recording { .. } => "recording",
            CaptureState::Stopped { .. } => "stopped",
            CaptureState::Uploading { .. } => "uploading",
        }
    }

    fn clip(&self) -> Option<&RecordedClip> {
        match self {
            CaptureState::Idle => None,
            CaptureState::Recording { prev_clip, .. } => prev_clip.as_ref(),
            CaptureState::Stopped { clip } | CaptureState::Uploading { clip } => Some(clip),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioFlowView {
    pub state: &'static str,
    pub status: String,
    pub has_clip: bool,
    pub clip_duration_seconds: Option<f64>,
    pub transcribed_text: Option<String>,
    pub translated_text: Option<String>,
    pub audio_url: Option<String>,
    pub detected_language: Option<String>,
}

/// The audio capture flow. All user-visible strings originate here; the
/// session layer only moves data between this machine and the backends.
pub struct AudioFlow {
    state: CaptureState,
    status: String,
    result: Option<AudioTranslation>,
}

impl AudioFlow {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            status: STATUS_IDLE.to_string(),
            result: None,
        }
    }

    pub fn view(&self) -> AudioFlowView {
        AudioFlowView {
            state: self.state.name(),
            status: self.status.clone(),
            has_clip: self.state.clip().is_some(),
            clip_duration_seconds: self.state.clip().map(|c| c.duration_seconds),
            transcribed_text: self.result.as_ref().map(|r| r.transcribed_text.clone()),
            translated_text: self.result.as_ref().map(|r| r.translated_text.clone()),
            audio_url: self.result.as_ref().and_then(|r| r.audio_url.clone()),
            detected_language: self
                .result
                .as_ref()
                .and_then(|r| r.detected_language.clone()),
        }
    }

    /// Whether a start action is currently legal. Rejections are in place:
    /// only the status line changes.
    pub fn may_start_recording(&mut self) -> bool {
        match self.state {
            CaptureState::Idle | CaptureState::Stopped { .. } => true,
            CaptureState::Recording { .. } => {
                self.status = STATUS_RECORDING.to_string();
                false
            }
            CaptureState::Uploading { .. } => {
                self.status = MSG_UPLOAD_BUSY.to_string();
                false
            }
        }
    }

    /// Attach a freshly acquired capture. The previous clip, if any, stays
    /// valid until this recording stops.
    pub fn recording_started(&mut self, capture: Box<dyn ActiveCapture>, now_ms: i64) {
        let prev_clip = match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Stopped { clip } => Some(clip),
            _ => None,
        };
        self.state = CaptureState::Recording {
            capture,
            prev_clip,
            started_at_ms: now_ms,
        };
        self.status = STATUS_RECORDING.to_string();
    }

    /// Device acquisition failed: no transition, report the permission error.
    pub fn recording_denied(&mut self) {
        self.status = MSG_MIC_DENIED.to_string();
    }

    /// Stop action. Outside `Recording` this is a no-op (mirrors the guard
    /// a media recorder enforces); returns the recording duration when a
    /// clip was produced.
    pub fn stop_recording(&mut self, now_ms: i64) -> Option<u128> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Recording {
                capture,
                prev_clip,
                started_at_ms,
            } => match capture.finish() {
                Ok(clip) => {
                    self.state = CaptureState::Stopped { clip };
                    self.status = STATUS_STOPPED.to_string();
                    Some(now_ms.saturating_sub(started_at_ms).max(0) as u128)
                }
                Err(_) => {
                    // The device is released either way; fall back to the
                    // previous clip so a valid clip is never lost.
                    self.state = match prev_clip {
                        Some(clip) => CaptureState::Stopped { clip },
                        None => CaptureState::Idle,
                    };
                    self.status = MSG_RECORD_FAILED.to_string();
                    None
                }
            },
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Local playback request. Non-transitioning: on success the status line
    /// is left as-is, matching the silent side-action contract.
    pub fn request_playback(&mut self) -> Option<RecordedClip> {
        match self.state.clip() {
            Some(clip) => Some(clip.clone()),
            None => {
                self.status = MSG_NO_CLIP_PLAY.to_string();
                None
            }
        }
    }

    /// Submit action. Guards reject in place; on success the machine moves
    /// to `Uploading` and hands back the clip for the network layer.
    pub fn begin_upload(&mut self, language: &str) -> Option<RecordedClip> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Idle => {
                self.status = MSG_NO_CLIP_SUBMIT.to_string();
                None
            }
            CaptureState::Recording {
                capture,
                prev_clip,
                started_at_ms,
            } => {
                self.state = CaptureState::Recording {
                    capture,
                    prev_clip,
                    started_at_ms,
                };
                self.status = MSG_STOP_FIRST.to_string();
                None
            }
            CaptureState::Uploading { clip } => {
                self.state = CaptureState::Uploading { clip };
                self.status = MSG_UPLOAD_BUSY.to_string();
                None
            }
            CaptureState::Stopped { clip } => {
                if language.trim().is_empty() {
                    self.state = CaptureState::Stopped { clip };
                    self.status = MSG_NO_LANGUAGE.to_string();
                    return None;
                }
                self.status = STATUS_UPLOADING.to_string();
                self.state = CaptureState::Uploading { clip: clip.clone() };
                Some(clip)
            }
        }
    }

    /// Apply the upload outcome. The clip is retained in `Stopped` for
    /// manual retry on any response. Returns false when the outcome arrived
    /// after a clear emptied the machine (the clear wins).
    pub fn finish_upload(&mut self, outcome: Result<AudioTranslation, ApiError>) -> bool {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Uploading { clip } => {
                self.state = CaptureState::Stopped { clip };
                match outcome {
                    Ok(result) => {
                        self.result = Some(result);
                        self.status = STATUS_COMPLETE.to_string();
                    }
                    Err(e) => {
                        self.status = match e.kind {
                            ApiErrorKind::Application => format!("Error: {}", e.message),
                            ApiErrorKind::Transport | ApiErrorKind::Protocol => {
                                MSG_UPLOAD_FAILED.to_string()
                            }
                        };
                    }
                }
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// Clear action: any state back to `Idle`, clip and results discarded.
    /// Dropping a live capture releases the device. Idempotent.
    pub fn clear(&mut self) {
        self.state = CaptureState::Idle;
        self.result = None;
        self.status = STATUS_CLEARED.to_string();
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{ActiveCapture, CaptureError, RecordedClip};

    struct FakeCapture {
        samples: Vec<f32>,
        fail: bool,
    }

    impl ActiveCapture for FakeCapture {
        fn finish(self: Box<Self>) -> Result<RecordedClip, CaptureError> {
            if self.fail {
                return Err(CaptureError {
                    code: "E_CAPTURE_STREAM".to_string(),
                    message: "fake failure".to_string(),
                });
            }
            Ok(RecordedClip::from_samples(&self.samples))
        }
    }

    fn capture(n: usize) -> Box<dyn ActiveCapture> {
        Box::new(FakeCapture {
            samples: vec![0.1; n],
            fail: false,
        })
    }

    fn translation() -> AudioTranslation {
        AudioTranslation {
            transcribed_text: "hello there".to_string(),
            translated_text: "hola".to_string(),
            audio_url: Some("/generated/x.mp3".to_string()),
            detected_language: Some("en".to_string()),
        }
    }

    fn app_error(msg: &str) -> ApiError {
        ApiError {
            kind: ApiErrorKind::Application,
            code: "E_API_TRANSLATE_AUDIO".to_string(),
            message: msg.to_string(),
        }
    }

    fn transport_error() -> ApiError {
        ApiError {
            kind: ApiErrorKind::Transport,
            code: "E_API_HTTP_SEND".to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn recorded_flow() -> AudioFlow {
        let mut flow = AudioFlow::new();
        assert!(flow.may_start_recording());
        flow.recording_started(capture(16_000), 1_000);
        assert!(flow.stop_recording(3_500).is_some());
        flow
    }

    #[test]
    fn start_stop_produces_a_clip_and_reports_readiness() {
        let mut flow = AudioFlow::new();
        assert!(flow.may_start_recording());
        flow.recording_started(capture(16_000), 1_000);
        assert_eq!(flow.status(), STATUS_RECORDING);
        assert_eq!(flow.state_name(), "recording");

        let elapsed = flow.stop_recording(4_000).expect("duration");
        assert_eq!(elapsed, 3_000);
        assert_eq!(flow.status(), STATUS_STOPPED);
        assert_eq!(flow.state_name(), "stopped");
        assert!(flow.view().has_clip);
    }

    #[test]
    fn denied_microphone_stays_idle_with_permission_error() {
        let mut flow = AudioFlow::new();
        assert!(flow.may_start_recording());
        flow.recording_denied();
        assert_eq!(flow.state_name(), "idle");
        assert_eq!(flow.status(), MSG_MIC_DENIED);
    }

    #[test]
    fn submit_without_clip_is_rejected_in_place() {
        let mut flow = AudioFlow::new();
        assert!(flow.begin_upload("Hindi").is_none());
        assert_eq!(flow.state_name(), "idle");
        assert_eq!(flow.status(), MSG_NO_CLIP_SUBMIT);
    }

    #[test]
    fn submit_without_language_is_rejected_in_place() {
        let mut flow = recorded_flow();
        assert!(flow.begin_upload("  ").is_none());
        assert_eq!(flow.state_name(), "stopped");
        assert_eq!(flow.status(), MSG_NO_LANGUAGE);
        assert!(flow.view().has_clip);
    }

    #[test]
    fn successful_upload_returns_to_stopped_with_result() {
        let mut flow = recorded_flow();
        let clip = flow.begin_upload("Hindi").expect("clip");
        assert!(!clip.wav.is_empty());
        assert_eq!(flow.state_name(), "uploading");
        assert_eq!(flow.status(), STATUS_UPLOADING);

        assert!(flow.finish_upload(Ok(translation())));
        assert_eq!(flow.state_name(), "stopped");
        assert_eq!(flow.status(), STATUS_COMPLETE);
        let view = flow.view();
        assert_eq!(view.transcribed_text.as_deref(), Some("hello there"));
        assert_eq!(view.translated_text.as_deref(), Some("hola"));
        assert_eq!(view.audio_url.as_deref(), Some("/generated/x.mp3"));
        assert_eq!(view.detected_language.as_deref(), Some("en"));
    }

    #[test]
    fn application_error_is_shown_verbatim_and_clip_retained() {
        let mut flow = recorded_flow();
        flow.begin_upload("Hindi").expect("clip");
        assert!(flow.finish_upload(Err(app_error("rate limited"))));
        assert_eq!(flow.status(), "Error: rate limited");
        assert_eq!(flow.state_name(), "stopped");
        assert!(flow.view().has_clip, "clip must survive for manual retry");
    }

    #[test]
    fn transport_error_shows_generic_upload_failure() {
        let mut flow = recorded_flow();
        flow.begin_upload("Hindi").expect("clip");
        assert!(flow.finish_upload(Err(transport_error())));
        assert_eq!(flow.status(), MSG_UPLOAD_FAILED);
        assert!(flow.view().has_clip);
    }

    #[test]
    fn double_submit_is_rejected_while_uploading() {
        let mut flow = recorded_flow();
        flow.begin_upload("Hindi").expect("clip");
        assert!(flow.begin_upload("Hindi").is_none());
        assert_eq!(flow.status(), MSG_UPLOAD_BUSY);
        assert_eq!(flow.state_name(), "uploading");
    }

    #[test]
    fn clear_resets_everything_and_is_idempotent() {
        let mut flow = recorded_flow();
        flow.finish_upload(Ok(translation()));
        flow.clear();
        assert_eq!(flow.status(), STATUS_CLEARED);
        assert_eq!(flow.state_name(), "idle");
        let first = flow.view();
        assert!(!first.has_clip);
        assert!(first.transcribed_text.is_none());
        assert!(first.audio_url.is_none());

        flow.clear();
        let second = flow.view();
        assert_eq!(second.status, first.status);
        assert_eq!(second.state, first.state);
        assert_eq!(second.has_clip, first.has_clip);
    }

    #[test]
    fn playback_after_clear_reports_no_recorded_audio() {
        let mut flow = recorded_flow();
        assert!(flow.request_playback().is_some());
        flow.clear();
        assert!(flow.request_playback().is_none());
        assert_eq!(flow.status(), MSG_NO_CLIP_PLAY);
    }

    #[test]
    fn upload_outcome_after_clear_is_dropped() {
        let mut flow = recorded_flow();
        flow.begin_upload("Hindi").expect("clip");
        flow.clear();
        assert!(!flow.finish_upload(Ok(translation())));
        assert_eq!(flow.state_name(), "idle");
        assert_eq!(flow.status(), STATUS_CLEARED);
        assert!(flow.view().transcribed_text.is_none());
    }

    #[test]
    fn previous_clip_survives_until_new_recording_stops() {
        let mut flow = recorded_flow();
        assert!(flow.may_start_recording());
        flow.recording_started(capture(32_000), 10_000);
        // Old clip still present mid-recording.
        assert!(flow.view().has_clip);
        assert_eq!(flow.view().clip_duration_seconds, Some(1.0));

        flow.stop_recording(12_000).expect("duration");
        // Replaced only now.
        assert_eq!(flow.view().clip_duration_seconds, Some(2.0));
    }

    #[test]
    fn failed_stop_falls_back_to_previous_clip() {
        let mut flow = recorded_flow();
        assert!(flow.may_start_recording());
        flow.recording_started(
            Box::new(FakeCapture {
                samples: vec![],
                fail: true,
            }),
            0,
        );
        assert!(flow.stop_recording(100).is_none());
        assert_eq!(flow.status(), MSG_RECORD_FAILED);
        assert_eq!(flow.state_name(), "stopped");
        assert_eq!(flow.view().clip_duration_seconds, Some(1.0));
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let mut flow = AudioFlow::new();
        assert!(flow.stop_recording(5).is_none());
        assert_eq!(flow.state_name(), "idle");
        assert_eq!(flow.status(), STATUS_IDLE);
    }

    #[test]
    fn submit_while_recording_is_rejected_in_place() {
        let mut flow = AudioFlow::new();
        assert!(flow.may_start_recording());
        flow.recording_started(capture(100), 0);
        assert!(flow.begin_upload("Hindi").is_none());
        assert_eq!(flow.status(), MSG_STOP_FIRST);
        assert_eq!(flow.state_name(), "recording");
    }
}
