use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::json;

use crate::api::TranslateApi;
use crate::audio_flow::{AudioFlow, AudioFlowView};
use crate::metrics;
use crate::playback::{AudioOutput, RodioOutput};
use crate::recorder::{CaptureBackend, CpalBackend};
use crate::settings;
use crate::text_flow::{TextFlow, TextFlowView};
use crate::ui::{self, ShellView, Tab};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct SessionInner {
    active_tab: Tab,
    text: TextFlow,
    audio: AudioFlow,
}

/// The per-run session object: sole owner of both flows and the tab state.
/// Commands lock, run a pure flow transition, release the lock for any
/// network round trip, then re-lock to apply the outcome. The capture
/// handle never leaves the lock, which is what makes it safe to keep the
/// non-Send stream inside the session (see recorder.rs).
#[derive(Clone)]
pub struct AppSession {
    inner: Arc<Mutex<SessionInner>>,
    capture: Arc<dyn CaptureBackend>,
    output: Arc<dyn AudioOutput>,
    http: Client,
}

impl AppSession {
    pub fn new() -> Self {
        Self::with_components(Arc::new(CpalBackend), Arc::new(RodioOutput))
    }

    fn with_components(capture: Arc<dyn CaptureBackend>, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                active_tab: Tab::default(),
                text: TextFlow::new(),
                audio: AudioFlow::new(),
            })),
            capture,
            output,
            http: Client::new(),
        }
    }

    fn api(&self, data_dir: &Path) -> TranslateApi {
        let s = settings::load_settings_or_recover(data_dir);
        TranslateApi::new(self.http.clone(), s.server_base_url)
    }

    fn autoplay_enabled(&self, data_dir: &Path) -> bool {
        settings::load_settings_or_recover(data_dir).autoplay
    }

    // --- shell -----------------------------------------------------------

    pub fn shell_view(&self) -> ShellView {
        let g = self.inner.lock().unwrap();
        ui::shell_view(g.active_tab)
    }

    pub fn select_tab(&self, id: &str) -> Result<ShellView> {
        let tab = Tab::parse(id).ok_or_else(|| anyhow!("unknown tab: {id}"))?;
        let mut g = self.inner.lock().unwrap();
        g.active_tab = tab;
        Ok(ui::shell_view(g.active_tab))
    }

    // --- text flow -------------------------------------------------------

    pub fn text_view(&self) -> TextFlowView {
        self.inner.lock().unwrap().text.view()
    }

    pub async fn translate_text(
        &self,
        data_dir: &Path,
        task_id: &str,
        text: &str,
        language: &str,
    ) -> TextFlowView {
        let epoch = {
            let mut g = self.inner.lock().unwrap();
            match g.text.begin_translate(text) {
                Some(epoch) => epoch,
                None => {
                    note_flow_event(data_dir, task_id, "text", "translate_rejected", g.text.status());
                    return g.text.view();
                }
            }
        };

        let api = self.api(data_dir);
        let outcome = api.translate_text(data_dir, task_id, text, language).await;

        let mut g = self.inner.lock().unwrap();
        let applied = g.text.finish_translate(epoch, outcome);
        note_flow_event(
            data_dir,
            task_id,
            "text",
            if applied { "translate_done" } else { "translate_dropped" },
            g.text.status(),
        );
        g.text.view()
    }

    /// Request synthesized speech for the current result field, then play it
    /// best-effort when autoplay is on.
    pub async fn speak_translation(&self, data_dir: &Path, task_id: &str) -> TextFlowView {
        let (epoch, text) = {
            let mut g = self.inner.lock().unwrap();
            match g.text.begin_speech() {
                Some(v) => v,
                None => {
                    note_flow_event(data_dir, task_id, "text", "speech_rejected", g.text.status());
                    return g.text.view();
                }
            }
        };

        let api = self.api(data_dir);
        let outcome = api.synthesize_speech(data_dir, task_id, &text).await;
        let play_url = outcome.as_ref().ok().cloned();

        let applied = {
            let mut g = self.inner.lock().unwrap();
            let applied = g.text.finish_speech(epoch, outcome);
            note_flow_event(
                data_dir,
                task_id,
                "text",
                if applied { "speech_done" } else { "speech_dropped" },
                g.text.status(),
            );
            applied
        };

        if applied && self.autoplay_enabled(data_dir) {
            if let Some(url) = play_url {
                self.fetch_and_play(data_dir, task_id, &api, &url, "text_speech").await;
            }
        }

        self.text_view()
    }

    pub fn clear_text(&self, data_dir: &Path) -> TextFlowView {
        let mut g = self.inner.lock().unwrap();
        g.text.clear();
        note_flow_event(data_dir, "-", "text", "clear", g.text.status());
        g.text.view()
    }

    // --- audio flow ------------------------------------------------------

    pub fn audio_view(&self) -> AudioFlowView {
        self.inner.lock().unwrap().audio.view()
    }

    pub fn start_recording(&self, data_dir: &Path, task_id: &str) -> AudioFlowView {
        let mut g = self.inner.lock().unwrap();
        if !g.audio.may_start_recording() {
            note_flow_event(data_dir, task_id, "audio", "record_rejected", g.audio.status());
            return g.audio.view();
        }
        // Device acquisition stays under the lock: the capture handle is
        // confined to the session for its whole lifetime.
        match self.capture.begin() {
            Ok(capture) => {
                g.audio.recording_started(capture, now_ms());
                note_flow_event(data_dir, task_id, "audio", "record_started", g.audio.status());
            }
            Err(e) => {
                g.audio.recording_denied();
                crate::trace::event(
                    data_dir,
                    Some(task_id),
                    "Record",
                    "RECORD.begin_failed",
                    "err",
                    Some(json!({"code": e.code, "message": e.message})),
                );
                note_flow_event(data_dir, task_id, "audio", "record_denied", g.audio.status());
            }
        }
        g.audio.view()
    }

    pub fn stop_recording(&self, data_dir: &Path, task_id: &str) -> AudioFlowView {
        let mut g = self.inner.lock().unwrap();
        match g.audio.stop_recording(now_ms()) {
            Some(elapsed_ms) => {
                crate::trace::event(
                    data_dir,
                    Some(task_id),
                    "Record",
                    "RECORD.stopped",
                    "ok",
                    Some(json!({"elapsed_ms": elapsed_ms as i64})),
                );
                note_flow_event(data_dir, task_id, "audio", "record_stopped", g.audio.status());
            }
            None => {
                note_flow_event(data_dir, task_id, "audio", "record_stop_noop", g.audio.status());
            }
        }
        g.audio.view()
    }

    pub fn play_clip(&self, data_dir: &Path, task_id: &str) -> AudioFlowView {
        let mut g = self.inner.lock().unwrap();
        match g.audio.request_playback() {
            Some(clip) => {
                self.output
                    .play_best_effort(data_dir, task_id, "local_clip", clip.wav.clone());
            }
            None => {
                note_flow_event(data_dir, task_id, "audio", "playback_rejected", g.audio.status());
            }
        }
        g.audio.view()
    }

    pub async fn translate_audio(
        &self,
        data_dir: &Path,
        task_id: &str,
        language: &str,
    ) -> AudioFlowView {
        let clip = {
            let mut g = self.inner.lock().unwrap();
            match g.audio.begin_upload(language) {
                Some(clip) => clip,
                None => {
                    note_flow_event(data_dir, task_id, "audio", "upload_rejected", g.audio.status());
                    return g.audio.view();
                }
            }
        };

        let api = self.api(data_dir);
        let outcome = api
            .translate_audio(
                data_dir,
                task_id,
                (*clip.wav).clone(),
                clip.content_type,
                clip.file_name,
                language,
            )
            .await;

        let (applied, play_url) = {
            let mut g = self.inner.lock().unwrap();
            let applied = g.audio.finish_upload(outcome);
            note_flow_event(
                data_dir,
                task_id,
                "audio",
                if applied { "upload_done" } else { "upload_dropped" },
                g.audio.status(),
            );
            (applied, g.audio.view().audio_url)
        };

        if applied && self.autoplay_enabled(data_dir) {
            if let Some(url) = play_url {
                self.fetch_and_play(data_dir, task_id, &api, &url, "audio_result").await;
            }
        }

        self.audio_view()
    }

    /// Manual replay of the last server audio for a flow (the recovery path
    /// when autoplay was blocked or disabled). No flow state changes.
    pub async fn replay_result_audio(&self, data_dir: &Path, task_id: &str, flow: &str) -> bool {
        let url = {
            let g = self.inner.lock().unwrap();
            match flow {
                "text" => g.text.view().audio_url,
                "audio" => g.audio.view().audio_url,
                _ => None,
            }
        };
        let Some(url) = url else {
            return false;
        };
        let api = self.api(data_dir);
        self.fetch_and_play(data_dir, task_id, &api, &url, "replay").await;
        true
    }

    pub fn clear_audio(&self, data_dir: &Path) -> AudioFlowView {
        let mut g = self.inner.lock().unwrap();
        g.audio.clear();
        note_flow_event(data_dir, "-", "audio", "clear", g.audio.status());
        g.audio.view()
    }

    async fn fetch_and_play(
        &self,
        data_dir: &Path,
        task_id: &str,
        api: &TranslateApi,
        audio_url: &str,
        label: &str,
    ) {
        // fetch_audio traces its own failures; playback is fire-and-forget.
        if let Ok(bytes) = api.fetch_audio(data_dir, task_id, audio_url).await {
            self.output
                .play_best_effort(data_dir, task_id, label, Arc::new(bytes));
        }
    }
}

fn note_flow_event(data_dir: &Path, task_id: &str, flow: &str, action: &str, status_line: &str) {
    if let Err(e) = metrics::append_jsonl(
        data_dir,
        &json!({
            "type": "flow_event",
            "ts_ms": now_ms(),
            "task_id": task_id,
            "flow": flow,
            "action": action,
            "status_line": status_line,
        }),
    ) {
        crate::safe_eprintln!("metrics append failed (flow_event): {e:#}");
    }
}
