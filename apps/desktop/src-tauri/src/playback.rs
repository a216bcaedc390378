use std::{io::Cursor, path::Path, sync::Arc};

use crate::trace;

/// Seam between the flows and the audio output host. Playback never fails a
/// flow: a blocked or broken output leaves flow state untouched, so the
/// interface is fire-and-forget.
pub trait AudioOutput: Send + Sync {
    fn play_best_effort(&self, data_dir: &Path, task_id: &str, label: &str, bytes: Arc<Vec<u8>>);
}

/// Plays decoded audio (WAV clips, server MP3s) through the default output
/// device. Output streams are not `Send`, so each play request gets its own
/// short-lived thread that owns stream, sink, and decoder together.
pub struct RodioOutput;

impl AudioOutput for RodioOutput {
    fn play_best_effort(&self, data_dir: &Path, task_id: &str, label: &str, bytes: Arc<Vec<u8>>) {
        let data_dir = data_dir.to_path_buf();
        let task_id = task_id.to_string();
        let label = label.to_string();
        let _ = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let t0 = std::time::Instant::now();
                match play_to_end(&bytes) {
                    Ok(()) => trace::event(
                        &data_dir,
                        Some(&task_id),
                        "Playback",
                        "PLAYBACK.done",
                        "ok",
                        Some(serde_json::json!({
                            "label": label,
                            "bytes": bytes.len(),
                            "elapsed_ms": t0.elapsed().as_millis() as i64,
                        })),
                    ),
                    Err(e) => trace::event(
                        &data_dir,
                        Some(&task_id),
                        "Playback",
                        "PLAYBACK.failed",
                        "err",
                        Some(serde_json::json!({"label": label, "error": e})),
                    ),
                }
            });
    }
}

fn play_to_end(bytes: &Arc<Vec<u8>>) -> Result<(), String> {
    let (_stream, handle) = rodio::OutputStream::try_default()
        .map_err(|e| format!("open output stream failed: {e}"))?;
    let sink = rodio::Sink::try_new(&handle).map_err(|e| format!("create sink failed: {e}"))?;
    let source = rodio::Decoder::new(Cursor::new((**bytes).clone()))
        .map_err(|e| format!("decode audio failed: {e}"))?;
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}
