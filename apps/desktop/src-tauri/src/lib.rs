mod api;
mod audio_flow;
mod data_dir;
mod debug_log;
mod metrics;
mod playback;
mod recorder;
mod safe_print;
mod session;
mod settings;
mod text_flow;
mod trace;
mod ui;
mod wav;

use audio_flow::AudioFlowView;
use session::AppSession;
use settings::{Settings, SettingsPatch};
use text_flow::TextFlowView;
use trace::Span;
use ui::ShellView;

fn cmd_span(
    data_dir: &std::path::Path,
    task_id: Option<&str>,
    step_id: &str,
    ctx: Option<serde_json::Value>,
) -> Span {
    Span::start(data_dir, task_id, "Cmd", step_id, ctx)
}

fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tauri::command]
fn shell_state(state: tauri::State<AppSession>) -> Result<ShellView, String> {
    Ok(state.shell_view())
}

#[tauri::command]
fn select_tab(state: tauri::State<AppSession>, id: &str) -> Result<ShellView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let span = cmd_span(&dir, None, "CMD.select_tab", Some(serde_json::json!({"id": id})));
    match state.select_tab(id) {
        Ok(v) => {
            span.ok(None);
            Ok(v)
        }
        Err(e) => {
            span.err_anyhow("ui", "E_CMD_SELECT_TAB", &e, None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
fn language_options() -> Result<Vec<String>, String> {
    Ok(settings::LANGUAGE_OPTIONS
        .iter()
        .map(|s| s.to_string())
        .collect())
}

#[tauri::command]
fn text_state(state: tauri::State<AppSession>) -> Result<TextFlowView, String> {
    Ok(state.text_view())
}

#[tauri::command]
async fn translate_text(
    state: tauri::State<'_, AppSession>,
    text: &str,
    language: &str,
) -> Result<TextFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let task_id = new_task_id();
    let span = cmd_span(
        &dir,
        Some(&task_id),
        "CMD.translate_text",
        Some(serde_json::json!({"text_chars": text.len(), "language": language})),
    );
    let view = state.translate_text(&dir, &task_id, text, language).await;
    span.ok(Some(serde_json::json!({"status_line": view.status})));
    Ok(view)
}

#[tauri::command]
async fn play_translation(state: tauri::State<'_, AppSession>) -> Result<TextFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let task_id = new_task_id();
    let span = cmd_span(&dir, Some(&task_id), "CMD.play_translation", None);
    let view = state.speak_translation(&dir, &task_id).await;
    span.ok(Some(serde_json::json!({"status_line": view.status})));
    Ok(view)
}

#[tauri::command]
fn clear_text(state: tauri::State<AppSession>) -> Result<TextFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let span = cmd_span(&dir, None, "CMD.clear_text", None);
    let view = state.clear_text(&dir);
    span.ok(None);
    Ok(view)
}

#[tauri::command]
fn audio_state(state: tauri::State<AppSession>) -> Result<AudioFlowView, String> {
    Ok(state.audio_view())
}

#[tauri::command]
fn start_recording(state: tauri::State<AppSession>) -> Result<AudioFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let task_id = new_task_id();
    let span = cmd_span(&dir, Some(&task_id), "CMD.start_recording", None);
    let view = state.start_recording(&dir, &task_id);
    span.ok(Some(serde_json::json!({"state": view.state})));
    Ok(view)
}

#[tauri::command]
fn stop_recording(state: tauri::State<AppSession>) -> Result<AudioFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let task_id = new_task_id();
    let span = cmd_span(&dir, Some(&task_id), "CMD.stop_recording", None);
    let view = state.stop_recording(&dir, &task_id);
    span.ok(Some(serde_json::json!({
        "state": view.state,
        "clip_duration_seconds": view.clip_duration_seconds,
    })));
    Ok(view)
}

#[tauri::command]
fn play_recording(state: tauri::State<AppSession>) -> Result<AudioFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let task_id = new_task_id();
    let span = cmd_span(&dir, Some(&task_id), "CMD.play_recording", None);
    let view = state.play_clip(&dir, &task_id);
    span.ok(Some(serde_json::json!({"has_clip": view.has_clip})));
    Ok(view)
}

#[tauri::command]
async fn translate_recording(
    state: tauri::State<'_, AppSession>,
    language: &str,
) -> Result<AudioFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let task_id = new_task_id();
    let span = cmd_span(
        &dir,
        Some(&task_id),
        "CMD.translate_recording",
        Some(serde_json::json!({"language": language})),
    );
    let view = state.translate_audio(&dir, &task_id, language).await;
    span.ok(Some(serde_json::json!({"state": view.state, "status_line": view.status})));
    Ok(view)
}

#[tauri::command]
async fn replay_result_audio(
    state: tauri::State<'_, AppSession>,
    flow: &str,
) -> Result<bool, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let task_id = new_task_id();
    let span = cmd_span(
        &dir,
        Some(&task_id),
        "CMD.replay_result_audio",
        Some(serde_json::json!({"flow": flow})),
    );
    let played = state.replay_result_audio(&dir, &task_id, flow).await;
    span.ok(Some(serde_json::json!({"played": played})));
    Ok(played)
}

#[tauri::command]
fn clear_recording(state: tauri::State<AppSession>) -> Result<AudioFlowView, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let span = cmd_span(&dir, None, "CMD.clear_recording", None);
    let view = state.clear_audio(&dir);
    span.ok(None);
    Ok(view)
}

#[tauri::command]
fn get_settings() -> Result<Settings, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let span = cmd_span(&dir, None, "CMD.get_settings", None);
    let s = settings::load_settings_or_recover(&dir);
    span.ok(Some(serde_json::json!({"server_base_url": s.server_base_url})));
    Ok(s)
}

#[tauri::command]
fn update_settings(patch: SettingsPatch) -> Result<Settings, String> {
    let dir = data_dir::data_dir().map_err(|e| e.to_string())?;
    let patch_summary = serde_json::json!({
        "server_base_url": patch.server_base_url.is_some(),
        "text_language": patch.text_language.is_some(),
        "audio_language": patch.audio_language.is_some(),
        "autoplay": patch.autoplay.is_some(),
    });
    let span = cmd_span(&dir, None, "CMD.update_settings", Some(patch_summary));
    let cur = settings::load_settings_or_recover(&dir);
    let next = settings::apply_patch(cur, patch);
    if let Err(e) = settings::save_settings(&dir, &next) {
        span.err_anyhow("settings", "E_CMD_UPDATE_SETTINGS", &e, None);
        return Err(e.to_string());
    }
    span.ok(None);
    Ok(next)
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let ctx = tauri::generate_context!();
    tauri::Builder::default()
        .manage(AppSession::new())
        .invoke_handler(tauri::generate_handler![
            shell_state,
            select_tab,
            language_options,
            text_state,
            translate_text,
            play_translation,
            clear_text,
            audio_state,
            start_recording,
            stop_recording,
            play_recording,
            translate_recording,
            replay_result_audio,
            clear_recording,
            get_settings,
            update_settings
        ])
        .run(ctx)
        .expect("error while running tauri application");
}
