use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

pub fn metrics_path(data_dir: &Path) -> PathBuf {
    data_dir.join("metrics.jsonl")
}

pub fn append_jsonl<T: Serialize>(data_dir: &Path, obj: &T) -> Result<()> {
    std::fs::create_dir_all(data_dir).context("create data dir failed")?;
    let p = metrics_path(data_dir);
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&p)
        .with_context(|| format!("open metrics jsonl failed: {}", p.display()))?;
    let line = serde_json::to_string(obj).context("serialize metrics json failed")?;
    f.write_all(line.as_bytes())
        .context("write metrics line failed")?;
    f.write_all(b"\n").context("write metrics newline failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{append_jsonl, metrics_path};

    #[test]
    fn append_produces_one_parseable_line_per_call() {
        let td = tempfile::tempdir().expect("tempdir");
        append_jsonl(td.path(), &serde_json::json!({"type": "flow_event", "n": 1})).expect("append");
        append_jsonl(td.path(), &serde_json::json!({"type": "flow_event", "n": 2})).expect("append");

        let raw = std::fs::read_to_string(metrics_path(td.path())).expect("read metrics");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let v: serde_json::Value = serde_json::from_str(line).expect("valid json line");
            assert_eq!(v.get("type").and_then(|t| t.as_str()), Some("flow_event"));
        }
    }
}
