use std::fs;
use std::path::Path;
use std::time::Instant;

use es_compiler::{compile_lists, CompileStats};
use es_core::rules::RuleTables;
use es_core::snapshot::RuleSnapshot;

pub fn compile_snapshot(
    inputs: &[String],
    base: RuleTables,
    verbose: bool,
) -> Result<(RuleSnapshot, CompileStats, f64), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let start = Instant::now();
    let mut texts = Vec::with_capacity(inputs.len());
    for (list_id, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path).map_err(|e| format!("Failed to read '{path}': {e}"))?;
        if verbose {
            println!(
                "  [{}] {} - {} lines",
                list_id,
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                content.lines().count()
            );
        }
        texts.push(content);
    }

    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
    let (snapshot, stats) = compile_lists(&texts, base).map_err(|e| format!("Failed to compile: {e}"))?;

    // The written form must load back through the same validation as a shipped one.
    let json = snapshot.to_json().map_err(|e| e.to_string())?;
    RuleSnapshot::load(&json).map_err(|e| format!("Generated snapshot failed validation: {e}"))?;

    Ok((snapshot, stats, start.elapsed().as_secs_f64() * 1000.0))
}

pub fn write_snapshot(path: &Path, snapshot: &RuleSnapshot) -> Result<usize, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
    }
    let json = snapshot.to_json().map_err(|e| e.to_string())?;
    fs::write(path, &json).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    Ok(json.len())
}

pub fn read_snapshot(path: &Path) -> Result<(RuleSnapshot, usize), String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let snapshot = RuleSnapshot::load(&text).map_err(|e| format!("Invalid snapshot: {e}"))?;
    Ok((snapshot, text.len()))
}

/// Tables from `path`, or the builtin tables when no snapshot is given.
pub fn load_tables(path: Option<&str>) -> Result<RuleTables, String> {
    match path {
        Some(path) => {
            let (snapshot, _) = read_snapshot(Path::new(path))?;
            snapshot.into_tables().map_err(|e| format!("Invalid snapshot: {e}"))
        }
        None => Ok(RuleTables::builtin()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("es-cli-{}-{}", std::process::id(), name))
    }

    #[test]
    fn compile_write_and_reload() {
        let list = temp_path("list.txt");
        fs::write(&list, "! Version: cli-1\n||ads.example.com^\n@@||player.example.org^\n").unwrap();

        let inputs = vec![list.to_string_lossy().into_owned()];
        let (snapshot, stats, _) = compile_snapshot(&inputs, RuleTables::default(), false).unwrap();
        assert_eq!(stats.list_version, "cli-1");

        let out = temp_path("out/snapshot.json");
        let written = write_snapshot(&out, &snapshot).unwrap();
        let (loaded, size) = read_snapshot(&out).unwrap();
        assert_eq!(written, size);
        assert_eq!(loaded, snapshot);

        let tables = load_tables(out.to_str()).unwrap();
        assert!(tables.blocklist.contains("ads.example.com"));
        assert!(tables.embed_hosts.contains("player.example.org"));

        let _ = fs::remove_file(&list);
        let _ = fs::remove_file(&out);
    }

    #[test]
    fn missing_input_is_an_error() {
        let inputs = vec![temp_path("does-not-exist.txt").to_string_lossy().into_owned()];
        let err = compile_snapshot(&inputs, RuleTables::default(), false).unwrap_err();
        assert!(err.starts_with("Failed to read"));
        assert!(compile_snapshot(&[], RuleTables::default(), false).is_err());
    }

    #[test]
    fn builtin_tables_without_snapshot() {
        let tables = load_tables(None).unwrap();
        assert!(tables.blocklist.contains("doubleclick.net"));
    }
}
