//! cptrace: loop, condition and recursion tracing for competitive-programming
//! Python code
//!
//! This crate provides:
//! - A source transformer that injects tracer calls into a program
//! - A tracer runtime filling a per-run trace buffer
//! - Reconstruction of iteration tables, histories and call trees
//! - Sample-case checking and random stress runs
//! - Heuristic static overlays (complexity, variables, data structures)

pub mod analysis;
pub mod config;
pub mod error;
pub mod instrument;
pub mod judge;
pub mod logging;
pub mod models;
pub mod reconstruct;
pub mod sandbox;
pub mod session;
pub mod syntax;
pub mod tracer;

use analysis::FileAnalysis;
use config::TraceConfig;
use error::TraceError;
use rayon::prelude::*;
use session::{RunReport, Session};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Run `source` with `stdin` and collect its trace.
pub fn trace_source(source: &str, stdin: &str, config: &TraceConfig) -> RunReport {
    Session::new(config.clone()).run(source, stdin)
}

/// Static overlays for one source text.
pub fn analyze_source(path: &str, source: &str) -> Result<FileAnalysis, TraceError> {
    FileAnalysis::from_source(path, source)
}

/// Outcome of analyzing one file
#[derive(Debug)]
pub struct AnalysisResult {
    pub file_path: String,
    pub analysis: Option<FileAnalysis>,
    pub error: Option<String>,
}

/// Read and analyze a single file
pub fn analyze_file(file_path: &Path) -> AnalysisResult {
    let path_str = file_path.to_string_lossy().to_string();
    let outcome = std::fs::read_to_string(file_path)
        .map_err(|e| format!("Failed to read file: {}", e))
        .and_then(|source| analyze_source(&path_str, &source).map_err(|e| e.to_string()));
    match outcome {
        Ok(analysis) => AnalysisResult {
            file_path: path_str,
            analysis: Some(analysis),
            error: None,
        },
        Err(error) => AnalysisResult {
            file_path: path_str,
            analysis: None,
            error: Some(error),
        },
    }
}

/// Collect Python files from paths
pub fn collect_python_files(paths: &[String], exclude_patterns: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        let p = Path::new(path);
        if p.is_file() {
            if p.extension().is_some_and(|e| e == "py") {
                files.push(p.to_path_buf());
            }
        } else if p.is_dir() {
            for entry in WalkDir::new(p)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !should_exclude(e.path(), exclude_patterns))
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|e| e == "py") {
                    files.push(path.to_path_buf());
                }
            }
        }
    }

    files
}

fn should_exclude(path: &Path, patterns: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    patterns.iter().any(|pattern| name == pattern || name.contains(pattern.as_str()))
}

/// Analyze multiple files in parallel
pub fn analyze_files_parallel(files: &[PathBuf]) -> Vec<AnalysisResult> {
    files.par_iter().map(|file| analyze_file(file)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_trace_source_while_loop() {
        let report = trace_source("x = 0\nwhile x < 3:\n    x += 1\nprint(x)\n", "", &TraceConfig::default());
        assert_eq!(report.outcome.stdout, "3\n");
        let trace = report.trace.unwrap();
        let table = trace.loops.values().next().unwrap();
        assert_eq!(table.range, "while");
        assert_eq!(table.rows.len(), 4);
    }

    #[test]
    fn test_collect_python_files_honours_excludes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        let venv = dir.path().join(".venv");
        fs::create_dir(&venv).unwrap();
        fs::write(venv.join("ignored.py"), "").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("b.py"), "y = 2\n").unwrap();

        let root = dir.path().to_string_lossy().to_string();
        let files = collect_python_files(&[root], &[".venv".to_string()]);
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_analyze_files_parallel_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.py");
        let bad = dir.path().join("bad.py");
        fs::write(&good, "for i in range(3):\n    print(i)\n").unwrap();
        fs::write(&bad, "def f(:\n").unwrap();

        let results = analyze_files_parallel(&[good, bad]);
        assert_eq!(results[0].analysis.as_ref().unwrap().complexity.time, "O(n)");
        assert!(results[1].analysis.is_none());
        assert!(results[1].error.as_ref().unwrap().starts_with("parse error"));
    }
}
