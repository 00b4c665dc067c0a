use cptrace::analysis::{StructureKind, VarType};
use cptrace::config::{load_config, ConfigOverrides, TraceConfig};
use cptrace::{analyze_files_parallel, collect_python_files};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}

#[test]
fn analyzes_a_directory_of_solutions() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    write_file(
        &root.join("a_pairs.py"),
        "n = int(input())\nxs = list(map(int, input().split()))\nbest = 0\nfor i in range(n):\n    for j in range(n):\n        best = max(best, xs[i] + xs[j])\nprint(best)\n",
    );
    write_file(
        &root.join("b_search.py"),
        "import bisect\nxs = sorted(map(int, input().split()))\nprint(bisect.bisect_left(xs, 5))\n",
    );
    write_file(&root.join("c_broken.py"), "def f(:\n    pass\n");
    write_file(&root.join("build").join("generated.py"), "x = 1\n");

    let excludes = TraceConfig::default().apply(&ConfigOverrides::default()).exclude;
    let files = collect_python_files(&[root.to_string_lossy().to_string()], &excludes);
    let names: Vec<String> = files
        .iter()
        .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    assert_eq!(names, vec!["a_pairs.py", "b_search.py", "c_broken.py"]);

    let results = analyze_files_parallel(&files);
    assert_eq!(results.len(), 3);

    let pairs = results[0].analysis.as_ref().expect("pairs analysis");
    assert_eq!(pairs.complexity.time, "O(n²)");
    assert_eq!(pairs.complexity.space, "O(n)");
    assert_eq!(pairs.complexity.loop_depth, 2);
    let vars: Vec<(&str, VarType)> = pairs.variables.iter().map(|v| (v.name.as_str(), v.var_type)).collect();
    assert_eq!(vars, vec![("n", VarType::Int), ("xs", VarType::List), ("best", VarType::Int)]);
    assert_eq!(pairs.line_costs.len(), 8);
    assert_eq!(pairs.line_costs[5].time.to_string(), "n²");

    let search = results[1].analysis.as_ref().expect("search analysis");
    assert!(search.complexity.has_sorting);
    assert!(search.complexity.has_binary_search);
    assert_eq!(search.complexity.time, "O(n log n)");

    assert!(results[2].analysis.is_none());
    assert!(results[2].error.as_deref().is_some_and(|e| e.contains("parse error")));
}

#[test]
fn analysis_serializes_for_the_renderer() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("grid.py");
    write_file(&file, "grid = [[0] * 3 for _ in range(3)]\nfor row in grid:\n    row.sort()\n");

    let results = analyze_files_parallel(&[file]);
    let analysis = results[0].analysis.as_ref().expect("analysis");
    let json = serde_json::to_value(analysis).expect("json");
    assert_eq!(json["complexity"]["space"], "O(n²)");
    assert_eq!(json["variables"][0]["varType"], "list");
    assert_eq!(json["lineCosts"][0]["space"], "n²");
    assert_eq!(json["lineCosts"][2]["time"], "nlogn");
}

#[test]
fn recognizes_structures_from_rendered_values() {
    use cptrace::analysis::data_structure_kind;

    assert_eq!(data_structure_kind("graph", "defaultdict(<class 'list'>, {1: [2]})"), Some(StructureKind::Graph));
    assert_eq!(data_structure_kind("heap", "[1, 4, 2]"), Some(StructureKind::Heap));
    assert_eq!(data_structure_kind("dp", "[[0, 1], [1, 2]]"), Some(StructureKind::Matrix));
    assert_eq!(data_structure_kind("xs", "[1, 2, 3]"), None);
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cptrace.toml");
    write_file(&path, "history_cap = 5\nstress_iterations = 30\nexclude = [\"scratch\"]\n");

    let config = load_config(Some(&path)).expect("load").expect("config present");
    assert_eq!(config.history_cap, 5);
    assert_eq!(config.stress_iterations, 30);

    let overrides = ConfigOverrides {
        history_cap: Some(2),
        exclude: vec!["tmp".to_string()],
        ..ConfigOverrides::default()
    };
    let merged = config.apply(&overrides);
    assert_eq!(merged.history_cap, 2);
    assert_eq!(merged.stress_iterations, 30);
    assert!(merged.exclude.iter().any(|e| e == "scratch"));
    assert!(merged.exclude.iter().any(|e| e == "tmp"));
}

#[test]
fn invalid_config_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cptrace.toml");
    write_file(&path, "history_cap = \"lots\"\n");
    assert!(load_config(Some(&path)).is_err());
}
