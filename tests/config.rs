use std::fs;

use agentic_rag::config::{load_config, resolve_config};
use tempfile::TempDir;

fn write_config(body: &str) -> (TempDir, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("arag.toml");
    fs::write(&path, body).unwrap();
    (tmp, path)
}

#[test]
fn test_full_config_round_trip() {
    let (tmp, path) = write_config(
        r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
temperature = 0.2

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536
batch_size = 16

[retrieval]
vector_weight = 0.6
lexical_weight = 0.4
top_k = 3
candidate_k = 10

[workflow]
enable_reflection = true
max_iterations = 2
task_timeout_secs = 30
reflection_threshold = 0.5

[corpus]
root = "./docs"
exclude_globs = ["**/drafts/**"]

[server]
bind = "0.0.0.0:9000"
"#,
    );

    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.llm.model.as_deref(), Some("gpt-4o-mini"));
    assert!(cfg.llm.is_enabled());
    assert_eq!(cfg.embedding.dims, Some(1536));
    assert_eq!(cfg.embedding.batch_size, 16);
    assert_eq!(cfg.retrieval.top_k, 3);
    assert!(cfg.workflow.enable_reflection);
    assert_eq!(cfg.workflow.max_iterations, 2);
    assert_eq!(cfg.workflow.task_timeout_secs, Some(30));
    assert_eq!(cfg.corpus.exclude_globs, vec!["**/drafts/**"]);
    assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    drop(tmp);
}

#[test]
fn test_empty_file_uses_offline_defaults() {
    let (_tmp, path) = write_config("");
    let cfg = load_config(&path).unwrap();
    assert!(!cfg.llm.is_enabled());
    assert!(!cfg.embedding.is_enabled());
    assert!(!cfg.workflow.enable_reflection);
    assert_eq!(cfg.workflow.max_iterations, 3);
    assert_eq!(cfg.embedding.batch_size, 64);
    assert!((cfg.retrieval.vector_weight - 0.7).abs() < 1e-12);
    assert!(cfg.corpus.root.is_none());
}

#[test]
fn test_invalid_values_rejected() {
    let cases = [
        ("[workflow]\nmax_iterations = 0\n", "max_iterations"),
        ("[workflow]\nreflection_threshold = 1.5\n", "reflection_threshold"),
        ("[retrieval]\ntop_k = 10\ncandidate_k = 5\n", "candidate_k"),
        ("[retrieval]\nvector_weight = 0.0\nlexical_weight = 0.0\n", "both be zero"),
        ("[llm]\nprovider = \"openai\"\n", "llm.model"),
        ("[llm]\nprovider = \"carrier-pigeon\"\n", "Unknown llm provider"),
        ("[embedding]\nbatch_size = 0\n", "embedding.batch_size"),
    ];
    for (body, needle) in cases {
        let (_tmp, path) = write_config(body);
        let err = load_config(&path).unwrap_err();
        assert!(
            format!("{:#}", err).contains(needle),
            "expected '{}' in error for {:?}, got {:#}",
            needle,
            body,
            err
        );
    }
}

#[test]
fn test_malformed_toml_reports_parse_error() {
    let (_tmp, path) = write_config("[workflow\nmax_iterations = 2");
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_explicit_missing_path_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let err = resolve_config(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
