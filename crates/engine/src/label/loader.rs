//! 파이프라인 정의 로더 -- YAML 정의 파일을 디스크에서 로드합니다.
//!
//! 디렉토리 내의 `.yml`/`.yaml` 파일을 경로 순서대로 읽어 하나로 병합합니다.
//! 정의 오류는 레코드를 받기 전에 드러나야 하므로 어떤 파일이든 실패하면 전체 로드가 실패합니다.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

use super::types::PipelineFile;

/// 정의 파일 하나의 최대 크기
const MAX_PIPELINE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
/// 디렉토리당 최대 파일 수
const MAX_PIPELINE_FILES: usize = 1_000;

/// 파이프라인 정의 로더
pub struct PipelineLoader;

impl PipelineLoader {
    /// 디렉토리의 모든 YAML 정의를 로드하여 병합합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - YAML 파일이 하나도 없는 경우
    /// - 어느 한 파일이라도 읽기/파싱에 실패한 경우
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<PipelineFile, EngineError> {
        let dir = dir.as_ref();
        let load_err = |reason: String| EngineError::PipelineLoad {
            path: dir.display().to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_err(format!("failed to read directory: {e}")))?;

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| load_err(format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
            if paths.len() > MAX_PIPELINE_FILES {
                return Err(load_err(format!(
                    "too many definition files: max {MAX_PIPELINE_FILES}"
                )));
            }
        }

        if paths.is_empty() {
            return Err(load_err("no .yml/.yaml definition files found".to_owned()));
        }

        // 병합 순서 = 바인딩 선언 순서이므로 결정적이어야 함
        paths.sort();

        let mut merged = PipelineFile::default();
        for path in &paths {
            let file = Self::load_file(path).await?;
            tracing::debug!(
                path = %path.display(),
                labels = file.labels.len(),
                bindings = file.bindings.len(),
                outputs = file.outputs.len(),
                "loaded pipeline definition file"
            );
            merged.merge(file);
        }

        tracing::info!(
            dir = %dir.display(),
            files = paths.len(),
            labels = merged.labels.len(),
            bindings = merged.bindings.len(),
            outputs = merged.outputs.len(),
            "loaded pipeline definitions"
        );

        Ok(merged)
    }

    /// 단일 YAML 파일을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<PipelineFile, EngineError> {
        let path = path.as_ref();
        let load_err = |reason: String| EngineError::PipelineLoad {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(format!("failed to read file metadata: {e}")))?;

        if metadata.len() > MAX_PIPELINE_FILE_SIZE {
            return Err(load_err(format!(
                "file too large: {} bytes (max: {MAX_PIPELINE_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(format!("failed to read file: {e}")))?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 파싱합니다. 빈 문서는 빈 정의입니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<PipelineFile, EngineError> {
        let has_content = yaml_str
            .lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with('#') && line != "---");
        if !has_content {
            return Ok(PipelineFile::default());
        }

        serde_yaml::from_str(yaml_str).map_err(|e| EngineError::PipelineLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageSpec;

    #[test]
    fn parse_valid_yaml() {
        let yaml = r#"
bindings:
  - { pattern: "order.**", label: ORDER_APP }
labels:
  - name: ORDER_APP
    output: out
outputs:
  - { name: out, type: memory }
"#;
        let file = PipelineLoader::parse_yaml(yaml, "test.yml").unwrap();
        assert_eq!(file.labels[0].name, "ORDER_APP");
        assert_eq!(file.outputs[0].name, "out");
    }

    #[test]
    fn stages_parse_as_single_key_maps() {
        let yaml = r#"
labels:
  - name: APP
    stages:
      - transform:
          parse:
            - source: log
              fields:
                status: { key_value: { key: status, digits: true } }
                endpoint: { regex: { pattern: '-\s+(/\S+)' } }
                path: first_path
      - filter: { mode: exclude, conditions: [ { key: is_error, pattern: "^false$" } ] }
    output: out
"#;
        let file = PipelineLoader::parse_yaml(yaml, "stages.yml").unwrap();
        let stages = &file.labels[0].stages;
        assert_eq!(stages.len(), 2);
        assert!(matches!(stages[0], StageSpec::Transform(_)));
        assert!(matches!(stages[1], StageSpec::Filter(_)));
    }

    #[tokio::test]
    async fn demo_definitions_load_and_compile() {
        let demo = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/conf.d");
        let file = PipelineLoader::load_directory(&demo).await.unwrap();
        assert_eq!(file.bindings.len(), 3);
        assert!(file.labels.iter().all(|l| l.name.starts_with('@')));

        let graph = crate::label::LabelGraph::compile(&file, None).unwrap();
        assert_eq!(graph.label_count(), file.labels.len());
    }

    #[test]
    fn parse_invalid_yaml_returns_error() {
        let err = PipelineLoader::parse_yaml("labels: [valid: yaml: {{{", "bad.yml").unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn comments_only_is_empty_definition() {
        let file = PipelineLoader::parse_yaml("# nothing yet\n---\n", "empty.yml").unwrap();
        assert_eq!(file, PipelineFile::default());
    }

    #[tokio::test]
    async fn load_nonexistent_directory_returns_error() {
        let result = PipelineLoader::load_directory("/nonexistent/path/conf.d").await;
        assert!(matches!(result, Err(EngineError::PipelineLoad { .. })));
    }

    #[tokio::test]
    async fn directory_files_merge_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("20-b.yaml"),
            "bindings: [ { pattern: '**', label: B } ]\nlabels: [ { name: B } ]",
        )
        .await
        .unwrap();
        tokio::fs::write(
            dir.path().join("10-a.yml"),
            "bindings: [ { pattern: '**', label: A } ]\nlabels: [ { name: A } ]",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("README.md"), "ignored").await.unwrap();

        let file = PipelineLoader::load_directory(dir.path()).await.unwrap();
        let labels: Vec<_> = file.bindings.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["A", "B"]);
    }

    #[tokio::test]
    async fn one_bad_file_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("good.yml"), "labels: [ { name: A } ]")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("bad.yml"), "labels: 42").await.unwrap();

        let err = PipelineLoader::load_directory(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[tokio::test]
    async fn directory_without_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineLoader::load_directory(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("no .yml"));
    }
}
