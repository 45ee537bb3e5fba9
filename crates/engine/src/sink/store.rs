//! 청크 저장소 -- 파일 기반 내구성 버퍼와 격리 영역
//!
//! # 디렉토리 구조
//! ```text
//! <storage_path>/
//! ├── <output>/
//! │   ├── 00000000000000000007-<uuid>.open     # 수신 중 (append + fsync)
//! │   └── 00000000000000000006-<uuid>.sealed   # 전송 대기/재시도 중
//! └── quarantine/
//!     └── <output>/
//!         ├── 00000000000000000003-<uuid>.ndjson
//!         └── 00000000000000000003-<uuid>.meta.json
//! ```
//!
//! 각 파일은 레코드 하나가 한 줄인 NDJSON입니다. 레코드는 `sync_data`가 끝난 뒤에야
//! 수신 확인됩니다. 재시작 시 `.open`/`.sealed` 파일은 순번 순서대로 복구됩니다.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use logroute_core::types::Record;

use crate::error::EngineError;

use super::chunk::Chunk;

/// 격리 디렉토리 이름 (출력 이름으로 사용 불가)
pub const QUARANTINE_DIR: &str = "quarantine";

const OPEN_EXT: &str = "open";
const SEALED_EXT: &str = "sealed";
const TMP_EXT: &str = "tmp";

/// 격리된 청크의 메타데이터 (`.meta.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineMeta {
    /// 청크 ID
    pub chunk_id: String,
    /// 출력 이름
    pub output: String,
    /// 전송 시도 횟수
    pub attempts: u32,
    /// 격리 사유
    pub reason: String,
    /// 격리 시각
    pub quarantined_at: DateTime<Utc>,
    /// 레코드 수
    pub records: usize,
    /// 데이터 파일 경로
    pub data_path: PathBuf,
}

/// 출력 하나의 청크 저장소
#[derive(Debug)]
pub struct ChunkStore {
    output: String,
    dir: PathBuf,
    quarantine_dir: PathBuf,
    next_seq: AtomicU64,
}

impl ChunkStore {
    /// 저장소 디렉토리를 준비합니다.
    pub async fn open(storage_path: &Path, output: &str) -> Result<Self, EngineError> {
        let dir = storage_path.join(output);
        let quarantine_dir = storage_path.join(QUARANTINE_DIR).join(output);
        for path in [&dir, &quarantine_dir] {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| store_err(path, format!("failed to create directory: {e}")))?;
        }
        Ok(Self {
            output: output.to_owned(),
            dir,
            quarantine_dir,
            next_seq: AtomicU64::new(1),
        })
    }

    /// 출력 이름
    pub fn output(&self) -> &str {
        &self.output
    }

    /// 청크 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 남아 있는 청크 파일을 순번 순서대로 복구합니다.
    ///
    /// 복구된 청크는 모두 `.sealed`로 이름이 바뀌어 전송 대기열 앞에 놓입니다.
    /// 읽을 수 없는 줄(중단된 쓰기)은 경고 후 건너뜁니다. 빈 파일과 임시 파일은 삭제합니다.
    pub async fn recover(&self) -> Result<Vec<Chunk>, EngineError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_err(&self.dir, format!("failed to read directory: {e}")))?;

        let mut found: Vec<(u64, String, PathBuf)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_err(&self.dir, format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if ext == TMP_EXT {
                tracing::debug!(path = %path.display(), "removing leftover temp file");
                remove_file_quiet(&path).await;
                continue;
            }
            if ext != OPEN_EXT && ext != SEALED_EXT {
                continue;
            }
            match parse_chunk_file_name(&path) {
                Some((seq, id)) => found.push((seq, id, path)),
                None => {
                    tracing::warn!(path = %path.display(), "ignoring unrecognized file in chunk directory");
                }
            }
        }

        found.sort_by_key(|(seq, _, _)| *seq);

        let mut chunks = Vec::with_capacity(found.len());
        let mut max_seq = 0;
        for (seq, id, path) in found {
            max_seq = max_seq.max(seq);
            let (records, size_bytes) = self.read_records(&path).await?;
            if records.is_empty() {
                remove_file_quiet(&path).await;
                continue;
            }
            let sealed = path.with_extension(SEALED_EXT);
            if sealed != path {
                tokio::fs::rename(&path, &sealed)
                    .await
                    .map_err(|e| store_err(&path, format!("failed to seal recovered chunk: {e}")))?;
            }
            chunks.push(Chunk::recovered(id, seq, sealed, records, size_bytes));
        }

        self.next_seq.fetch_max(max_seq + 1, Ordering::SeqCst);

        if !chunks.is_empty() {
            tracing::info!(
                output = %self.output,
                chunks = chunks.len(),
                records = chunks.iter().map(Chunk::len).sum::<usize>(),
                "recovered buffered chunks"
            );
        }
        Ok(chunks)
    }

    async fn read_records(&self, path: &Path) -> Result<(Vec<Record>, usize), EngineError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| store_err(path, format!("failed to read chunk: {e}")))?;

        let mut records = Vec::new();
        let mut size_bytes = 0;
        let mut torn = 0usize;
        for line in content.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Record>(line) {
                Ok(record) => {
                    size_bytes += line.len() + 1;
                    records.push(record);
                }
                Err(_) => torn += 1,
            }
        }
        if torn > 0 {
            tracing::warn!(
                path = %path.display(),
                skipped = torn,
                "skipped unreadable lines in recovered chunk"
            );
        }
        Ok((records, size_bytes))
    }

    /// 새 open 청크와 쓰기 핸들을 생성합니다.
    pub async fn create_chunk(&self) -> Result<(Chunk, tokio::fs::File), EngineError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let id = uuid::Uuid::new_v4().to_string();
        let path = self.dir.join(format!("{seq:020}-{id}.{OPEN_EXT}"));
        let file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| store_err(&path, format!("failed to create chunk file: {e}")))?;
        Ok((Chunk::new(id, seq, path), file))
    }

    /// NDJSON 줄들을 청크 파일에 추가하고 디스크에 동기화합니다.
    ///
    /// 파일 길이는 항상 `chunk.size_bytes`(승인된 줄의 합)와 같아야 합니다.
    /// 쓰기 전에 그보다 긴 꼬리(이전 실패의 잔여 바이트)를 잘라내고,
    /// 쓰기나 동기화가 실패하면 다시 그 길이로 되돌립니다.
    /// 따라서 새 줄이 잘린 줄 뒤에 붙어 복구 시 함께 버려지는 일이 없습니다.
    pub async fn append(
        &self,
        file: &mut tokio::fs::File,
        chunk: &Chunk,
        lines: &[u8],
    ) -> Result<(), EngineError> {
        let path = chunk.path.as_path();
        let committed = chunk.size_bytes as u64;
        let len = file
            .metadata()
            .await
            .map_err(|e| store_err(path, format!("failed to read chunk length: {e}")))?
            .len();
        if len != committed {
            tracing::warn!(
                path = %path.display(),
                expected = committed,
                actual = len,
                "truncating partial write before append"
            );
            truncate(file, path, committed).await?;
        }

        if let Err(e) = write_synced_tail(file, path, lines).await {
            if let Err(te) = truncate(file, path, committed).await {
                tracing::error!(path = %path.display(), error = %te, "failed to roll back partial append");
            }
            return Err(e);
        }
        Ok(())
    }

    /// open 청크 파일을 봉인합니다 (`.open` → `.sealed`).
    pub async fn seal(&self, chunk: &mut Chunk) -> Result<(), EngineError> {
        let sealed = chunk.path.with_extension(SEALED_EXT);
        tokio::fs::rename(&chunk.path, &sealed)
            .await
            .map_err(|e| store_err(&chunk.path, format!("failed to seal chunk: {e}")))?;
        chunk.path = sealed;
        Ok(())
    }

    /// 청크 파일을 현재 레코드 목록으로 다시 씁니다 (부분 승인 후).
    pub async fn rewrite(&self, chunk: &Chunk) -> Result<(), EngineError> {
        let tmp = chunk.path.with_extension(TMP_EXT);
        let body = encode_ndjson(&chunk.records)?;
        write_synced(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &chunk.path)
            .await
            .map_err(|e| store_err(&chunk.path, format!("failed to replace chunk: {e}")))?;
        Ok(())
    }

    /// 승인된 청크 파일을 삭제합니다.
    pub async fn remove(&self, chunk: &Chunk) -> Result<(), EngineError> {
        match tokio::fs::remove_file(&chunk.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_err(&chunk.path, format!("failed to remove chunk: {e}"))),
        }
    }

    /// 청크를 격리 영역으로 옮기고 메타데이터를 기록합니다.
    pub async fn quarantine(&self, chunk: &Chunk, reason: &str) -> Result<QuarantineMeta, EngineError> {
        self.quarantine_file(&chunk.path, &chunk.id, chunk.attempts, chunk.len(), reason)
            .await
    }

    /// 청크 파일 경로로 격리합니다 (전송 태스크가 중단되어 청크 객체가 없는 경우).
    pub async fn quarantine_file(
        &self,
        path: &Path,
        chunk_id: &str,
        attempts: u32,
        records: usize,
        reason: &str,
    ) -> Result<QuarantineMeta, EngineError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
            .unwrap_or_else(|| chunk_id.to_owned());
        let data_path = self.quarantine_dir.join(format!("{stem}.ndjson"));

        tokio::fs::rename(path, &data_path)
            .await
            .map_err(|e| store_err(path, format!("failed to move chunk to quarantine: {e}")))?;

        let meta = QuarantineMeta {
            chunk_id: chunk_id.to_owned(),
            output: self.output.clone(),
            attempts,
            reason: reason.to_owned(),
            quarantined_at: Utc::now(),
            records,
            data_path,
        };
        self.write_meta(&stem, &meta).await?;
        Ok(meta)
    }

    /// 영구 거부된 개별 레코드를 새 격리 파일로 기록합니다.
    pub async fn quarantine_records(
        &self,
        chunk_id: &str,
        records: &[Record],
        attempts: u32,
        reason: &str,
    ) -> Result<QuarantineMeta, EngineError> {
        let stem = format!("{chunk_id}-rejected-{}", uuid::Uuid::new_v4());
        let data_path = self.quarantine_dir.join(format!("{stem}.ndjson"));
        write_synced(&data_path, &encode_ndjson(records)?).await?;

        let meta = QuarantineMeta {
            chunk_id: chunk_id.to_owned(),
            output: self.output.clone(),
            attempts,
            reason: reason.to_owned(),
            quarantined_at: Utc::now(),
            records: records.len(),
            data_path,
        };
        self.write_meta(&stem, &meta).await?;
        Ok(meta)
    }

    async fn write_meta(&self, stem: &str, meta: &QuarantineMeta) -> Result<(), EngineError> {
        let meta_path = self.quarantine_dir.join(format!("{stem}.meta.json"));
        let body = serde_json::to_vec_pretty(meta)
            .map_err(|e| store_err(&meta_path, format!("failed to encode metadata: {e}")))?;
        write_synced(&meta_path, &body).await
    }
}

/// 저장소 루트 아래의 모든 격리 항목을 나열합니다.
pub async fn list_quarantined(storage_path: &Path) -> Result<Vec<QuarantineMeta>, EngineError> {
    let root = storage_path.join(QUARANTINE_DIR);
    let mut outputs = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(store_err(&root, format!("failed to read directory: {e}"))),
    };

    let mut metas = Vec::new();
    while let Some(output_dir) = outputs
        .next_entry()
        .await
        .map_err(|e| store_err(&root, format!("failed to read directory entry: {e}")))?
    {
        let dir = output_dir.path();
        if !dir.is_dir() {
            continue;
        }
        let mut files = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| store_err(&dir, format!("failed to read directory: {e}")))?;
        while let Some(file) = files
            .next_entry()
            .await
            .map_err(|e| store_err(&dir, format!("failed to read directory entry: {e}")))?
        {
            let path = file.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".meta.json"));
            if !is_meta {
                continue;
            }
            let content = tokio::fs::read(&path)
                .await
                .map_err(|e| store_err(&path, format!("failed to read metadata: {e}")))?;
            match serde_json::from_slice::<QuarantineMeta>(&content) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable quarantine metadata");
                }
            }
        }
    }

    metas.sort_by(|a, b| a.quarantined_at.cmp(&b.quarantined_at));
    Ok(metas)
}

/// 레코드 하나를 NDJSON 한 줄(줄바꿈 포함)로 직렬화합니다.
pub fn encode_line(record: &Record) -> Result<Vec<u8>, EngineError> {
    let mut line = serde_json::to_vec(record).map_err(|e| EngineError::Store {
        path: record.id.clone(),
        reason: format!("failed to encode record: {e}"),
    })?;
    line.push(b'\n');
    Ok(line)
}

fn encode_ndjson(records: &[Record]) -> Result<Vec<u8>, EngineError> {
    let mut body = Vec::new();
    for record in records {
        body.extend_from_slice(&encode_line(record)?);
    }
    Ok(body)
}

async fn write_synced(path: &Path, body: &[u8]) -> Result<(), EngineError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| store_err(path, format!("failed to create file: {e}")))?;
    file.write_all(body)
        .await
        .map_err(|e| store_err(path, format!("write failed: {e}")))?;
    file.flush()
        .await
        .map_err(|e| store_err(path, format!("flush failed: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| store_err(path, format!("sync failed: {e}")))?;
    Ok(())
}

async fn remove_file_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove file");
    }
}

/// `{seq:020}-{uuid}.{ext}` → (seq, uuid)
fn parse_chunk_file_name(path: &Path) -> Option<(u64, String)> {
    let stem = path.file_stem()?.to_str()?;
    let (seq, id) = stem.split_once('-')?;
    let seq = seq.parse().ok()?;
    (!id.is_empty()).then(|| (seq, id.to_owned()))
}

async fn write_synced_tail(
    file: &mut tokio::fs::File,
    path: &Path,
    lines: &[u8],
) -> Result<(), EngineError> {
    file.write_all(lines)
        .await
        .map_err(|e| store_err(path, format!("append failed: {e}")))?;
    file.flush()
        .await
        .map_err(|e| store_err(path, format!("flush failed: {e}")))?;
    file.sync_data()
        .await
        .map_err(|e| store_err(path, format!("sync failed: {e}")))
}

async fn truncate(file: &mut tokio::fs::File, path: &Path, len: u64) -> Result<(), EngineError> {
    file.set_len(len)
        .await
        .map_err(|e| store_err(path, format!("truncate failed: {e}")))?;
    file.sync_data()
        .await
        .map_err(|e| store_err(path, format!("sync failed: {e}")))
}

fn store_err(path: &Path, reason: String) -> EngineError {
    EngineError::Store {
        path: path.display().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &Path) -> ChunkStore {
        ChunkStore::open(dir, "main").await.unwrap()
    }

    async fn write_chunk(store: &ChunkStore, records: &[Record]) -> Chunk {
        let (mut chunk, mut file) = store.create_chunk().await.unwrap();
        for record in records {
            let line = encode_line(record).unwrap();
            store.append(&mut file, &chunk, &line).await.unwrap();
            chunk.push(record.clone(), line.len() - 1);
        }
        chunk
    }

    #[tokio::test]
    async fn open_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        assert!(s.dir().is_dir());
        assert!(dir.path().join("quarantine/main").is_dir());
        assert_eq!(s.output(), "main");
    }

    #[tokio::test]
    async fn recover_returns_chunks_in_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        let a = write_chunk(&s, &[Record::empty("t").with_id("a1"), Record::empty("t").with_id("a2")]).await;
        let mut b = write_chunk(&s, &[Record::empty("t").with_id("b1")]).await;
        s.seal(&mut b).await.unwrap();
        drop(a);

        // 재시작
        let s2 = store(dir.path()).await;
        let chunks = s2.recover().await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].seq < chunks[1].seq);
        let ids: Vec<_> = chunks[0].records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a1", "a2"]);
        assert!(chunks.iter().all(|c| c.path.extension().is_some_and(|e| e == "sealed")));

        // 새 청크 순번은 복구된 것보다 큼
        let (fresh, _) = s2.create_chunk().await.unwrap();
        assert!(fresh.seq > chunks[1].seq);
    }

    #[tokio::test]
    async fn recover_skips_torn_lines_and_removes_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        let chunk = write_chunk(&s, &[Record::empty("t").with_id("ok")]).await;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&chunk.path)
            .await
            .unwrap();
        file.write_all(br#"{"id":"torn","ta"#).await.unwrap();
        file.sync_all().await.unwrap();

        let (empty, _) = s.create_chunk().await.unwrap();
        tokio::fs::write(s.dir().join("x.tmp"), b"junk").await.unwrap();

        let chunks = store(dir.path()).await.recover().await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].records.len(), 1);
        assert_eq!(chunks[0].records[0].id, "ok");
        assert!(!empty.path.exists());
        assert!(!s.dir().join("x.tmp").exists());
    }

    #[tokio::test]
    async fn append_after_partial_write_keeps_acked_records() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        let (mut chunk, mut file) = s.create_chunk().await.unwrap();

        let a = Record::empty("t").with_id("a");
        let line = encode_line(&a).unwrap();
        s.append(&mut file, &chunk, &line).await.unwrap();
        chunk.push(a, line.len() - 1);

        // 실패한 쓰기가 남긴 조각
        let torn = encode_line(&Record::empty("t").with_id("b")).unwrap();
        file.write_all(&torn[..10]).await.unwrap();
        file.flush().await.unwrap();

        let c = Record::empty("t").with_id("c");
        let line = encode_line(&c).unwrap();
        s.append(&mut file, &chunk, &line).await.unwrap();
        chunk.push(c, line.len() - 1);
        drop(file);

        let len = tokio::fs::metadata(&chunk.path).await.unwrap().len();
        assert_eq!(len, chunk.size_bytes as u64);

        let recovered = store(dir.path()).await.recover().await.unwrap();
        let ids: Vec<_> = recovered[0].records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[tokio::test]
    async fn rewrite_keeps_only_remaining_records() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        let mut chunk = write_chunk(&s, &[Record::empty("t").with_id("1"), Record::empty("t").with_id("2")]).await;
        s.seal(&mut chunk).await.unwrap();
        chunk.records.retain(|r| r.id == "2");
        s.rewrite(&chunk).await.unwrap();

        let recovered = store(dir.path()).await.recover().await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].records[0].id, "2");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        let chunk = write_chunk(&s, &[Record::empty("t")]).await;
        s.remove(&chunk).await.unwrap();
        s.remove(&chunk).await.unwrap();
        assert!(!chunk.path.exists());
    }

    #[tokio::test]
    async fn quarantine_moves_file_and_writes_meta() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        let mut chunk = write_chunk(&s, &[Record::empty("t"), Record::empty("t")]).await;
        s.seal(&mut chunk).await.unwrap();
        chunk.attempts = 4;

        let meta = s.quarantine(&chunk, "retry limit exhausted").await.unwrap();
        assert!(!chunk.path.exists());
        assert!(meta.data_path.exists());
        assert_eq!(meta.records, 2);
        assert_eq!(meta.attempts, 4);

        s.quarantine_records(&chunk.id, &[Record::empty("t")], 1, "mapper_parsing_exception")
            .await
            .unwrap();

        let listed = list_quarantined(dir.path()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|m| m.output == "main"));
        assert!(listed.iter().any(|m| m.reason == "retry limit exhausted"));
    }

    #[tokio::test]
    async fn list_quarantined_on_fresh_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_quarantined(dir.path()).await.unwrap().is_empty());
    }

    #[test]
    fn chunk_file_names() {
        let path = Path::new("/x/00000000000000000042-3f2a.sealed");
        assert_eq!(parse_chunk_file_name(path), Some((42, "3f2a".to_owned())));
        assert_eq!(parse_chunk_file_name(Path::new("/x/notes.open")), None);
    }
}
