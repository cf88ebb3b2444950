use crate::index::{DocId, DocVector, InvertedIndex, Posting, Record};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub vocabulary_size: usize,
    pub created_at: String,
    pub version: u32,
}

/// Whole-engine state as written to disk. Records are kept as JSON text since
/// bincode cannot encode a schemaless `serde_json::Value`.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    postings: BTreeMap<String, Vec<Posting>>,
    docs: BTreeMap<DocId, String>,
    vectors: BTreeMap<DocId, DocVector>,
    num_docs: u32,
    stale: bool,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn snapshot(&self) -> PathBuf { self.root.join("snapshot.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

impl InvertedIndex {
    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>> {
        let docs = self
            .docs
            .iter()
            .map(|(id, record)| Ok((*id, serde_json::to_string(record)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            postings: self.postings.clone(),
            docs,
            vectors: self.vectors.clone(),
            num_docs: self.num_docs,
            stale: self.stale,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    pub fn from_snapshot_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = bincode::deserialize(bytes).context("decode snapshot")?;
        if snapshot.version != SNAPSHOT_VERSION {
            bail!("unsupported snapshot version {}", snapshot.version);
        }
        let docs = snapshot
            .docs
            .into_iter()
            .map(|(id, json)| Ok((id, serde_json::from_str::<Record>(&json)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            postings: snapshot.postings,
            docs,
            vectors: snapshot.vectors,
            num_docs: snapshot.num_docs,
            stale: snapshot.stale,
        })
    }
}

/// Structural sanity check run on every reload.
pub fn validate(index: &InvertedIndex) -> Result<()> {
    if let Some(id) = index.vectors.keys().find(|id| !index.docs.contains_key(id)) {
        bail!("vector for unknown document {id}");
    }
    for (term, plist) in &index.postings {
        if plist.is_empty() {
            bail!("empty posting list for term {term:?}");
        }
        if let Some(p) = plist.iter().find(|p| !index.docs.contains_key(&p.doc_id)) {
            bail!("posting for term {term:?} points at unknown document {}", p.doc_id);
        }
    }
    if (index.num_docs as usize) < index.docs.len() {
        bail!("document count {} below stored documents {}", index.num_docs, index.docs.len());
    }
    for hit in index.search("test") {
        if !(hit.cosine > 0.0 && hit.cosine <= 1.0 + 1e-9) || !hit.tfidf_score.is_finite() {
            bail!("probe search produced malformed hit for document {}", hit.doc_id);
        }
    }
    Ok(())
}

pub fn save_index(paths: &IndexPaths, index: &InvertedIndex) -> Result<()> {
    create_dir_all(&paths.root)?;
    let bytes = index.to_snapshot_bytes()?;
    let mut f = File::create(paths.snapshot())?;
    f.write_all(&bytes)?;

    let meta = MetaFile {
        num_docs: index.num_docs(),
        vocabulary_size: index.vocabulary_size(),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into()),
        version: SNAPSHOT_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, "index saved");
    Ok(())
}

pub fn load_index(paths: &IndexPaths) -> Result<InvertedIndex> {
    let mut f = File::open(paths.snapshot())
        .with_context(|| format!("open {}", paths.snapshot().display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let index = InvertedIndex::from_snapshot_bytes(&buf)?;
    validate(&index)?;
    Ok(index)
}

/// Load the saved index, or start empty when it is missing or fails validation.
pub fn load_index_or_default(paths: &IndexPaths) -> InvertedIndex {
    if !paths.snapshot().exists() {
        tracing::info!(root = %paths.root.display(), "no saved index, starting empty");
        return InvertedIndex::new();
    }
    match load_index(paths) {
        Ok(index) => index,
        Err(err) => {
            tracing::warn!(error = %err, "saved index unusable, starting empty");
            InvertedIndex::new()
        }
    }
}

/// Remove the persisted snapshot and meta file if present.
pub fn clear_index(paths: &IndexPaths) -> Result<()> {
    for path in [paths.snapshot(), paths.meta()] {
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
    }
    Ok(())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
