use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::db;

pub const RELATED_TYPE_GRADING: &str = "grading";
const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub related_type: String,
    pub related_id: String,
    pub uploaded_by: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
}

/// Where finalized spreadsheets go.
pub trait UploadTransport {
    fn upload(&self, req: UploadRequest) -> anyhow::Result<UploadReceipt>;
}

/// Stores uploads in the workspace folder and records them in the database.
pub struct WorkspaceUploads {
    workspace: PathBuf,
}

impl WorkspaceUploads {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

impl UploadTransport for WorkspaceUploads {
    fn upload(&self, req: UploadRequest) -> anyhow::Result<UploadReceipt> {
        if req.bytes.is_empty() {
            return Ok(UploadReceipt {
                success: false,
                message: Some("refusing to store an empty file".to_string()),
                upload_id: None,
            });
        }

        let conn = db::open_db(&self.workspace)?;
        let dir = self.workspace.join(UPLOADS_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;

        let id = Uuid::new_v4().to_string();
        let stored = dir.join(format!("{id}.xlsx"));
        std::fs::write(&stored, &req.bytes)
            .with_context(|| format!("failed to write upload {}", stored.to_string_lossy()))?;

        let inserted = conn.execute(
            "INSERT INTO file_uploads(
               id, file_name, stored_path, related_type, related_id, uploaded_by,
               size_bytes, sha256, uploaded_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &req.file_name,
                stored.to_string_lossy().to_string(),
                &req.related_type,
                &req.related_id,
                &req.uploaded_by,
                req.bytes.len() as i64,
                sha256_hex(&req.bytes),
                chrono::Utc::now().to_rfc3339(),
            ),
        );
        if let Err(e) = inserted {
            let _ = std::fs::remove_file(&stored);
            return Err(e).context("failed to record upload");
        }

        tracing::info!(upload_id = %id, file = %req.file_name, related_id = %req.related_id, "upload stored");
        Ok(UploadReceipt {
            success: true,
            message: Some(format!("{} uploaded", req.file_name)),
            upload_id: Some(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(bytes: &[u8]) -> UploadRequest {
        UploadRequest {
            file_name: "3AS_T1.xlsx".to_string(),
            bytes: bytes.to_vec(),
            related_type: RELATED_TYPE_GRADING.to_string(),
            related_id: "report-1".to_string(),
            uploaded_by: "teacher-7".to_string(),
        }
    }

    #[test]
    fn stores_file_and_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let receipt = WorkspaceUploads::new(dir.path())
            .upload(request(b"abc"))
            .expect("upload");
        assert!(receipt.success);
        let id = receipt.upload_id.expect("id");

        let conn = db::open_db(dir.path()).expect("db");
        let (path, sha): (String, String) = conn
            .query_row(
                "SELECT stored_path, sha256 FROM file_uploads WHERE id = ?",
                [&id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .expect("row");
        assert_eq!(std::fs::read(path).expect("stored"), b"abc");
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_payload_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let receipt = WorkspaceUploads::new(dir.path())
            .upload(request(b""))
            .expect("upload");
        assert!(!receipt.success);
    }
}
