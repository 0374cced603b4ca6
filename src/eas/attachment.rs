//! Attachment streaming, `spec.md` §4.2.6/§4.3: `GetAttachment`, streamed to
//! the destination path in 16 KiB chunks with a progress callback per chunk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::callbacks::CallbackHub;
use crate::credentials::AuthContext;
use crate::model::CallbackStatus;

const CHUNK_SIZE: usize = 16 * 1024;

pub struct AttachmentDownload {
    pub message_id: i64,
    pub attachment_id: i64,
    pub server_location: String,
    pub dest_path: Option<PathBuf>,
}

pub enum AttachmentOutcome {
    Success { content_uri: String, mime_type: Option<String> },
    NotFound,
}

pub async fn load_attachment(
    client: &Client,
    auth: &AuthContext,
    callbacks: &CallbackHub,
    req: AttachmentDownload,
) -> Result<AttachmentOutcome> {
    let url = format!(
        "{}&AttachmentName={}",
        auth.command_url("GetAttachment"),
        urlencode(&req.server_location)
    );

    let response = client
        .get(url)
        .header(reqwest::header::AUTHORIZATION, &auth.authorization_header)
        .send()
        .await
        .context("sending GetAttachment request")?;

    if response.status() != reqwest::StatusCode::OK {
        return Ok(AttachmentOutcome::NotFound);
    }

    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let dest_path = resolve_dest_path(req.dest_path.as_deref()).await?;
    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("creating attachment destination directory")?;
    }

    let total = response.content_length();
    let mut file = tokio::fs::File::create(&dest_path)
        .await
        .context("creating attachment destination file")?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("reading attachment chunk")?;
        for piece in chunk.chunks(CHUNK_SIZE) {
            file.write_all(piece).await.context("writing attachment chunk")?;
            downloaded += piece.len() as u64;
            let progress = total
                .filter(|&t| t > 0)
                .map(|t| ((downloaded * 100) / t).min(100) as u8)
                .unwrap_or(0);
            callbacks.attachment_status(req.message_id, req.attachment_id, CallbackStatus::InProgress, progress);
        }
    }

    file.flush().await.context("flushing attachment file")?;
    callbacks.attachment_status(req.message_id, req.attachment_id, CallbackStatus::Success, 100);

    Ok(AttachmentOutcome::Success {
        content_uri: dest_path.to_string_lossy().into_owned(),
        mime_type,
    })
}

/// When the caller doesn't supply a destination, choose a unique suffix,
/// `spec.md` §4.2.6.
async fn resolve_dest_path(dest_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = dest_path {
        return Ok(path.to_path_buf());
    }
    let dir = std::env::temp_dir().join("eas-attachments");
    Ok(dir.join(format!("attachment-{}", Uuid::new_v4().simple())))
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unspecified_destination_gets_unique_suffix() {
        let a = resolve_dest_path(None).await.unwrap();
        let b = resolve_dest_path(None).await.unwrap();
        assert_ne!(a, b);
    }
}
