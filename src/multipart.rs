// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Rebuilding multipart bodies for proxied uploads.
//!
//! Parsing the form consumes the request body, so the declared file fields are
//! re-encoded into a fresh body before the request is forwarded.

use axum::extract::Multipart;
use bytes::{BufMut, Bytes, BytesMut};

pub const CHART_FIELD: &str = "chart";
pub const PROV_FIELD: &str = "prov";

/// A form field the rewrite must carry over.
#[derive(Debug, Clone, Copy)]
pub struct FormField {
    pub name: &'static str,
    pub mandatory: bool,
}

pub const CHART_UPLOAD_FIELDS: [FormField; 2] = [
    FormField {
        name: CHART_FIELD,
        mandatory: true,
    },
    FormField {
        name: PROV_FIELD,
        mandatory: false,
    },
];

pub const PROV_UPLOAD_FIELDS: [FormField; 1] = [FormField {
    name: PROV_FIELD,
    mandatory: true,
}];

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("form field '{0}' is missing")]
    MissingField(&'static str),

    #[error("reading multipart form: {0}")]
    Read(String),
}

/// One file part of a form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormFile {
    pub field: String,
    pub filename: String,
    pub data: Bytes,
}

/// The re-encoded form.
#[derive(Debug, Clone)]
pub struct RewrittenForm {
    pub content_type: String,
    pub body: Bytes,
    pub files: Vec<FormFile>,
}

impl RewrittenForm {
    pub fn file(&self, field: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field == field)
    }
}

pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.contains("multipart/form-data"))
}

/// Read the declared fields out of a parsed form and encode them again.
pub async fn rewrite_form(
    mut multipart: Multipart,
    fields: &[FormField],
) -> Result<RewrittenForm, RewriteError> {
    let mut found: Vec<FormFile> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RewriteError::Read(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if !fields.iter().any(|f| f.name == name) || found.iter().any(|f| f.field == name) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| RewriteError::Read(e.to_string()))?;
        found.push(FormFile {
            field: name,
            filename,
            data,
        });
    }

    let mut files = Vec::with_capacity(fields.len());
    for declared in fields {
        match found.iter().position(|f| f.field == declared.name) {
            Some(idx) => files.push(found.swap_remove(idx)),
            None if declared.mandatory => return Err(RewriteError::MissingField(declared.name)),
            None => tracing::warn!("optional form field '{}' is missing", declared.name),
        }
    }

    let mut writer = FormWriter::new();
    for file in &files {
        writer.add_file(&file.field, &file.filename, &file.data);
    }
    let content_type = writer.content_type();
    Ok(RewrittenForm {
        content_type,
        body: writer.finish(),
        files,
    })
}

/// Minimal `multipart/form-data` encoder for file parts.
pub struct FormWriter {
    boundary: String,
    buf: BytesMut,
}

impl FormWriter {
    pub fn new() -> Self {
        Self {
            boundary: uuid::Uuid::new_v4().simple().to_string(),
            buf: BytesMut::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn add_file(&mut self, field: &str, filename: &str, data: &[u8]) {
        self.buf.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.buf.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_quotes(field),
                escape_quotes(filename)
            )
            .as_bytes(),
        );
        self.buf
            .put_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        self.buf.put_slice(data);
        self.buf.put_slice(b"\r\n");
    }

    pub fn finish(mut self) -> Bytes {
        self.buf
            .put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buf.freeze()
    }
}

impl Default for FormWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
