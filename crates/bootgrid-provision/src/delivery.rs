//! Delivery and compression negotiation.
//!
//! Templated resources are rendered in full before anything is handed out.
//! Raw resources are returned as a path for the transport to stream,
//! swapped for their `.gz` sibling when the client asked for gzip.

use std::fs;
use std::path::{Path, PathBuf};

use boot_core::Compression;

use crate::error::ProvisionError;
use crate::render::TemplateRenderer;
use crate::report::Receipt;
use crate::router::StageResource;

pub const TEXT_CONTENT_TYPE: &str = "text/plain";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// The bytes to send, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A rendered template, complete.
    Rendered { artifact: String, body: Vec<u8> },
    /// A file to stream verbatim.
    File { path: PathBuf, len: u64 },
}

impl Payload {
    /// Base name reported as the outcome of a successful delivery.
    pub fn artifact(&self) -> String {
        match self {
            Payload::Rendered { artifact, .. } => artifact.clone(),
            Payload::File { path, .. } => base_name(path),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Payload::Rendered { .. } => TEXT_CONTENT_TYPE,
            Payload::File { .. } => BINARY_CONTENT_TYPE,
        }
    }

    pub fn content_length(&self) -> u64 {
        match self {
            Payload::Rendered { body, .. } => body.len() as u64,
            Payload::File { len, .. } => *len,
        }
    }
}

/// A negotiated payload plus the receipt to commit once it is fully sent.
#[derive(Debug)]
pub struct Delivery {
    pub payload: Payload,
    pub receipt: Receipt,
}

impl Delivery {
    /// Read the whole payload into memory and commit the receipt.
    ///
    /// For callers without a streaming transport.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        let bytes = match self.payload {
            Payload::Rendered { body, .. } => body,
            Payload::File { path, .. } => fs::read(path)?,
        };
        self.receipt.commit();
        Ok(bytes)
    }
}

/// Turn a routed resource into a payload, honouring the compression token.
pub fn negotiate(
    renderer: &TemplateRenderer,
    resource: StageResource,
    compression: &Compression,
) -> Result<Payload, ProvisionError> {
    let (path, context) = match resource {
        StageResource::Empty => return Err(ProvisionError::NoResource),
        StageResource::Artifact(path) => (path, None),
        StageResource::Template { path, context } => (path, Some(context)),
    };
    if !path.is_file() {
        return Err(ProvisionError::NotFound(path.display().to_string()));
    }

    if let Some(context) = context {
        if compression.is_requested() {
            return Err(unsupported(compression, &path));
        }
        let body = renderer.render(&path, &context)?;
        return Ok(Payload::Rendered {
            artifact: base_name(&path),
            body,
        });
    }

    let path = match compression {
        Compression::None => path,
        Compression::Gzip => {
            let gz = gz_sibling(&path);
            if !gz.is_file() {
                return Err(ProvisionError::NotFound(gz.display().to_string()));
            }
            gz
        }
        Compression::Unsupported(_) => return Err(unsupported(compression, &path)),
    };
    let len = fs::metadata(&path)
        .map_err(|err| ProvisionError::Internal(format!("{}: {err}", path.display())))?
        .len();
    Ok(Payload::File { path, len })
}

fn unsupported(compression: &Compression, path: &Path) -> ProvisionError {
    ProvisionError::UnsupportedEncoding {
        token: compression.token().to_string(),
        artifact: path.display().to_string(),
    }
}

fn gz_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateContext;

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("initramfs.img");
        fs::write(&raw, b"raw bytes").unwrap();
        let template = dir.path().join("default.ipxe");
        fs::write(&template, "#!ipxe {{ hwaddr }}\n").unwrap();
        (dir, raw, template)
    }

    fn templated(path: &Path) -> StageResource {
        StageResource::Template {
            path: path.to_path_buf(),
            context: Box::new(TemplateContext::unconfigured("de:ad:be:ef:00:01")),
        }
    }

    #[test]
    fn empty_is_bad_request() {
        let err = negotiate(&TemplateRenderer::new(), StageResource::Empty, &Compression::None)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NoResource));
    }

    #[test]
    fn absent_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = negotiate(
            &TemplateRenderer::new(),
            StageResource::Artifact(dir.path().join("gone")),
            &Compression::None,
        )
        .unwrap_err();
        assert!(matches!(err, ProvisionError::NotFound(_)));
    }

    #[test]
    fn raw_file_streams_as_is() {
        let (_dir, raw, _) = fixture();
        let payload = negotiate(
            &TemplateRenderer::new(),
            StageResource::Artifact(raw.clone()),
            &Compression::None,
        )
        .unwrap();
        assert_eq!(payload, Payload::File { path: raw, len: 9 });
        assert_eq!(payload.artifact(), "initramfs.img");
        assert_eq!(payload.content_type(), BINARY_CONTENT_TYPE);
    }

    #[test]
    fn gzip_needs_sibling() {
        let (_dir, raw, _) = fixture();
        let renderer = TemplateRenderer::new();
        let err = negotiate(&renderer, StageResource::Artifact(raw.clone()), &Compression::Gzip)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NotFound(_)));

        fs::write(raw.with_extension("img.gz"), b"gz").unwrap();
        let payload =
            negotiate(&renderer, StageResource::Artifact(raw), &Compression::Gzip).unwrap();
        assert_eq!(payload.artifact(), "initramfs.img.gz");
        assert_eq!(payload.content_length(), 2);
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let (_dir, raw, _) = fixture();
        let err = negotiate(
            &TemplateRenderer::new(),
            StageResource::Artifact(raw),
            &Compression::parse(Some("zstd")),
        )
        .unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedEncoding { token, .. } if token == "zstd"));
    }

    #[test]
    fn templates_render_but_refuse_compression() {
        let (_dir, _, template) = fixture();
        let renderer = TemplateRenderer::new();

        let payload = negotiate(&renderer, templated(&template), &Compression::None).unwrap();
        assert_eq!(
            payload,
            Payload::Rendered {
                artifact: "default.ipxe".into(),
                body: b"#!ipxe de:ad:be:ef:00:01\n".to_vec(),
            }
        );
        assert_eq!(payload.content_type(), TEXT_CONTENT_TYPE);
        assert_eq!(payload.content_length(), 25);

        for token in ["gz", "zstd"] {
            let err = negotiate(&renderer, templated(&template), &Compression::parse(Some(token)))
                .unwrap_err();
            assert!(matches!(err, ProvisionError::UnsupportedEncoding { .. }));
        }
    }
}
