//! Provisioning error taxonomy.
//!
//! Every failure maps to exactly one HTTP status and, when it happens after
//! the node is known, to one status outcome label.

use boot_core::status::{BAD_ASSET, BAD_REQUEST, INTERNAL_ERROR, NOT_FOUND};
use boot_core::{HwaddrError, OverlayError, RegistryError};
use http::StatusCode;
use thiserror::Error;

use crate::render::TemplateError;

/// The inbound request could not be turned into a [`crate::BootRequest`].
#[derive(Debug, Error)]
pub enum ClientProtocolError {
    #[error("no stage encoded in request")]
    MissingStage,

    #[error("no hardware address encoded in request")]
    MissingHwaddr,

    #[error(transparent)]
    Hwaddr(#[from] HwaddrError),

    #[error("invalid overlay name: {0:?}")]
    OverlayName(String),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("malformed request: {0}")]
    ClientProtocol(#[from] ClientProtocolError),

    #[error("non-privileged source port {port}")]
    PrivilegedPort { port: u16 },

    #[error("incorrect asset key for node {node}")]
    AssetKey { node: String },

    #[error("no resource selected")]
    NoResource,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported {token:?} compressed version of {artifact}")]
    UnsupportedEncoding { token: String, artifact: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProvisionError::ClientProtocol(_) | ProvisionError::NoResource => {
                StatusCode::BAD_REQUEST
            }
            ProvisionError::PrivilegedPort { .. } | ProvisionError::AssetKey { .. } => {
                StatusCode::UNAUTHORIZED
            }
            ProvisionError::NotFound(_)
            | ProvisionError::UnsupportedEncoding { .. }
            | ProvisionError::Overlay(OverlayError::DoesNotExist(_)) => StatusCode::NOT_FOUND,
            ProvisionError::Template(_)
            | ProvisionError::Overlay(_)
            | ProvisionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProvisionError::Registry(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Status label to record, or `None` for failures before node identity
    /// is established.
    pub fn outcome_label(&self) -> Option<&'static str> {
        match self {
            ProvisionError::ClientProtocol(_)
            | ProvisionError::PrivilegedPort { .. }
            | ProvisionError::Registry(_) => None,
            ProvisionError::AssetKey { .. } => Some(BAD_ASSET),
            ProvisionError::NoResource => Some(BAD_REQUEST),
            ProvisionError::NotFound(_)
            | ProvisionError::UnsupportedEncoding { .. }
            | ProvisionError::Overlay(OverlayError::DoesNotExist(_)) => Some(NOT_FOUND),
            ProvisionError::Template(_)
            | ProvisionError::Overlay(_)
            | ProvisionError::Internal(_) => Some(INTERNAL_ERROR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ProvisionError::NoResource.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProvisionError::PrivilegedPort { port: 40000 }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProvisionError::Overlay(OverlayError::DoesNotExist("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProvisionError::Overlay(OverlayError::Build("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProvisionError::Registry(RegistryError::NoUnconfiguredSlot("a".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn pre_identity_failures_carry_no_label() {
        assert_eq!(
            ProvisionError::ClientProtocol(ClientProtocolError::MissingStage).outcome_label(),
            None
        );
        assert_eq!(ProvisionError::PrivilegedPort { port: 2000 }.outcome_label(), None);
        assert_eq!(
            ProvisionError::Registry(RegistryError::Backend("io".into())).outcome_label(),
            None
        );
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            ProvisionError::AssetKey { node: "n1".into() }.outcome_label(),
            Some("BAD_ASSET")
        );
        assert_eq!(ProvisionError::NoResource.outcome_label(), Some("BAD_REQUEST"));
        assert_eq!(
            ProvisionError::UnsupportedEncoding {
                token: "gz".into(),
                artifact: "default.ipxe".into()
            }
            .outcome_label(),
            Some("NOT_FOUND")
        );
        assert_eq!(
            ProvisionError::Internal("x".into()).outcome_label(),
            Some("INTERNAL_ERROR")
        );
    }
}
