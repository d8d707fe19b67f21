//! Secure-mode source port check.

use boot_core::Stage;

use crate::error::ProvisionError;
use crate::request::BootRequest;

/// Ports below this can only be bound by a privileged process on the node.
pub const PRIVILEGED_PORT_LIMIT: u16 = 1024;

/// Reject security-sensitive requests from non-privileged source ports.
///
/// A request is sensitive when it asks for the runtime overlay or names
/// overlays explicitly.
pub fn check(secure: bool, request: &BootRequest) -> Result<(), ProvisionError> {
    if !secure {
        return Ok(());
    }
    let sensitive = request
        .stage
        .stage()
        .is_some_and(Stage::is_security_sensitive)
        || !request.overlays.is_empty();
    let port = request.remote.port();
    if sensitive && port >= PRIVILEGED_PORT_LIMIT {
        return Err(ProvisionError::PrivilegedPort { port });
    }
    Ok(())
}
