//! Observability sink for provisioning decisions.
//!
//! The pipeline reports what it decided, not how to log it. Every terminal
//! outcome and every warn-level fallback becomes one [`Decision`] handed to
//! the injected [`Observer`]. [`TracingObserver`] turns them into `tracing`
//! events; tests substitute a recorder.

use std::net::{IpAddr, SocketAddr};

use boot_core::{ImageError, Node, StatusError, StatusEvent};
use tracing::{debug, error, info, warn};

use crate::error::{ClientProtocolError, ProvisionError};
use crate::request::BootRequest;

/// Why the router settled for an empty resource.
#[derive(Debug, Clone, Copy)]
pub enum Fallback<'a> {
    /// Placeholder node asked for something other than the boot-loader script.
    UnconfiguredNode,
    NoContainer,
    /// Kernel-module archives are only served for override kernels.
    NoKernelOverride,
    /// Neither a kernel override nor a container is set.
    NoKernelSource,
    KernelDiscovery(&'a ImageError),
    InitramfsDiscovery(&'a ImageError),
    /// The container carries no shim or grub binary.
    NoEfiBinary { container: &'a str, file: &'static str },
    UnrecognizedEfiFile(&'a str),
    UnrecognizedStage(&'a str),
}

/// A point in the pipeline worth reporting.
#[derive(Debug)]
pub enum Decision<'a> {
    Received {
        request: &'a BootRequest,
    },
    Malformed {
        remote: SocketAddr,
        error: &'a ClientProtocolError,
    },
    Resolved {
        request: &'a BootRequest,
        node: &'a Node,
    },
    Fallback {
        request: &'a BootRequest,
        node: &'a Node,
        reason: Fallback<'a>,
    },
    Rejected {
        request: &'a BootRequest,
        node: Option<&'a str>,
        error: &'a ProvisionError,
    },
    /// The last byte of an artifact was handed to the transport.
    Delivered {
        node: &'a str,
        stage: &'a str,
        artifact: &'a str,
        remote: IpAddr,
    },
    /// Delivery stopped before the artifact was fully sent.
    Aborted {
        node: &'a str,
        stage: &'a str,
        artifact: &'a str,
        remote: IpAddr,
    },
    StatusFailed {
        event: &'a StatusEvent,
        error: &'a StatusError,
    },
}

pub trait Observer: Send + Sync {
    fn observe(&self, decision: &Decision<'_>);
}

/// Forwards decisions to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, decision: &Decision<'_>) {
        match decision {
            Decision::Received { request } => debug!(
                hwaddr = %request.hwaddr,
                remote = %request.remote,
                stage = %request.stage,
                "request received"
            ),
            Decision::Malformed { remote, error } => {
                warn!(%remote, %error, "malformed provisioning request")
            }
            Decision::Resolved { request, node } => debug!(
                hwaddr = %request.hwaddr,
                node = %node.id,
                valid = node.is_valid(),
                "node resolved"
            ),
            Decision::Fallback {
                request,
                node,
                reason,
            } => {
                let stage = &request.stage;
                match reason {
                    Fallback::UnconfiguredNode => {
                        warn!(hwaddr = %request.hwaddr, %stage, "unknown/unconfigured node")
                    }
                    Fallback::NoContainer => {
                        warn!(node = %node.id, %stage, "no container set for node")
                    }
                    Fallback::NoKernelOverride => {
                        warn!(node = %node.id, "no kernel override modules set for node")
                    }
                    Fallback::NoKernelSource => {
                        warn!(node = %node.id, "no kernel version set for node")
                    }
                    Fallback::KernelDiscovery(err) => {
                        error!(node = %node.id, container = %node.container, error = %err, "no kernel found")
                    }
                    Fallback::InitramfsDiscovery(err) => {
                        error!(node = %node.id, container = %node.container, error = %err, "no initramfs found")
                    }
                    Fallback::NoEfiBinary { container, file } => {
                        warn!(node = %node.id, %container, %file, "no EFI binary found in container")
                    }
                    Fallback::UnrecognizedEfiFile(name) => {
                        warn!(node = %node.id, file = %name, "unrecognized EFI file requested")
                    }
                    Fallback::UnrecognizedStage(token) => {
                        warn!(node = %node.id, %token, "unrecognized stage requested")
                    }
                }
            }
            Decision::Rejected {
                request,
                node,
                error,
            } => {
                let status = error.status();
                if status.is_server_error() {
                    error!(
                        remote = %request.remote,
                        hwaddr = %request.hwaddr,
                        node = node.unwrap_or("-"),
                        stage = %request.stage,
                        status = status.as_u16(),
                        %error,
                        "provisioning failed"
                    )
                } else {
                    warn!(
                        remote = %request.remote,
                        hwaddr = %request.hwaddr,
                        node = node.unwrap_or("-"),
                        stage = %request.stage,
                        status = status.as_u16(),
                        %error,
                        "provisioning denied"
                    )
                }
            }
            Decision::Delivered {
                node,
                stage,
                artifact,
                remote,
            } => info!(%node, %stage, %artifact, %remote, "sent"),
            Decision::Aborted {
                node,
                stage,
                artifact,
                remote,
            } => warn!(%node, %stage, %artifact, %remote, "delivery aborted before completion"),
            Decision::StatusFailed { event, error } => {
                error!(node = %event.node_id, stage = %event.stage, %error, "could not record status")
            }
        }
    }
}
