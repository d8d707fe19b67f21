//! The provisioning pipeline.
//!
//! parse → access gate → node resolution → stage routing → delivery
//! negotiation → status report. Every step is synchronous; callers on an
//! async runtime should run [`Provisioner::handle`] on a blocking thread.

use std::net::SocketAddr;
use std::sync::Arc;

use boot_core::{BootConfig, ImageLayout, Node, NodeRegistry, OverlayResolver, StatusSink};

use crate::delivery::{self, Delivery};
use crate::error::ProvisionError;
use crate::gate;
use crate::observe::{Decision, Observer, TracingObserver};
use crate::render::TemplateRenderer;
use crate::report::Reporter;
use crate::request::{BootRequest, RawRequest};
use crate::resolver::NodeResolver;
use crate::router::StageRouter;

/// External collaborators the pipeline depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn NodeRegistry>,
    pub images: Arc<dyn ImageLayout>,
    pub overlays: Arc<dyn OverlayResolver>,
    pub status: Arc<dyn StatusSink>,
}

pub struct Provisioner {
    config: Arc<BootConfig>,
    collaborators: Collaborators,
    resolver: NodeResolver,
    router: StageRouter,
    renderer: TemplateRenderer,
    reporter: Reporter,
    observer: Arc<dyn Observer>,
}

impl Provisioner {
    pub fn new(config: Arc<BootConfig>, collaborators: Collaborators) -> Self {
        Self::build(config, collaborators, Arc::new(TracingObserver))
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(self, observer: Arc<dyn Observer>) -> Self {
        Self::build(self.config, self.collaborators, observer)
    }

    fn build(
        config: Arc<BootConfig>,
        collaborators: Collaborators,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            resolver: NodeResolver::new(collaborators.registry.clone()),
            router: StageRouter::new(
                config.clone(),
                collaborators.images.clone(),
                collaborators.overlays.clone(),
                observer.clone(),
            ),
            renderer: TemplateRenderer::new(),
            reporter: Reporter::new(collaborators.status.clone(), observer.clone()),
            config,
            collaborators,
            observer,
        }
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    /// Parse and serve a raw request.
    pub fn handle(&self, raw: &RawRequest, remote: SocketAddr) -> Result<Delivery, ProvisionError> {
        let request = BootRequest::parse(raw, remote).map_err(|error| {
            self.observer.observe(&Decision::Malformed {
                remote,
                error: &error,
            });
            ProvisionError::from(error)
        })?;
        self.provision(&request)
    }

    /// Serve a parsed request.
    ///
    /// On success the returned [`Delivery`] carries a receipt; the success
    /// status is recorded when the caller commits it after sending. Failures
    /// are recorded here, before returning, when the node is known.
    pub fn provision(&self, request: &BootRequest) -> Result<Delivery, ProvisionError> {
        self.observer.observe(&Decision::Received { request });

        gate::check(self.config.server.secure, request)
            .map_err(|err| self.reject(request, None, err))?;

        let node = self
            .resolver
            .resolve(&request.hwaddr, request.asset_key.as_deref())
            .map_err(|err| self.reject(request, None, err))?;
        self.observer.observe(&Decision::Resolved {
            request,
            node: &node,
        });

        let payload = self
            .router
            .route(&node, request)
            .and_then(|resource| {
                delivery::negotiate(&self.renderer, resource, &request.compression)
            })
            .map_err(|err| self.reject(request, Some(&node), err))?;

        let receipt = self.reporter.receipt(
            &node.id,
            request.stage.status_label(),
            &payload.artifact(),
            request.remote_ip(),
        );
        Ok(Delivery { payload, receipt })
    }

    fn reject(&self, request: &BootRequest, node: Option<&Node>, err: ProvisionError) -> ProvisionError {
        let node_id = match (&err, node) {
            (ProvisionError::AssetKey { node }, _) => Some(node.as_str()),
            (_, Some(node)) => Some(node.id.as_str()),
            (_, None) => None,
        };
        self.observer.observe(&Decision::Rejected {
            request,
            node: node_id,
            error: &err,
        });
        if let (Some(node_id), Some(label)) = (node_id, err.outcome_label()) {
            self.reporter.record(
                node_id,
                request.stage.status_label(),
                label,
                request.remote_ip(),
            );
        }
        err
    }
}
