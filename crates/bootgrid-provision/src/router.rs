//! Stage dispatch: node + request to the artifact to serve.

use std::path::PathBuf;
use std::sync::Arc;

use boot_core::{
    BootConfig, EfiFile, ImageLayout, Node, OverlayContext, OverlayResolver, OverlaySelection,
    Stage, StageToken,
};

use crate::context::TemplateContext;
use crate::error::ProvisionError;
use crate::observe::{Decision, Fallback, Observer};
use crate::request::BootRequest;

/// What the router selected.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResource {
    /// Nothing matched. Delivered as a bad request.
    Empty,
    /// An opaque file, streamed verbatim.
    Artifact(PathBuf),
    /// A text template rendered against its context.
    Template {
        path: PathBuf,
        context: Box<TemplateContext>,
    },
}

impl StageResource {
    fn template(path: PathBuf, context: TemplateContext) -> Self {
        StageResource::Template {
            path,
            context: Box::new(context),
        }
    }
}

pub struct StageRouter {
    config: Arc<BootConfig>,
    images: Arc<dyn ImageLayout>,
    overlays: Arc<dyn OverlayResolver>,
    observer: Arc<dyn Observer>,
}

impl StageRouter {
    pub fn new(
        config: Arc<BootConfig>,
        images: Arc<dyn ImageLayout>,
        overlays: Arc<dyn OverlayResolver>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            config,
            images,
            overlays,
            observer,
        }
    }

    pub fn route(&self, node: &Node, request: &BootRequest) -> Result<StageResource, ProvisionError> {
        let stage = match &request.stage {
            StageToken::Known(stage) => *stage,
            StageToken::Unrecognized(token) => {
                return Ok(self.fallback(node, request, Fallback::UnrecognizedStage(token)));
            }
        };

        if !node.is_valid() {
            return Ok(match stage {
                Stage::Ipxe => StageResource::template(
                    self.config.unconfigured_template(),
                    TemplateContext::unconfigured(&request.hwaddr),
                ),
                _ => self.fallback(node, request, Fallback::UnconfiguredNode),
            });
        }

        match stage {
            Stage::Ipxe => Ok(StageResource::template(
                self.config.ipxe_template(node.ipxe_template()),
                self.full_context(node, request),
            )),
            Stage::Kernel => Ok(self.kernel(node, request)),
            Stage::Kmods => Ok(match node.kernel_override() {
                Some(version) => StageResource::Artifact(self.images.kmods_image(version)),
                None => self.fallback(node, request, Fallback::NoKernelOverride),
            }),
            Stage::Container => Ok(match node.container() {
                Some(container) => StageResource::Artifact(self.images.container_image(container)),
                None => self.fallback(node, request, Fallback::NoContainer),
            }),
            Stage::System => self.overlay(node, request, OverlayContext::System),
            Stage::Runtime => self.overlay(node, request, OverlayContext::Runtime),
            Stage::Efiboot => self.efiboot(node, request),
            Stage::Shim => Ok(self.efi_binary(node, request, Stage::Shim)),
            Stage::Grub => Ok(self.efi_binary(node, request, Stage::Grub)),
            Stage::Initramfs => Ok(self.initramfs(node, request)),
        }
    }

    /// The override kernel always wins over the container's own kernel.
    fn kernel(&self, node: &Node, request: &BootRequest) -> StageResource {
        if let Some(version) = node.kernel_override() {
            return StageResource::Artifact(self.images.kernel_image(version));
        }
        let Some(container) = node.container() else {
            return self.fallback(node, request, Fallback::NoKernelSource);
        };
        match self.images.find_kernel(container) {
            Ok(kernel) => StageResource::Artifact(kernel.path),
            Err(err) => self.fallback(node, request, Fallback::KernelDiscovery(&err)),
        }
    }

    fn overlay(
        &self,
        node: &Node,
        request: &BootRequest,
        context: OverlayContext,
    ) -> Result<StageResource, ProvisionError> {
        let selection = if request.overlays.is_empty() {
            OverlaySelection::Context(context)
        } else {
            OverlaySelection::Named(&request.overlays)
        };
        let path = self
            .overlays
            .resolve(node, selection, self.config.server.autobuild_overlays)?;
        Ok(StageResource::Artifact(path))
    }

    fn efiboot(&self, node: &Node, request: &BootRequest) -> Result<StageResource, ProvisionError> {
        let file = match &request.efi_file {
            Some(EfiFile::GrubConfig) => {
                return Ok(StageResource::template(
                    self.config.grub_config_template(),
                    self.full_context(node, request),
                ));
            }
            Some(EfiFile::Unrecognized(name)) => {
                return Ok(self.fallback(node, request, Fallback::UnrecognizedEfiFile(name)));
            }
            None => return Ok(self.fallback(node, request, Fallback::UnrecognizedEfiFile(""))),
            Some(file) => file,
        };

        let container = node
            .container()
            .ok_or_else(|| ProvisionError::NotFound(format!("{} (no container)", file.name())))?;
        let found = match file {
            EfiFile::Shim => self.images.find_shim(container),
            _ => self.images.find_grub(container),
        };
        found
            .map(StageResource::Artifact)
            .ok_or_else(|| ProvisionError::NotFound(format!("{} in container {container}", file.name())))
    }

    /// Standalone shim/grub stages settle for an empty resource on a miss.
    fn efi_binary(&self, node: &Node, request: &BootRequest, stage: Stage) -> StageResource {
        let Some(container) = node.container() else {
            return self.fallback(node, request, Fallback::NoContainer);
        };
        let (found, file) = match stage {
            Stage::Shim => (self.images.find_shim(container), "shim"),
            _ => (self.images.find_grub(container), "grub"),
        };
        match found {
            Some(path) => StageResource::Artifact(path),
            None => self.fallback(node, request, Fallback::NoEfiBinary { container, file }),
        }
    }

    fn initramfs(&self, node: &Node, request: &BootRequest) -> StageResource {
        let Some(container) = node.container() else {
            return self.fallback(node, request, Fallback::NoContainer);
        };
        let kernel = match self.images.find_kernel(container) {
            Ok(kernel) => kernel,
            Err(err) => return self.fallback(node, request, Fallback::KernelDiscovery(&err)),
        };
        match self.images.initramfs(container, &kernel.version) {
            Ok(path) => StageResource::Artifact(path),
            Err(err) => self.fallback(node, request, Fallback::InitramfsDiscovery(&err)),
        }
    }

    fn full_context(&self, node: &Node, request: &BootRequest) -> TemplateContext {
        TemplateContext::for_node(node, request, &self.config.server)
    }

    fn fallback(&self, node: &Node, request: &BootRequest, reason: Fallback<'_>) -> StageResource {
        self.observer.observe(&Decision::Fallback {
            request,
            node,
            reason,
        });
        StageResource::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use boot_core::{ImageError, KernelInfo, OverlayError};

    use crate::request::RawRequest;

    /// Fixed answers keyed by container name `c`.
    struct FakeImages;

    impl ImageLayout for FakeImages {
        fn kernel_image(&self, v: &str) -> PathBuf {
            PathBuf::from(format!("/p/kernel/{v}/vmlinuz"))
        }
        fn kmods_image(&self, v: &str) -> PathBuf {
            PathBuf::from(format!("/p/kernel/{v}/kmods.img"))
        }
        fn container_image(&self, c: &str) -> PathBuf {
            PathBuf::from(format!("/p/container/{c}.img"))
        }
        fn find_kernel(&self, c: &str) -> Result<KernelInfo, ImageError> {
            if c == "c" {
                Ok(KernelInfo {
                    path: PathBuf::from("/c/boot/vmlinuz-6.1"),
                    version: "6.1".into(),
                })
            } else {
                Err(ImageError::NoKernel(PathBuf::from(c)))
            }
        }
        fn find_shim(&self, c: &str) -> Option<PathBuf> {
            (c == "c").then(|| PathBuf::from("/c/shim.efi"))
        }
        fn find_grub(&self, c: &str) -> Option<PathBuf> {
            (c == "c").then(|| PathBuf::from("/c/grubx64.efi"))
        }
        fn initramfs(&self, _c: &str, v: &str) -> Result<PathBuf, ImageError> {
            Ok(PathBuf::from(format!("/c/boot/initramfs-{v}.img")))
        }
    }

    struct FakeOverlays;

    impl OverlayResolver for FakeOverlays {
        fn resolve(
            &self,
            node: &Node,
            selection: OverlaySelection<'_>,
            _autobuild: bool,
        ) -> Result<PathBuf, OverlayError> {
            match selection {
                OverlaySelection::Context(ctx) => Ok(Path::new("/o").join(&node.id).join(ctx.as_str())),
                OverlaySelection::Named(names) if names.iter().any(|n| n == "missing") => {
                    Err(OverlayError::DoesNotExist("missing".into()))
                }
                OverlaySelection::Named(names) => Ok(Path::new("/o").join(&node.id).join(names.join("-"))),
            }
        }
    }

    #[derive(Default)]
    struct Fallbacks(Mutex<Vec<String>>);

    impl Observer for Fallbacks {
        fn observe(&self, decision: &Decision<'_>) {
            if let Decision::Fallback { reason, .. } = decision {
                self.0.lock().unwrap().push(format!("{reason:?}"));
            }
        }
    }

    fn router() -> (StageRouter, Arc<Fallbacks>) {
        let mut config = BootConfig::default();
        config.paths.sysconfdir = PathBuf::from("/etc");
        let observer = Arc::new(Fallbacks::default());
        let router = StageRouter::new(
            Arc::new(config),
            Arc::new(FakeImages),
            Arc::new(FakeOverlays),
            observer.clone(),
        );
        (router, observer)
    }

    fn request(stage: &str) -> BootRequest {
        request_with(stage, |_| {})
    }

    fn request_with(stage: &str, f: impl FnOnce(&mut RawRequest)) -> BootRequest {
        let mut raw = RawRequest {
            stage: Some(stage.into()),
            hwaddr: Some("de:ad:be:ef:00:01".into()),
            ..RawRequest::default()
        };
        f(&mut raw);
        BootRequest::parse(&raw, ([10, 0, 0, 5], 987).into()).unwrap()
    }

    fn node(container: &str, kernel_override: &str) -> Node {
        let mut node = Node {
            id: "n0001".into(),
            container: container.into(),
            ..Node::default()
        };
        node.kernel.override_version = kernel_override.into();
        node
    }

    fn artifact(resource: StageResource) -> PathBuf {
        match resource {
            StageResource::Artifact(path) => path,
            other => panic!("expected artifact, got {other:?}"),
        }
    }

    #[test]
    fn placeholder_gets_unconfigured_page_only_for_ipxe() {
        let (router, observer) = router();
        let placeholder = Node::placeholder("de:ad:be:ef:00:01");

        match router.route(&placeholder, &request("ipxe")).unwrap() {
            StageResource::Template { path, context } => {
                assert_eq!(path, PathBuf::from("/etc/bootgrid/ipxe/unconfigured.ipxe"));
                assert_eq!(*context, TemplateContext::unconfigured("de:ad:be:ef:00:01"));
            }
            other => panic!("unexpected {other:?}"),
        }
        for stage in ["kernel", "container", "system", "initramfs"] {
            assert_eq!(router.route(&placeholder, &request(stage)).unwrap(), StageResource::Empty);
        }
        assert_eq!(observer.0.lock().unwrap().len(), 4);
    }

    #[test]
    fn ipxe_uses_node_template() {
        let (router, _) = router();
        let mut n = node("c", "");
        n.ipxe = "rescue".into();
        match router.route(&n, &request("ipxe")).unwrap() {
            StageResource::Template { path, context } => {
                assert_eq!(path, PathBuf::from("/etc/bootgrid/ipxe/rescue.ipxe"));
                assert_eq!(context.id, "n0001");
                assert_eq!(context.container, "c");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn kernel_override_wins() {
        let (router, _) = router();
        let path = artifact(router.route(&node("c", "5.14.0-custom"), &request("kernel")).unwrap());
        assert_eq!(path, PathBuf::from("/p/kernel/5.14.0-custom/vmlinuz"));
    }

    #[test]
    fn kernel_from_container_or_nothing() {
        let (router, observer) = router();
        let path = artifact(router.route(&node("c", ""), &request("kernel")).unwrap());
        assert_eq!(path, PathBuf::from("/c/boot/vmlinuz-6.1"));

        assert_eq!(router.route(&node("", ""), &request("kernel")).unwrap(), StageResource::Empty);
        assert_eq!(
            router.route(&node("broken", ""), &request("kernel")).unwrap(),
            StageResource::Empty
        );
        let seen = observer.0.lock().unwrap();
        assert_eq!(seen[0], "NoKernelSource");
        assert!(seen[1].starts_with("KernelDiscovery"));
    }

    #[test]
    fn kmods_need_override() {
        let (router, _) = router();
        assert_eq!(
            artifact(router.route(&node("c", "5.14"), &request("kmods")).unwrap()),
            PathBuf::from("/p/kernel/5.14/kmods.img")
        );
        assert_eq!(router.route(&node("c", ""), &request("kmods")).unwrap(), StageResource::Empty);
    }

    #[test]
    fn container_image() {
        let (router, _) = router();
        assert_eq!(
            artifact(router.route(&node("c", ""), &request("container")).unwrap()),
            PathBuf::from("/p/container/c.img")
        );
        assert_eq!(router.route(&node("", ""), &request("container")).unwrap(), StageResource::Empty);
    }

    #[test]
    fn overlays_by_context_or_name() {
        let (router, _) = router();
        let n = node("c", "");
        assert_eq!(
            artifact(router.route(&n, &request("system")).unwrap()),
            PathBuf::from("/o/n0001/system")
        );
        assert_eq!(
            artifact(router.route(&n, &request("runtime")).unwrap()),
            PathBuf::from("/o/n0001/runtime")
        );
        let named = request_with("runtime", |r| r.overlay = Some("a,b".into()));
        assert_eq!(
            artifact(router.route(&n, &named).unwrap()),
            PathBuf::from("/o/n0001/a-b")
        );
        let missing = request_with("system", |r| r.overlay = Some("missing".into()));
        assert!(matches!(
            router.route(&n, &missing),
            Err(ProvisionError::Overlay(OverlayError::DoesNotExist(_)))
        ));
    }

    #[test]
    fn efiboot_dispatch() {
        let (router, observer) = router();
        let n = node("c", "");
        let efi = |file: &str| {
            let file = file.to_string();
            request_with("efiboot", move |r| r.efifile = Some(file))
        };

        assert_eq!(
            artifact(router.route(&n, &efi("shim.efi")).unwrap()),
            PathBuf::from("/c/shim.efi")
        );
        for grub in ["grub.efi", "grubx64.efi", "grub-tpm.efi"] {
            assert_eq!(
                artifact(router.route(&n, &efi(grub)).unwrap()),
                PathBuf::from("/c/grubx64.efi")
            );
        }
        match router.route(&n, &efi("grub.cfg")).unwrap() {
            StageResource::Template { path, context } => {
                assert_eq!(path, PathBuf::from("/etc/bootgrid/grub/grub.cfg.ww"));
                assert_eq!(context.id, "n0001");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(router.route(&n, &efi("bogus.efi")).unwrap(), StageResource::Empty);
        assert_eq!(
            observer.0.lock().unwrap().last().map(String::as_str),
            Some("UnrecognizedEfiFile(\"bogus.efi\")")
        );
    }

    #[test]
    fn efiboot_binary_missing_is_not_found() {
        let (router, _) = router();
        let req = request_with("efiboot", |r| r.efifile = Some("shim.efi".into()));
        assert!(matches!(
            router.route(&node("other", ""), &req),
            Err(ProvisionError::NotFound(_))
        ));
        assert!(matches!(
            router.route(&node("", ""), &req),
            Err(ProvisionError::NotFound(_))
        ));
    }

    #[test]
    fn shim_and_grub_stages() {
        let (router, _) = router();
        assert_eq!(
            artifact(router.route(&node("c", ""), &request("shim")).unwrap()),
            PathBuf::from("/c/shim.efi")
        );
        assert_eq!(
            artifact(router.route(&node("c", ""), &request("grub")).unwrap()),
            PathBuf::from("/c/grubx64.efi")
        );
        assert_eq!(router.route(&node("", ""), &request("shim")).unwrap(), StageResource::Empty);
    }

    #[test]
    fn missing_efi_binary_is_reported() {
        let (router, observer) = router();
        assert_eq!(router.route(&node("bare", ""), &request("grub")).unwrap(), StageResource::Empty);
        assert_eq!(router.route(&node("bare", ""), &request("shim")).unwrap(), StageResource::Empty);

        let seen = observer.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("NoEfiBinary"));
        assert!(seen[0].contains("\"bare\""));
    }

    #[test]
    fn initramfs_follows_discovered_kernel() {
        let (router, _) = router();
        assert_eq!(
            artifact(router.route(&node("c", ""), &request("initramfs")).unwrap()),
            PathBuf::from("/c/boot/initramfs-6.1.img")
        );
        assert_eq!(
            router.route(&node("broken", ""), &request("initramfs")).unwrap(),
            StageResource::Empty
        );
        assert_eq!(router.route(&node("", ""), &request("initramfs")).unwrap(), StageResource::Empty);
    }

    #[test]
    fn unrecognized_stage_is_empty() {
        let (router, observer) = router();
        for n in [node("c", "5.14"), Node::placeholder("de:ad:be:ef:00:01")] {
            assert_eq!(router.route(&n, &request("bogus")).unwrap(), StageResource::Empty);
        }
        assert_eq!(observer.0.lock().unwrap()[0], "UnrecognizedStage(\"bogus\")");
    }
}
