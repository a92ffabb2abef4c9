//! Selector derivation from kubelet pod records
//!
//! Locates the pod owning a runtime container id and turns the pod's
//! populated fields into `key:value` selectors.

use crate::error::{AttestationError, Result};
use crate::models::{ContainerStatus, Pod, SelectorSet};
use tracing::warn;
use url::Url;

/// Runtime-local id of a status' `<runtime>://<id>` container id
fn runtime_local_id(status: &ContainerStatus) -> Option<String> {
    if status.container_id.is_empty() {
        return None;
    }

    match Url::parse(&status.container_id) {
        Ok(url) => url.host_str().map(str::to_string),
        Err(e) => {
            warn!(container_id = %status.container_id, error = %e, "Malformed container id");
            None
        }
    }
}

/// Find the status for `container_id` in a pod, regular containers first
pub fn lookup_container_in_pod<'a>(container_id: &str, pod: &'a Pod) -> Option<&'a ContainerStatus> {
    pod.status
        .container_statuses
        .iter()
        .chain(pod.status.init_container_statuses.iter())
        .find(|status| runtime_local_id(status).as_deref() == Some(container_id))
}

/// Find the first pod, in listing order, that owns `container_id`
pub fn find_workload<'a>(
    container_id: &str,
    pods: &'a [Pod],
) -> Option<(&'a Pod, &'a ContainerStatus)> {
    pods.iter().find_map(|pod| {
        lookup_container_in_pod(container_id, pod).map(|status| (pod, status))
    })
}

/// Insert `key:<image>` and `key:<imageID>` for every status.
///
/// Both forms are emitted so a selector can name either a tag-qualified or a
/// digest-qualified reference.
fn insert_images<'a>(
    selectors: &mut SelectorSet,
    key: &str,
    statuses: impl IntoIterator<Item = &'a ContainerStatus>,
) {
    for status in statuses {
        selectors.insert(key, &status.image);
        selectors.insert(key, &status.image_id);
    }
}

/// Selectors for a pod and the matched container status
pub fn selectors_for(pod: &Pod, status: &ContainerStatus) -> SelectorSet {
    let mut selectors = SelectorSet::new();

    selectors.insert("sa", &pod.spec.service_account_name);
    selectors.insert("ns", &pod.metadata.namespace);
    selectors.insert("node-name", &pod.spec.node_name);
    selectors.insert("pod-uid", &pod.metadata.uid);
    selectors.insert("pod-name", &pod.metadata.name);
    selectors.insert("container-name", &status.name);
    selectors.insert(
        "pod-image-count",
        pod.status.container_statuses.len().to_string(),
    );
    selectors.insert(
        "pod-init-image-count",
        pod.status.init_container_statuses.len().to_string(),
    );

    insert_images(&mut selectors, "container-image", [status]);
    insert_images(
        &mut selectors,
        "pod-image",
        pod.status
            .container_statuses
            .iter()
            .chain(&pod.status.init_container_statuses),
    );
    insert_images(
        &mut selectors,
        "pod-init-image",
        &pod.status.init_container_statuses,
    );

    for (key, value) in &pod.metadata.labels {
        selectors.insert("pod-label", format!("{key}:{value}"));
    }

    for owner in &pod.metadata.owner_references {
        if !owner.kind.is_empty() && !owner.name.is_empty() {
            selectors.insert("pod-owner", format!("{}:{}", owner.kind, owner.name));
        }
        if !owner.kind.is_empty() && !owner.uid.is_empty() {
            selectors.insert("pod-owner-uid", format!("{}:{}", owner.kind, owner.uid));
        }
    }

    selectors
}

/// Derive the selector set for `container_id` from a pod listing
pub fn derive_selectors(container_id: &str, pods: &[Pod]) -> Result<SelectorSet> {
    let (pod, status) =
        find_workload(container_id, pods).ok_or_else(|| AttestationError::WorkloadNotFound {
            container_id: container_id.to_string(),
        })?;

    Ok(selectors_for(pod, status))
}
