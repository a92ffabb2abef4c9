//! Core data models for workload attestation

use crate::transport::PeerHandle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of the process on the other end of an accepted local channel.
///
/// The process id is only ever obtained from the kernel; a pid carried in a
/// request payload is never used to build one of these.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub process_id: u32,
    pub handle: PeerHandle,
}

/// A running container whose runtime-reported main process matched a pid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub container_id: String,
    /// Pod sandbox the container belongs to
    pub workload_group_id: String,
    pub reported_process_id: u32,
    /// Raw runtime info blob, kept for diagnosing ambiguous mappings
    pub runtime_metadata: String,
}

/// Kubelet `/pods` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

/// A workload record as served by the node-local kubelet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodSpec {
    pub node_name: String,
    pub service_account_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodStatus {
    pub container_statuses: Vec<ContainerStatus>,
    pub init_container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerStatus {
    pub name: String,
    /// `<runtime>://<runtime-local id>`
    #[serde(rename = "containerID")]
    pub container_id: String,
    pub image: String,
    #[serde(rename = "imageID")]
    pub image_id: String,
}

/// Identity-binding attributes derived for one attestation.
///
/// Ordered and duplicate-free so that two derivations over the same inputs
/// compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorSet(BTreeSet<String>);

impl SelectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key:value`; an empty value contributes nothing
    pub fn insert(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref();
        if value.is_empty() {
            return;
        }
        self.0.insert(format!("{key}:{value}"));
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.0.contains(selector)
    }

    /// Value of the first selector with the given key, if any
    pub fn value_of(&self, key: &str) -> Option<&str> {
        let prefix = format!("{key}:");
        self.0
            .iter()
            .find_map(|selector| selector.strip_prefix(prefix.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SelectorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_set_skips_empty_values() {
        let mut selectors = SelectorSet::new();
        selectors.insert("sa", "");
        selectors.insert("ns", "default");
        selectors.insert("ns", "default");

        assert_eq!(selectors.len(), 1);
        assert!(selectors.contains("ns:default"));
        assert_eq!(selectors.value_of("ns"), Some("default"));
        assert_eq!(selectors.value_of("sa"), None);
    }

    #[test]
    fn test_pod_decodes_kubelet_field_names() {
        let json = r#"{
            "metadata": {
                "name": "web-0",
                "namespace": "ns1",
                "uid": "pod-uid",
                "ownerReferences": [{"kind": "StatefulSet", "name": "web", "uid": "o1"}]
            },
            "spec": {"nodeName": "node-a", "serviceAccountName": "svc1"},
            "status": {
                "containerStatuses": [{
                    "name": "app",
                    "containerID": "containerd://abc123",
                    "image": "img:v1",
                    "imageID": "img@sha256:deadbeef"
                }]
            }
        }"#;

        let pod: Pod = serde_json::from_str(json).unwrap();
        assert_eq!(pod.spec.service_account_name, "svc1");
        assert_eq!(pod.metadata.owner_references[0].kind, "StatefulSet");
        assert_eq!(pod.status.container_statuses[0].container_id, "containerd://abc123");
        assert_eq!(pod.status.container_statuses[0].image_id, "img@sha256:deadbeef");
        assert!(pod.status.init_container_statuses.is_empty());
    }
}
