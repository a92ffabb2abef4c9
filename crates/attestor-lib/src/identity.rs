//! Mapping from attested selectors to a SPIFFE ID

use crate::error::{AttestationError, Result};
use crate::pipeline::Attestation;

/// Decides which identity an attested workload is issued
pub trait IdentityMapper: Send + Sync {
    fn spiffe_id(&self, attestation: &Attestation) -> Result<String>;
}

/// `spiffe://<trust-domain>/ns/<namespace>/sa/<service-account>`
///
/// Workloads missing either selector get no identity.
#[derive(Debug, Clone)]
pub struct ServiceAccountIdentityMapper {
    trust_domain: String,
}

impl ServiceAccountIdentityMapper {
    pub fn new(trust_domain: &str) -> Result<Self> {
        let trust_domain = trust_domain
            .trim()
            .trim_start_matches("spiffe://")
            .trim_end_matches('/')
            .to_ascii_lowercase();

        if trust_domain.is_empty() || trust_domain.contains('/') {
            return Err(AttestationError::Configuration(format!(
                "invalid trust domain {trust_domain:?}"
            )));
        }
        Ok(Self { trust_domain })
    }

    pub fn trust_domain(&self) -> &str {
        &self.trust_domain
    }
}

impl IdentityMapper for ServiceAccountIdentityMapper {
    fn spiffe_id(&self, attestation: &Attestation) -> Result<String> {
        let selectors = &attestation.selectors;
        match (selectors.value_of("ns"), selectors.value_of("sa")) {
            (Some(ns), Some(sa)) => Ok(format!(
                "spiffe://{}/ns/{}/sa/{}",
                self.trust_domain, ns, sa
            )),
            _ => Err(AttestationError::WorkloadNotFound {
                container_id: attestation.container.container_id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerRecord, SelectorSet};

    fn attestation(selectors: &[(&str, &str)]) -> Attestation {
        let mut set = SelectorSet::new();
        for (k, v) in selectors {
            set.insert(k, v);
        }
        Attestation {
            process_id: 4242,
            container: ContainerRecord {
                container_id: "abc123".into(),
                workload_group_id: "pod-b".into(),
                reported_process_id: 4242,
                runtime_metadata: String::new(),
            },
            selectors: set,
        }
    }

    #[test]
    fn test_maps_namespace_and_service_account() {
        let mapper = ServiceAccountIdentityMapper::new("example.org").unwrap();
        let id = mapper
            .spiffe_id(&attestation(&[("ns", "ns1"), ("sa", "svc1"), ("pod-name", "web")]))
            .unwrap();
        assert_eq!(id, "spiffe://example.org/ns/ns1/sa/svc1");
    }

    #[test]
    fn test_missing_service_account_gets_no_identity() {
        let mapper = ServiceAccountIdentityMapper::new("example.org").unwrap();
        let err = mapper
            .spiffe_id(&attestation(&[("ns", "ns1")]))
            .unwrap_err();
        assert!(matches!(err, AttestationError::WorkloadNotFound { .. }));
    }

    #[test]
    fn test_trust_domain_normalization() {
        let mapper = ServiceAccountIdentityMapper::new("spiffe://Example.ORG/").unwrap();
        assert_eq!(mapper.trust_domain(), "example.org");

        assert!(ServiceAccountIdentityMapper::new("").is_err());
        assert!(ServiceAccountIdentityMapper::new("example.org/path").is_err());
    }
}
