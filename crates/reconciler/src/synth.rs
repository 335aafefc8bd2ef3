//! Manifest work synthesis.

use kealm_core::{Bundle, ClusterId, ManifestWork, ManifestWorkSpec, OWNED_BY_LABEL, ObjectMeta};

/// Build the work a cluster should hold for `bundle`.
///
/// The work takes the bundle's name, lives in the cluster's namespace, copies
/// the bundle's labels and annotations, adds the owner label, and carries the
/// workload verbatim. The bundle is not modified.
pub fn synthesize(bundle: &Bundle, cluster: &ClusterId) -> ManifestWork {
    let mut labels = bundle.metadata.labels.clone();
    labels.insert(
        OWNED_BY_LABEL.to_string(),
        bundle.metadata.uid.as_str().to_string(),
    );

    ManifestWork {
        metadata: ObjectMeta {
            labels,
            annotations: bundle.metadata.annotations.clone(),
            ..ObjectMeta::new(cluster.as_str(), bundle.metadata.name.clone())
        },
        spec: ManifestWorkSpec {
            workload: bundle.spec.workload.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kealm_core::{PLACEMENT_LABEL, Uid};
    use serde_json::json;

    fn bundle() -> Bundle {
        let mut bundle = Bundle::new("apps", "b1")
            .with_placement("p1")
            .with_label("team", "payments")
            .with_annotation("note", "hello")
            .with_manifest(json!({"kind": "ConfigMap", "metadata": {"name": "cm1"}}));
        bundle.metadata.uid = Uid::new("u1");
        bundle
    }

    #[test]
    fn test_work_identity() {
        let work = synthesize(&bundle(), &ClusterId::new("east"));
        assert_eq!(work.metadata.name, "b1");
        assert_eq!(work.metadata.namespace, "east");
        assert_eq!(work.metadata.resource_version, 0);
    }

    #[test]
    fn test_labels_and_annotations_copied_with_owner() {
        let work = synthesize(&bundle(), &ClusterId::new("east"));
        assert_eq!(work.metadata.label("team"), Some("payments"));
        assert_eq!(work.metadata.label(PLACEMENT_LABEL), Some("p1"));
        assert_eq!(work.metadata.label(OWNED_BY_LABEL), Some("u1"));
        assert_eq!(
            work.metadata.annotations.get("note").map(String::as_str),
            Some("hello")
        );
    }

    #[test]
    fn test_workload_verbatim() {
        let source = bundle();
        let work = synthesize(&source, &ClusterId::new("east"));
        assert_eq!(work.spec.workload, source.spec.workload);
    }

    #[test]
    fn test_bundle_labels_untouched() {
        let source = bundle();
        let before = source.metadata.labels.clone();
        let _ = synthesize(&source, &ClusterId::new("east"));
        assert_eq!(source.metadata.labels, before);
        assert!(!source.metadata.labels.contains_key(OWNED_BY_LABEL));
    }

    #[test]
    fn test_owner_label_overrides_bundle_label() {
        let source = bundle().with_label(OWNED_BY_LABEL, "forged");
        let work = synthesize(&source, &ClusterId::new("east"));
        assert_eq!(work.metadata.label(OWNED_BY_LABEL), Some("u1"));
    }

    #[test]
    fn test_deterministic() {
        let source = bundle();
        let cluster = ClusterId::new("west");
        assert_eq!(synthesize(&source, &cluster), synthesize(&source, &cluster));
    }
}
