use crate::OwnerReference;
use scan_controller_core::ResourceKind;

/// Returns true if an object of `kind` with the given owners is already
/// represented by a parent of one of the `watched` kinds, so scanning it
/// separately is redundant (e.g. a Pod owned by a ReplicaSet, or a Job owned
/// by a CronJob).
pub fn is_redundant_child(
    kind: ResourceKind,
    owners: &[OwnerReference],
    watched: &[ResourceKind],
) -> bool {
    owners
        .iter()
        .any(|owner| kind.is_redundant_owner(&owner.kind, watched))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[ResourceKind] = &ResourceKind::ALL;

    fn owner(kind: &str) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: format!("{}-owner", kind.to_lowercase()),
            uid: "00000000-0000-0000-0000-000000000000".to_string(),
            controller: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn suppresses_owned_children() {
        assert!(is_redundant_child(ResourceKind::Pod, &[owner("ReplicaSet")], ALL));
        assert!(is_redundant_child(ResourceKind::Pod, &[owner("DaemonSet")], ALL));
        assert!(is_redundant_child(ResourceKind::Pod, &[owner("StatefulSet")], ALL));
        assert!(is_redundant_child(ResourceKind::Pod, &[owner("Job")], ALL));
        assert!(is_redundant_child(
            ResourceKind::ReplicaSet,
            &[owner("Deployment")],
            ALL
        ));
        assert!(is_redundant_child(ResourceKind::Job, &[owner("CronJob")], ALL));
    }

    #[test]
    fn keeps_unowned_and_foreign_owned() {
        assert!(!is_redundant_child(ResourceKind::Pod, &[], ALL));
        // Static pods are mirrored with a Node owner.
        assert!(!is_redundant_child(ResourceKind::Pod, &[owner("Node")], ALL));
        assert!(!is_redundant_child(
            ResourceKind::Deployment,
            &[owner("Deployment")],
            ALL
        ));
        assert!(!is_redundant_child(ResourceKind::Job, &[owner("Workflow")], ALL));
    }

    #[test]
    fn keeps_children_of_unwatched_owners() {
        let pods_only = [ResourceKind::Pod];
        assert!(!is_redundant_child(
            ResourceKind::Pod,
            &[owner("ReplicaSet")],
            &pods_only
        ));
        assert!(!is_redundant_child(
            ResourceKind::Pod,
            &[owner("Job")],
            &ResourceKind::DEFAULT
        ));
    }

    #[test]
    fn any_matching_owner_suppresses() {
        assert!(is_redundant_child(
            ResourceKind::Pod,
            &[owner("Node"), owner("ReplicaSet")],
            ALL
        ));
    }
}
