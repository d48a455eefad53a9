//! Resource Lifecycle - Draft / Implemented / MarkedForDelete
//!
//! Every script, event and variable carries a lifecycle state. Checkers
//! consult it to flag live references to soft-deleted resources.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    #[default]
    Draft,
    Implemented,
    MarkedForDelete,
}

/// Allowed transitions, indexed by source state.
const TRANSITIONS: &[(ResourceState, &[ResourceState])] = &[
    (
        ResourceState::Draft,
        &[
            ResourceState::Draft,
            ResourceState::Implemented,
            ResourceState::MarkedForDelete,
        ],
    ),
    (
        ResourceState::Implemented,
        &[ResourceState::Implemented, ResourceState::MarkedForDelete],
    ),
    (
        ResourceState::MarkedForDelete,
        &[ResourceState::MarkedForDelete],
    ),
];

/// How a resource may leave the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Safe to remove right away.
    HardRemove,
    /// Must be marked for delete first.
    SoftDeleteFirst,
}

impl ResourceState {
    pub fn allowed_targets(self) -> &'static [ResourceState] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, to)| *to)
            .unwrap_or(&[])
    }

    pub fn can_transition_to(self, target: ResourceState) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_marked_for_delete(self) -> bool {
        self == ResourceState::MarkedForDelete
    }

    pub fn deletion_policy(self) -> DeletionPolicy {
        match self {
            ResourceState::Draft | ResourceState::MarkedForDelete => DeletionPolicy::HardRemove,
            ResourceState::Implemented => DeletionPolicy::SoftDeleteFirst,
        }
    }
}

/// Free-function form used by the editor layer.
pub fn can_transition_resource_state(from: ResourceState, to: ResourceState) -> bool {
    from.can_transition_to(to)
}
