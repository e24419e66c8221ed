// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Classification-based visibility and edit filtering.
//!
//! Elements optionally carry a classification. Users carry per-classification
//! permission levels; the diagram owner bypasses filtering entirely. Filtering is
//! applied when a diagram is served, so a reader below a classification's threshold
//! never sees those elements on the wire at all.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{ClassificationId, EdgeRecord, ElementId, ElementRecord};

/// Ordered permission ladder. `View < Edit < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    View,
    Edit,
    Admin,
}

/// A user's permission grants, keyed by classification.
///
/// Absent classifications grant nothing. Unclassified elements are visible and
/// editable by everyone with access to the diagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPermissions {
    grants: HashMap<ClassificationId, PermissionLevel>,
}

impl UserPermissions {
    pub fn new(grants: HashMap<ClassificationId, PermissionLevel>) -> Self {
        Self { grants }
    }

    pub fn level_for(&self, classification: &ClassificationId) -> Option<PermissionLevel> {
        self.grants.get(classification).copied()
    }

    fn at_least(&self, classification: &ClassificationId, level: PermissionLevel) -> bool {
        self.level_for(classification)
            .is_some_and(|granted| granted >= level)
    }
}

/// Drops elements whose classification the user cannot at least view. The owner
/// sees everything.
pub fn visible_elements(
    elements: Vec<ElementRecord>,
    permissions: &UserPermissions,
    is_owner: bool,
) -> Vec<ElementRecord> {
    if is_owner {
        return elements;
    }
    elements
        .into_iter()
        .filter(|element| match &element.classification_id {
            None => true,
            Some(classification) => {
                permissions.at_least(classification, PermissionLevel::View)
            }
        })
        .collect()
}

/// Keeps only edges whose endpoints both survived element filtering. An edge to a
/// hidden element would otherwise leak that the element exists.
pub fn visible_edges(
    edges: Vec<EdgeRecord>,
    visible: &[ElementRecord],
) -> Vec<EdgeRecord> {
    let surviving = |id: &ElementId| visible.iter().any(|element| &element.id == id);
    edges
        .into_iter()
        .filter(|edge| surviving(&edge.source_id) && surviving(&edge.target_id))
        .collect()
}

/// Whether the user may modify or delete this element. Unclassified elements are
/// editable by anyone; classified ones require `Edit` or above on the
/// classification. The owner may always edit.
pub fn can_edit(
    element: &ElementRecord,
    permissions: &UserPermissions,
    is_owner: bool,
) -> bool {
    if is_owner {
        return true;
    }
    match &element.classification_id {
        None => true,
        Some(classification) => permissions.at_least(classification, PermissionLevel::Edit),
    }
}

/// Diagram-level administration (dropping the diagram, maintenance operations) is
/// owner-only.
pub fn can_administer(is_owner: bool) -> bool {
    is_owner
}
