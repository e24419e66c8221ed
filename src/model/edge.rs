// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::ids::{EdgeId, ElementId};

/// A client-only connection between two elements.
///
/// Edges are never written to storage; they are reconstructed or exported on the
/// client side only. Whether that is intentional or a missing feature is an open
/// product decision, so no persistence format is invented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub source_id: ElementId,
    pub target_id: ElementId,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl EdgeRecord {
    /// Whether this edge connects the unordered pair `{a, b}`.
    pub fn connects(&self, a: &ElementId, b: &ElementId) -> bool {
        (&self.source_id == a && &self.target_id == b)
            || (&self.source_id == b && &self.target_id == a)
    }

    /// Whether either endpoint is `element_id`.
    pub fn touches(&self, element_id: &ElementId) -> bool {
        &self.source_id == element_id || &self.target_id == element_id
    }
}
