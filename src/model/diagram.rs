// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::ids::DiagramId;

/// One registry row. The registry is the single source of truth for which diagrams exist.
///
/// `relation_name` is derived deterministically from `id` when the diagram is created and
/// is immutable afterwards; it is unique and never reused once the diagram is dropped
/// (ids themselves are globally unique and never recycled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramRecord {
    pub id: DiagramId,
    pub name: String,
    pub relation_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}
