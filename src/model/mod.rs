// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core data model.
//!
//! Diagrams are registry rows; elements are the table boxes inside a diagram; edges are a
//! client-only overlay between elements and are never persisted.

pub mod diagram;
pub mod edge;
pub mod element;
pub mod ids;

pub use diagram::DiagramRecord;
pub use edge::EdgeRecord;
pub use element::{ElementPatch, ElementRecord, FieldDescriptor, DEFAULT_ELEMENT_KIND};
pub use ids::{ClassificationId, DiagramId, EdgeId, ElementId, Id, IdError, UserId};
