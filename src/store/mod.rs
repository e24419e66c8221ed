// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence for diagrams in SQLite.
//!
//! The store module owns the diagram registry (which diagrams exist) and the element
//! rows backing each diagram. No other component issues raw storage operations.

pub mod diagram_store;

pub use diagram_store::{
    relation_name_for, CollapseReport, DiagramStore, ReconcileReport, StoreError,
};
