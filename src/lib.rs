// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Proteus — diagram persistence and synchronization backend.
//!
//! The crate keeps a canvas-side in-memory model of a table diagram in sync with an
//! SQLite-backed diagram registry, via debounced flushes over a thin transport.

pub mod access;
pub mod api;
pub mod canvas;
pub mod clock;
pub mod model;
pub mod store;
pub mod sync;
