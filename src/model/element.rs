// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};

use super::ids::{ClassificationId, ElementId};

/// Element kind applied when the client does not send one.
pub const DEFAULT_ELEMENT_KIND: &str = "table";

/// One typed column of a table element.
///
/// The ordered list of descriptors is the element's payload; it round-trips through
/// JSON in the `fields` storage column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

/// One visual node of a diagram, as stored (one row per element).
///
/// `created_at`/`updated_at` are unix millis assigned by the store; client-supplied
/// values are ignored on write.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub id: ElementId,
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub position_x: f64,
    pub position_y: f64,
    pub width: i64,
    pub height: i64,
    pub classification_id: Option<ClassificationId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ElementRecord {
    pub fn new(
        id: ElementId,
        name: impl Into<String>,
        position_x: f64,
        position_y: f64,
        width: i64,
        height: i64,
        now_ms: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: DEFAULT_ELEMENT_KIND.to_owned(),
            description: None,
            fields: Vec::new(),
            position_x,
            position_y,
            width,
            height,
            classification_id: None,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Applies a partial update. Returns whether anything changed.
    pub fn apply_patch(&mut self, patch: &ElementPatch) -> bool {
        let mut changed = false;

        if let Some(name) = patch.name.as_ref() {
            if &self.name != name {
                self.name = name.clone();
                changed = true;
            }
        }
        if let Some(kind) = patch.kind.as_ref() {
            if &self.kind != kind {
                self.kind = kind.clone();
                changed = true;
            }
        }
        if let Some(description) = patch.description.as_ref() {
            if self.description.as_ref() != Some(description) {
                self.description = Some(description.clone());
                changed = true;
            }
        }
        if let Some(fields) = patch.fields.as_ref() {
            if &self.fields != fields {
                self.fields = fields.clone();
                changed = true;
            }
        }
        if let Some(x) = patch.position_x {
            if self.position_x != x {
                self.position_x = x;
                changed = true;
            }
        }
        if let Some(y) = patch.position_y {
            if self.position_y != y {
                self.position_y = y;
                changed = true;
            }
        }
        if let Some(width) = patch.width {
            if self.width != width {
                self.width = width;
                changed = true;
            }
        }
        if let Some(height) = patch.height {
            if self.height != height {
                self.height = height;
                changed = true;
            }
        }
        if let Some(classification_id) = patch.classification_id.as_ref() {
            if self.classification_id.as_ref() != Some(classification_id) {
                self.classification_id = Some(classification_id.clone());
                changed = true;
            }
        }

        changed
    }
}

/// Partial element update. `None` fields are left untouched.
///
/// Clearing an already-set `classification_id` or `description` goes through a full
/// upsert, not a patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Vec<FieldDescriptor>>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub classification_id: Option<ClassificationId>,
}
