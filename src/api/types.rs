// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

// Wire types for the HTTP surface. Ids travel as plain strings and are validated
// at the boundary; everything past the handlers works with typed ids.

use serde::{Deserialize, Serialize};

use crate::model::{
    ClassificationId, DiagramRecord, ElementId, ElementPatch, ElementRecord,
    FieldDescriptor, IdError,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDiagramRequest {
    pub name: String,
    /// Client-supplied id; omitted means the server generates one.
    #[serde(default)]
    pub diagram_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDiagramResponse {
    pub diagram_id: String,
    pub relation_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementJson {
    pub id: String,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    pub position_x: f64,
    pub position_y: f64,
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub classification_id: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn default_kind() -> String {
    crate::model::DEFAULT_ELEMENT_KIND.to_owned()
}

impl From<ElementRecord> for ElementJson {
    fn from(record: ElementRecord) -> Self {
        Self {
            id: record.id.into_string(),
            name: record.name,
            kind: record.kind,
            description: record.description,
            fields: record.fields,
            position_x: record.position_x,
            position_y: record.position_y,
            width: record.width,
            height: record.height,
            classification_id: record.classification_id.map(|c| c.into_string()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl ElementJson {
    /// Validates the ids and builds the stored record. Timestamps are placeholders;
    /// the store assigns them on write.
    pub fn into_record(self) -> Result<ElementRecord, IdError> {
        Ok(ElementRecord {
            id: ElementId::new(self.id)?,
            name: self.name,
            kind: self.kind,
            description: self.description,
            fields: self.fields,
            position_x: self.position_x,
            position_y: self.position_y,
            width: self.width,
            height: self.height,
            classification_id: self.classification_id.map(ClassificationId::new).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertElementRequest {
    #[serde(flatten)]
    pub element: ElementJson,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertElementResponse {
    pub element_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PatchElementRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldDescriptor>>,
    #[serde(default)]
    pub position_x: Option<f64>,
    #[serde(default)]
    pub position_y: Option<f64>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub classification_id: Option<String>,
}

impl PatchElementRequest {
    pub fn into_patch(self) -> Result<ElementPatch, IdError> {
        Ok(ElementPatch {
            name: self.name,
            kind: self.kind,
            description: self.description,
            fields: self.fields,
            position_x: self.position_x,
            position_y: self.position_y,
            width: self.width,
            height: self.height,
            classification_id: self
                .classification_id
                .map(ClassificationId::new)
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagramJson {
    pub diagram_id: String,
    pub name: String,
    pub relation_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<DiagramRecord> for DiagramJson {
    fn from(record: DiagramRecord) -> Self {
        Self {
            diagram_id: record.id.into_string(),
            name: record.name,
            relation_name: record.relation_name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FullLoadResponse {
    pub diagram: DiagramJson,
    pub elements: Vec<ElementJson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropResponse {
    pub relation_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
    pub remaining: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    /// Set when the client should retry the same request after a repair pass.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retry: bool,
}
