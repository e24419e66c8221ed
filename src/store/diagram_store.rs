// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::now_millis;
use crate::model::{
    ClassificationId, DiagramId, DiagramRecord, ElementId, ElementPatch, ElementRecord,
    FieldDescriptor, IdError,
};

/// Reserved prefix stripped from a diagram id before deriving its relation name.
const RESERVED_ID_PREFIX: &str = "d:";

/// Namespace prefix of every derived relation name.
const RELATION_NAME_PREFIX: &str = "diagram_";

const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Derives the storage relation name for a diagram id.
///
/// The mapping is deterministic so it is reproducible from the id alone: the reserved
/// `d:` prefix is stripped, every non-alphanumeric character becomes `_`, and the
/// `diagram_` namespace prefix is prepended. The derived name is recorded in the
/// registry at creation time; lookups always read the recorded value and never
/// re-derive it.
pub fn relation_name_for(diagram_id: &DiagramId) -> String {
    let stripped = diagram_id
        .as_str()
        .strip_prefix(RESERVED_ID_PREFIX)
        .unwrap_or(diagram_id.as_str());

    let mut name = String::with_capacity(RELATION_NAME_PREFIX.len() + stripped.len());
    name.push_str(RELATION_NAME_PREFIX);
    for ch in stripped.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch);
        } else {
            name.push('_');
        }
    }
    name
}

#[derive(Debug)]
pub enum StoreError {
    /// The underlying store is unreachable or refuses connections. Retryable.
    Unavailable { source: rusqlite::Error },
    /// A registry row exists but its backing element storage does not. Repairable
    /// divergence; callers delete the registry row and ask the user to retry rather
    /// than silently fabricating an empty relation.
    RelationMissing { diagram_id: DiagramId },
    /// No registry row for the diagram. Terminal and user-visible.
    DiagramNotFound { diagram_id: DiagramId },
    /// The derived relation name was retired when its diagram was dropped. Retired
    /// names are never reissued, so this is terminal for the requested id.
    RelationRetired { relation_name: String },
    /// A different live diagram already owns the derived relation name.
    RelationNameConflict { relation_name: String },
    Sql {
        context: &'static str,
        source: rusqlite::Error,
    },
    Payload {
        element_id: String,
        source: serde_json::Error,
    },
    InvalidId { value: String, source: IdError },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { source } => write!(f, "storage unavailable: {source}"),
            Self::RelationMissing { diagram_id } => {
                write!(f, "element relation missing for diagram {diagram_id}")
            }
            Self::DiagramNotFound { diagram_id } => {
                write!(f, "diagram not found: {diagram_id}")
            }
            Self::RelationRetired { relation_name } => {
                write!(f, "relation name {relation_name} was retired and cannot be reused")
            }
            Self::RelationNameConflict { relation_name } => {
                write!(f, "relation name {relation_name} is already in use by another diagram")
            }
            Self::Sql { context, source } => write!(f, "sql error during {context}: {source}"),
            Self::Payload { element_id, source } => {
                write!(f, "cannot decode fields payload of element {element_id}: {source}")
            }
            Self::InvalidId { value, source } => {
                write!(f, "stored id {value:?} is invalid: {source}")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable { source } => Some(source),
            Self::RelationMissing { .. } => None,
            Self::DiagramNotFound { .. } => None,
            Self::RelationRetired { .. } => None,
            Self::RelationNameConflict { .. } => None,
            Self::Sql { source, .. } => Some(source),
            Self::Payload { source, .. } => Some(source),
            Self::InvalidId { source, .. } => Some(source),
        }
    }
}

/// SQLite's "no such table" signal, as opposed to any other failure class.
fn is_missing_relation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(message)) if message.starts_with("no such table")
    )
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn is_unavailable(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if matches!(
            inner.code,
            rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::CannotOpen
        )
    )
}

fn registry_err(context: &'static str, source: rusqlite::Error) -> StoreError {
    if is_unavailable(&source) {
        StoreError::Unavailable { source }
    } else {
        StoreError::Sql { context, source }
    }
}

fn element_err(
    context: &'static str,
    diagram_id: &DiagramId,
    source: rusqlite::Error,
) -> StoreError {
    if is_missing_relation(&source) {
        StoreError::RelationMissing {
            diagram_id: diagram_id.clone(),
        }
    } else if is_unavailable(&source) {
        StoreError::Unavailable { source }
    } else {
        StoreError::Sql { context, source }
    }
}

/// Registry plus per-diagram element storage behind a single SQLite connection.
///
/// Elements live in one fixed-schema `elements` relation keyed by the composite
/// `(diagram_id, id)`; the per-diagram relation name remains part of the external
/// contract (derived at creation, returned on create/drop) without each diagram
/// owning a separate table that could vanish independently of its registry row.
#[derive(Debug)]
pub struct DiagramStore {
    conn: Mutex<Connection>,
}

impl DiagramStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|source| StoreError::Unavailable { source })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| StoreError::Unavailable { source })?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))
            .map_err(|source| StoreError::Unavailable { source })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|source| StoreError::Unavailable { source })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("diagram store lock poisoned")
    }

    /// Idempotent; creates the registry relation if absent. Safe to call repeatedly
    /// and called defensively before most other operations.
    pub fn ensure_registry_exists(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        ensure_registry_on(&conn)
    }

    /// Creates (or re-registers) a diagram and returns its relation name.
    ///
    /// A second create with the same id is an upsert: it updates `name` and
    /// `updated_at` instead of erroring. A relation name that was retired by a drop
    /// is refused (`RelationRetired`); a name already held by a different live
    /// diagram, which can happen because the derivation collapses punctuation into
    /// `_`, is refused as `RelationNameConflict`.
    pub fn create_diagram(
        &self,
        diagram_id: &DiagramId,
        name: &str,
    ) -> Result<String, StoreError> {
        let conn = self.conn();
        ensure_registry_on(&conn)?;
        ensure_elements_on(&conn)?;

        let relation_name = relation_name_for(diagram_id);
        if relation_is_retired(&conn, &relation_name)? {
            return Err(StoreError::RelationRetired { relation_name });
        }

        let now = now_millis();
        conn.execute(
            "INSERT INTO diagrams (id, name, relation_name, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![diagram_id.as_str(), name, relation_name.as_str(), now],
        )
        .map_err(|source| {
            // The id upsert never trips a constraint, so one here is the
            // relation_name UNIQUE column: a distinct id derived the same name.
            if is_constraint_violation(&source) {
                StoreError::RelationNameConflict {
                    relation_name: relation_name.clone(),
                }
            } else {
                registry_err("create diagram", source)
            }
        })?;

        Ok(relation_name)
    }

    /// Inserts or updates one element row, keyed by element id.
    pub fn upsert_element(
        &self,
        diagram_id: &DiagramId,
        element: &ElementRecord,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        require_diagram(&conn, diagram_id)?;

        let fields = serde_json::to_string(&element.fields).map_err(|source| {
            StoreError::Payload {
                element_id: element.id.as_str().to_owned(),
                source,
            }
        })?;
        let now = now_millis();
        conn.execute(
            "INSERT INTO elements (diagram_id, id, name, kind, description, fields, \
             position_x, position_y, width, height, classification_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12) \
             ON CONFLICT(diagram_id, id) DO UPDATE SET \
             name = excluded.name, kind = excluded.kind, description = excluded.description, \
             fields = excluded.fields, position_x = excluded.position_x, \
             position_y = excluded.position_y, width = excluded.width, \
             height = excluded.height, classification_id = excluded.classification_id, \
             updated_at = excluded.updated_at",
            params![
                diagram_id.as_str(),
                element.id.as_str(),
                element.name,
                element.kind,
                element.description,
                fields,
                element.position_x,
                element.position_y,
                element.width,
                element.height,
                element.classification_id.as_ref().map(|c| c.as_str()),
                now,
            ],
        )
        .map_err(|source| element_err("upsert element", diagram_id, source))?;

        touch_diagram(&conn, diagram_id, now)?;
        Ok(())
    }

    /// Partial update of one element. Returns the number of affected rows (0 or 1);
    /// patching an absent element is not an error.
    pub fn update_element(
        &self,
        diagram_id: &DiagramId,
        element_id: &ElementId,
        patch: &ElementPatch,
    ) -> Result<u64, StoreError> {
        let conn = self.conn();
        require_diagram(&conn, diagram_id)?;

        let Some(mut element) = query_element(&conn, diagram_id, element_id)? else {
            return Ok(0);
        };
        element.apply_patch(patch);

        let fields = serde_json::to_string(&element.fields).map_err(|source| {
            StoreError::Payload {
                element_id: element_id.as_str().to_owned(),
                source,
            }
        })?;
        let now = now_millis();
        conn.execute(
            "UPDATE elements SET name = ?3, kind = ?4, description = ?5, fields = ?6, \
             position_x = ?7, position_y = ?8, width = ?9, height = ?10, \
             classification_id = ?11, updated_at = ?12 \
             WHERE diagram_id = ?1 AND id = ?2",
            params![
                diagram_id.as_str(),
                element_id.as_str(),
                element.name,
                element.kind,
                element.description,
                fields,
                element.position_x,
                element.position_y,
                element.width,
                element.height,
                element.classification_id.as_ref().map(|c| c.as_str()),
                now,
            ],
        )
        .map_err(|source| element_err("update element", diagram_id, source))?;

        touch_diagram(&conn, diagram_id, now)?;
        Ok(1)
    }

    /// Deletes one element. Deleting an element that does not exist is a no-op
    /// success, returning 0 affected rows.
    pub fn delete_element(
        &self,
        diagram_id: &DiagramId,
        element_id: &ElementId,
    ) -> Result<u64, StoreError> {
        let conn = self.conn();
        require_diagram(&conn, diagram_id)?;

        let affected = conn
            .execute(
                "DELETE FROM elements WHERE diagram_id = ?1 AND id = ?2",
                params![diagram_id.as_str(), element_id.as_str()],
            )
            .map_err(|source| element_err("delete element", diagram_id, source))?;

        if affected > 0 {
            touch_diagram(&conn, diagram_id, now_millis())?;
        }
        Ok(affected as u64)
    }

    /// All elements of a diagram, ordered by `created_at` ascending for display
    /// order stability (element id as tiebreak).
    pub fn list_elements(&self, diagram_id: &DiagramId) -> Result<Vec<ElementRecord>, StoreError> {
        let conn = self.conn();
        require_diagram(&conn, diagram_id)?;
        query_elements(&conn, diagram_id)
    }

    pub fn get_element(
        &self,
        diagram_id: &DiagramId,
        element_id: &ElementId,
    ) -> Result<Option<ElementRecord>, StoreError> {
        let conn = self.conn();
        require_diagram(&conn, diagram_id)?;
        query_element(&conn, diagram_id, element_id)
    }

    pub fn get_diagram(&self, diagram_id: &DiagramId) -> Result<DiagramRecord, StoreError> {
        let conn = self.conn();
        let Some(record) = query_diagram(&conn, diagram_id)? else {
            return Err(StoreError::DiagramNotFound {
                diagram_id: diagram_id.clone(),
            });
        };
        Ok(record)
    }

    /// Destroys a diagram: element rows first, then the registry row. The order
    /// favors detectability — a registry row without element storage is repairable
    /// divergence, while element rows without a registry row are orphans the
    /// reconciler must sweep. The relation name is retired so a later create can
    /// never silently reuse it.
    pub fn drop_diagram(&self, diagram_id: &DiagramId) -> Result<String, StoreError> {
        let conn = self.conn();
        let relation_name = require_diagram(&conn, diagram_id)?;

        match conn.execute(
            "DELETE FROM elements WHERE diagram_id = ?1",
            params![diagram_id.as_str()],
        ) {
            Ok(_) => {}
            // Already-missing element storage must not block the drop.
            Err(source) if is_missing_relation(&source) => {}
            Err(source) => return Err(element_err("drop diagram", diagram_id, source)),
        }

        conn.execute(
            "DELETE FROM diagrams WHERE id = ?1",
            params![diagram_id.as_str()],
        )
        .map_err(|source| registry_err("drop diagram", source))?;
        retire_relation(&conn, &relation_name, now_millis())?;

        Ok(relation_name)
    }

    /// All registry rows, most recently updated first.
    pub fn list_diagrams(&self) -> Result<Vec<DiagramRecord>, StoreError> {
        let conn = self.conn();
        ensure_registry_on(&conn)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, relation_name, created_at, updated_at FROM diagrams \
                 ORDER BY updated_at DESC, created_at DESC, id DESC",
            )
            .map_err(|source| registry_err("list diagrams", source))?;
        let rows = stmt
            .query_map([], diagram_row)
            .map_err(|source| registry_err("list diagrams", source))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| registry_err("list diagrams", source))?;

        rows.into_iter().map(diagram_from_row).collect()
    }

    /// Removes a registry row without touching element storage. Used by the repair
    /// path after a `RelationMissing` signal; data loss stays visible to the caller.
    pub fn delete_registry_row(&self, diagram_id: &DiagramId) -> Result<(), StoreError> {
        let conn = self.conn();
        let relation_name = conn
            .query_row(
                "SELECT relation_name FROM diagrams WHERE id = ?1",
                params![diagram_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|source| registry_err("delete registry row", source))?;

        conn.execute(
            "DELETE FROM diagrams WHERE id = ?1",
            params![diagram_id.as_str()],
        )
        .map_err(|source| registry_err("delete registry row", source))?;

        if let Some(relation_name) = relation_name {
            retire_relation(&conn, &relation_name, now_millis())?;
        }
        Ok(())
    }
}

fn ensure_registry_on(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS diagrams (\
         id TEXT PRIMARY KEY, \
         name TEXT NOT NULL, \
         relation_name TEXT NOT NULL UNIQUE, \
         created_at INTEGER NOT NULL, \
         updated_at INTEGER NOT NULL)",
        [],
    )
    .map_err(|source| registry_err("ensure registry", source))?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_diagrams_name ON diagrams (name)",
        [],
    )
    .map_err(|source| registry_err("ensure registry", source))?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS retired_relations (\
         relation_name TEXT PRIMARY KEY, \
         retired_at INTEGER NOT NULL)",
        [],
    )
    .map_err(|source| registry_err("ensure registry", source))?;
    Ok(())
}

/// Records a relation name as permanently retired. Idempotent; the first
/// retirement timestamp wins.
fn retire_relation(
    conn: &Connection,
    relation_name: &str,
    now: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO retired_relations (relation_name, retired_at) VALUES (?1, ?2) \
         ON CONFLICT(relation_name) DO NOTHING",
        params![relation_name, now],
    )
    .map_err(|source| registry_err("retire relation", source))?;
    Ok(())
}

fn relation_is_retired(conn: &Connection, relation_name: &str) -> Result<bool, StoreError> {
    let hit = conn
        .query_row(
            "SELECT 1 FROM retired_relations WHERE relation_name = ?1",
            params![relation_name],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(|source| registry_err("lookup retired relation", source))?;
    Ok(hit.is_some())
}

fn ensure_elements_on(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS elements (\
         diagram_id TEXT NOT NULL, \
         id TEXT NOT NULL, \
         name TEXT NOT NULL, \
         kind TEXT NOT NULL DEFAULT 'table', \
         description TEXT, \
         fields TEXT NOT NULL, \
         position_x REAL NOT NULL, \
         position_y REAL NOT NULL, \
         width INTEGER NOT NULL, \
         height INTEGER NOT NULL, \
         classification_id TEXT, \
         created_at INTEGER NOT NULL, \
         updated_at INTEGER NOT NULL, \
         PRIMARY KEY (diagram_id, id))",
        [],
    )
    .map_err(|source| registry_err("ensure elements", source))?;
    Ok(())
}

/// Registry lookup discipline: element operations resolve the diagram through the
/// registry and read the recorded relation name, never re-deriving it.
fn require_diagram(conn: &Connection, diagram_id: &DiagramId) -> Result<String, StoreError> {
    ensure_registry_on(conn)?;
    let relation_name = conn
        .query_row(
            "SELECT relation_name FROM diagrams WHERE id = ?1",
            params![diagram_id.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|source| registry_err("lookup diagram", source))?;

    relation_name.ok_or_else(|| StoreError::DiagramNotFound {
        diagram_id: diagram_id.clone(),
    })
}

fn touch_diagram(conn: &Connection, diagram_id: &DiagramId, now: i64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE diagrams SET updated_at = ?2 WHERE id = ?1",
        params![diagram_id.as_str(), now],
    )
    .map_err(|source| registry_err("touch diagram", source))?;
    Ok(())
}

struct RawElement {
    id: String,
    name: String,
    kind: String,
    description: Option<String>,
    fields: String,
    position_x: f64,
    position_y: f64,
    width: i64,
    height: i64,
    classification_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

const ELEMENT_COLUMNS: &str = "id, name, kind, description, fields, position_x, position_y, \
                               width, height, classification_id, created_at, updated_at";

fn element_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawElement> {
    Ok(RawElement {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        description: row.get(3)?,
        fields: row.get(4)?,
        position_x: row.get(5)?,
        position_y: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        classification_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn element_from_row(raw: RawElement) -> Result<ElementRecord, StoreError> {
    let fields: Vec<FieldDescriptor> =
        serde_json::from_str(&raw.fields).map_err(|source| StoreError::Payload {
            element_id: raw.id.clone(),
            source,
        })?;
    let id = ElementId::new(raw.id.clone()).map_err(|source| StoreError::InvalidId {
        value: raw.id,
        source,
    })?;
    let classification_id = raw
        .classification_id
        .map(|value| {
            ClassificationId::new(value.clone())
                .map_err(|source| StoreError::InvalidId { value, source })
        })
        .transpose()?;

    Ok(ElementRecord {
        id,
        name: raw.name,
        kind: raw.kind,
        description: raw.description,
        fields,
        position_x: raw.position_x,
        position_y: raw.position_y,
        width: raw.width,
        height: raw.height,
        classification_id,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}

fn query_elements(
    conn: &Connection,
    diagram_id: &DiagramId,
) -> Result<Vec<ElementRecord>, StoreError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM elements WHERE diagram_id = ?1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .map_err(|source| element_err("list elements", diagram_id, source))?;
    let rows = stmt
        .query_map(params![diagram_id.as_str()], element_row)
        .map_err(|source| element_err("list elements", diagram_id, source))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| element_err("list elements", diagram_id, source))?;

    rows.into_iter().map(element_from_row).collect()
}

fn query_element(
    conn: &Connection,
    diagram_id: &DiagramId,
    element_id: &ElementId,
) -> Result<Option<ElementRecord>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {ELEMENT_COLUMNS} FROM elements WHERE diagram_id = ?1 AND id = ?2"),
            params![diagram_id.as_str(), element_id.as_str()],
            element_row,
        )
        .optional()
        .map_err(|source| element_err("get element", diagram_id, source))?;

    raw.map(element_from_row).transpose()
}

struct RawDiagram {
    id: String,
    name: String,
    relation_name: String,
    created_at: i64,
    updated_at: i64,
}

fn diagram_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDiagram> {
    Ok(RawDiagram {
        id: row.get(0)?,
        name: row.get(1)?,
        relation_name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn diagram_from_row(raw: RawDiagram) -> Result<DiagramRecord, StoreError> {
    let id = DiagramId::new(raw.id.clone()).map_err(|source| StoreError::InvalidId {
        value: raw.id,
        source,
    })?;
    Ok(DiagramRecord {
        id,
        name: raw.name,
        relation_name: raw.relation_name,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}

fn query_diagram(
    conn: &Connection,
    diagram_id: &DiagramId,
) -> Result<Option<DiagramRecord>, StoreError> {
    ensure_registry_on(conn)?;
    let raw = conn
        .query_row(
            "SELECT id, name, relation_name, created_at, updated_at FROM diagrams WHERE id = ?1",
            params![diagram_id.as_str()],
            diagram_row,
        )
        .optional()
        .map_err(|source| registry_err("get diagram", source))?;

    raw.map(diagram_from_row).transpose()
}

// Extracted reconciliation implementation for `DiagramStore`.
include!("diagram_store/reconcile.rs");

#[cfg(test)]
mod tests;
