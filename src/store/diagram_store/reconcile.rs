// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

// Reconciliation between the registry and element storage. Runs on demand: before
// listing diagrams, and through the explicit maintenance endpoint.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed_registry_rows: usize,
    pub swept_orphan_elements: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseReport {
    pub deleted: usize,
    pub remaining: usize,
}

impl DiagramStore {
    /// Detects and repairs registry/storage divergence.
    ///
    /// For each registry row, a cheap bounded probe is run against its element
    /// storage. Only the specific "relation does not exist" signal leads to deleting
    /// the registry row; any other failure class is surfaced, not swallowed into a
    /// deletion. Element rows whose registry row is gone are swept as orphans.
    /// Nothing is ever recreated here: a vanished relation stays vanished and the
    /// loss is made visible by dropping the row that pointed at it.
    pub fn reconcile(&self) -> Result<ReconcileReport, StoreError> {
        let conn = self.conn();
        ensure_registry_on(&conn)?;

        let rows: Vec<(String, String)> = {
            let mut stmt = conn
                .prepare("SELECT id, relation_name FROM diagrams ORDER BY id")
                .map_err(|source| registry_err("reconcile", source))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|source| registry_err("reconcile", source))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| registry_err("reconcile", source))?;
            rows
        };

        let mut report = ReconcileReport::default();
        for (id, relation_name) in rows {
            let diagram_id =
                DiagramId::new(id.clone()).map_err(|source| StoreError::InvalidId {
                    value: id,
                    source,
                })?;
            match probe_elements(&conn, &diagram_id) {
                Ok(()) => {}
                Err(StoreError::RelationMissing { .. }) => {
                    conn.execute(
                        "DELETE FROM diagrams WHERE id = ?1",
                        params![diagram_id.as_str()],
                    )
                    .map_err(|source| registry_err("reconcile", source))?;
                    retire_relation(&conn, &relation_name, now_millis())?;
                    report.removed_registry_rows += 1;
                }
                Err(err) => return Err(err),
            }
        }

        report.swept_orphan_elements = match conn.execute(
            "DELETE FROM elements WHERE diagram_id NOT IN (SELECT id FROM diagrams)",
            [],
        ) {
            Ok(swept) => swept,
            Err(source) if is_missing_relation(&source) => 0,
            Err(source) => return Err(registry_err("reconcile", source)),
        };

        if report.removed_registry_rows > 0 || report.swept_orphan_elements > 0 {
            tracing::warn!(
                removed = report.removed_registry_rows,
                swept = report.swept_orphan_elements,
                "reconciled registry/storage divergence"
            );
        }
        Ok(report)
    }

    /// Collapses registry rows sharing a display name, keeping the most recently
    /// created row per name and dropping the element rows and registry rows of the
    /// rest.
    ///
    /// This merges on name collision: two genuinely distinct diagrams that happen to
    /// share a display name are collapsed into the newer one. Deliberate, documented
    /// policy — not a bug to quietly change.
    pub fn collapse_duplicate_names(&self) -> Result<CollapseReport, StoreError> {
        let conn = self.conn();
        ensure_registry_on(&conn)?;

        let duplicated: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM diagrams GROUP BY name HAVING COUNT(*) > 1")
                .map_err(|source| registry_err("collapse duplicates", source))?;
            let names = stmt
                .query_map([], |row| row.get(0))
                .map_err(|source| registry_err("collapse duplicates", source))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| registry_err("collapse duplicates", source))?;
            names
        };

        let mut deleted = 0;
        for name in duplicated {
            let losers: Vec<(String, String)> = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, relation_name FROM diagrams WHERE name = ?1 AND id NOT IN (\
                         SELECT id FROM diagrams WHERE name = ?1 \
                         ORDER BY created_at DESC, id DESC LIMIT 1)",
                    )
                    .map_err(|source| registry_err("collapse duplicates", source))?;
                let rows = stmt
                    .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))
                    .map_err(|source| registry_err("collapse duplicates", source))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| registry_err("collapse duplicates", source))?;
                rows
            };

            for (loser, relation_name) in losers {
                match conn.execute(
                    "DELETE FROM elements WHERE diagram_id = ?1",
                    params![loser],
                ) {
                    Ok(_) => {}
                    Err(source) if is_missing_relation(&source) => {}
                    Err(source) => {
                        return Err(registry_err("collapse duplicates", source));
                    }
                }
                conn.execute("DELETE FROM diagrams WHERE id = ?1", params![loser])
                    .map_err(|source| registry_err("collapse duplicates", source))?;
                retire_relation(&conn, &relation_name, now_millis())?;
                deleted += 1;
            }
        }

        let remaining: usize = conn
            .query_row("SELECT COUNT(*) FROM diagrams", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|source| registry_err("collapse duplicates", source))?
            as usize;

        if deleted > 0 {
            tracing::warn!(deleted, remaining, "collapsed duplicate diagram names");
        }
        Ok(CollapseReport { deleted, remaining })
    }
}

/// Cheap existence probe: a bounded read against the diagram's element storage.
fn probe_elements(conn: &Connection, diagram_id: &DiagramId) -> Result<(), StoreError> {
    conn.query_row(
        "SELECT id FROM elements WHERE diagram_id = ?1 LIMIT 1",
        params![diagram_id.as_str()],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map(|_| ())
    .map_err(|source| element_err("probe elements", diagram_id, source))
}
