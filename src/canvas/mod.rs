// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The canvas-side model of the diagram currently open.
//!
//! A single owned document with controlled mutation operations; UI code never writes
//! fields directly. The model is ephemeral: it is discarded on navigation and rebuilt
//! from storage on re-entry, and it is never the source of truth.

use std::collections::BTreeSet;

use crate::model::{
    DiagramId, EdgeId, EdgeRecord, ElementId, ElementPatch, ElementRecord,
};

/// Minimum distance (px) a new element must keep from every existing element's origin.
pub const MIN_CLEARANCE_PX: f64 = 20.0;

/// Minimum interval (ms) between two successful adds.
pub const MIN_ADD_INTERVAL_MS: i64 = 300;

/// Ceiling on elements per diagram.
pub const MAX_ELEMENTS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tool {
    #[default]
    Select,
    AddElement,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: i64,
    pub height: i64,
}

/// The mutable in-memory diagram the UI runs against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasModel {
    diagram_id: Option<DiagramId>,
    nodes: Vec<ElementRecord>,
    edges: Vec<EdgeRecord>,
    selected: BTreeSet<ElementId>,
    tool: Tool,
    dirty: bool,
    last_add_ms: Option<i64>,
    next_seq: u64,
}

impl CanvasModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagram_id(&self) -> Option<&DiagramId> {
        self.diagram_id.as_ref()
    }

    pub fn nodes(&self) -> &[ElementRecord] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    pub fn selected(&self) -> &BTreeSet<ElementId> {
        &self.selected
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Replaces the model wholesale from storage and clears the dirty flag.
    pub fn load_from(
        &mut self,
        diagram_id: Option<DiagramId>,
        nodes: Vec<ElementRecord>,
        edges: Vec<EdgeRecord>,
    ) {
        self.diagram_id = diagram_id;
        self.nodes = nodes;
        self.edges = edges;
        self.selected.clear();
        self.tool = Tool::default();
        self.dirty = false;
        self.last_add_ms = None;
    }

    /// Clears the dirty flag after a successful flush.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Adds a new element at `position`, or silently refuses.
    ///
    /// The guards absorb duplicate creation events the UI can emit from a single
    /// gesture (click-and-drag ambiguity): a rejected add mutates nothing and is not
    /// an error. Rejection cases: position within [`MIN_CLEARANCE_PX`] of an existing
    /// element's origin; bounding-box overlap with an existing element; less than
    /// [`MIN_ADD_INTERVAL_MS`] since the last successful add; element count at
    /// [`MAX_ELEMENTS`].
    pub fn add_element(
        &mut self,
        position: Position,
        size: Size,
        now_ms: i64,
    ) -> Option<&ElementRecord> {
        if self.nodes.len() >= MAX_ELEMENTS {
            return None;
        }
        if self
            .last_add_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < MIN_ADD_INTERVAL_MS)
        {
            return None;
        }
        if self.nodes.iter().any(|node| {
            origin_distance(node, position) < MIN_CLEARANCE_PX
                || boxes_overlap(node, position, size)
        }) {
            return None;
        }

        let id = self.fresh_element_id();
        let name = format!("Table {}", self.nodes.len() + 1);
        let element = ElementRecord::new(
            id,
            name,
            position.x,
            position.y,
            size.width,
            size.height,
            now_ms,
        );
        self.nodes.push(element);
        self.last_add_ms = Some(now_ms);
        self.dirty = true;
        self.nodes.last()
    }

    /// Applies a partial update to one element. Returns whether the element exists.
    pub fn update_element(&mut self, id: &ElementId, patch: &ElementPatch) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|node| &node.id == id) else {
            return false;
        };
        node.apply_patch(patch);
        self.dirty = true;
        true
    }

    /// Removes an element and every edge incident to it.
    pub fn remove_element(&mut self, id: &ElementId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|node| &node.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.edges.retain(|edge| !edge.touches(id));
        self.selected.remove(id);
        self.dirty = true;
        true
    }

    /// Connects two elements, or silently refuses.
    ///
    /// Self-loops are rejected. At most one edge exists per unordered node pair: a
    /// second connect between the same pair replaces the existing edge (old removed,
    /// new inserted) regardless of direction or handle variation.
    pub fn connect(
        &mut self,
        source_id: &ElementId,
        target_id: &ElementId,
        source_handle: Option<String>,
        target_handle: Option<String>,
    ) -> Option<&EdgeRecord> {
        if source_id == target_id {
            return None;
        }
        if !self.has_node(source_id) || !self.has_node(target_id) {
            return None;
        }

        self.edges.retain(|edge| !edge.connects(source_id, target_id));
        let edge = EdgeRecord {
            id: self.fresh_edge_id(),
            source_id: source_id.clone(),
            target_id: target_id.clone(),
            source_handle,
            target_handle,
        };
        self.edges.push(edge);
        self.dirty = true;
        self.edges.last()
    }

    /// Pure selection change; does not dirty the model.
    pub fn set_selected(&mut self, selected: BTreeSet<ElementId>) {
        self.selected = selected;
    }

    /// Tool switch; does not dirty the model.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    fn has_node(&self, id: &ElementId) -> bool {
        self.nodes.iter().any(|node| &node.id == id)
    }

    fn fresh_element_id(&mut self) -> ElementId {
        loop {
            self.next_seq += 1;
            let candidate = format!("n:{}", self.next_seq);
            if !self.nodes.iter().any(|node| node.id.as_str() == candidate) {
                return ElementId::new(candidate).expect("generated element id is valid");
            }
        }
    }

    fn fresh_edge_id(&mut self) -> EdgeId {
        loop {
            self.next_seq += 1;
            let candidate = format!("e:{}", self.next_seq);
            if !self.edges.iter().any(|edge| edge.id.as_str() == candidate) {
                return EdgeId::new(candidate).expect("generated edge id is valid");
            }
        }
    }
}

fn origin_distance(node: &ElementRecord, position: Position) -> f64 {
    let dx = node.position_x - position.x;
    let dy = node.position_y - position.y;
    (dx * dx + dy * dy).sqrt()
}

fn boxes_overlap(node: &ElementRecord, position: Position, size: Size) -> bool {
    let (ax0, ay0) = (position.x, position.y);
    let (ax1, ay1) = (ax0 + size.width as f64, ay0 + size.height as f64);
    let (bx0, by0) = (node.position_x, node.position_y);
    let (bx1, by1) = (bx0 + node.width as f64, by0 + node.height as f64);

    ax0 < bx1 && bx0 < ax1 && ay0 < by1 && by0 < ay1
}
