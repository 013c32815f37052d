use crate::overlay::OverlayPath;
use crate::style;
use enrichmap_core::{
    BoundingBox, ClusterNode, EdgeId, Element, ElementId, ModelError, NetworkDocument, NodeId,
    PathwayNode, Position, SimilarityEdge, average_nes,
};
use enrichmap_events::{EventBus, GraphEvent};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Unknown cluster: {0}")]
    UnknownCluster(NodeId),
    #[error("Edge {edge} references missing node {node}")]
    MissingEndpoint { edge: EdgeId, node: NodeId },
    #[error("Duplicate element id: {0}")]
    DuplicateId(String),
    #[error("Cluster {0} has no members")]
    EmptyCluster(NodeId),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug)]
struct PathwayEntry {
    node: PathwayNode,
    seq: u64,
}

#[derive(Debug)]
struct ClusterEntry {
    node: ClusterNode,
    members: Vec<NodeId>,
    seq: u64,
    overlay: Option<OverlayPath>,
}

#[derive(Debug)]
struct EdgeEntry {
    edge: SimilarityEdge,
    visible: bool,
    seq: u64,
}

/// Element store of one network.
///
/// Iteration is always in insertion order so layouts and exports are reproducible.
/// Every mutation that other components care about is published on the bus; the
/// editor drains and fans the events out.
pub struct Graph {
    network_id: String,
    pathways: HashMap<NodeId, PathwayEntry>,
    clusters: HashMap<NodeId, ClusterEntry>,
    edges: HashMap<EdgeId, EdgeEntry>,
    next_seq: u64,
    bus: EventBus,
}

impl Graph {
    pub fn new(bus: EventBus) -> Self {
        Self {
            network_id: String::new(),
            pathways: HashMap::new(),
            clusters: HashMap::new(),
            edges: HashMap::new(),
            next_seq: 0,
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn publish(&self, event: GraphEvent) {
        self.bus.publish(event);
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Drops every element. Overlays registered for clusters are released with them.
    pub fn clear(&mut self) {
        self.pathways.clear();
        self.clusters.clear();
        self.edges.clear();
        self.next_seq = 0;
    }

    /// Replaces the graph with the contents of `doc`.
    ///
    /// Edges whose endpoints are missing and clusters without any valid member are
    /// dropped with a warning rather than failing the whole load.
    pub fn load_document(&mut self, doc: &NetworkDocument) -> Result<(), GraphError> {
        doc.validate()?;
        self.clear();
        self.network_id = doc.network_id.clone();

        for node in &doc.elements.nodes {
            self.insert_pathway(node.to_pathway())?;
        }

        for cluster in &doc.clusters {
            let node = ClusterNode {
                id: cluster.id.clone(),
                label: cluster.label.clone(),
                average_nes: 0.0,
                collapsed: false,
            };
            match self.insert_cluster(node, &cluster.members) {
                Ok(()) => {}
                Err(GraphError::EmptyCluster(id)) => {
                    warn!("Dropping cluster {} without valid members", id);
                }
                Err(e) => return Err(e),
            }
        }

        for edge in &doc.elements.edges {
            match self.insert_edge(edge.to_similarity()) {
                Ok(()) => {}
                Err(GraphError::MissingEndpoint { edge, node }) => {
                    warn!("Dropping edge {}: endpoint {} not found", edge, node);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Loaded network {}: {} pathways, {} clusters, {} edges",
            self.network_id,
            self.pathways.len(),
            self.clusters.len(),
            self.edges.len()
        );
        self.publish(GraphEvent::NetworkLoaded {
            network_id: self.network_id.clone(),
        });
        Ok(())
    }

    pub fn add_pathway(&mut self, node: PathwayNode) -> Result<(), GraphError> {
        let id = node.id.clone();
        let parent = node.parent.clone();
        self.insert_pathway(node)?;
        if let Some(parent) = parent {
            self.refresh_average_nes(&parent);
        }
        self.publish(GraphEvent::ElementsAdded {
            ids: vec![ElementId::Node(id)],
        });
        Ok(())
    }

    pub fn add_cluster(&mut self, node: ClusterNode, members: &[NodeId]) -> Result<(), GraphError> {
        let id = node.id.clone();
        self.insert_cluster(node, members)?;
        self.publish(GraphEvent::ElementsAdded {
            ids: vec![ElementId::Node(id)],
        });
        Ok(())
    }

    pub fn add_edge(&mut self, edge: SimilarityEdge) -> Result<(), GraphError> {
        let id = edge.id.clone();
        self.insert_edge(edge)?;
        self.publish(GraphEvent::ElementsAdded {
            ids: vec![ElementId::Edge(id)],
        });
        Ok(())
    }

    fn ensure_free_node_id(&self, id: &NodeId) -> Result<(), GraphError> {
        if self.pathways.contains_key(id) || self.clusters.contains_key(id) {
            return Err(GraphError::DuplicateId(id.0.clone()));
        }
        Ok(())
    }

    fn insert_pathway(&mut self, mut node: PathwayNode) -> Result<(), GraphError> {
        self.ensure_free_node_id(&node.id)?;
        if let Some(parent) = node.parent.clone() {
            match self.clusters.get_mut(&parent) {
                Some(cluster) => {
                    if !cluster.members.contains(&node.id) {
                        cluster.members.push(node.id.clone());
                    }
                }
                None => node.parent = None,
            }
        }
        let seq = self.next_seq();
        self.pathways
            .insert(node.id.clone(), PathwayEntry { node, seq });
        Ok(())
    }

    fn insert_cluster(&mut self, mut node: ClusterNode, members: &[NodeId]) -> Result<(), GraphError> {
        self.ensure_free_node_id(&node.id)?;

        let mut valid = Vec::with_capacity(members.len());
        for member in members {
            match self.pathways.get(member) {
                Some(entry) if entry.node.parent.as_ref().is_none_or(|p| p == &node.id) => {
                    if !valid.contains(member) {
                        valid.push(member.clone());
                    }
                }
                Some(_) => warn!("Node {} already belongs to another cluster", member),
                None => warn!("Cluster {} references missing node {}", node.id, member),
            }
        }
        if valid.is_empty() {
            return Err(GraphError::EmptyCluster(node.id));
        }

        for member in &valid {
            if let Some(entry) = self.pathways.get_mut(member) {
                entry.node.parent = Some(node.id.clone());
            }
        }
        node.average_nes = self.members_average(&valid).unwrap_or(0.0);

        let seq = self.next_seq();
        self.clusters.insert(
            node.id.clone(),
            ClusterEntry {
                node,
                members: valid,
                seq,
                overlay: None,
            },
        );
        Ok(())
    }

    fn insert_edge(&mut self, edge: SimilarityEdge) -> Result<(), GraphError> {
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateId(edge.id.0.clone()));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !self.pathways.contains_key(endpoint) {
                return Err(GraphError::MissingEndpoint {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        let visible = !self.is_internal_to_collapsed(&edge);
        let seq = self.next_seq();
        self.edges
            .insert(edge.id.clone(), EdgeEntry { edge, visible, seq });
        Ok(())
    }

    fn is_internal_to_collapsed(&self, edge: &SimilarityEdge) -> bool {
        let parent_of = |id: &NodeId| self.pathways.get(id).and_then(|e| e.node.parent.clone());
        match (parent_of(&edge.source), parent_of(&edge.target)) {
            (Some(a), Some(b)) if a == b => self
                .clusters
                .get(&a)
                .is_some_and(|cluster| cluster.node.collapsed),
            _ => false,
        }
    }

    fn members_average(&self, members: &[NodeId]) -> Option<f64> {
        average_nes(
            members
                .iter()
                .filter_map(|id| self.pathways.get(id))
                .map(|entry| entry.node.nes),
        )
    }

    // --- Queries ---

    pub fn pathway(&self, id: &NodeId) -> Option<&PathwayNode> {
        self.pathways.get(id).map(|entry| &entry.node)
    }

    pub fn cluster(&self, id: &NodeId) -> Option<&ClusterNode> {
        self.clusters.get(id).map(|entry| &entry.node)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&SimilarityEdge> {
        self.edges.get(id).map(|entry| &entry.edge)
    }

    pub fn is_cluster(&self, id: &NodeId) -> bool {
        self.clusters.contains_key(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.pathways.contains_key(id) || self.clusters.contains_key(id)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        match id {
            ElementId::Node(node) => self.contains_node(node),
            ElementId::Edge(edge) => self.edges.contains_key(edge),
        }
    }

    pub fn is_edge_visible(&self, id: &EdgeId) -> bool {
        self.edges.get(id).is_some_and(|entry| entry.visible)
    }

    /// Children of `cluster`; empty for unknown ids.
    pub fn members(&self, cluster: &NodeId) -> &[NodeId] {
        self.clusters
            .get(cluster)
            .map(|entry| entry.members.as_slice())
            .unwrap_or(&[])
    }

    pub fn pathways(&self) -> Vec<&PathwayNode> {
        let mut entries: Vec<&PathwayEntry> = self.pathways.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.node).collect()
    }

    pub fn clusters(&self) -> Vec<&ClusterNode> {
        let mut entries: Vec<&ClusterEntry> = self.clusters.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.node).collect()
    }

    pub fn edges(&self) -> Vec<&SimilarityEdge> {
        let mut entries: Vec<&EdgeEntry> = self.edges.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.edge).collect()
    }

    pub fn visible_edges(&self) -> Vec<&SimilarityEdge> {
        let mut entries: Vec<&EdgeEntry> = self.edges.values().filter(|e| e.visible).collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.edge).collect()
    }

    pub fn element_ids(&self) -> BTreeSet<ElementId> {
        self.pathways
            .keys()
            .chain(self.clusters.keys())
            .cloned()
            .map(ElementId::Node)
            .chain(self.edges.keys().cloned().map(ElementId::Edge))
            .collect()
    }

    pub fn pathway_count(&self) -> usize {
        self.pathways.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }

    pub fn degree(&self, id: &NodeId) -> usize {
        self.edges
            .values()
            .filter(|entry| entry.edge.connects(id))
            .count()
    }

    /// Edges whose endpoints are both children of `cluster`, in insertion order.
    pub fn internal_edges(&self, cluster: &NodeId) -> Vec<&SimilarityEdge> {
        let members: HashSet<&NodeId> = self.members(cluster).iter().collect();
        if members.is_empty() {
            return Vec::new();
        }
        let mut entries: Vec<&EdgeEntry> = self
            .edges
            .values()
            .filter(|e| members.contains(&e.edge.source) && members.contains(&e.edge.target))
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.edge).collect()
    }

    pub fn node_extent(&self, id: &NodeId) -> Option<(f64, f64)> {
        self.pathway(id)
            .map(|node| style::node_extent(node.gene_set_size, node.display_label()))
    }

    /// Bounds of a pathway including its label, or of a cluster's children.
    pub fn node_bounds(&self, id: &NodeId) -> Option<BoundingBox> {
        if let Some(node) = self.pathway(id) {
            let (w, h) = style::node_extent(node.gene_set_size, node.display_label());
            return Some(BoundingBox::around(node.position, w, h));
        }
        self.bounding_box(self.members(id))
    }

    pub fn bounding_box<'a, I>(&self, ids: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        ids.into_iter()
            .filter_map(|id| self.node_bounds(id))
            .reduce(|acc, b| acc.union(&b))
    }

    pub fn bounding_box_all(&self) -> Option<BoundingBox> {
        self.bounding_box(self.pathways.keys())
    }

    pub fn cluster_centroid(&self, cluster: &NodeId) -> Option<Position> {
        let positions: Vec<Position> = self
            .members(cluster)
            .iter()
            .filter_map(|id| self.pathway(id))
            .map(|node| node.position)
            .collect();
        centroid(&positions)
    }

    /// Expands cluster ids into their children; unknown ids are skipped.
    pub fn resolve_leaves(&self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut leaves = Vec::new();
        for id in ids {
            if self.pathways.contains_key(id) {
                if seen.insert(id.clone()) {
                    leaves.push(id.clone());
                }
            } else if let Some(cluster) = self.clusters.get(id) {
                for member in &cluster.members {
                    if seen.insert(member.clone()) {
                        leaves.push(member.clone());
                    }
                }
            }
        }
        leaves
    }

    // --- Pointer interaction ---

    pub fn grab(&mut self, ids: &[NodeId]) {
        let leaves = self.resolve_leaves(ids);
        if !leaves.is_empty() {
            self.publish(GraphEvent::Grab { ids: leaves });
        }
    }

    pub fn drag(&mut self, ids: &[NodeId], delta: Position) {
        let leaves = self.resolve_leaves(ids);
        if leaves.is_empty() {
            return;
        }
        for id in &leaves {
            if let Some(entry) = self.pathways.get_mut(id) {
                entry.node.position.x += delta.x;
                entry.node.position.y += delta.y;
            }
        }
        self.publish(GraphEvent::Drag { ids: leaves });
    }

    pub fn free(&mut self, ids: &[NodeId]) {
        let leaves = self.resolve_leaves(ids);
        if !leaves.is_empty() {
            self.publish(GraphEvent::Free { ids: leaves });
        }
    }

    // --- Programmatic mutation ---

    /// Moves one pathway without publishing; callers batch the notification.
    pub fn set_position(&mut self, id: &NodeId, position: Position) -> bool {
        match self.pathways.get_mut(id) {
            Some(entry) => {
                entry.node.position = position;
                true
            }
            None => false,
        }
    }

    /// Applies positions and publishes one `PositionsChanged` for those that exist.
    pub fn set_positions<I>(&mut self, positions: I) -> usize
    where
        I: IntoIterator<Item = (NodeId, Position)>,
    {
        let mut moved = Vec::new();
        for (id, position) in positions {
            if self.set_position(&id, position) {
                moved.push(id);
            }
        }
        let count = moved.len();
        if count > 0 {
            self.publish(GraphEvent::PositionsChanged { ids: moved });
        }
        count
    }

    /// Returns whether the flag changed.
    pub fn set_collapsed(&mut self, cluster: &NodeId, collapsed: bool) -> Result<bool, GraphError> {
        let entry = self
            .clusters
            .get_mut(cluster)
            .ok_or_else(|| GraphError::UnknownCluster(cluster.clone()))?;
        if entry.node.collapsed == collapsed {
            return Ok(false);
        }
        entry.node.collapsed = collapsed;
        self.publish(GraphEvent::ClusterCollapsedChanged {
            id: cluster.clone(),
            collapsed,
        });
        Ok(true)
    }

    pub fn set_internal_edges_visible(
        &mut self,
        cluster: &NodeId,
        visible: bool,
    ) -> Result<(), GraphError> {
        if !self.clusters.contains_key(cluster) {
            return Err(GraphError::UnknownCluster(cluster.clone()));
        }
        let ids: Vec<EdgeId> = self
            .internal_edges(cluster)
            .into_iter()
            .map(|edge| edge.id.clone())
            .collect();
        for id in &ids {
            if let Some(entry) = self.edges.get_mut(id) {
                entry.visible = visible;
            }
        }
        self.publish(GraphEvent::ClusterEdgesVisibilityChanged {
            id: cluster.clone(),
            visible,
        });
        Ok(())
    }

    /// Recomputes a cluster's average NES from its current children.
    pub fn refresh_average_nes(&mut self, cluster: &NodeId) -> Option<f64> {
        let members = self.clusters.get(cluster)?.members.clone();
        let average = self.members_average(&members)?;
        let entry = self.clusters.get_mut(cluster)?;
        if entry.node.average_nes != average {
            entry.node.average_nes = average;
            self.publish(GraphEvent::ClusterDataChanged {
                id: cluster.clone(),
            });
        }
        Some(average)
    }

    /// Attaches an overlay to a cluster. A missing cluster drops (and so unregisters) it.
    pub fn set_overlay(&mut self, cluster: &NodeId, overlay: OverlayPath) -> Result<(), GraphError> {
        let entry = self
            .clusters
            .get_mut(cluster)
            .ok_or_else(|| GraphError::UnknownCluster(cluster.clone()))?;
        entry.overlay = Some(overlay);
        Ok(())
    }

    pub fn take_overlay(&mut self, cluster: &NodeId) -> Option<OverlayPath> {
        self.clusters.get_mut(cluster)?.overlay.take()
    }

    pub fn overlay(&self, cluster: &NodeId) -> Option<&OverlayPath> {
        self.clusters.get(cluster)?.overlay.as_ref()
    }

    // --- Removal and restore ---

    /// Removes the given elements with everything that depends on them.
    ///
    /// Removing a cluster removes its children; removing a pathway removes its
    /// incident edges; a cluster left without children is removed too. One
    /// `ElementRemoved` is published per element, edges first, then pathways, then
    /// clusters, and the returned snapshots are in the same order.
    pub fn remove(&mut self, ids: &[ElementId]) -> Vec<Element> {
        let mut node_ids: Vec<NodeId> = Vec::new();
        let mut explicit_clusters: Vec<NodeId> = Vec::new();
        let mut edge_ids: Vec<EdgeId> = Vec::new();

        for id in ids {
            match id {
                ElementId::Node(node) if self.clusters.contains_key(node) => {
                    if !explicit_clusters.contains(node) {
                        explicit_clusters.push(node.clone());
                    }
                    node_ids.extend(self.members(node).iter().cloned());
                }
                ElementId::Node(node) if self.pathways.contains_key(node) => {
                    node_ids.push(node.clone());
                }
                ElementId::Edge(edge) if self.edges.contains_key(edge) => {
                    edge_ids.push(edge.clone());
                }
                other => debug!("Skipping removal of unknown element {}", other),
            }
        }

        let mut seen = HashSet::new();
        node_ids.retain(|id| seen.insert(id.clone()));
        let node_set: HashSet<&NodeId> = node_ids.iter().collect();

        let mut edge_set: HashSet<EdgeId> = edge_ids.into_iter().collect();
        for entry in self.edges.values() {
            if node_set.contains(&entry.edge.source) || node_set.contains(&entry.edge.target) {
                edge_set.insert(entry.edge.id.clone());
            }
        }
        let mut edge_order: Vec<(u64, EdgeId)> = edge_set
            .into_iter()
            .filter_map(|id| self.edges.get(&id).map(|entry| (entry.seq, id)))
            .collect();
        edge_order.sort();

        // Snapshot membership before children disappear so a restore can re-link them.
        let mut touched: Vec<NodeId> = explicit_clusters.clone();
        for id in &node_ids {
            if let Some(parent) = self.pathway(id).and_then(|n| n.parent.clone())
                && !touched.contains(&parent)
            {
                touched.push(parent);
            }
        }
        let member_snapshots: HashMap<NodeId, Vec<NodeId>> = touched
            .iter()
            .map(|id| (id.clone(), self.members(id).to_vec()))
            .collect();

        let mut removed = Vec::new();

        for (_, id) in edge_order {
            if let Some(entry) = self.edges.remove(&id) {
                removed.push(Element::Edge(entry.edge));
            }
        }

        for id in &node_ids {
            let Some(entry) = self.pathways.remove(id) else {
                continue;
            };
            if let Some(parent) = &entry.node.parent
                && let Some(cluster) = self.clusters.get_mut(parent)
            {
                cluster.members.retain(|member| member != id);
            }
            removed.push(Element::Pathway(entry.node));
        }

        for cluster_id in &touched {
            let now_empty = self
                .clusters
                .get(cluster_id)
                .is_some_and(|entry| entry.members.is_empty());
            if !now_empty && !explicit_clusters.contains(cluster_id) {
                continue;
            }
            if let Some(entry) = self.clusters.remove(cluster_id) {
                if !explicit_clusters.contains(cluster_id) {
                    debug!("Removing cluster {} left without children", cluster_id);
                }
                let members = member_snapshots
                    .get(cluster_id)
                    .cloned()
                    .unwrap_or_default();
                removed.push(Element::Cluster {
                    node: entry.node,
                    members,
                });
            }
        }

        for element in &removed {
            self.publish(GraphEvent::ElementRemoved {
                element: element.clone(),
            });
        }

        for cluster_id in &touched {
            if self.clusters.contains_key(cluster_id) {
                self.refresh_average_nes(cluster_id);
            }
        }
        removed
    }

    /// Re-adds element snapshots taken by [`Graph::remove`], in dependency order.
    pub fn restore(&mut self, elements: Vec<Element>) -> Vec<ElementId> {
        let mut pathways = Vec::new();
        let mut clusters = Vec::new();
        let mut edges = Vec::new();
        for element in elements {
            match element {
                Element::Pathway(node) => pathways.push(node),
                Element::Cluster { node, members } => clusters.push((node, members)),
                Element::Edge(edge) => edges.push(edge),
            }
        }

        let mut added = Vec::new();
        let mut touched: Vec<NodeId> = Vec::new();

        for mut node in pathways {
            // Parents are linked once every cluster of the batch exists.
            let parent = node.parent.take();
            let id = node.id.clone();
            match self.insert_pathway(node) {
                Ok(()) => {
                    if let Some(parent) = parent
                        && let Some(entry) = self.pathways.get_mut(&id)
                    {
                        entry.node.parent = Some(parent);
                    }
                    added.push(ElementId::Node(id));
                }
                Err(e) => warn!("Cannot restore node {}: {}", id, e),
            }
        }

        for (node, members) in clusters {
            let id = node.id.clone();
            let members: Vec<NodeId> = members
                .into_iter()
                .filter(|m| {
                    self.pathways
                        .get(m)
                        .is_some_and(|e| e.node.parent.as_ref().is_none_or(|p| p == &id))
                })
                .collect();
            if let Err(e) = self.ensure_free_node_id(&id) {
                warn!("Cannot restore cluster {}: {}", id, e);
                continue;
            }
            if members.is_empty() {
                warn!("Cannot restore cluster {} without children", id);
                continue;
            }
            for member in &members {
                if let Some(entry) = self.pathways.get_mut(member) {
                    entry.node.parent = Some(id.clone());
                }
            }
            let seq = self.next_seq();
            self.clusters.insert(
                id.clone(),
                ClusterEntry {
                    node,
                    members,
                    seq,
                    overlay: None,
                },
            );
            touched.push(id.clone());
            added.push(ElementId::Node(id));
        }

        // Pathways restored into clusters that survived the removal.
        for id in &added {
            let ElementId::Node(node_id) = id else {
                continue;
            };
            let Some(parent) = self.pathway(node_id).and_then(|n| n.parent.clone()) else {
                continue;
            };
            match self.clusters.get_mut(&parent) {
                Some(cluster) => {
                    if !cluster.members.contains(node_id) {
                        cluster.members.push(node_id.clone());
                    }
                    if !touched.contains(&parent) {
                        touched.push(parent);
                    }
                }
                None => {
                    if let Some(entry) = self.pathways.get_mut(node_id) {
                        entry.node.parent = None;
                    }
                }
            }
        }

        for edge in edges {
            let id = edge.id.clone();
            match self.insert_edge(edge) {
                Ok(()) => added.push(ElementId::Edge(id)),
                Err(e) => warn!("Cannot restore edge {}: {}", id, e),
            }
        }

        for cluster in &touched {
            self.refresh_average_nes(cluster);
        }

        if !added.is_empty() {
            self.publish(GraphEvent::ElementsAdded { ids: added.clone() });
        }
        added
    }
}

pub fn centroid(positions: &[Position]) -> Option<Position> {
    if positions.is_empty() {
        return None;
    }
    let n = positions.len() as f64;
    let (sx, sy) = positions
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Position::new(sx / n, sy / n))
}
