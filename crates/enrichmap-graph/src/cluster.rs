//! Collapse/expand transitions.
//!
//! The graph only stores the collapsed flag. Whether a cluster is mid-transition
//! lives here, in a side table keyed by cluster id, so a second toggle during an
//! animation can be rejected without touching graph elements.

use crate::graph::{Graph, GraphError, centroid};
use crate::settings::ClusterSettings;
use enrichmap_core::{Element, NodeId, PersistedPosition, Position};
use enrichmap_events::GraphEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    Expanded,
    Collapsing,
    Collapsed,
    Expanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// An animation is running; finish it with [`ClusterStateMachine::advance`].
    Started,
    /// Applied synchronously.
    Completed,
    /// The cluster was already transitioning.
    Ignored,
}

#[derive(Debug, Clone)]
struct Transition {
    collapsing: bool,
    from: Vec<(NodeId, Position)>,
    to: Vec<(NodeId, Position)>,
    started: Instant,
    duration: Duration,
}

impl Transition {
    fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (now.saturating_duration_since(self.started).as_secs_f64() / self.duration.as_secs_f64())
            .min(1.0)
    }
}

/// Moves every position toward (or away from) the group centroid by `factor`.
pub fn scale_about_centroid(positions: &[(NodeId, Position)], factor: f64) -> Vec<(NodeId, Position)> {
    let points: Vec<Position> = positions.iter().map(|(_, p)| *p).collect();
    let Some(center) = centroid(&points) else {
        return Vec::new();
    };
    positions
        .iter()
        .map(|(id, p)| {
            (
                id.clone(),
                Position::new(
                    center.x + (p.x - center.x) * factor,
                    center.y + (p.y - center.y) * factor,
                ),
            )
        })
        .collect()
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn member_positions(graph: &Graph, cluster: &NodeId) -> Vec<(NodeId, Position)> {
    graph
        .members(cluster)
        .iter()
        .filter_map(|id| graph.pathway(id).map(|node| (id.clone(), node.position)))
        .collect()
}

pub struct ClusterStateMachine {
    settings: ClusterSettings,
    transitions: BTreeMap<NodeId, Transition>,
}

impl ClusterStateMachine {
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            settings,
            transitions: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    pub fn state(&self, graph: &Graph, cluster: &NodeId) -> Option<ClusterState> {
        let node = graph.cluster(cluster)?;
        Some(match self.transitions.get(cluster) {
            Some(t) if t.collapsing => ClusterState::Collapsing,
            Some(_) => ClusterState::Expanding,
            None if node.collapsed => ClusterState::Collapsed,
            None => ClusterState::Expanded,
        })
    }

    pub fn is_transitioning(&self, cluster: &NodeId) -> bool {
        self.transitions.contains_key(cluster)
    }

    pub fn is_animating(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// Sets up every cluster after a load. A cluster is expanded only when the
    /// persisted layout says so; clusters without a record start collapsed and
    /// have their children pulled together.
    pub fn initialize(&mut self, graph: &mut Graph, persisted: Option<&[PersistedPosition]>) {
        self.transitions.clear();
        let persisted = persisted.unwrap_or(&[]);

        let leaves: Vec<(NodeId, Position)> = persisted
            .iter()
            .filter(|record| graph.pathway(&record.id).is_some())
            .map(|record| (record.id.clone(), Position::new(record.x, record.y)))
            .collect();
        graph.set_positions(leaves);

        let records: HashMap<&NodeId, &PersistedPosition> =
            persisted.iter().map(|record| (&record.id, record)).collect();
        let clusters: Vec<NodeId> = graph.clusters().iter().map(|c| c.id.clone()).collect();
        for id in clusters {
            let record = records.get(&id);
            let expanded = record.is_some_and(|r| !r.collapsed);
            if let Err(e) = graph
                .set_collapsed(&id, !expanded)
                .and_then(|_| graph.set_internal_edges_visible(&id, expanded))
            {
                warn!("Cannot initialize cluster {}: {}", id, e);
                continue;
            }
            if record.is_none() {
                self.compact(graph, &id);
            }
        }
    }

    fn compact(&self, graph: &mut Graph, cluster: &NodeId) {
        let scaled = scale_about_centroid(&member_positions(graph, cluster), self.settings.shrink_factor);
        graph.set_positions(scaled);
    }

    /// Re-applies the collapsed spacing to every settled collapsed cluster, e.g.
    /// after a layout spread their children out.
    pub fn compact_collapsed(&self, graph: &mut Graph) -> usize {
        let collapsed: Vec<NodeId> = graph
            .clusters()
            .iter()
            .filter(|c| c.collapsed && !self.transitions.contains_key(&c.id))
            .map(|c| c.id.clone())
            .collect();
        for id in &collapsed {
            self.compact(graph, id);
        }
        collapsed.len()
    }

    pub fn toggle(
        &mut self,
        graph: &mut Graph,
        cluster: &NodeId,
        animate: bool,
        now: Instant,
    ) -> Result<ToggleOutcome, GraphError> {
        if self.transitions.contains_key(cluster) {
            debug!("Ignoring toggle of {}: transition in progress", cluster);
            return Ok(ToggleOutcome::Ignored);
        }
        let node = graph
            .cluster(cluster)
            .ok_or_else(|| GraphError::UnknownCluster(cluster.clone()))?;
        let collapsing = !node.collapsed;
        let factor = if collapsing {
            self.settings.shrink_factor
        } else {
            1.0 / self.settings.shrink_factor
        };
        let from = member_positions(graph, cluster);
        let to = scale_about_centroid(&from, factor);
        let animated = animate && from.len() < self.settings.large_cluster_threshold;

        if collapsing {
            graph.set_collapsed(cluster, true)?;
        } else {
            graph.set_collapsed(cluster, false)?;
            graph.set_internal_edges_visible(cluster, true)?;
        }

        if !animated {
            graph.set_positions(to);
            Self::complete(graph, cluster, collapsing);
            return Ok(ToggleOutcome::Completed);
        }

        self.transitions.insert(
            cluster.clone(),
            Transition {
                collapsing,
                from,
                to,
                started: now,
                duration: self.settings.animation_duration(),
            },
        );
        Ok(ToggleOutcome::Started)
    }

    fn complete(graph: &mut Graph, cluster: &NodeId, collapsing: bool) {
        if collapsing && let Err(e) = graph.set_internal_edges_visible(cluster, false) {
            warn!("Cannot hide edges of {}: {}", cluster, e);
        }
        graph.publish(GraphEvent::ClusterChildrenMoved {
            id: cluster.clone(),
        });
    }

    /// Steps running animations to `now`. Returns the clusters that settled.
    pub fn advance(&mut self, graph: &mut Graph, now: Instant) -> Vec<NodeId> {
        let mut settled = Vec::new();
        let ids: Vec<NodeId> = self.transitions.keys().cloned().collect();
        for id in ids {
            if !graph.is_cluster(&id) {
                self.transitions.remove(&id);
                continue;
            }
            let Some(transition) = self.transitions.get(&id) else {
                continue;
            };
            let t = transition.progress(now);
            if t >= 1.0 {
                if let Some(transition) = self.transitions.remove(&id) {
                    graph.set_positions(transition.to);
                    Self::complete(graph, &id, transition.collapsing);
                    settled.push(id);
                }
            } else {
                let eased = smoothstep(t);
                let frame: Vec<(NodeId, Position)> = transition
                    .from
                    .iter()
                    .zip(&transition.to)
                    .map(|((node, a), (_, b))| (node.clone(), a.lerp(*b, eased)))
                    .collect();
                graph.set_positions(frame);
            }
        }
        settled
    }

    /// Jumps every running animation to its end state.
    pub fn finish_all(&mut self, graph: &mut Graph) -> Vec<NodeId> {
        let transitions = std::mem::take(&mut self.transitions);
        let mut settled = Vec::new();
        for (id, transition) in transitions {
            if graph.is_cluster(&id) {
                graph.set_positions(transition.to);
                Self::complete(graph, &id, transition.collapsing);
                settled.push(id);
            }
        }
        settled
    }

    pub fn collapse_all(&mut self, graph: &mut Graph, now: Instant) -> usize {
        self.toggle_all(graph, true, now)
    }

    pub fn expand_all(&mut self, graph: &mut Graph, now: Instant) -> usize {
        self.toggle_all(graph, false, now)
    }

    fn toggle_all(&mut self, graph: &mut Graph, collapse: bool, now: Instant) -> usize {
        let targets: Vec<NodeId> = graph
            .clusters()
            .iter()
            .filter(|c| c.collapsed != collapse)
            .map(|c| c.id.clone())
            .collect();
        targets
            .iter()
            .filter(|id| {
                matches!(
                    self.toggle(graph, id, false, now),
                    Ok(ToggleOutcome::Completed)
                )
            })
            .count()
    }

    pub fn forget(&mut self, cluster: &NodeId) {
        if self.transitions.remove(cluster).is_some() {
            debug!("Dropped transition of removed cluster {}", cluster);
        }
    }

    pub fn handle_event(&mut self, event: &GraphEvent) {
        match event {
            GraphEvent::NetworkLoaded { .. } => self.transitions.clear(),
            GraphEvent::ElementRemoved {
                element: Element::Cluster { node, .. },
            } => self.forget(&node.id),
            _ => {}
        }
    }

    /// Records for `POST /api/{netId}/positions`. Running animations are reported
    /// at their end positions. Clusters are stored at their children's centroid.
    pub fn persisted_positions(&self, graph: &Graph) -> Vec<PersistedPosition> {
        let pending: HashMap<&NodeId, Position> = self
            .transitions
            .values()
            .flat_map(|t| t.to.iter().map(|(id, p)| (id, *p)))
            .collect();
        let mut records = Vec::new();
        for node in graph.pathways() {
            let position = pending.get(&node.id).copied().unwrap_or(node.position);
            let collapsed = node
                .parent
                .as_ref()
                .and_then(|parent| graph.cluster(parent))
                .is_some_and(|c| c.collapsed);
            records.push(PersistedPosition {
                id: node.id.clone(),
                x: position.x,
                y: position.y,
                collapsed,
            });
        }
        for cluster in graph.clusters() {
            let points: Vec<Position> = graph
                .members(&cluster.id)
                .iter()
                .filter_map(|id| {
                    pending
                        .get(id)
                        .copied()
                        .or_else(|| graph.pathway(id).map(|n| n.position))
                })
                .collect();
            if let Some(center) = centroid(&points) {
                records.push(PersistedPosition {
                    id: cluster.id.clone(),
                    x: center.x,
                    y: center.y,
                    collapsed: cluster.collapsed,
                });
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{cluster_node, pathway, sample_graph};
    use enrichmap_core::EdgeId;
    use enrichmap_events::EventBus;
    use proptest::prelude::*;

    fn machine() -> ClusterStateMachine {
        ClusterStateMachine::new(ClusterSettings::default())
    }

    fn positions(graph: &Graph, cluster: &NodeId) -> Vec<(NodeId, Position)> {
        member_positions(graph, cluster)
    }

    #[test]
    fn test_initialize_collapses_unless_persisted_expanded() {
        let mut graph = sample_graph();
        let mut sm = machine();
        let record = PersistedPosition {
            id: NodeId::new("a"),
            x: 0.0,
            y: 0.0,
            collapsed: false,
        };
        sm.initialize(&mut graph, Some(&[record]));
        assert_eq!(
            sm.state(&graph, &NodeId::new("a")),
            Some(ClusterState::Expanded)
        );
        assert_eq!(
            sm.state(&graph, &NodeId::new("b")),
            Some(ClusterState::Collapsed)
        );
        assert!(!graph.is_edge_visible(&EdgeId::new("eb")));
        assert!(graph.is_edge_visible(&EdgeId::new("e12")));
    }

    #[test]
    fn test_initialize_compacts_fresh_clusters() {
        let mut graph = sample_graph();
        let before = positions(&graph, &NodeId::new("b"));
        machine().initialize(&mut graph, None);
        let after = positions(&graph, &NodeId::new("b"));
        let spread = |p: &[(NodeId, Position)]| p[0].1.distance(p[1].1);
        assert!((spread(&after) - spread(&before) * 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_immediate_collapse_orders_signals() {
        let mut graph = sample_graph();
        let mut sm = machine();
        let a = NodeId::new("a");
        let outcome = sm.toggle(&mut graph, &a, false, Instant::now()).unwrap();
        assert_eq!(outcome, ToggleOutcome::Completed);
        assert!(graph.cluster(&a).unwrap().collapsed);
        assert!(!graph.is_edge_visible(&EdgeId::new("e12")));

        let events: Vec<GraphEvent> = graph
            .bus()
            .drain()
            .into_iter()
            .filter(|e| e.cluster().is_some())
            .collect();
        assert_eq!(
            events,
            vec![
                GraphEvent::ClusterCollapsedChanged {
                    id: a.clone(),
                    collapsed: true
                },
                GraphEvent::ClusterEdgesVisibilityChanged {
                    id: a.clone(),
                    visible: false
                },
                GraphEvent::ClusterChildrenMoved { id: a },
            ]
        );
    }

    #[test]
    fn test_animated_collapse_hides_edges_only_at_end() {
        let mut graph = sample_graph();
        let mut sm = machine();
        let b = NodeId::new("b");
        let t0 = Instant::now();

        assert_eq!(
            sm.toggle(&mut graph, &b, true, t0).unwrap(),
            ToggleOutcome::Started
        );
        assert!(graph.cluster(&b).unwrap().collapsed);
        assert!(graph.is_edge_visible(&EdgeId::new("eb")));
        assert_eq!(
            sm.toggle(&mut graph, &b, true, t0).unwrap(),
            ToggleOutcome::Ignored
        );

        assert!(sm.advance(&mut graph, t0 + Duration::from_millis(150)).is_empty());
        assert_eq!(sm.state(&graph, &b), Some(ClusterState::Collapsing));
        assert!(graph.is_edge_visible(&EdgeId::new("eb")));
        assert!(!graph
            .bus()
            .drain()
            .contains(&GraphEvent::ClusterChildrenMoved { id: b.clone() }));

        assert_eq!(
            sm.advance(&mut graph, t0 + Duration::from_millis(300)),
            vec![b.clone()]
        );
        assert_eq!(sm.state(&graph, &b), Some(ClusterState::Collapsed));
        assert!(!graph.is_edge_visible(&EdgeId::new("eb")));
        assert!(graph
            .bus()
            .drain()
            .contains(&GraphEvent::ClusterChildrenMoved { id: b }));
    }

    #[test]
    fn test_animated_expand_shows_edges_immediately() {
        let mut graph = sample_graph();
        let mut sm = machine();
        let b = NodeId::new("b");
        let t0 = Instant::now();
        sm.toggle(&mut graph, &b, false, t0).unwrap();
        graph.bus().drain();

        sm.toggle(&mut graph, &b, true, t0).unwrap();
        assert_eq!(sm.state(&graph, &b), Some(ClusterState::Expanding));
        assert!(!graph.cluster(&b).unwrap().collapsed);
        assert!(graph.is_edge_visible(&EdgeId::new("eb")));
        assert!(!graph
            .bus()
            .drain()
            .contains(&GraphEvent::ClusterChildrenMoved { id: b.clone() }));

        sm.advance(&mut graph, t0 + Duration::from_secs(1));
        assert_eq!(sm.state(&graph, &b), Some(ClusterState::Expanded));
    }

    #[test]
    fn test_large_cluster_never_animates() {
        let mut graph = Graph::new(EventBus::new());
        let mut members = Vec::new();
        for i in 0..33 {
            let id = format!("n{i}");
            graph
                .add_pathway(pathway(&id, 1.0, i as f64 * 10.0, 0.0))
                .unwrap();
            members.push(NodeId::new(id));
        }
        graph.add_cluster(cluster_node("big"), &members).unwrap();
        let mut sm = machine();
        let outcome = sm
            .toggle(&mut graph, &NodeId::new("big"), true, Instant::now())
            .unwrap();
        assert_eq!(outcome, ToggleOutcome::Completed);
        assert!(!sm.is_animating());
    }

    #[test]
    fn test_removed_cluster_drops_transition() {
        let mut graph = sample_graph();
        let mut sm = machine();
        let b = NodeId::new("b");
        let t0 = Instant::now();
        sm.toggle(&mut graph, &b, true, t0).unwrap();
        let removed = graph.remove(&[enrichmap_core::ElementId::Node(b.clone())]);
        for element in removed {
            sm.handle_event(&GraphEvent::ElementRemoved { element });
        }
        assert!(!sm.is_transitioning(&b));
        assert!(sm.advance(&mut graph, t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_persisted_positions_cover_leaves_and_clusters() {
        let mut graph = sample_graph();
        let mut sm = machine();
        sm.toggle(&mut graph, &NodeId::new("b"), false, Instant::now())
            .unwrap();
        let records = sm.persisted_positions(&graph);
        assert_eq!(records.len(), 8 + 2);
        let b1 = records.iter().find(|r| r.id.as_str() == "b1").unwrap();
        assert!(b1.collapsed);
        let loose = records.iter().find(|r| r.id.as_str() == "loose").unwrap();
        assert!(!loose.collapsed);
        let a = records.iter().find(|r| r.id.as_str() == "a").unwrap();
        assert!(!a.collapsed);
        assert_eq!((a.x, a.y), (80.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_collapse_then_expand_restores_positions(
            coords in prop::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 1..20)
        ) {
            let mut graph = Graph::new(EventBus::new());
            let mut members = Vec::new();
            for (i, (x, y)) in coords.iter().enumerate() {
                let id = format!("n{i}");
                graph.add_pathway(pathway(&id, 1.0, *x, *y)).unwrap();
                members.push(NodeId::new(id));
            }
            graph.add_cluster(cluster_node("c"), &members).unwrap();
            let c = NodeId::new("c");
            let before = positions(&graph, &c);

            let mut sm = machine();
            let t0 = Instant::now();
            sm.toggle(&mut graph, &c, true, t0).unwrap();
            sm.advance(&mut graph, t0 + Duration::from_secs(1));
            sm.toggle(&mut graph, &c, true, t0 + Duration::from_secs(2)).unwrap();
            sm.advance(&mut graph, t0 + Duration::from_secs(3));

            for ((_, a), (_, b)) in before.iter().zip(positions(&graph, &c)) {
                prop_assert!(a.approx_eq(b, 1e-6));
            }
        }
    }
}
