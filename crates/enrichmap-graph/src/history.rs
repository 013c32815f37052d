use crate::graph::Graph;
use crate::settings::HistorySettings;
use enrichmap_core::{Element, NodeId, Position};
use enrichmap_events::{Debounce, GraphEvent};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// Positions from before a drag, only for nodes that moved.
    PositionRestore { positions: Vec<(NodeId, Position)> },
    /// Everything one logical delete removed.
    RestoreElements { elements: Vec<Element> },
}

impl UndoAction {
    pub fn description(&self) -> String {
        match self {
            UndoAction::PositionRestore { positions } => {
                format!("Move {} node(s)", positions.len())
            }
            UndoAction::RestoreElements { elements } => {
                format!("Delete {} element(s)", elements.len())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LeafState {
    position: Position,
    collapsed: bool,
}

fn leaf_state(graph: &Graph, id: &NodeId) -> Option<LeafState> {
    let node = graph.pathway(id)?;
    let collapsed = node
        .parent
        .as_ref()
        .and_then(|parent| graph.cluster(parent))
        .is_some_and(|c| c.collapsed);
    Some(LeafState {
        position: node.position,
        collapsed,
    })
}

/// Undo stack fed by observing graph events.
///
/// Drags and deletes arrive as bursts of events; each burst is folded into one
/// action after its debounce window. The stack keeps at most `capacity` actions
/// and drops the oldest first.
pub struct UndoHistory {
    stack: VecDeque<UndoAction>,
    capacity: usize,
    grab_snapshot: Option<Vec<(NodeId, LeafState)>>,
    grabbed: Vec<NodeId>,
    release: Debounce<NodeId>,
    removals: Debounce<Element>,
}

impl UndoHistory {
    pub fn new(settings: &HistorySettings) -> Self {
        Self {
            stack: VecDeque::new(),
            capacity: settings.capacity.max(1),
            grab_snapshot: None,
            grabbed: Vec::new(),
            release: Debounce::new(settings.release_window()),
            removals: Debounce::new(settings.removal_window()),
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn peek(&self) -> Option<&UndoAction> {
        self.stack.back()
    }

    /// True while a drag or delete burst has not been folded into an action yet.
    pub fn has_pending(&self) -> bool {
        self.release.is_armed() || self.removals.is_armed()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
        self.drop_grab();
        self.release.cancel();
        self.removals.cancel();
    }

    fn snapshot(graph: &Graph) -> Vec<(NodeId, LeafState)> {
        graph
            .pathways()
            .into_iter()
            .filter_map(|node| leaf_state(graph, &node.id).map(|state| (node.id.clone(), state)))
            .collect()
    }

    fn drop_grab(&mut self) {
        self.grab_snapshot = None;
        self.grabbed.clear();
    }

    pub fn handle_event(&mut self, graph: &Graph, event: &GraphEvent, now: Instant) {
        match event {
            GraphEvent::Grab { ids } => {
                if self.release.is_armed() {
                    // Same gesture picked up again before the release settled.
                    self.release.touch(now);
                    self.grabbed.extend(ids.iter().cloned());
                } else {
                    self.grab_snapshot = Some(Self::snapshot(graph));
                    self.grabbed = ids.clone();
                }
            }
            GraphEvent::Drag { .. } => {
                if self.release.is_armed() {
                    self.release.touch(now);
                }
            }
            GraphEvent::Free { ids } => {
                if self.grab_snapshot.is_some() {
                    self.release.extend(ids.iter().cloned(), now);
                }
            }
            GraphEvent::ElementRemoved { element } => {
                // A held node that disappears never sends its release.
                if let Element::Pathway(node) = element
                    && !self.release.is_armed()
                    && self.grabbed.contains(&node.id)
                {
                    debug!("Grabbed node {} removed; dropping drag snapshot", node.id);
                    self.drop_grab();
                }
                self.removals.push(element.clone(), now);
            }
            GraphEvent::LayoutStarted => {
                self.release.cancel();
                self.drop_grab();
            }
            GraphEvent::NetworkLoaded { .. } => self.clear(),
            _ => {}
        }
    }

    /// Folds bursts whose quiet window elapsed. Returns the number of actions pushed.
    pub fn poll(&mut self, graph: &Graph, now: Instant) -> usize {
        let mut pushed = 0;
        if self.release.poll(now).is_some() && self.commit_drag(graph) {
            pushed += 1;
        }
        if let Some(batch) = self.removals.poll(now)
            && self.commit_removals(batch)
        {
            pushed += 1;
        }
        pushed
    }

    /// Folds every pending burst regardless of its window.
    pub fn flush(&mut self, graph: &Graph) -> usize {
        let mut pushed = 0;
        if self.release.flush().is_some() && self.commit_drag(graph) {
            pushed += 1;
        }
        if let Some(batch) = self.removals.flush()
            && self.commit_removals(batch)
        {
            pushed += 1;
        }
        pushed
    }

    fn commit_drag(&mut self, graph: &Graph) -> bool {
        self.grabbed.clear();
        let Some(before) = self.grab_snapshot.take() else {
            return false;
        };
        let changed: Vec<(NodeId, Position)> = before
            .into_iter()
            .filter(|(id, old)| leaf_state(graph, id).is_some_and(|now| now != *old))
            .map(|(id, old)| (id, old.position))
            .collect();
        if changed.is_empty() {
            debug!("Drag released without moving anything");
            return false;
        }
        self.push(UndoAction::PositionRestore { positions: changed });
        true
    }

    fn commit_removals(&mut self, elements: Vec<Element>) -> bool {
        if elements.is_empty() {
            return false;
        }
        self.push(UndoAction::RestoreElements { elements });
        true
    }

    pub fn push(&mut self, action: UndoAction) {
        debug!("Recorded undo action: {}", action.description());
        self.stack.push_back(action);
        while self.stack.len() > self.capacity {
            self.stack.pop_front();
            debug!("Undo history full; dropped oldest action");
        }
    }

    /// Pops and replays the most recent action. An empty stack is not an error.
    pub fn undo(&mut self, graph: &mut Graph) -> Option<UndoAction> {
        let Some(action) = self.stack.pop_back() else {
            warn!("Nothing to undo");
            return None;
        };
        match &action {
            UndoAction::PositionRestore { positions } => {
                graph.set_positions(positions.iter().cloned());
            }
            UndoAction::RestoreElements { elements } => {
                graph.restore(elements.clone());
            }
        }
        debug!("Undid: {}", action.description());
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::sample_graph;
    use enrichmap_core::ElementId;
    use std::time::Duration;

    fn observe(history: &mut UndoHistory, graph: &Graph, now: Instant) {
        for event in graph.bus().drain() {
            history.handle_event(graph, &event, now);
        }
    }

    fn history() -> UndoHistory {
        UndoHistory::new(&HistorySettings::default())
    }

    #[test]
    fn test_drag_records_only_moved_nodes() {
        let mut graph = sample_graph();
        let mut history = history();
        let t0 = Instant::now();
        let a1 = NodeId::new("a1");

        graph.grab(&[a1.clone()]);
        observe(&mut history, &graph, t0);
        graph.drag(&[a1.clone()], Position::new(15.0, 5.0));
        graph.free(&[a1.clone()]);
        observe(&mut history, &graph, t0);

        assert_eq!(history.poll(&graph, t0 + Duration::from_millis(50)), 0);
        assert_eq!(history.poll(&graph, t0 + Duration::from_millis(200)), 1);
        assert_eq!(
            history.peek(),
            Some(&UndoAction::PositionRestore {
                positions: vec![(a1.clone(), Position::new(0.0, 0.0))]
            })
        );

        history.undo(&mut graph);
        assert_eq!(graph.pathway(&a1).unwrap().position, Position::new(0.0, 0.0));
        assert!(history.is_empty());
    }

    #[test]
    fn test_drag_back_to_start_records_nothing() {
        let mut graph = sample_graph();
        let mut history = history();
        let t0 = Instant::now();
        let b1 = NodeId::new("b1");

        graph.grab(&[b1.clone()]);
        observe(&mut history, &graph, t0);
        graph.drag(&[b1.clone()], Position::new(30.0, 0.0));
        graph.drag(&[b1.clone()], Position::new(-30.0, 0.0));
        graph.free(&[b1]);
        observe(&mut history, &graph, t0);

        assert_eq!(history.poll(&graph, t0 + Duration::from_secs(1)), 0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_regrab_inside_window_is_one_action() {
        let mut graph = sample_graph();
        let mut history = history();
        let t0 = Instant::now();
        let a2 = NodeId::new("a2");

        graph.grab(&[a2.clone()]);
        observe(&mut history, &graph, t0);
        graph.drag(&[a2.clone()], Position::new(5.0, 0.0));
        graph.free(&[a2.clone()]);
        observe(&mut history, &graph, t0);

        let t1 = t0 + Duration::from_millis(100);
        graph.grab(&[a2.clone()]);
        graph.drag(&[a2.clone()], Position::new(5.0, 0.0));
        graph.free(&[a2.clone()]);
        observe(&mut history, &graph, t1);

        assert_eq!(history.poll(&graph, t0 + Duration::from_millis(200)), 0);
        assert_eq!(history.poll(&graph, t1 + Duration::from_millis(200)), 1);
        history.undo(&mut graph);
        assert_eq!(graph.pathway(&a2).unwrap().position, Position::new(40.0, 0.0));
    }

    #[test]
    fn test_multi_delete_is_one_batch_and_undo_restores_set() {
        let mut graph = sample_graph();
        let mut history = history();
        let before = graph.element_ids();
        let t0 = Instant::now();

        graph.remove(&[
            ElementId::Node(NodeId::new("a1")),
            ElementId::Node(NodeId::new("b2")),
        ]);
        observe(&mut history, &graph, t0);
        assert_eq!(history.poll(&graph, t0 + Duration::from_millis(150)), 1);
        assert_eq!(history.len(), 1);

        history.undo(&mut graph);
        assert_eq!(graph.element_ids(), before);
        assert_eq!(graph.cluster(&NodeId::new("b")).unwrap().average_nes, -2.0);
    }

    #[test]
    fn test_interleaved_actions_undo_in_reverse_order() {
        let mut graph = sample_graph();
        let mut history = history();
        let t0 = Instant::now();
        let loose = NodeId::new("loose");

        graph.grab(&[loose.clone()]);
        observe(&mut history, &graph, t0);
        graph.drag(&[loose.clone()], Position::new(1.0, 1.0));
        graph.free(&[loose.clone()]);
        observe(&mut history, &graph, t0);
        history.poll(&graph, t0 + Duration::from_secs(1));

        graph.remove(&[ElementId::Node(loose.clone())]);
        observe(&mut history, &graph, t0 + Duration::from_secs(2));
        history.poll(&graph, t0 + Duration::from_secs(3));
        assert_eq!(history.len(), 2);

        assert!(matches!(
            history.undo(&mut graph),
            Some(UndoAction::RestoreElements { .. })
        ));
        assert!(matches!(
            history.undo(&mut graph),
            Some(UndoAction::PositionRestore { .. })
        ));
        assert_eq!(
            graph.pathway(&loose).unwrap().position,
            Position::new(400.0, 400.0)
        );
        assert_eq!(history.undo(&mut graph), None);
    }

    #[test]
    fn test_deleting_held_node_drops_its_snapshot() {
        let mut graph = sample_graph();
        let mut history = history();
        let t0 = Instant::now();
        let loose = NodeId::new("loose");
        let a1 = NodeId::new("a1");

        // The held node is deleted before release, so no Free ever arrives.
        graph.grab(&[loose.clone()]);
        observe(&mut history, &graph, t0);
        graph.remove(&[ElementId::Node(loose.clone())]);
        observe(&mut history, &graph, t0);
        history.flush(&graph);
        assert_eq!(history.len(), 1);

        // Unrelated moves after the abandoned grab.
        graph.set_positions([(NodeId::new("b1"), Position::new(-500.0, -500.0))]);
        observe(&mut history, &graph, t0);

        graph.grab(&[a1.clone()]);
        observe(&mut history, &graph, t0);
        graph.drag(&[a1.clone()], Position::new(10.0, 0.0));
        graph.free(&[a1.clone()]);
        observe(&mut history, &graph, t0);
        assert_eq!(history.flush(&graph), 1);

        assert_eq!(
            history.peek(),
            Some(&UndoAction::PositionRestore {
                positions: vec![(a1, Position::new(0.0, 0.0))]
            })
        );
    }

    #[test]
    fn test_layout_start_discards_unreleased_grab() {
        let mut graph = sample_graph();
        let mut history = history();
        let t0 = Instant::now();
        let a1 = NodeId::new("a1");

        graph.grab(&[a1.clone()]);
        observe(&mut history, &graph, t0);
        history.handle_event(&graph, &GraphEvent::LayoutStarted, t0);
        graph.set_positions([(NodeId::new("a2"), Position::new(900.0, 900.0))]);
        graph.free(&[a1]);
        observe(&mut history, &graph, t0);

        assert_eq!(history.flush(&graph), 0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let settings = HistorySettings {
            capacity: 2,
            ..HistorySettings::default()
        };
        let mut history = UndoHistory::new(&settings);
        for i in 0..3 {
            history.push(UndoAction::PositionRestore {
                positions: vec![(NodeId::new(format!("n{i}")), Position::default())],
            });
        }
        assert_eq!(history.len(), 2);
        let mut graph = sample_graph();
        let newest = history.undo(&mut graph).unwrap();
        assert_eq!(
            newest,
            UndoAction::PositionRestore {
                positions: vec![(NodeId::new("n2"), Position::default())]
            }
        );
    }

    #[test]
    fn test_flush_commits_pending_delete() {
        let mut graph = sample_graph();
        let mut history = history();
        graph.remove(&[ElementId::Node(NodeId::new("loose"))]);
        observe(&mut history, &graph, Instant::now());
        assert!(history.has_pending());
        assert_eq!(history.flush(&graph), 1);
        assert!(!history.has_pending());
    }
}
