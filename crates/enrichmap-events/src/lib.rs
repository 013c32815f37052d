use crossbeam_channel::{Receiver, Sender, unbounded};
use enrichmap_core::{Element, ElementId, NodeId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod debounce;
pub mod telemetry;

pub use debounce::{Debounce, Throttle};

/// Low-level notifications emitted by the graph engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphEvent {
    /// A new network replaced the graph contents.
    NetworkLoaded { network_id: String },
    /// Elements were (re-)added, e.g. by undo.
    ElementsAdded { ids: Vec<ElementId> },
    /// One event per removed element; a multi-node delete fires several.
    ElementRemoved { element: Element },

    // Pointer interaction
    Grab { ids: Vec<NodeId> },
    Drag { ids: Vec<NodeId> },
    Free { ids: Vec<NodeId> },

    /// Positions changed programmatically (layout, animation frame, undo).
    PositionsChanged { ids: Vec<NodeId> },

    // Clusters
    ClusterCollapsedChanged { id: NodeId, collapsed: bool },
    ClusterEdgesVisibilityChanged { id: NodeId, visible: bool },
    /// Emitted once a cluster's sub-layout has settled.
    ClusterChildrenMoved { id: NodeId },
    /// Average NES (and therefore overlay colour) changed.
    ClusterDataChanged { id: NodeId },

    // Layout
    LayoutStarted,
    LayoutCompleted { moved: usize },
}

impl GraphEvent {
    /// Cluster the event directly concerns, if any.
    pub fn cluster(&self) -> Option<&NodeId> {
        match self {
            GraphEvent::ClusterCollapsedChanged { id, .. }
            | GraphEvent::ClusterEdgesVisibilityChanged { id, .. }
            | GraphEvent::ClusterChildrenMoved { id }
            | GraphEvent::ClusterDataChanged { id } => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<GraphEvent>,
    rx: Receiver<GraphEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<GraphEvent> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<GraphEvent> {
        self.rx.clone()
    }

    pub fn publish(&self, event: GraphEvent) {
        let _ = self.tx.send(event);
    }

    /// Take every pending event, in emission order.
    pub fn drain(&self) -> Vec<GraphEvent> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Trait for components that respond to graph events.
pub trait EventListener {
    fn handle_event(&mut self, event: &GraphEvent);
}

impl<L: EventListener> EventListener for Arc<Mutex<L>> {
    fn handle_event(&mut self, event: &GraphEvent) {
        self.lock().handle_event(event);
    }
}

/// Fixed fan-out positions for listeners outside the editor core.
///
/// Dispatch order follows the stage, never the registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DispatchStage {
    Search,
    Observers,
}

/// Ordered dispatcher: every event reaches every stage in [`DispatchStage`] order.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Vec<(DispatchStage, Box<dyn EventListener + Send>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage: DispatchStage, listener: Box<dyn EventListener + Send>) {
        // Stable sort keeps registration order only within a stage.
        self.listeners.push((stage, listener));
        self.listeners.sort_by_key(|(stage, _)| *stage);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn dispatch(&mut self, event: &GraphEvent) {
        for (_, listener) in &mut self.listeners {
            listener.handle_event(event);
        }
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
