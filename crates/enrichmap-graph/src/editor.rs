use crate::cluster::{ClusterState, ClusterStateMachine, ToggleOutcome};
use crate::graph::{Graph, GraphError};
use crate::history::{UndoAction, UndoHistory};
use crate::layout::{LayoutError, LayoutOptions, LayoutOrchestrator, LayoutReport};
use crate::overlay::{HullPath, OverlayCache, OverlayLayer};
use crate::settings::EditorSettings;
use crate::viewport::Viewport;
use enrichmap_core::{Element, ElementId, NetworkDocument, NodeId, PersistedPosition, Position};
use enrichmap_events::{DispatchStage, Dispatcher, EventBus, EventListener, GraphEvent};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on drain rounds per pump; handlers may publish follow-up events.
const MAX_DISPATCH_ROUNDS: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A persisted layout was applied.
    Restored,
    /// No layout was stored; run [`NetworkEditor::apply_layout`].
    NeedsLayout,
}

/// Owns the graph and every component that reacts to it.
///
/// Each public operation mutates the graph and then pumps the event bus. Every
/// event reaches the components in a fixed order: cluster state machine, overlay
/// cache, undo history, then listeners registered per [`DispatchStage`].
pub struct NetworkEditor {
    settings: EditorSettings,
    graph: Graph,
    viewport: Viewport,
    clusters: ClusterStateMachine,
    overlays: OverlayCache,
    history: UndoHistory,
    layout: LayoutOrchestrator,
    dispatcher: Dispatcher,
    network: Option<NetworkInfo>,
}

impl NetworkEditor {
    pub fn new(settings: EditorSettings) -> Self {
        Self {
            graph: Graph::new(EventBus::new()),
            viewport: Viewport::default(),
            clusters: ClusterStateMachine::new(settings.clusters.clone()),
            overlays: OverlayCache::new(
                settings.overlay.clone(),
                settings.clusters.large_cluster_threshold,
            ),
            history: UndoHistory::new(&settings.history),
            layout: LayoutOrchestrator::new(settings.layout.clone()),
            dispatcher: Dispatcher::new(),
            network: None,
            settings,
        }
    }

    pub fn with_viewport(mut self, width: f64, height: f64) -> Self {
        self.viewport = Viewport::new(width, height);
        self
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn overlay_layer(&self) -> &OverlayLayer {
        self.overlays.layer()
    }

    /// Hull paths currently drawn, ordered by cluster id.
    pub fn overlay_paths(&self) -> Vec<HullPath> {
        self.overlays.layer().paths()
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn network(&self) -> Option<&NetworkInfo> {
        self.network.as_ref()
    }

    pub fn cluster_state(&self, cluster: &NodeId) -> Option<ClusterState> {
        self.clusters.state(&self.graph, cluster)
    }

    /// Animations, debounced undo bursts or throttled overlays still outstanding.
    pub fn is_busy(&self) -> bool {
        self.clusters.is_animating() || self.history.has_pending() || self.overlays.has_pending()
    }

    pub fn register_listener(&mut self, stage: DispatchStage, listener: Box<dyn EventListener + Send>) {
        self.dispatcher.register(stage, listener);
    }

    pub fn load(&mut self, doc: &NetworkDocument, now: Instant) -> Result<LoadOutcome, GraphError> {
        self.layout.stop();
        self.graph.load_document(doc)?;
        self.network = Some(NetworkInfo {
            id: doc.network_id.clone(),
            name: doc.network_name.clone(),
            parameters: doc.parameters.clone(),
        });
        self.clusters
            .initialize(&mut self.graph, doc.positions.as_deref());

        let outcome = if doc.has_persisted_layout() {
            if let Some(bbox) = self.graph.bounding_box_all() {
                let layout = &self.settings.layout;
                self.viewport.tighten(
                    &bbox,
                    layout.fit_padding,
                    layout.max_zoom,
                    layout.min_zoom_fraction,
                );
            }
            LoadOutcome::Restored
        } else {
            LoadOutcome::NeedsLayout
        };
        self.pump(now);
        info!(
            "Network {} loaded ({} pathways, {} clusters): {:?}",
            doc.network_id,
            self.graph.pathway_count(),
            self.graph.cluster_count(),
            outcome
        );
        Ok(outcome)
    }

    pub fn apply_layout(
        &mut self,
        options: &LayoutOptions,
        now: Instant,
    ) -> Result<LayoutReport, LayoutError> {
        // Pending drags are diffed against pre-layout positions.
        self.pump(now);
        self.history.flush(&self.graph);
        self.clusters.finish_all(&mut self.graph);
        let clusters = &self.clusters;
        let result = self.layout.apply_layout_with(
            &mut self.graph,
            &mut self.viewport,
            options,
            |graph| {
                clusters.compact_collapsed(graph);
            },
        );
        self.pump(now);
        result
    }

    pub fn toggle_cluster(
        &mut self,
        cluster: &NodeId,
        animate: bool,
        now: Instant,
    ) -> Result<ToggleOutcome, GraphError> {
        let outcome = self.clusters.toggle(&mut self.graph, cluster, animate, now)?;
        self.pump(now);
        Ok(outcome)
    }

    pub fn collapse_all(&mut self, now: Instant) -> usize {
        let count = self.clusters.collapse_all(&mut self.graph, now);
        self.pump(now);
        count
    }

    pub fn expand_all(&mut self, now: Instant) -> usize {
        let count = self.clusters.expand_all(&mut self.graph, now);
        self.pump(now);
        count
    }

    pub fn grab(&mut self, ids: &[NodeId], now: Instant) {
        self.graph.grab(ids);
        self.pump(now);
    }

    pub fn drag(&mut self, ids: &[NodeId], delta: Position, now: Instant) {
        self.graph.drag(ids, delta);
        self.pump(now);
    }

    pub fn free(&mut self, ids: &[NodeId], now: Instant) {
        self.graph.free(ids);
        self.pump(now);
    }

    pub fn delete(&mut self, ids: &[ElementId], now: Instant) -> Vec<Element> {
        let removed = self.graph.remove(ids);
        self.pump(now);
        removed
    }

    /// Commits any pending drag/delete burst first so it is what gets undone.
    pub fn undo(&mut self, now: Instant) -> Option<UndoAction> {
        self.pump(now);
        self.history.flush(&self.graph);
        let action = self.history.undo(&mut self.graph);
        self.pump(now);
        action
    }

    /// Advances animations and timers to `now`.
    pub fn tick(&mut self, now: Instant) {
        self.clusters.advance(&mut self.graph, now);
        self.pump(now);
    }

    /// Brings everything to a resting state immediately.
    pub fn settle(&mut self, now: Instant) {
        self.clusters.finish_all(&mut self.graph);
        self.pump(now);
        self.history.flush(&self.graph);
        self.overlays.flush(&mut self.graph);
        self.pump(now);
    }

    pub fn persisted_positions(&self) -> Vec<PersistedPosition> {
        self.clusters.persisted_positions(&self.graph)
    }

    /// Drains the bus and fans every event out in dispatch order.
    pub fn pump(&mut self, now: Instant) {
        for round in 0..MAX_DISPATCH_ROUNDS {
            let events = self.graph.bus().drain();
            for event in &events {
                self.dispatch(event, now);
            }
            self.history.poll(&self.graph, now);
            self.overlays.poll(&mut self.graph, now);
            if self.graph.bus().is_empty() {
                return;
            }
            debug!("Dispatch round {} produced follow-up events", round);
        }
        warn!(
            "Event dispatch did not settle after {} rounds",
            MAX_DISPATCH_ROUNDS
        );
    }

    fn dispatch(&mut self, event: &GraphEvent, now: Instant) {
        self.clusters.handle_event(event);
        self.overlays.handle_event(&mut self.graph, event, now);
        self.history.handle_event(&self.graph, event, now);
        self.dispatcher.dispatch(event);
    }
}
