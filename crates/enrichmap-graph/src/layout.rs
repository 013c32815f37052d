use crate::graph::Graph;
use crate::settings::LayoutSettings;
use crate::style;
use crate::viewport::{Viewport, ZoomBounds};
use crossbeam_channel::{Receiver, bounded};
use enrichmap_core::{NodeId, PathwayNode, Position};
use enrichmap_events::GraphEvent;
use enrichmap_events::telemetry::{OP_APPLY_LAYOUT, OperationSpan};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Closest two node borders may get before repulsion stops growing.
const MIN_DISTANCE: f64 = 1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Layout was cancelled")]
    Cancelled,
    #[error("Layout worker panicked")]
    Panicked,
    #[error("Failed to spawn layout worker: {0}")]
    Spawn(String),
}

/// Cooperative cancellation shared between the editor and a layout worker.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Border-to-border length a similarity edge pulls toward.
pub fn ideal_edge_length(similarity: f64) -> f64 {
    30.0 - 25.0 * similarity
}

/// Higher similarity gives a stiffer spring.
pub fn edge_elasticity(similarity: f64) -> f64 {
    10.0 / similarity.max(f64::EPSILON)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub source: usize,
    pub target: usize,
    pub ideal_length: f64,
    pub elasticity: f64,
}

/// Owned snapshot of what the force pass needs, so it can leave the UI thread.
#[derive(Debug, Clone, Default)]
pub struct LayoutInput {
    pub ids: Vec<NodeId>,
    /// Half of each node's largest extent.
    pub radii: Vec<f64>,
    pub springs: Vec<Spring>,
}

impl LayoutInput {
    pub fn from_graph(graph: &Graph) -> Self {
        let pathways = graph.pathways();
        let index: HashMap<&NodeId, usize> = pathways
            .iter()
            .enumerate()
            .map(|(i, node)| (&node.id, i))
            .collect();
        let radii = pathways
            .iter()
            .map(|node| {
                let (w, h) = style::node_extent(node.gene_set_size, node.display_label());
                w.max(h) / 2.0
            })
            .collect();
        let springs = graph
            .edges()
            .into_iter()
            .filter_map(|edge| {
                Some(Spring {
                    source: *index.get(&edge.source)?,
                    target: *index.get(&edge.target)?,
                    ideal_length: ideal_edge_length(edge.similarity),
                    elasticity: edge_elasticity(edge.similarity),
                })
            })
            .collect();
        Self {
            ids: pathways.iter().map(|node| node.id.clone()).collect(),
            radii,
            springs,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Spring-electrical layout with simulated cooling.
///
/// Every random draw comes from the caller's RNG in a fixed order, and the
/// parallel repulsion pass sums over neighbours in index order, so a given seed
/// always produces the same positions.
#[derive(Debug, Clone)]
pub struct ForceLayout {
    pub iterations: usize,
    pub node_repulsion: f64,
    pub gravity: f64,
    pub initial_temperature: f64,
    pub cooling_factor: f64,
    pub min_temperature: f64,
}

impl ForceLayout {
    pub fn from_settings(settings: &LayoutSettings) -> Self {
        Self {
            iterations: settings.iterations,
            node_repulsion: settings.node_repulsion,
            gravity: settings.gravity,
            initial_temperature: settings.initial_temperature,
            cooling_factor: settings.cooling_factor,
            min_temperature: settings.min_temperature,
        }
    }

    pub fn run<R: Rng>(
        &self,
        input: &LayoutInput,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<Vec<Position>, LayoutError> {
        let n = input.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let side = (n as f64).sqrt() * 60.0;
        let mut positions: Vec<Position> = (0..n)
            .map(|_| Position::new(rng.gen_range(0.0..side), rng.gen_range(0.0..side)))
            .collect();
        let mut temperature = self.initial_temperature;

        for _ in 0..self.iterations {
            if cancel.is_cancelled() {
                return Err(LayoutError::Cancelled);
            }

            // Direction used when two nodes sit exactly on top of each other.
            let jitter: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..TAU)).collect();
            let snapshot = &positions;
            let radii = &input.radii;

            let mut displacement: Vec<(f64, f64)> = (0..n)
                .into_par_iter()
                .map(|i| {
                    let pi = snapshot[i];
                    let (mut fx, mut fy) = (0.0, 0.0);
                    for (j, pj) in snapshot.iter().enumerate() {
                        if i == j {
                            continue;
                        }
                        let (mut ux, mut uy) = (pi.x - pj.x, pi.y - pj.y);
                        let dist = (ux * ux + uy * uy).sqrt();
                        if dist < 1e-9 {
                            ux = jitter[i].cos();
                            uy = jitter[i].sin();
                        } else {
                            ux /= dist;
                            uy /= dist;
                        }
                        let gap = (dist - radii[i] - radii[j]).max(MIN_DISTANCE);
                        let force = self.node_repulsion / (gap * gap);
                        fx += force * ux;
                        fy += force * uy;
                    }
                    (fx, fy)
                })
                .collect();

            for spring in &input.springs {
                let a = positions[spring.source];
                let b = positions[spring.target];
                let (dx, dy) = (b.x - a.x, b.y - a.y);
                let dist = (dx * dx + dy * dy).sqrt().max(1e-9);
                let length = dist - input.radii[spring.source] - input.radii[spring.target];
                let force = (length - spring.ideal_length) / spring.elasticity;
                let (fx, fy) = (force * dx / dist, force * dy / dist);
                displacement[spring.source].0 += fx;
                displacement[spring.source].1 += fy;
                displacement[spring.target].0 -= fx;
                displacement[spring.target].1 -= fy;
            }

            let (cx, cy) = positions
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            let (cx, cy) = (cx / n as f64, cy / n as f64);

            for (p, (dx, dy)) in positions.iter_mut().zip(displacement) {
                let dx = dx - self.gravity * (p.x - cx);
                let dy = dy - self.gravity * (p.y - cy);
                let len = (dx * dx + dy * dy).sqrt();
                let scale = if len > temperature { temperature / len } else { 1.0 };
                p.x += dx * scale;
                p.y += dy * scale;
            }

            temperature *= self.cooling_factor;
            if temperature < self.min_temperature {
                break;
            }
        }

        Ok(positions)
    }
}

/// Parameters of one layout run; unset fields fall back to [`LayoutSettings`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutOptions {
    pub seed: Option<u64>,
    pub iterations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOutcome {
    pub job: u64,
    pub ids: Vec<NodeId>,
    pub positions: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutReport {
    pub moved: usize,
    pub disconnected: usize,
    pub zoom_bounds: Option<ZoomBounds>,
}

/// A force pass running on its own thread.
pub struct LayoutJob {
    id: u64,
    ids: Vec<NodeId>,
    cancel: CancellationToken,
    rx: Receiver<Result<Vec<Position>, LayoutError>>,
    handle: Option<JoinHandle<()>>,
}

impl LayoutJob {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks until the worker is done. A worker that died without reporting is
    /// turned into [`LayoutError::Panicked`].
    pub fn wait(mut self) -> Result<LayoutOutcome, LayoutError> {
        let received = self.rx.recv();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Layout worker {} panicked", self.id);
            return Err(LayoutError::Panicked);
        }
        match received {
            Ok(Ok(positions)) => Ok(LayoutOutcome {
                job: self.id,
                ids: std::mem::take(&mut self.ids),
                positions,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LayoutError::Panicked),
        }
    }
}

impl Drop for LayoutJob {
    fn drop(&mut self) {
        // Abandoned without wait(): stop burning CPU.
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Places nodes without edges on a grid under the connected part of the graph,
/// highest NES first. Returns how many nodes were placed.
pub fn place_disconnected(graph: &mut Graph, viewport_width: f64, spacing: f64) -> usize {
    let linked: HashSet<NodeId> = graph
        .edges()
        .into_iter()
        .flat_map(|edge| [edge.source.clone(), edge.target.clone()])
        .collect();
    let (connected, mut disconnected): (Vec<&PathwayNode>, Vec<&PathwayNode>) = graph
        .pathways()
        .into_iter()
        .partition(|node| linked.contains(&node.id));
    if disconnected.is_empty() {
        return 0;
    }
    // Stable: equal NES keeps insertion order.
    disconnected.sort_by(|a, b| b.nes.partial_cmp(&a.nes).unwrap_or(CmpOrdering::Equal));

    let (widest, tallest) = disconnected
        .iter()
        .map(|node| style::node_extent(node.gene_set_size, node.display_label()))
        .fold((0.0f64, 0.0f64), |(w, h), (nw, nh)| (w.max(nw), h.max(nh)));

    let (left, top, available) = match graph.bounding_box(connected.iter().map(|n| &n.id)) {
        Some(bbox) => (bbox.x1, bbox.y2 + spacing, bbox.width()),
        None => (0.0, 0.0, viewport_width),
    };
    let cell_w = widest + spacing;
    let cell_h = tallest + spacing;
    let columns = (((available + spacing) / cell_w).floor() as usize).max(1);

    let placements: Vec<(NodeId, Position)> = disconnected
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let (col, row) = (i % columns, i / columns);
            (
                node.id.clone(),
                Position::new(
                    left + col as f64 * cell_w + widest / 2.0,
                    top + row as f64 * cell_h + tallest / 2.0,
                ),
            )
        })
        .collect();
    debug!(
        "Placing {} disconnected nodes in {} columns",
        placements.len(),
        columns
    );
    graph.set_positions(placements)
}

/// Runs at most one layout at a time; starting a new one cancels the previous.
pub struct LayoutOrchestrator {
    settings: LayoutSettings,
    active: Option<(u64, CancellationToken)>,
    next_job: u64,
}

impl LayoutOrchestrator {
    pub fn new(settings: LayoutSettings) -> Self {
        Self {
            settings,
            active: None,
            next_job: 0,
        }
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn start(
        &mut self,
        graph: &Graph,
        viewport: &mut Viewport,
        options: &LayoutOptions,
    ) -> Result<LayoutJob, LayoutError> {
        self.stop();
        viewport.clear_bounds();

        let input = LayoutInput::from_graph(graph);
        let ids = input.ids.clone();
        let seed = options.seed.unwrap_or(self.settings.seed);
        let mut layout = ForceLayout::from_settings(&self.settings);
        if let Some(iterations) = options.iterations {
            layout.iterations = iterations;
        }

        let job = self.next_job;
        self.next_job += 1;
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let (tx, rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(format!("enrichmap-layout-{job}"))
            .spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let result = layout.run(&input, &mut rng, &worker_cancel);
                let _ = tx.send(result);
            })
            .map_err(|e| LayoutError::Spawn(e.to_string()))?;

        debug!("Layout job {} started for {} nodes (seed {})", job, ids.len(), seed);
        self.active = Some((job, cancel.clone()));
        graph.publish(GraphEvent::LayoutStarted);
        Ok(LayoutJob {
            id: job,
            ids,
            cancel,
            rx,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some((job, token)) = self.active.take() {
            token.cancel();
            debug!("Cancelled layout job {}", job);
        }
    }

    fn release(&mut self, job: u64) {
        if self.active.as_ref().is_some_and(|(id, _)| *id == job) {
            self.active = None;
        }
    }

    /// Applies a finished run: positions, disconnected grid, then zoom bounds.
    pub fn finish(
        &mut self,
        graph: &mut Graph,
        viewport: &mut Viewport,
        outcome: LayoutOutcome,
    ) -> LayoutReport {
        self.finish_with(graph, viewport, outcome, |_| {})
    }

    /// Like [`LayoutOrchestrator::finish`], running `before_grid` once the force
    /// positions are applied but before disconnected nodes are placed.
    pub fn finish_with<F>(
        &mut self,
        graph: &mut Graph,
        viewport: &mut Viewport,
        outcome: LayoutOutcome,
        before_grid: F,
    ) -> LayoutReport
    where
        F: FnOnce(&mut Graph),
    {
        self.release(outcome.job);
        let moved = graph.set_positions(outcome.ids.into_iter().zip(outcome.positions));
        before_grid(graph);
        let disconnected =
            place_disconnected(graph, viewport.width, self.settings.disconnected_spacing);
        let zoom_bounds = graph.bounding_box_all().map(|bbox| {
            viewport.tighten(
                &bbox,
                self.settings.fit_padding,
                self.settings.max_zoom,
                self.settings.min_zoom_fraction,
            )
        });
        graph.publish(GraphEvent::LayoutCompleted { moved });
        info!(
            "Layout applied: {} nodes moved, {} disconnected",
            moved, disconnected
        );
        LayoutReport {
            moved,
            disconnected,
            zoom_bounds,
        }
    }

    /// Runs a layout to completion on a worker thread and applies it.
    pub fn apply_layout(
        &mut self,
        graph: &mut Graph,
        viewport: &mut Viewport,
        options: &LayoutOptions,
    ) -> Result<LayoutReport, LayoutError> {
        self.apply_layout_with(graph, viewport, options, |_| {})
    }

    pub fn apply_layout_with<F>(
        &mut self,
        graph: &mut Graph,
        viewport: &mut Viewport,
        options: &LayoutOptions,
        before_grid: F,
    ) -> Result<LayoutReport, LayoutError>
    where
        F: FnOnce(&mut Graph),
    {
        let span = OperationSpan::start(OP_APPLY_LAYOUT);
        span.context(&format!("{} nodes", graph.pathway_count()));
        let result = match self.start(graph, viewport, options) {
            Ok(job) => {
                let id = job.id();
                match job.wait() {
                    Ok(outcome) => Ok(self.finish_with(graph, viewport, outcome, before_grid)),
                    Err(e) => {
                        self.release(id);
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        };
        span.finish(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{edge, pathway, sample_graph};
    use enrichmap_events::EventBus;

    fn quick_options(seed: u64) -> LayoutOptions {
        LayoutOptions {
            seed: Some(seed),
            iterations: Some(60),
        }
    }

    fn positions(graph: &Graph) -> Vec<(NodeId, Position)> {
        graph
            .pathways()
            .into_iter()
            .map(|node| (node.id.clone(), node.position))
            .collect()
    }

    #[test]
    fn test_edge_formulas() {
        assert_eq!(ideal_edge_length(1.0), 5.0);
        assert_eq!(ideal_edge_length(0.0), 30.0);
        assert_eq!(edge_elasticity(0.5), 20.0);
        assert!(edge_elasticity(0.0).is_finite());
    }

    #[test]
    fn test_cancelled_run_reports_cancellation() {
        let graph = sample_graph();
        let input = LayoutInput::from_graph(&graph);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rng = StdRng::seed_from_u64(1);
        let layout = ForceLayout::from_settings(&LayoutSettings::default());
        assert_eq!(
            layout.run(&input, &mut rng, &cancel),
            Err(LayoutError::Cancelled)
        );
    }

    #[test]
    fn test_same_seed_same_positions() {
        let graph = sample_graph();
        let input = LayoutInput::from_graph(&graph);
        let layout = ForceLayout::from_settings(&LayoutSettings::default());
        let cancel = CancellationToken::new();
        let first = layout
            .run(&input, &mut StdRng::seed_from_u64(5), &cancel)
            .unwrap();
        let second = layout
            .run(&input, &mut StdRng::seed_from_u64(5), &cancel)
            .unwrap();
        let other = layout
            .run(&input, &mut StdRng::seed_from_u64(6), &cancel)
            .unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_apply_layout_is_reproducible() {
        let mut graph = sample_graph();
        let mut viewport = Viewport::new(800.0, 600.0);
        let mut orchestrator = LayoutOrchestrator::new(LayoutSettings::default());

        let report = orchestrator
            .apply_layout(&mut graph, &mut viewport, &quick_options(3))
            .unwrap();
        let first = positions(&graph);
        orchestrator
            .apply_layout(&mut graph, &mut viewport, &quick_options(3))
            .unwrap();
        assert_eq!(first, positions(&graph));

        assert_eq!(report.disconnected, 1);
        let bounds = report.zoom_bounds.unwrap();
        assert_eq!(bounds.max, 2.0);
        assert!((bounds.min - (bounds.fit * 0.25).min(2.0)).abs() < 1e-12);
        assert!(!orchestrator.is_running());

        let events = graph.bus().drain();
        assert!(events.contains(&GraphEvent::LayoutStarted));
        assert!(events.contains(&GraphEvent::LayoutCompleted { moved: 8 }));
    }

    #[test]
    fn test_new_layout_cancels_running_one() {
        let graph = sample_graph();
        let mut viewport = Viewport::default();
        let mut settings = LayoutSettings::default();
        settings.min_temperature = 0.0;
        let mut orchestrator = LayoutOrchestrator::new(settings);

        let slow = orchestrator
            .start(
                &graph,
                &mut viewport,
                &LayoutOptions {
                    seed: Some(1),
                    iterations: Some(50_000_000),
                },
            )
            .unwrap();
        let fast = orchestrator
            .start(&graph, &mut viewport, &quick_options(1))
            .unwrap();

        assert_eq!(slow.wait(), Err(LayoutError::Cancelled));
        let outcome = fast.wait().unwrap();
        assert_eq!(outcome.positions.len(), graph.pathway_count());
    }

    #[test]
    fn test_dead_worker_is_reported_as_panic() {
        let (tx, rx) = bounded::<Result<Vec<Position>, LayoutError>>(1);
        let handle = thread::spawn(move || {
            let _tx = tx;
            panic!("worker failed");
        });
        let job = LayoutJob {
            id: 9,
            ids: Vec::new(),
            cancel: CancellationToken::new(),
            rx,
            handle: Some(handle),
        };
        assert_eq!(job.wait(), Err(LayoutError::Panicked));
    }

    #[test]
    fn test_disconnected_nodes_sorted_by_nes_below_component() {
        let mut graph = Graph::new(EventBus::new());
        graph.add_pathway(pathway("c1", 1.0, 0.0, 0.0)).unwrap();
        graph.add_pathway(pathway("c2", 1.0, 1000.0, 0.0)).unwrap();
        graph.add_edge(edge("e", "c1", "c2", 0.5)).unwrap();
        graph.add_pathway(pathway("low", 0.5, 0.0, 0.0)).unwrap();
        graph.add_pathway(pathway("high", 2.0, 0.0, 0.0)).unwrap();
        graph.add_pathway(pathway("mid", 1.0, 0.0, 0.0)).unwrap();

        let component = graph
            .bounding_box([NodeId::new("c1"), NodeId::new("c2")].iter())
            .unwrap();
        assert_eq!(place_disconnected(&mut graph, 800.0, 20.0), 3);

        let at = |id: &str| graph.pathway(&NodeId::new(id)).unwrap().position;
        assert!(at("high").x < at("mid").x && at("mid").x < at("low").x);
        for id in ["high", "mid", "low"] {
            assert!(at(id).y > component.y2);
            assert_eq!(at(id).y, at("high").y);
        }
    }

    #[test]
    fn test_disconnected_grid_has_at_least_one_column() {
        let mut graph = Graph::new(EventBus::new());
        graph.add_pathway(pathway("x", 1.0, 0.0, 0.0)).unwrap();
        graph.add_pathway(pathway("y", 1.0, 0.0, 0.0)).unwrap();
        assert_eq!(place_disconnected(&mut graph, 5.0, 20.0), 2);
        let x = graph.pathway(&NodeId::new("x")).unwrap().position;
        let y = graph.pathway(&NodeId::new("y")).unwrap().position;
        assert_eq!(x.x, y.x);
        assert!(y.y > x.y);
    }
}
