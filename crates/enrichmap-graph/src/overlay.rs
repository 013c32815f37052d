//! Cluster hull overlays.
//!
//! Hull paths live in an [`OverlayLayer`] shared with renderers. The graph owns one
//! [`OverlayPath`] handle per cluster; dropping the handle (because the overlay was
//! replaced or the cluster was removed) takes the path off the layer.

use crate::graph::Graph;
use crate::hull::{self, PathSegment};
use crate::settings::OverlaySettings;
use crate::style::{self, OverlayColors};
use enrichmap_core::{BoundingBox, Element, ElementId, NodeId, Position, SimilarityEdge};
use enrichmap_events::{GraphEvent, Throttle};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

const POINTS_PER_NODE: usize = 8;
const EDGE_SAMPLE_STEPS: [f64; 3] = [0.25, 0.5, 0.75];

#[derive(Debug, Clone, PartialEq)]
pub struct HullPath {
    pub cluster: NodeId,
    pub outline: Vec<Position>,
    pub segments: Vec<PathSegment>,
    pub colors: OverlayColors,
    pub bounds: BoundingBox,
}

impl HullPath {
    pub fn to_svg_path(&self) -> String {
        hull::segments_to_svg(&self.segments)
    }

    pub fn to_svg_element(&self) -> String {
        format!(
            r#"<path d="{}" fill="{}" fill-opacity="{:.3}" stroke="{}" stroke-opacity="{:.3}" stroke-width="1.5"/>"#,
            self.to_svg_path(),
            self.colors.fill.to_hex(),
            self.colors.fill.opacity(),
            self.colors.stroke.to_hex(),
            self.colors.stroke.opacity(),
        )
    }
}

#[derive(Default)]
struct LayerInner {
    paths: BTreeMap<NodeId, (u64, HullPath)>,
    next_token: u64,
}

/// Paths currently drawn above the network, keyed by cluster.
#[derive(Clone, Default)]
pub struct OverlayLayer {
    inner: Arc<Mutex<LayerInner>>,
}

impl fmt::Debug for OverlayLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayLayer")
            .field("paths", &self.len())
            .finish()
    }
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: HullPath) -> OverlayPath {
        let mut inner = self.inner.lock();
        let token = inner.next_token;
        inner.next_token += 1;
        let cluster = path.cluster.clone();
        inner.paths.insert(cluster.clone(), (token, path));
        OverlayPath {
            cluster,
            token,
            layer: self.clone(),
        }
    }

    fn unregister(&self, cluster: &NodeId, token: u64) {
        let mut inner = self.inner.lock();
        // A newer registration for the same cluster stays put.
        if inner.paths.get(cluster).is_some_and(|(t, _)| *t == token) {
            inner.paths.remove(cluster);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().paths.is_empty()
    }

    pub fn contains(&self, cluster: &NodeId) -> bool {
        self.inner.lock().paths.contains_key(cluster)
    }

    pub fn get(&self, cluster: &NodeId) -> Option<HullPath> {
        self.inner.lock().paths.get(cluster).map(|(_, p)| p.clone())
    }

    /// Snapshot of every path, ordered by cluster id.
    pub fn paths(&self) -> Vec<HullPath> {
        self.inner
            .lock()
            .paths
            .values()
            .map(|(_, p)| p.clone())
            .collect()
    }
}

/// Registration handle of one cluster's path.
pub struct OverlayPath {
    cluster: NodeId,
    token: u64,
    layer: OverlayLayer,
}

impl fmt::Debug for OverlayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayPath")
            .field("cluster", &self.cluster)
            .field("token", &self.token)
            .finish()
    }
}

impl OverlayPath {
    pub fn cluster(&self) -> &NodeId {
        &self.cluster
    }

    pub fn path(&self) -> Option<HullPath> {
        self.layer.get(&self.cluster)
    }
}

impl Drop for OverlayPath {
    fn drop(&mut self) {
        self.layer.unregister(&self.cluster, self.token);
    }
}

/// Uniform sample of `max` indices out of `total`, returned sorted.
pub(crate) fn sample_indices(rng: &mut StdRng, total: usize, max: usize) -> Vec<usize> {
    if total <= max {
        return (0..total).collect();
    }
    let mut indices = rand::seq::index::sample(rng, total, max).into_vec();
    indices.sort_unstable();
    indices
}

/// Computes hulls and rate-limits their refresh per cluster.
pub struct OverlayCache {
    settings: OverlaySettings,
    large_threshold: usize,
    layer: OverlayLayer,
    throttles: HashMap<NodeId, Throttle>,
    rng: StdRng,
}

impl OverlayCache {
    pub fn new(settings: OverlaySettings, large_threshold: usize) -> Self {
        let rng = StdRng::seed_from_u64(settings.sample_seed);
        Self {
            settings,
            large_threshold,
            layer: OverlayLayer::new(),
            throttles: HashMap::new(),
            rng,
        }
    }

    pub fn layer(&self) -> &OverlayLayer {
        &self.layer
    }

    pub fn is_large(&self, graph: &Graph, cluster: &NodeId) -> bool {
        graph.members(cluster).len() >= self.large_threshold
    }

    pub fn has_pending(&self) -> bool {
        self.throttles.values().any(Throttle::is_pending)
    }

    /// Hull around a cluster's children and (a sample of) its internal edges.
    pub fn build_hull(&mut self, graph: &Graph, cluster: &NodeId) -> Option<HullPath> {
        let node = graph.cluster(cluster)?;
        let members = graph.members(cluster);
        if members.is_empty() {
            return None;
        }
        let padding = self.settings.padding;

        let mut points = Vec::with_capacity(members.len() * POINTS_PER_NODE);
        for member in members {
            if let Some(pathway) = graph.pathway(member) {
                let radius = style::node_diameter(pathway.gene_set_size) / 2.0 + padding;
                points.extend(hull::circle_points(pathway.position, radius, POINTS_PER_NODE));
            }
        }

        let edges = graph.internal_edges(cluster);
        let sampled: Vec<&SimilarityEdge> = if self.is_large(graph, cluster) {
            sample_indices(&mut self.rng, edges.len(), self.settings.max_sampled_edges)
                .into_iter()
                .map(|i| edges[i])
                .collect()
        } else {
            edges
        };
        for edge in sampled {
            let (Some(source), Some(target)) = (graph.pathway(&edge.source), graph.pathway(&edge.target))
            else {
                continue;
            };
            let (a, b) = (source.position, target.position);
            let length = a.distance(b);
            if length <= f64::EPSILON {
                continue;
            }
            let offset = style::edge_width(edge.similarity) / 2.0 + padding / 2.0;
            let normal = Position::new(-(b.y - a.y) / length, (b.x - a.x) / length);
            for t in EDGE_SAMPLE_STEPS {
                let p = a.lerp(b, t);
                points.push(Position::new(p.x + normal.x * offset, p.y + normal.y * offset));
                points.push(Position::new(p.x - normal.x * offset, p.y - normal.y * offset));
            }
        }

        let outline = hull::convex_hull(&points);
        let bounds = hull::bounds_of(&outline)?;
        Some(HullPath {
            cluster: cluster.clone(),
            segments: hull::smooth_closed_path(&outline),
            outline,
            colors: style::cluster_colors(node.average_nes),
            bounds,
        })
    }

    /// Replaces a cluster's overlay. Returns false when the cluster no longer exists.
    pub fn update_overlay(&mut self, graph: &mut Graph, cluster: &NodeId) -> bool {
        drop(graph.take_overlay(cluster));
        if !graph.is_cluster(cluster) {
            self.throttles.remove(cluster);
            return false;
        }
        graph.refresh_average_nes(cluster);
        let Some(path) = self.build_hull(graph, cluster) else {
            return false;
        };
        trace!("Overlay for {} rebuilt", cluster);
        let handle = self.layer.register(path);
        graph.set_overlay(cluster, handle).is_ok()
    }

    /// Throttled refresh; returns whether the overlay was rebuilt right away.
    pub fn request_update(&mut self, graph: &mut Graph, cluster: &NodeId, now: Instant) -> bool {
        if !graph.is_cluster(cluster) {
            self.throttles.remove(cluster);
            return false;
        }
        let interval = self.settings.throttle(self.is_large(graph, cluster));
        let throttle = self
            .throttles
            .entry(cluster.clone())
            .or_insert_with(|| Throttle::new(interval));
        throttle.set_interval(interval);
        if throttle.request(now) {
            self.update_overlay(graph, cluster)
        } else {
            false
        }
    }

    /// Runs deferred refreshes whose interval has elapsed.
    pub fn poll(&mut self, graph: &mut Graph, now: Instant) -> usize {
        self.throttles.retain(|id, _| graph.is_cluster(id));
        let mut due: Vec<NodeId> = self
            .throttles
            .iter_mut()
            .filter_map(|(id, throttle)| throttle.poll(now).then(|| id.clone()))
            .collect();
        due.sort();
        due.iter()
            .filter(|id| self.update_overlay(graph, id))
            .count()
    }

    /// Runs every deferred refresh immediately.
    pub fn flush(&mut self, graph: &mut Graph) -> usize {
        let mut pending: Vec<NodeId> = self
            .throttles
            .iter()
            .filter(|(_, t)| t.is_pending())
            .map(|(id, _)| id.clone())
            .collect();
        pending.sort();
        for id in &pending {
            self.throttles.remove(id);
        }
        pending
            .iter()
            .filter(|id| self.update_overlay(graph, id))
            .count()
    }

    pub fn refresh_all(&mut self, graph: &mut Graph) -> usize {
        self.throttles.clear();
        let clusters: Vec<NodeId> = graph.clusters().into_iter().map(|c| c.id.clone()).collect();
        let updated = clusters
            .iter()
            .filter(|id| self.update_overlay(graph, id))
            .count();
        debug!("Rebuilt {} cluster overlays", updated);
        updated
    }

    pub fn handle_event(&mut self, graph: &mut Graph, event: &GraphEvent, now: Instant) {
        let targets: Vec<NodeId> = match event {
            GraphEvent::NetworkLoaded { .. } => {
                self.refresh_all(graph);
                return;
            }
            GraphEvent::Drag { ids } | GraphEvent::PositionsChanged { ids } => parents_of(graph, ids),
            GraphEvent::ElementsAdded { ids } => {
                let mut targets = Vec::new();
                for id in ids {
                    match id {
                        ElementId::Node(node) if graph.is_cluster(node) => push_unique(&mut targets, node.clone()),
                        ElementId::Node(node) => targets.extend(parents_of(graph, std::slice::from_ref(node))),
                        ElementId::Edge(edge) => {
                            if let Some(edge) = graph.edge(edge) {
                                let ends = [edge.source.clone(), edge.target.clone()];
                                targets.extend(parents_of(graph, &ends));
                            }
                        }
                    }
                }
                targets
            }
            GraphEvent::ElementRemoved { element } => match element {
                Element::Cluster { node, .. } => {
                    self.throttles.remove(&node.id);
                    return;
                }
                Element::Pathway(node) => node.parent.iter().cloned().collect(),
                Element::Edge(edge) => {
                    parents_of(graph, &[edge.source.clone(), edge.target.clone()])
                }
            },
            other => other.cluster().cloned().into_iter().collect(),
        };

        let mut seen = Vec::new();
        for cluster in targets {
            if !seen.contains(&cluster) {
                self.request_update(graph, &cluster, now);
                seen.push(cluster);
            }
        }
    }
}

fn push_unique(targets: &mut Vec<NodeId>, id: NodeId) {
    if !targets.contains(&id) {
        targets.push(id);
    }
}

fn parents_of(graph: &Graph, ids: &[NodeId]) -> Vec<NodeId> {
    let mut parents = Vec::new();
    for id in ids {
        if let Some(parent) = graph.pathway(id).and_then(|n| n.parent.clone()) {
            push_unique(&mut parents, parent);
        }
    }
    parents
}
