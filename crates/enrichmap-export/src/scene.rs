use enrichmap_core::{BoundingBox, NodeId, Position};
use enrichmap_graph::style::{self, EDGE_COLOR};
use enrichmap_graph::{Color, HullPath, NetworkEditor};

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub id: NodeId,
    pub center: Position,
    pub radius: f64,
    pub fill: Color,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneEdge {
    pub from: Position,
    pub to: Position,
    pub width: f64,
    pub color: Color,
}

/// Owned snapshot of everything drawn, safe to hand to a blocking task.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportScene {
    pub nodes: Vec<SceneNode>,
    pub edges: Vec<SceneEdge>,
    pub hulls: Vec<HullPath>,
    /// Union of node and hull bounds, before padding.
    pub bounds: BoundingBox,
}

impl ExportScene {
    /// Returns `None` for an empty network.
    pub fn capture(editor: &NetworkEditor) -> Option<ExportScene> {
        let graph = editor.graph();
        let nodes: Vec<SceneNode> = graph
            .pathways()
            .into_iter()
            .map(|node| SceneNode {
                id: node.id.clone(),
                center: node.position,
                radius: style::node_diameter(node.gene_set_size) / 2.0,
                fill: style::nes_color(node.nes),
                label: node.display_label().to_string(),
            })
            .collect();

        let edges: Vec<SceneEdge> = graph
            .visible_edges()
            .into_iter()
            .filter_map(|edge| {
                let from = graph.pathway(&edge.source)?.position;
                let to = graph.pathway(&edge.target)?.position;
                Some(SceneEdge {
                    from,
                    to,
                    width: style::edge_width(edge.similarity),
                    color: EDGE_COLOR.with_alpha(200),
                })
            })
            .collect();

        let hulls = editor.overlay_paths();
        let bounds = hulls
            .iter()
            .map(|hull| hull.bounds)
            .chain(graph.bounding_box_all())
            .reduce(|acc, b| acc.union(&b))?;

        Some(ExportScene {
            nodes,
            edges,
            hulls,
            bounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrichmap_core::NetworkDocument;
    use enrichmap_graph::EditorSettings;
    use std::time::Instant;

    #[test]
    fn test_empty_editor_has_no_scene() {
        let editor = NetworkEditor::new(EditorSettings::default());
        assert!(ExportScene::capture(&editor).is_none());
    }

    #[test]
    fn test_capture_skips_hidden_edges() {
        let doc = NetworkDocument::from_json(
            r#"{
                "networkIDStr": "n",
                "elements": {
                    "nodes": [
                        { "data": { "id": "a", "name": ["A"], "NES": 2.0, "padj": 0.1, "gs_size": 4 } },
                        { "data": { "id": "b", "name": ["B"], "NES": -2.0, "padj": 0.1, "gs_size": 4 } },
                        { "data": { "id": "c", "name": ["C"], "NES": 1.0, "padj": 0.1, "gs_size": 4 } }
                    ],
                    "edges": [
                        { "data": { "id": "ab", "source": "a", "target": "b", "similarity_coefficient": 0.5 } },
                        { "data": { "id": "bc", "source": "b", "target": "c", "similarity_coefficient": 0.5 } }
                    ]
                },
                "clusters": [ { "id": "k", "label": "K", "members": ["a", "b"] } ]
            }"#,
        )
        .unwrap();
        let mut editor = NetworkEditor::new(EditorSettings::default());
        editor.load(&doc, Instant::now()).unwrap();

        let scene = ExportScene::capture(&editor).unwrap();
        assert_eq!(scene.nodes.len(), 3);
        // The cluster starts collapsed, so only the outgoing edge is drawn.
        assert_eq!(scene.edges.len(), 1);
        assert_eq!(scene.hulls.len(), 1);
        assert!(scene.bounds.width() > 0.0);
    }
}
