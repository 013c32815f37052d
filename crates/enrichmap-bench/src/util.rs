use enrichmap_core::NetworkDocument;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

/// Builds a network of `cluster_count` clusters with `cluster_size` pathways each,
/// densely linked inside clusters and sparsely across them.
pub fn generate_synthetic_network(
    cluster_count: usize,
    cluster_size: usize,
    seed: u64,
) -> anyhow::Result<NetworkDocument> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut clusters = Vec::new();

    for c in 0..cluster_count {
        let members: Vec<String> = (0..cluster_size).map(|i| format!("n{c}_{i}")).collect();
        for id in &members {
            nodes.push(json!({
                "data": {
                    "id": id,
                    "name": [format!("GS_{id}")],
                    "NES": rng.gen_range(-3.0..3.0),
                    "padj": rng.gen_range(0.0..0.05),
                    "gs_size": rng.gen_range(10..500)
                }
            }));
        }
        for i in 0..cluster_size {
            for j in (i + 1)..cluster_size {
                if rng.gen_bool(0.3) {
                    edges.push(json!({
                        "data": {
                            "id": format!("e{c}_{i}_{j}"),
                            "source": members[i],
                            "target": members[j],
                            "similarity_coefficient": rng.gen_range(0.25..1.0)
                        }
                    }));
                }
            }
        }
        if c > 0 {
            edges.push(json!({
                "data": {
                    "id": format!("x{c}"),
                    "source": format!("n{}_0", c - 1),
                    "target": members[0],
                    "similarity_coefficient": 0.3
                }
            }));
        }
        clusters.push(json!({ "id": format!("c{c}"), "label": format!("Cluster {c}"), "members": members }));
    }

    let doc = json!({
        "networkIDStr": "bench",
        "networkName": "Synthetic",
        "elements": { "nodes": nodes, "edges": edges },
        "clusters": clusters
    });
    Ok(NetworkDocument::from_json(&doc.to_string())?)
}
