use enrichmap_api::{ApiError, NetworkApi, SearchGeneSet};
use enrichmap_core::{Element, ElementId, NodeId, PathwayNode};
use enrichmap_events::telemetry::{OP_BUILD_SEARCH_INDEX, OperationSpan};
use enrichmap_events::{EventListener, GraphEvent};
use nucleo_matcher::pattern::{AtomKind, CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher, Utf32String};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tantivy::collector::TopDocs;
use tantivy::doc;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument};
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_PATHWAY_RESULTS: usize = 20;
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search index is not ready")]
    NotReady,
    #[error("index error: {0}")]
    Index(#[from] tantivy::TantivyError),
    #[error("could not fetch search data: {0}")]
    Api(#[from] ApiError),
}

/// One gene with its rank and the gene sets that contain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub symbol: String,
    pub rank: f64,
    pub pathways: Vec<String>,
}

impl SearchDocument {
    /// Inverts `genesforsearch` (gene set → genes) into one document per gene,
    /// sorted by symbol. The first rank seen for a gene wins.
    pub fn from_gene_sets(sets: &[SearchGeneSet]) -> Vec<SearchDocument> {
        let mut by_symbol: BTreeMap<&str, SearchDocument> = BTreeMap::new();
        for set in sets {
            for gene in &set.genes {
                let doc = by_symbol
                    .entry(gene.gene.as_str())
                    .or_insert_with(|| SearchDocument {
                        symbol: gene.gene.clone(),
                        rank: gene.rank,
                        pathways: Vec::new(),
                    });
                if !doc.pathways.contains(&set.name) {
                    doc.pathways.push(set.name.clone());
                }
            }
        }
        by_symbol.into_values().collect()
    }
}

/// A pathway node as seen by the label index.
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayEntry {
    pub id: NodeId,
    pub label: String,
    pub gene_sets: Vec<String>,
}

impl From<&PathwayNode> for PathwayEntry {
    fn from(node: &PathwayNode) -> Self {
        Self {
            id: node.id.clone(),
            label: node.display_label().to_string(),
            gene_sets: node.gene_sets.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneHit {
    pub symbol: String,
    pub rank: f64,
    /// Gene sets still present in the network.
    pub pathways: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathwayHit {
    pub id: NodeId,
    pub label: String,
}

/// Gene-symbol prefix search plus full-text search over pathway labels.
///
/// The index is empty and not ready until [`SearchIndex::build`] succeeds. A new
/// network resets readiness; pathway nodes removed from the graph disappear from
/// results until they are added back.
pub struct SearchIndex {
    matcher: Matcher,
    genes: Vec<(Utf32String, SearchDocument)>,
    gene_set_owner: HashMap<String, NodeId>,
    removed: HashSet<NodeId>,
    ready: bool,

    index: Index,
    reader: IndexReader,
    id_field: Field,
    label_field: Field,
}

impl SearchIndex {
    pub fn new() -> Result<Self, SearchError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let label_field = schema_builder.add_text_field("label", TEXT | STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            matcher: Matcher::new(Config::DEFAULT),
            genes: Vec::new(),
            gene_set_owner: HashMap::new(),
            removed: HashSet::new(),
            ready: false,
            index,
            reader,
            id_field,
            label_field,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn gene_count(&self) -> usize {
        self.genes.len()
    }

    /// Replaces the index contents and marks it ready.
    pub fn build<I>(&mut self, documents: Vec<SearchDocument>, pathways: I) -> Result<(), SearchError>
    where
        I: IntoIterator<Item = PathwayEntry>,
    {
        let span = OperationSpan::start(OP_BUILD_SEARCH_INDEX);
        let result = self.rebuild(documents, pathways);
        span.finish(result)
    }

    fn rebuild<I>(&mut self, documents: Vec<SearchDocument>, pathways: I) -> Result<(), SearchError>
    where
        I: IntoIterator<Item = PathwayEntry>,
    {
        self.ready = false;
        self.removed.clear();
        self.gene_set_owner.clear();

        let mut index_writer = self.index.writer(WRITER_HEAP_BYTES)?;
        index_writer.delete_all_documents()?;
        let mut pathway_count = 0;
        for entry in pathways {
            for gene_set in &entry.gene_sets {
                self.gene_set_owner
                    .insert(gene_set.clone(), entry.id.clone());
            }
            index_writer.add_document(doc!(
                self.id_field => entry.id.0.clone(),
                self.label_field => entry.label.clone()
            ))?;
            pathway_count += 1;
        }
        index_writer.commit()?;
        self.reader.reload()?;

        self.genes = documents
            .into_iter()
            .map(|doc| (Utf32String::from(doc.symbol.as_str()), doc))
            .collect();
        self.ready = true;
        info!(
            "Search index built: {} genes, {} pathways",
            self.genes.len(),
            pathway_count
        );
        Ok(())
    }

    /// Fetches `genesforsearch` and builds the index. A failed fetch leaves the
    /// index not ready.
    pub async fn load<I>(
        &mut self,
        api: &dyn NetworkApi,
        net_id: &str,
        pathways: I,
    ) -> Result<usize, SearchError>
    where
        I: IntoIterator<Item = PathwayEntry>,
    {
        self.ready = false;
        let sets = match api.genes_for_search(net_id).await {
            Ok(sets) => sets,
            Err(e) => {
                warn!("Search data for {} unavailable: {}", net_id, e);
                return Err(e.into());
            }
        };
        let documents = SearchDocument::from_gene_sets(&sets);
        self.build(documents, pathways)?;
        Ok(self.genes.len())
    }

    fn is_live(&self, gene_set: &str) -> bool {
        self.gene_set_owner
            .get(gene_set)
            .is_none_or(|owner| !self.removed.contains(owner))
    }

    /// Case-insensitive prefix match over gene symbols, best match first.
    /// Every symbol starting with the query is returned.
    pub fn search_genes(&mut self, query: &str) -> Result<Vec<GeneHit>, SearchError> {
        if !self.ready {
            return Err(SearchError::NotReady);
        }
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = Pattern::new(
            query,
            CaseMatching::Ignore,
            Normalization::Smart,
            AtomKind::Prefix,
        );

        let mut matches: Vec<(u32, &SearchDocument)> = Vec::new();
        for (symbol, doc) in &self.genes {
            if let Some(score) = pattern.score(symbol.slice(..), &mut self.matcher) {
                matches.push((score, doc));
            }
        }
        matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.symbol.cmp(&b.1.symbol)));

        let hits: Vec<GeneHit> = matches
            .into_iter()
            .map(|(_, doc)| GeneHit {
                symbol: doc.symbol.clone(),
                rank: doc.rank,
                pathways: doc
                    .pathways
                    .iter()
                    .filter(|name| self.is_live(name))
                    .cloned()
                    .collect(),
            })
            .collect();
        debug!("Gene search {:?}: {} hits", query, hits.len());
        Ok(hits)
    }

    /// Full-text search over pathway labels.
    pub fn search_pathways(&self, query: &str) -> Result<Vec<PathwayHit>, SearchError> {
        if !self.ready {
            return Err(SearchError::NotReady);
        }
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.label_field]);
        let (parsed, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            debug!("Pathway query {:?} parsed leniently: {:?}", query, errors);
        }

        // Removed nodes are filtered after scoring, so ask for extra.
        let limit = MAX_PATHWAY_RESULTS + self.removed.len();
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        for (_score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(doc_address)?;
            let Some(id) = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .map(NodeId::new)
            else {
                continue;
            };
            if self.removed.contains(&id) || !seen.insert(id.clone()) {
                continue;
            }
            let label = retrieved
                .get_first(self.label_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            results.push(PathwayHit { id, label });
            if results.len() == MAX_PATHWAY_RESULTS {
                break;
            }
        }
        Ok(results)
    }
}

impl EventListener for SearchIndex {
    fn handle_event(&mut self, event: &GraphEvent) {
        match event {
            GraphEvent::NetworkLoaded { network_id } => {
                if self.ready {
                    debug!("Search index invalidated by load of {}", network_id);
                }
                self.ready = false;
                self.removed.clear();
            }
            GraphEvent::ElementRemoved {
                element: Element::Pathway(node),
            } => {
                self.removed.insert(node.id.clone());
            }
            GraphEvent::ElementsAdded { ids } => {
                for id in ids {
                    if let ElementId::Node(node) = id {
                        self.removed.remove(node);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrichmap_api::{GeneRank, InMemoryNetworkApi};
    use enrichmap_core::Position;

    fn set(name: &str, genes: &[(&str, f64)]) -> SearchGeneSet {
        SearchGeneSet {
            name: name.into(),
            genes: genes
                .iter()
                .map(|(gene, rank)| GeneRank {
                    gene: gene.to_string(),
                    rank: *rank,
                })
                .collect(),
        }
    }

    fn gene_sets() -> Vec<SearchGeneSet> {
        vec![
            set(
                "HALLMARK_DNA_REPAIR",
                &[("BRCA1", 3.2), ("BRCA2", 2.1), ("TP53", 1.0)],
            ),
            set("HALLMARK_APOPTOSIS", &[("TP53", 1.0), ("ABRCX", -0.5)]),
        ]
    }

    fn entry(id: &str, label: &str, gene_set: &str) -> PathwayEntry {
        PathwayEntry {
            id: NodeId::new(id),
            label: label.into(),
            gene_sets: vec![gene_set.into()],
        }
    }

    fn pathways() -> Vec<PathwayEntry> {
        vec![
            entry("p1", "HALLMARK_DNA_REPAIR", "HALLMARK_DNA_REPAIR"),
            entry("p2", "HALLMARK_APOPTOSIS", "HALLMARK_APOPTOSIS"),
        ]
    }

    fn built_index() -> SearchIndex {
        let mut index = SearchIndex::new().unwrap();
        index
            .build(SearchDocument::from_gene_sets(&gene_sets()), pathways())
            .unwrap();
        index
    }

    fn symbols(hits: &[GeneHit]) -> Vec<&str> {
        hits.iter().map(|h| h.symbol.as_str()).collect()
    }

    #[test]
    fn test_documents_are_inverted_per_gene() {
        let docs = SearchDocument::from_gene_sets(&gene_sets());
        let tp53 = docs.iter().find(|d| d.symbol == "TP53").unwrap();
        assert_eq!(
            tp53.pathways,
            vec!["HALLMARK_DNA_REPAIR", "HALLMARK_APOPTOSIS"]
        );
        assert_eq!(docs.len(), 4);
    }

    #[test]
    fn test_not_ready_before_build() {
        let mut index = SearchIndex::new().unwrap();
        assert!(matches!(
            index.search_genes("BRC"),
            Err(SearchError::NotReady)
        ));
        assert!(matches!(
            index.search_pathways("repair"),
            Err(SearchError::NotReady)
        ));
    }

    #[test]
    fn test_gene_prefix_is_case_insensitive() {
        let mut index = built_index();
        let hits = index.search_genes("brc").unwrap();
        assert_eq!(symbols(&hits), vec!["BRCA1", "BRCA2"]);
        assert!(index.search_genes("  ").unwrap().is_empty());
        assert!(index.search_genes("XYZ").unwrap().is_empty());
    }

    #[test]
    fn test_gene_prefix_returns_every_match() {
        let mut genes: Vec<(String, f64)> = (1..=25).map(|i| (format!("BA{i:02}"), 1.0)).collect();
        genes.push(("BRCA1".into(), 2.0));
        let pairs: Vec<(&str, f64)> = genes.iter().map(|(g, r)| (g.as_str(), *r)).collect();
        let sets = vec![set("HALLMARK_MANY", &pairs)];

        let mut index = SearchIndex::new().unwrap();
        index
            .build(
                SearchDocument::from_gene_sets(&sets),
                vec![entry("p1", "HALLMARK_MANY", "HALLMARK_MANY")],
            )
            .unwrap();

        let hits = index.search_genes("B").unwrap();
        assert_eq!(hits.len(), 26);
        assert!(symbols(&hits).contains(&"BRCA1"));
        assert_eq!(index.search_genes("BA").unwrap().len(), 25);
    }

    #[test]
    fn test_pathway_label_search() {
        let index = built_index();
        let hits = index.search_pathways("repair").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, NodeId::new("p1"));
        assert_eq!(hits[0].label, "HALLMARK_DNA_REPAIR");
        assert_eq!(index.search_pathways("hallmark").unwrap().len(), 2);
    }

    #[test]
    fn test_removed_pathways_are_filtered_until_restored() {
        let mut index = built_index();
        let node = PathwayNode {
            id: NodeId::new("p2"),
            gene_sets: vec!["HALLMARK_APOPTOSIS".into()],
            nes: 1.0,
            padj: 0.01,
            gene_set_size: 10,
            label: None,
            position: Position::default(),
            parent: None,
        };
        index.handle_event(&GraphEvent::ElementRemoved {
            element: Element::Pathway(node),
        });
        assert_eq!(index.search_pathways("hallmark").unwrap().len(), 1);
        let tp53 = index.search_genes("TP53").unwrap();
        assert_eq!(tp53[0].pathways, vec!["HALLMARK_DNA_REPAIR"]);

        index.handle_event(&GraphEvent::ElementsAdded {
            ids: vec![ElementId::Node(NodeId::new("p2"))],
        });
        assert_eq!(index.search_pathways("hallmark").unwrap().len(), 2);
    }

    #[test]
    fn test_network_load_resets_readiness() {
        let mut index = built_index();
        index.handle_event(&GraphEvent::NetworkLoaded {
            network_id: "other".into(),
        });
        assert!(!index.is_ready());
    }

    #[tokio::test]
    async fn test_load_from_api() {
        let api = InMemoryNetworkApi::new();
        api.insert_gene_sets("n1", gene_sets());
        let mut index = SearchIndex::new().unwrap();

        assert!(index.load(&api, "missing", pathways()).await.is_err());
        assert!(!index.is_ready());

        assert_eq!(index.load(&api, "n1", pathways()).await.unwrap(), 4);
        assert!(index.is_ready());
        assert_eq!(symbols(&index.search_genes("TP").unwrap()), vec!["TP53"]);
    }
}
