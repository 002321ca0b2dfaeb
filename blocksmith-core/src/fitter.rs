//! Fits a degree-distribution-corrected stochastic block model (DDcSBM) from
//! observed nodes and edges.
//!
//! The fitter accumulates per-type node counts, per-(node-type, edge-type)
//! degree histograms, and per-edge-type block matrices while the ingestor
//! streams rows at it, then compiles everything into a [`Model`] whose node
//! identity is a continuous interval.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, info, warn};

use crate::model::{
    Amount, ContinuousNodeId, Degree, EdgeBlock, EdgeRecord, MetaRecord, Model, NodeRecord,
    DEFAULT_MODEL_NAME, SCALE_KEY,
};

/// Degree histogram of one (node-type, edge-type) pair along one axis.
#[derive(Clone, Debug, Default)]
struct DegreeList {
    /// `(degree, number of nodes with that degree)` pairs.
    pairs: Vec<(Degree, Amount)>,
    /// Number of nodes with a recorded (nonzero) degree.
    recorded: Amount,
    /// Σ degree · amount.
    sum: Amount,
}

impl DegreeList {
    fn push(&mut self, degree: Degree, amount: Amount) {
        self.pairs.push((degree, amount));
        self.recorded += amount;
        self.sum += degree * amount;
    }

    /// Accounts for nodes of the type that never appeared as an endpoint.
    /// Padding does not touch `recorded`, which keeps tracking nodes with an
    /// observed degree.
    fn pad_to(&mut self, node_count: Amount) {
        if self.recorded < node_count {
            self.pairs.push((0, node_count - self.recorded));
        }
    }
}

/// Accumulates graph observations and compiles them into a [`Model`].
///
/// Node and edge ids are opaque strings here; integer ids only exist in
/// sampled output. Node observations must all happen before the first edge
/// observation, otherwise endpoints cannot be typed.
#[derive(Debug, Default)]
pub struct GraphFitter {
    node_count: Amount,
    node_types: BTreeMap<String, Amount>,
    edge_types: BTreeSet<String>,
    edge_counts: BTreeMap<String, Amount>,
    /// edge-type → (source type, destination type) → observed edge count
    block_matrix: BTreeMap<String, BTreeMap<(String, String), Amount>>,
    node_to_type: HashMap<String, String>,
    /// edge-type → node id → degree
    in_degrees: BTreeMap<String, HashMap<String, Degree>>,
    out_degrees: BTreeMap<String, HashMap<String, Degree>>,
    untyped_edges: Amount,
}

impl GraphFitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one node with its composite type label. Re-observing an id
    /// makes the newest type authoritative for future edges.
    pub fn observe_node(&mut self, id: &str, node_type: &str) {
        self.node_count += 1;
        *self.node_types.entry(node_type.to_owned()).or_insert(0) += 1;
        self.node_to_type
            .insert(id.to_owned(), node_type.to_owned());
    }

    /// Records one directed edge. Edges whose endpoints were never observed
    /// as nodes cannot be assigned to a block and are rejected and counted.
    pub fn observe_edge(&mut self, src: &str, dst: &str, edge_type: &str) {
        let (Some(src_type), Some(dst_type)) =
            (self.node_to_type.get(src), self.node_to_type.get(dst))
        else {
            self.untyped_edges += 1;
            debug!(src, dst, edge_type, "dropping edge with untyped endpoint");
            return;
        };
        let src_type = src_type.clone();
        let dst_type = dst_type.clone();

        *self.edge_counts.entry(edge_type.to_owned()).or_insert(0) += 1;
        *self
            .block_matrix
            .entry(edge_type.to_owned())
            .or_default()
            .entry((src_type, dst_type))
            .or_insert(0) += 1;
        *self
            .out_degrees
            .entry(edge_type.to_owned())
            .or_default()
            .entry(src.to_owned())
            .or_insert(0) += 1;
        *self
            .in_degrees
            .entry(edge_type.to_owned())
            .or_default()
            .entry(dst.to_owned())
            .or_insert(0) += 1;
        self.edge_types.insert(edge_type.to_owned());
    }

    /// Number of nodes observed so far (re-observations included).
    #[must_use]
    pub fn observed_nodes(&self) -> Amount {
        self.node_count
    }

    /// Number of edges rejected because an endpoint had no observed type.
    #[must_use]
    pub fn untyped_edges(&self) -> Amount {
        self.untyped_edges
    }

    /// Compiles the accumulated observations into a model.
    ///
    /// Degree lists are padded with zero-degree nodes, sorted for
    /// reproducibility, and shuffled with a PRNG seeded by `seed` to break
    /// positional correlation between in- and out-degree assignment within a
    /// type. Node-id intervals are assigned contiguously in sorted type
    /// order, then one block is emitted per (out-degree step × in-degree
    /// step) with the DDcSBM probability. Blocks with probability above 1
    /// count as model failures and keep their raw value; scaling and
    /// sampling clamp them.
    #[must_use]
    pub fn compile(self, meta: BTreeMap<String, String>, seed: u64) -> Model {
        let mut rng = SmallRng::seed_from_u64(seed);

        // Degree histograms per (node type, edge type), in degree order.
        let mut histograms: BTreeMap<(String, String), [BTreeMap<Degree, Amount>; 2]> =
            BTreeMap::new();
        for (axis, degrees) in [&self.in_degrees, &self.out_degrees].into_iter().enumerate() {
            for (edge_type, nodes) in degrees {
                for (node, &degree) in nodes {
                    let Some(node_type) = self.node_to_type.get(node) else {
                        continue;
                    };
                    let entry = histograms
                        .entry((node_type.clone(), edge_type.clone()))
                        .or_default();
                    *entry[axis].entry(degree).or_insert(0) += 1;
                }
            }
        }

        // Padded, shuffled degree lists. BTreeMap iteration keeps the rng
        // draw order reproducible for a given seed.
        let mut in_lists: BTreeMap<(String, String), DegreeList> = BTreeMap::new();
        let mut out_lists: BTreeMap<(String, String), DegreeList> = BTreeMap::new();
        for (node_type, &count) in &self.node_types {
            for edge_type in &self.edge_types {
                let key = (node_type.clone(), edge_type.clone());
                let axes = histograms.remove(&key).unwrap_or_default();
                for (axis, lists) in [&mut in_lists, &mut out_lists].into_iter().enumerate() {
                    let mut list = DegreeList::default();
                    for (&degree, &amount) in &axes[axis] {
                        list.push(degree, amount);
                    }
                    list.pad_to(count);
                    list.pairs.shuffle(&mut rng);
                    lists.insert(key.clone(), list);
                }
            }
        }

        // Contiguous node-id intervals, one per type, in sorted type order.
        let mut nodes = Vec::with_capacity(self.node_types.len());
        let mut type_offsets: BTreeMap<&str, Amount> = BTreeMap::new();
        let mut cursor: Amount = 0;
        for (node_type, &count) in &self.node_types {
            type_offsets.insert(node_type, cursor);
            nodes.push(NodeRecord::new(
                cursor as ContinuousNodeId,
                (cursor + count) as ContinuousNodeId,
                node_type.clone(),
            ));
            cursor += count;
        }

        let mut failed_probabilities: Amount = 0;
        let mut total_blocks: Amount = 0;
        let mut edges = Vec::with_capacity(self.edge_types.len());
        for edge_type in &self.edge_types {
            let mut record = EdgeRecord {
                edge_type: edge_type.clone(),
                blocks: Vec::new(),
            };
            for (type_x, _) in &self.node_types {
                let key_x = (type_x.clone(), edge_type.clone());
                let Some(out_list) = out_lists.get(&key_x).filter(|l| l.recorded > 0) else {
                    continue;
                };
                for (type_y, _) in &self.node_types {
                    let key_y = (type_y.clone(), edge_type.clone());
                    let Some(in_list) = in_lists.get(&key_y).filter(|l| l.recorded > 0) else {
                        continue;
                    };
                    let edges_between = self
                        .block_matrix
                        .get(edge_type)
                        .and_then(|m| m.get(&(type_x.clone(), type_y.clone())))
                        .copied()
                        .unwrap_or(0);

                    let mut cur_x = type_offsets[type_x.as_str()] as ContinuousNodeId;
                    for &(deg_x, amount_x) in &out_list.pairs {
                        let mut cur_y = type_offsets[type_y.as_str()] as ContinuousNodeId;
                        for &(deg_y, amount_y) in &in_list.pairs {
                            let mut probability = 0.0;
                            if out_list.sum > 0 && in_list.sum > 0 {
                                probability = edges_between as f64
                                    * (deg_x as f64 / out_list.sum as f64)
                                    * (deg_y as f64 / in_list.sum as f64);
                            }
                            if probability > 1.0 {
                                failed_probabilities += 1;
                            }
                            if probability > 0.0 {
                                record.blocks.push(EdgeBlock::new(
                                    cur_x,
                                    cur_x + amount_x as ContinuousNodeId,
                                    cur_y,
                                    cur_y + amount_y as ContinuousNodeId,
                                    probability,
                                ));
                                total_blocks += 1;
                            }
                            cur_y += amount_y as ContinuousNodeId;
                        }
                        cur_x += amount_x as ContinuousNodeId;
                    }
                }
            }
            edges.push(record);
        }

        let mut record = MetaRecord {
            name: DEFAULT_MODEL_NAME.to_owned(),
            values: BTreeMap::from([(SCALE_KEY.to_owned(), "1.0".to_owned())]),
        };
        for (key, value) in meta {
            if key == "NAME" {
                record.name = value;
            } else {
                record.values.insert(key, value);
            }
        }

        let mut model = Model {
            meta: record,
            nodes,
            edges,
        };
        model.normalize();

        info!(
            node_types = model.nodes.len(),
            edge_types = model.edges.len(),
            observed_edges = self.edge_counts.values().sum::<Amount>(),
            blocks = total_blocks,
            "compiled model"
        );
        if self.untyped_edges > 0 {
            warn!(
                dropped = self.untyped_edges,
                "edges referencing nodes without an observed type were dropped"
            );
        }
        if failed_probabilities > 0 {
            warn!(
                failed = failed_probabilities,
                total_blocks,
                percent = failed_probabilities as f64 / total_blocks as f64 * 100.0,
                "model failure: block probability above 1.0"
            );
        }

        model
    }
}
