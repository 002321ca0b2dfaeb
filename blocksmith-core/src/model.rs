//! Core data types for the block-structured graph model.
//!
//! A [`Model`] describes a labelled directed random graph as a set of node
//! intervals plus, per edge-type, a set of axis-aligned probability blocks in
//! the (source-id × destination-id) plane. Node identity is a continuous
//! real-valued interval so multiplicative rescaling stays closed over the
//! representation; integer node ids are only recovered at emission time.

use std::collections::BTreeMap;

use tracing::warn;

/// Integer node identifier, as written to sampled node/edge files.
pub type NodeId = u64;
/// Real-valued node-interval endpoint. Integer ids are recovered as
/// `floor(x) + 1` at the start of an interval and `floor(x)` at its end, so
/// the interval `(s, e]` spans the ids `floor(s)+1 ..= floor(e)`.
pub type ContinuousNodeId = f64;
/// Count of nodes or edges.
pub type Amount = u64;
/// In- or out-degree of a node with respect to one edge-type.
pub type Degree = u64;
/// Bernoulli probability attached to a block. Values above `1.0` are legal
/// inside a model (they record fitting failures) and are clamped at scale or
/// sampling time.
pub type Probability = f64;

/// Reserved meta key holding the cumulative scale factor relative to the
/// originally observed graph.
pub const SCALE_KEY: &str = "SCALE";
/// Name given to models whose meta data carries no `NAME` entry.
pub const DEFAULT_MODEL_NAME: &str = "Unnamed graph model";

/// First integer id inside the continuous interval starting at `x`.
#[inline]
#[must_use]
pub fn interval_start(x: ContinuousNodeId) -> NodeId {
    x.floor() as NodeId + 1
}

/// Last integer id inside the continuous interval ending at `x`.
#[inline]
#[must_use]
pub fn interval_end(x: ContinuousNodeId) -> NodeId {
    x.floor() as NodeId
}

/// Model name plus free-form key/value meta entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetaRecord {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

impl MetaRecord {
    /// Current cumulative scale factor, parsed from the `SCALE` entry.
    ///
    /// A missing or malformed entry degrades to `1.0` with a warning, so a
    /// hand-edited model never aborts a scale operation.
    #[must_use]
    pub fn scale_factor(&self) -> f64 {
        let Some(raw) = self.values.get(SCALE_KEY) else {
            return 1.0;
        };
        match raw.parse::<f64>() {
            Ok(value) => {
                if value <= 0.0 {
                    warn!(scale = raw.as_str(), "non-positive SCALE meta entry");
                }
                value
            }
            Err(_) => {
                warn!(scale = raw.as_str(), "non-numeric SCALE meta entry, assuming 1.0");
                1.0
            }
        }
    }
}

/// A contiguous interval `(start, end]` of nodes sharing one type.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeRecord {
    pub start: ContinuousNodeId,
    pub end: ContinuousNodeId,
    pub node_type: String,
}

impl NodeRecord {
    #[must_use]
    pub fn new(start: ContinuousNodeId, end: ContinuousNodeId, node_type: impl Into<String>) -> Self {
        Self {
            start,
            end,
            node_type: node_type.into(),
        }
    }

    /// Number of integer node ids covered by this interval.
    #[must_use]
    pub fn id_count(&self) -> Amount {
        interval_end(self.end).saturating_sub(interval_end(self.start))
    }
}

/// One Bernoulli rectangle: every ordered pair with a source in
/// `(start_x, end_x]` and a destination in `(start_y, end_y]` is an edge
/// independently with `probability`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeBlock {
    pub start_x: ContinuousNodeId,
    pub end_x: ContinuousNodeId,
    pub start_y: ContinuousNodeId,
    pub end_y: ContinuousNodeId,
    pub probability: Probability,
}

impl EdgeBlock {
    #[must_use]
    pub fn new(
        start_x: ContinuousNodeId,
        end_x: ContinuousNodeId,
        start_y: ContinuousNodeId,
        end_y: ContinuousNodeId,
        probability: Probability,
    ) -> Self {
        Self {
            start_x,
            end_x,
            start_y,
            end_y,
            probability,
        }
    }
}

/// All blocks belonging to one edge-type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeRecord {
    pub edge_type: String,
    pub blocks: Vec<EdgeBlock>,
}

/// A complete fitted model: meta data, node intervals, and per-edge-type
/// probability blocks.
///
/// Invariants (established by [`Model::normalize`] and preserved by the codec
/// and the scale transform): node records sorted by `(start, end)`, edge
/// records sorted by type, blocks within a record sorted by
/// `(start_x, start_y)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub meta: MetaRecord,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl Model {
    /// Restores the sort invariants after bulk construction or mutation.
    pub fn normalize(&mut self) {
        self.nodes.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then_with(|| a.end.total_cmp(&b.end))
        });
        self.edges.sort_by(|a, b| a.edge_type.cmp(&b.edge_type));
        for record in &mut self.edges {
            record.blocks.sort_by(|a, b| {
                a.start_x
                    .total_cmp(&b.start_x)
                    .then_with(|| a.start_y.total_cmp(&b.start_y))
            });
        }
    }

    /// Returns a copy of this model enlarged (or shrunk) by `factor`.
    ///
    /// Every interval endpoint is multiplied by `factor` and every block
    /// probability divided by it, which conserves the expected degree of each
    /// node under proportional enlargement. Probabilities exceeding `1.0`
    /// after the division are clamped and counted. The `SCALE` meta entry is
    /// multiplied by `factor`.
    ///
    /// Callers must validate `factor > 0`; the script parser rejects
    /// non-positive factors before execution.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Model {
        if factor < 1.0 {
            warn!(
                factor,
                "downscaling a model loses edges; aggressive downscaling collapses intervals"
            );
        }

        let mut meta = self.meta.clone();
        let new_scale = meta.scale_factor() * factor;
        meta.values
            .insert(SCALE_KEY.to_owned(), format_scale(new_scale));

        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeRecord::new(n.start * factor, n.end * factor, n.node_type.clone()))
            .collect();

        let mut clamped: Amount = 0;
        let mut total_blocks: Amount = 0;
        let edges = self
            .edges
            .iter()
            .map(|record| EdgeRecord {
                edge_type: record.edge_type.clone(),
                blocks: record
                    .blocks
                    .iter()
                    .map(|b| {
                        total_blocks += 1;
                        let mut probability = b.probability / factor;
                        if probability > 1.0 {
                            probability = 1.0;
                            clamped += 1;
                        }
                        EdgeBlock::new(
                            b.start_x * factor,
                            b.end_x * factor,
                            b.start_y * factor,
                            b.end_y * factor,
                            probability,
                        )
                    })
                    .collect(),
            })
            .collect();

        if clamped > 0 {
            warn!(
                clamped,
                total_blocks,
                percent = clamped as f64 / total_blocks as f64 * 100.0,
                "block probabilities above 1.0 remain after scaling"
            );
        }

        Model { meta, nodes, edges }
    }
}

/// Renders a scale factor for the `SCALE` meta entry. Debug formatting keeps
/// a trailing `.0` on whole numbers (`2.0`, not `2`).
#[must_use]
pub(crate) fn format_scale(value: f64) -> String {
    format!("{value:?}")
}
