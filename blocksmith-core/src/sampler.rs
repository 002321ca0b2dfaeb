//! Samples realized graphs from a model into TSV node and edge files.
//!
//! Every block is an independent Bernoulli rectangle. Cells are enumerated in
//! row-major order and the gap between accepted cells is drawn from the
//! geometric distribution with Devroye's logarithm method, so sparse blocks
//! cost time proportional to the number of edges rather than the number of
//! cells. Blocks of one edge-type are partitioned across workers; each block
//! owns a PRNG seeded from the caller's seed, which keeps the sampled edge
//! set independent of the worker count.

use std::{
    fmt::Write as _,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
    thread,
    time::Instant,
};

use rand::{distributions::Open01, rngs::SmallRng, Rng, SeedableRng};
use tracing::info;

use crate::{
    error::SamplerError,
    model::{interval_end, interval_start, EdgeBlock, Model, NodeId, Probability},
    rng::mix_seed,
};

/// Worker-local output buffer capacity in bytes.
const BUFFER_CAPACITY: usize = 100_000;
/// Flush headroom so one more serialized edge always fits.
const BUFFER_SAFETY_MARGIN: usize = 500;
/// Below this many blocks the threading overhead is not worth paying.
const PARALLEL_THRESHOLD: usize = 100;

/// Byte counts produced by one sampling run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SampleReport {
    pub node_bytes: u64,
    pub edge_bytes: u64,
}

/// Block with recovered integer corners, ready for cell enumeration.
#[derive(Clone, Copy, Debug)]
struct IntBlock {
    start_x: NodeId,
    end_x: NodeId,
    start_y: NodeId,
    end_y: NodeId,
    probability: Probability,
}

/// Writes one realized graph drawn from `model` with `seed`.
///
/// The node file lists every integer id covered by the model's node
/// intervals with its type; the edge file holds one
/// `src<TAB>dst<TAB>type` row per drawn edge, grouped by edge-type in
/// canonical order. Row order within an edge-type is not part of the
/// contract; the drawn edge set for a given seed is.
pub fn generate_graph(
    node_path: &Path,
    edge_path: &Path,
    model: &Model,
    seed: u64,
) -> Result<SampleReport, SamplerError> {
    let node_bytes = write_node_file(node_path, model)?;
    info!(path = %node_path.display(), bytes = node_bytes, "node file written");

    let started = Instant::now();
    let edge_bytes = write_edge_file(edge_path, model, seed)?;
    let elapsed = started.elapsed().as_secs_f64();
    info!(
        path = %edge_path.display(),
        bytes = edge_bytes,
        elapsed_seconds = elapsed,
        "edge file written"
    );

    Ok(SampleReport {
        node_bytes,
        edge_bytes,
    })
}

fn write_node_file(path: &Path, model: &Model) -> Result<u64, SamplerError> {
    let file = File::create(path).map_err(|source| io_error(path, source))?;
    let mut writer = BufWriter::new(file);
    let mut bytes: u64 = 0;
    let mut line = String::with_capacity(128);
    for record in &model.nodes {
        let first = interval_start(record.start);
        let last = interval_end(record.end);
        for id in first..=last {
            line.clear();
            let _ = writeln!(line, "{id}\t{}", record.node_type);
            writer
                .write_all(line.as_bytes())
                .map_err(|source| io_error(path, source))?;
            bytes += line.len() as u64;
        }
    }
    writer.flush().map_err(|source| io_error(path, source))?;
    Ok(bytes)
}

fn write_edge_file(path: &Path, model: &Model, seed: u64) -> Result<u64, SamplerError> {
    let file = File::create(path).map_err(|source| io_error(path, source))?;
    let writer = Mutex::new(BufWriter::new(file));
    let bytes_written = AtomicU64::new(0);
    let write_error: Mutex<Option<io::Error>> = Mutex::new(None);
    let mut rng = SmallRng::seed_from_u64(seed);

    for record in &model.edges {
        let blocks = integer_blocks(&record.blocks);
        let base_seed: u64 = rng.gen();
        if blocks.is_empty() {
            continue;
        }

        if blocks.len() < PARALLEL_THRESHOLD {
            sample_block_range(
                &blocks,
                0,
                &record.edge_type,
                base_seed,
                &writer,
                &bytes_written,
                &write_error,
            );
        } else {
            let chunk_size = blocks.len().div_ceil(worker_count());
            rayon::scope(|scope| {
                for (chunk_index, chunk) in blocks.chunks(chunk_size).enumerate() {
                    let edge_type = record.edge_type.as_str();
                    let writer = &writer;
                    let bytes_written = &bytes_written;
                    let write_error = &write_error;
                    scope.spawn(move |_| {
                        sample_block_range(
                            chunk,
                            (chunk_index * chunk_size) as u64,
                            edge_type,
                            base_seed,
                            writer,
                            bytes_written,
                            write_error,
                        );
                    });
                }
            });
        }

        let mut slot = write_error.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(source) = slot.take() {
            return Err(io_error(path, source));
        }
    }

    let mut writer = writer.into_inner().unwrap_or_else(PoisonError::into_inner);
    writer.flush().map_err(|source| io_error(path, source))?;
    Ok(bytes_written.load(Ordering::Relaxed))
}

/// Recovers integer block corners from the continuous representation,
/// dropping rectangles that collapsed during downscaling and clamping
/// probabilities into `[0, 1]`.
fn integer_blocks(blocks: &[EdgeBlock]) -> Vec<IntBlock> {
    blocks
        .iter()
        .filter_map(|b| {
            let start_x = interval_start(b.start_x);
            let end_x = interval_end(b.end_x);
            let start_y = interval_start(b.start_y);
            let end_y = interval_end(b.end_y);
            if end_x < start_x || end_y < start_y {
                return None;
            }
            Some(IntBlock {
                start_x,
                end_x,
                start_y,
                end_y,
                probability: b.probability.min(1.0),
            })
        })
        .collect()
}

fn worker_count() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get().saturating_sub(1).max(1))
}

fn sample_block_range(
    blocks: &[IntBlock],
    index_offset: u64,
    edge_type: &str,
    base_seed: u64,
    writer: &Mutex<BufWriter<File>>,
    bytes_written: &AtomicU64,
    write_error: &Mutex<Option<io::Error>>,
) {
    let mut buffer = String::with_capacity(BUFFER_CAPACITY);
    for (index, block) in blocks.iter().enumerate() {
        let block_seed = mix_seed(base_seed, index_offset + index as u64);
        let mut rng = SmallRng::seed_from_u64(block_seed);
        if !sample_block(
            block,
            edge_type,
            &mut rng,
            &mut buffer,
            writer,
            bytes_written,
            write_error,
        ) {
            return;
        }
    }
    if !buffer.is_empty() {
        flush_buffer(&mut buffer, writer, bytes_written, write_error);
    }
}

/// Draws the edges of one block into `buffer`, flushing to the shared writer
/// whenever the buffer approaches capacity. Returns `false` once writing has
/// failed, which stops the surrounding block range.
fn sample_block(
    block: &IntBlock,
    edge_type: &str,
    rng: &mut SmallRng,
    buffer: &mut String,
    writer: &Mutex<BufWriter<File>>,
    bytes_written: &AtomicU64,
    write_error: &Mutex<Option<io::Error>>,
) -> bool {
    let p = block.probability;
    // The denominator of Devroye's geometric inversion is constant per
    // block; log2 of the uniform draw times ln(2) recovers the natural log.
    let denominator = (1.0 / (1.0 - p).ln()) * std::f64::consts::LN_2;
    let width = block.end_x - block.start_x + 1;

    let mut x_offset: u64 = 0;
    let mut y = block.start_y;
    loop {
        let u: f64 = rng.sample(Open01);
        let gap = 1.0 + (u.log2() * denominator).ceil();
        if !gap.is_finite() {
            break;
        }
        let Some(cursor) = x_offset.checked_add(gap as u64) else {
            break;
        };
        x_offset = cursor % width;
        let Some(next_y) = y.checked_add(cursor / width) else {
            break;
        };
        y = next_y;
        if y > block.end_y {
            break;
        }

        let _ = writeln!(buffer, "{}\t{}\t{}", block.start_x + x_offset, y, edge_type);
        if buffer.len() >= BUFFER_CAPACITY - BUFFER_SAFETY_MARGIN
            && !flush_buffer(buffer, writer, bytes_written, write_error)
        {
            return false;
        }
    }
    true
}

fn flush_buffer(
    buffer: &mut String,
    writer: &Mutex<BufWriter<File>>,
    bytes_written: &AtomicU64,
    write_error: &Mutex<Option<io::Error>>,
) -> bool {
    let result = {
        let mut guard = writer.lock().unwrap_or_else(PoisonError::into_inner);
        guard.write_all(buffer.as_bytes())
    };
    match result {
        Ok(()) => {
            bytes_written.fetch_add(buffer.len() as u64, Ordering::Relaxed);
            buffer.clear();
            true
        }
        Err(source) => {
            let mut slot = write_error.lock().unwrap_or_else(PoisonError::into_inner);
            slot.get_or_insert(source);
            buffer.clear();
            false
        }
    }
}

fn io_error(path: &Path, source: io::Error) -> SamplerError {
    SamplerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{BTreeSet, HashMap};
    use std::path::PathBuf;

    use tempfile::TempDir;

    use crate::model::{EdgeRecord, MetaRecord, NodeRecord};

    fn block_model(nodes: Vec<NodeRecord>, edge_type: &str, blocks: Vec<EdgeBlock>) -> Model {
        let mut model = Model {
            meta: MetaRecord {
                name: "test".into(),
                values: Default::default(),
            },
            nodes,
            edges: vec![EdgeRecord {
                edge_type: edge_type.into(),
                blocks,
            }],
        };
        model.normalize();
        model
    }

    fn sample_to_dir(model: &Model, seed: u64) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let nodes = dir.path().join("n.tsv");
        let edges = dir.path().join("e.tsv");
        generate_graph(&nodes, &edges, model, seed).expect("sampling must succeed");
        (dir, nodes, edges)
    }

    fn read_edges(path: &Path) -> Vec<(u64, u64, String)> {
        std::fs::read_to_string(path)
            .expect("edge file must be readable")
            .lines()
            .map(|line| {
                let mut fields = line.split('\t');
                let src = fields.next().expect("src").parse().expect("src id");
                let dst = fields.next().expect("dst").parse().expect("dst id");
                let edge_type = fields.next().expect("type").to_owned();
                (src, dst, edge_type)
            })
            .collect()
    }

    #[test]
    fn node_file_enumerates_every_interval_id() {
        let model = block_model(
            vec![
                NodeRecord::new(0.0, 3.0, "A"),
                NodeRecord::new(3.0, 5.0, "B"),
            ],
            "E",
            vec![EdgeBlock::new(0.0, 3.0, 0.0, 3.0, 0.5)],
        );
        let (_dir, nodes, _edges) = sample_to_dir(&model, 1);
        let contents = std::fs::read_to_string(nodes).expect("node file");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["1\tA", "2\tA", "3\tA", "4\tB", "5\tB"]);
    }

    #[test]
    fn saturated_block_fills_all_but_the_first_cell() {
        let model = block_model(
            vec![NodeRecord::new(0.0, 3.0, "A")],
            "E",
            vec![EdgeBlock::new(0.0, 3.0, 0.0, 3.0, 1.0)],
        );
        let (_dir, _nodes, edges) = sample_to_dir(&model, 9);
        let drawn = read_edges(&edges);
        // The geometric gap is at least one cell, so the cursor can never
        // land on the rectangle's first cell.
        assert_eq!(drawn.len(), 8);
        let unique: BTreeSet<_> = drawn.iter().collect();
        assert_eq!(unique.len(), drawn.len());
        for (src, dst, edge_type) in &drawn {
            assert!((1..=3).contains(src));
            assert!((1..=3).contains(dst));
            assert_eq!(edge_type, "E");
        }
    }

    #[test]
    fn degenerate_blocks_are_skipped_without_edges() {
        let model = block_model(
            vec![NodeRecord::new(0.0, 3.0, "A")],
            "E",
            vec![EdgeBlock::new(2.0, 1.0, 0.0, 3.0, 0.9)],
        );
        let (_dir, _nodes, edges) = sample_to_dir(&model, 3);
        assert!(read_edges(&edges).is_empty());
    }

    #[test]
    fn zero_probability_blocks_produce_nothing() {
        let model = block_model(
            vec![NodeRecord::new(0.0, 10.0, "A")],
            "E",
            vec![EdgeBlock::new(0.0, 10.0, 0.0, 10.0, 0.0)],
        );
        let (_dir, _nodes, edges) = sample_to_dir(&model, 3);
        assert!(read_edges(&edges).is_empty());
    }

    #[test]
    fn same_seed_draws_the_same_edge_set_across_runs() {
        // More than PARALLEL_THRESHOLD blocks, so the partitioned path runs.
        let blocks: Vec<EdgeBlock> = (0..150)
            .map(|i| {
                let x = (i % 15) as f64 * 10.0;
                let y = (i / 15) as f64 * 10.0;
                EdgeBlock::new(x, x + 10.0, y, y + 10.0, 0.3)
            })
            .collect();
        let model = block_model(vec![NodeRecord::new(0.0, 150.0, "A")], "E", blocks);

        let (_d1, _n1, e1) = sample_to_dir(&model, 77);
        let (_d2, _n2, e2) = sample_to_dir(&model, 77);
        let mut first = read_edges(&e1);
        let mut second = read_edges(&e2);
        first.sort_unstable();
        second.sort_unstable();
        assert!(!first.is_empty());
        assert_eq!(first, second);

        let (_d3, _n3, e3) = sample_to_dir(&model, 78);
        let mut other = read_edges(&e3);
        other.sort_unstable();
        assert_ne!(first, other);
    }

    #[test]
    fn edge_file_groups_rows_by_edge_type() {
        let mut model = block_model(
            vec![NodeRecord::new(0.0, 20.0, "A")],
            "X",
            vec![EdgeBlock::new(0.0, 20.0, 0.0, 20.0, 0.5)],
        );
        model.edges.push(EdgeRecord {
            edge_type: "Y".into(),
            blocks: vec![EdgeBlock::new(0.0, 20.0, 0.0, 20.0, 0.5)],
        });
        model.normalize();
        let (_dir, _nodes, edges) = sample_to_dir(&model, 5);
        let drawn = read_edges(&edges);
        let first_y = drawn.iter().position(|(_, _, t)| t == "Y").expect("Y edges");
        assert!(
            drawn[..first_y].iter().all(|(_, _, t)| t == "X"),
            "all X rows must precede the first Y row"
        );
        assert!(drawn[first_y..].iter().all(|(_, _, t)| t == "Y"));
    }

    #[test]
    fn sparse_block_density_tracks_the_probability() {
        let model = block_model(
            vec![NodeRecord::new(0.0, 500.0, "A")],
            "E",
            vec![EdgeBlock::new(0.0, 500.0, 0.0, 200.0, 0.01)],
        );
        let (_dir, _nodes, edges) = sample_to_dir(&model, 1234);
        let count = read_edges(&edges).len();
        // 100,000 cells at p = 0.01: expect roughly a thousand edges.
        assert!((800..=1200).contains(&count), "unexpected edge count {count}");
    }

    #[test]
    fn drawn_edges_stay_inside_their_block() {
        let model = block_model(
            vec![NodeRecord::new(0.0, 40.0, "A")],
            "E",
            vec![
                EdgeBlock::new(0.0, 10.0, 20.0, 40.0, 0.4),
                EdgeBlock::new(10.0, 40.0, 0.0, 20.0, 0.2),
            ],
        );
        let (_dir, nodes, edges) = sample_to_dir(&model, 21);
        let node_ids: HashMap<u64, String> = std::fs::read_to_string(nodes)
            .expect("node file")
            .lines()
            .map(|line| {
                let (id, node_type) = line.split_once('\t').expect("id and type");
                (id.parse().expect("node id"), node_type.to_owned())
            })
            .collect();

        for (src, dst, _) in read_edges(&edges) {
            assert!(node_ids.contains_key(&src), "source {src} missing from node file");
            assert!(node_ids.contains_key(&dst), "destination {dst} missing from node file");
            let contained = model.edges[0].blocks.iter().any(|b| {
                (interval_start(b.start_x)..=interval_end(b.end_x)).contains(&src)
                    && (interval_start(b.start_y)..=interval_end(b.end_y)).contains(&dst)
            });
            assert!(contained, "edge ({src}, {dst}) outside every block");
        }
    }
}
