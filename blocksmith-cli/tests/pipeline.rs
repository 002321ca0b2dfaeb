//! End-to-end pipeline tests driving the CLI orchestration layer:
//! fit from TSV, rescale, persist, reload, and sample.

use std::path::{Path, PathBuf};

use blocksmith_cli::cli::{run_cli, Cli};
use blocksmith_core::{read_model, RunSummary, SCALE_KEY};
use tempfile::TempDir;

fn run(tokens: &[&str]) -> RunSummary {
    let cli = Cli {
        instructions: tokens.iter().map(|t| (*t).to_owned()).collect(),
    };
    run_cli(cli).expect("instructions must succeed")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

fn write_triangle_fixtures(dir: &TempDir) -> (PathBuf, PathBuf) {
    let nodes = dir.path().join("nodes.tsv");
    let edges = dir.path().join("edges.tsv");
    std::fs::write(&nodes, "id\tkind\n1\tA\n2\tA\n3\tA\n").expect("node fixture");
    std::fs::write(&edges, "src\tdst\tkind\n1\t2\tE\n2\t3\tE\n1\t3\tE\n").expect("edge fixture");
    (nodes, edges)
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("output file must be readable")
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn tiny_homogeneous_graph_fits_and_samples() {
    let dir = TempDir::new().expect("temp dir");
    let (nodes_in, edges_in) = write_triangle_fixtures(&dir);
    let model_out = dir.path().join("triangle.m1");
    let nodes_out = dir.path().join("sample_n.tsv");
    let edges_out = dir.path().join("sample_e.tsv");

    let summary = run(&[
        "-Seed", "tiny",
        "-Read",
        "+nodefile", path_str(&nodes_in),
        "+edgefile", path_str(&edges_in),
        "-Save", path_str(&model_out),
        "-Generate", path_str(&nodes_out), path_str(&edges_out), "1",
    ]);
    assert_eq!(summary.graphs_generated, 1);

    let model = read_model(&model_out).expect("fitted model must load back");
    assert_eq!(model.nodes.len(), 1);
    assert_eq!((model.nodes[0].start, model.nodes[0].end), (0.0, 3.0));
    assert_eq!(model.nodes[0].node_type, "A");
    assert_eq!(model.edges.len(), 1);
    assert_eq!(model.edges[0].edge_type, "E");
    // 3 edges over 9 ordered pairs: expectation preserved across blocks.
    let expectation: f64 = model.edges[0]
        .blocks
        .iter()
        .map(|b| b.probability * (b.end_x - b.start_x) * (b.end_y - b.start_y))
        .sum();
    assert!((expectation - 3.0).abs() < 1e-6);

    assert_eq!(
        read_lines(&nodes_out),
        vec!["1\tA", "2\tA", "3\tA"],
        "the sampled node file enumerates the fitted interval"
    );
    for line in read_lines(&edges_out) {
        let mut fields = line.split('\t');
        let src: u64 = fields.next().expect("src").parse().expect("src id");
        let dst: u64 = fields.next().expect("dst").parse().expect("dst id");
        assert!((1..=3).contains(&src));
        assert!((1..=3).contains(&dst));
        assert_eq!(fields.next(), Some("E"));
    }
}

#[test]
fn bipartite_fit_has_no_intra_type_blocks() {
    let dir = TempDir::new().expect("temp dir");
    let nodes_in = dir.path().join("nodes.tsv");
    let edges_in = dir.path().join("edges.tsv");
    std::fs::write(
        &nodes_in,
        "id\tkind\n1\tA\n2\tA\n3\tA\n4\tA\n5\tB\n6\tB\n7\tB\n8\tB\n",
    )
    .expect("node fixture");
    std::fs::write(
        &edges_in,
        "src\tdst\tkind\n1\t5\tL\n2\t6\tL\n3\t7\tL\n4\t8\tL\n",
    )
    .expect("edge fixture");
    let model_out = dir.path().join("bipartite.m1");

    run(&[
        "-Read",
        "+nodefile", path_str(&nodes_in),
        "+edgefile", path_str(&edges_in),
        "-Save", path_str(&model_out),
    ]);

    let model = read_model(&model_out).expect("model must load back");
    assert_eq!((model.nodes[0].start, model.nodes[0].end), (0.0, 4.0));
    assert_eq!(model.nodes[0].node_type, "A");
    for block in &model.edges[0].blocks {
        assert!(
            !(block.start_x < 4.0 && block.start_y < 4.0),
            "no block may pair A sources with A destinations"
        );
    }
}

#[test]
fn scaling_up_doubles_nodes_and_expected_edges() {
    let dir = TempDir::new().expect("temp dir");
    let (nodes_in, edges_in) = write_triangle_fixtures(&dir);
    let model_out = dir.path().join("doubled.m1");
    let nodes_out = dir.path().join("sample_n.tsv");
    let edges_out = dir.path().join("sample_e.tsv");

    run(&[
        "-Seed", "doubling",
        "-Read",
        "+nodefile", path_str(&nodes_in),
        "+edgefile", path_str(&edges_in),
        "-Scale", "2",
        "-Save", path_str(&model_out),
        "-Generate", path_str(&nodes_out), path_str(&edges_out), "1",
    ]);

    let model = read_model(&model_out).expect("scaled model must load back");
    assert_eq!(model.meta.values[SCALE_KEY], "2.0");
    assert_eq!((model.nodes[0].start, model.nodes[0].end), (0.0, 6.0));
    assert_eq!(read_lines(&nodes_out).len(), 6, "node count must double");
    // Expected edge count is conserved by the probability compensation.
    let expectation: f64 = model.edges[0]
        .blocks
        .iter()
        .map(|b| b.probability * (b.end_x - b.start_x) * (b.end_y - b.start_y))
        .sum();
    assert!((expectation - 6.0).abs() < 1e-6);
}

#[test]
fn scale_round_trip_through_files_restores_the_model() {
    let dir = TempDir::new().expect("temp dir");
    let original = dir.path().join("original.m1");
    std::fs::write(
        &original,
        "# META\nNAME=round\nSCALE=1.0\n\n# NODES\n0,7,A\n7,12,B\n\n# EDGES=E\n0,7,7,12,0.25\n1,3,8,9,0.5\n",
    )
    .expect("model fixture");
    let tripled = dir.path().join("tripled.m1");
    let restored = dir.path().join("restored.m1");

    run(&[
        "-Load", path_str(&original),
        "-Scale", "3",
        "-Save", path_str(&tripled),
    ]);
    run(&[
        "-Load", path_str(&tripled),
        "-Scale", "0.3333333333333333",
        "-Save", path_str(&restored),
    ]);

    let base = read_model(&original).expect("original must load");
    let round_tripped = read_model(&restored).expect("restored must load");
    assert_eq!(base.nodes.len(), round_tripped.nodes.len());
    for (a, b) in base.nodes.iter().zip(&round_tripped.nodes) {
        assert!((a.start - b.start).abs() < 1e-5);
        assert!((a.end - b.end).abs() < 1e-5);
        assert_eq!(a.node_type, b.node_type);
    }
    for (a, b) in base.edges.iter().zip(&round_tripped.edges) {
        assert_eq!(a.edge_type, b.edge_type);
        for (block_a, block_b) in a.blocks.iter().zip(&b.blocks) {
            assert!((block_a.start_x - block_b.start_x).abs() < 1e-5);
            assert!((block_a.end_x - block_b.end_x).abs() < 1e-5);
            assert!((block_a.start_y - block_b.start_y).abs() < 1e-5);
            assert!((block_a.end_y - block_b.end_y).abs() < 1e-5);
            assert!((block_a.probability - block_b.probability).abs() < 1e-6);
        }
    }
}

#[test]
fn included_scripts_see_substituted_templates() {
    let dir = TempDir::new().expect("temp dir");
    let (nodes_in, edges_in) = write_triangle_fixtures(&dir);
    let model_out = dir.path().join("m.m1");
    run(&[
        "-Read",
        "+nodefile", path_str(&nodes_in),
        "+edgefile", path_str(&edges_in),
        "-Save", path_str(&model_out),
    ]);

    let nodes_out = dir.path().join("out_n.tsv");
    let edges_out = dir.path().join("out_e.tsv");
    let inner = dir.path().join("inner.s1");
    std::fs::write(
        &inner,
        format!(
            "-Load \"@MODEL@\"\n-Generate \"{}\" \"{}\" 1\n",
            nodes_out.display(),
            edges_out.display()
        ),
    )
    .expect("inner script");

    let summary = run(&[
        "-Execute", path_str(&inner),
        "@MODEL@", path_str(&model_out),
    ]);
    assert_eq!(summary.scripts_included, 1);
    assert_eq!(summary.graphs_generated, 1);
    assert_eq!(read_lines(&nodes_out).len(), 3);
}

#[test]
fn degenerate_blocks_are_skipped_when_sampling() {
    let dir = TempDir::new().expect("temp dir");
    let model_path = dir.path().join("degenerate.m1");
    std::fs::write(
        &model_path,
        "# META\nNAME=degenerate\n\n# NODES\n0,4,A\n\n# EDGES=E\n3,1,0,4,0.9\n",
    )
    .expect("model fixture");
    let nodes_out = dir.path().join("n.tsv");
    let edges_out = dir.path().join("e.tsv");

    run(&[
        "-Load", path_str(&model_path),
        "-Generate", path_str(&nodes_out), path_str(&edges_out), "1",
    ]);

    assert_eq!(read_lines(&nodes_out).len(), 4);
    assert!(
        read_lines(&edges_out).is_empty(),
        "a collapsed rectangle must not produce edges"
    );
}

#[test]
fn multi_instance_generation_indexes_both_outputs() {
    let dir = TempDir::new().expect("temp dir");
    let (nodes_in, edges_in) = write_triangle_fixtures(&dir);
    let nodes_out = dir.path().join("batch_n.tsv");
    let edges_out = dir.path().join("batch_e.tsv");

    let summary = run(&[
        "-Read",
        "+nodefile", path_str(&nodes_in),
        "+edgefile", path_str(&edges_in),
        "-Generate", path_str(&nodes_out), path_str(&edges_out), "2",
    ]);
    assert_eq!(summary.graphs_generated, 2);
    for index in 0..2 {
        assert_eq!(
            read_lines(&dir.path().join(format!("batch_n_{index}.tsv"))).len(),
            3
        );
        assert!(dir.path().join(format!("batch_e_{index}.tsv")).exists());
    }
}
