//! Streams tab-separated node and edge files into a [`GraphFitter`].
//!
//! Every file starts with a mandatory header row whose column count defines
//! the expected arity. Configured column indices are validated against the
//! header before any data row is read; rows whose arity differs from the
//! header are skipped and counted. Composite type labels join the selected
//! columns with `_`.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{error::IngestError, fitter::GraphFitter};

/// Column layout and file list for one `-Read` invocation.
#[derive(Clone, Debug)]
pub struct TsvReader {
    node_files: Vec<PathBuf>,
    edge_files: Vec<PathBuf>,
    node_id_column: usize,
    node_type_columns: Vec<usize>,
    src_column: usize,
    dst_column: usize,
    edge_type_columns: Vec<usize>,
}

impl TsvReader {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_files: Vec<PathBuf>,
        edge_files: Vec<PathBuf>,
        node_id_column: usize,
        node_type_columns: Vec<usize>,
        src_column: usize,
        dst_column: usize,
        edge_type_columns: Vec<usize>,
    ) -> Self {
        Self {
            node_files,
            edge_files,
            node_id_column,
            node_type_columns,
            src_column,
            dst_column,
            edge_type_columns,
        }
    }

    /// Streams every configured file into `fitter`, node files first so that
    /// edge endpoints can be typed.
    pub fn read_into(&self, fitter: &mut GraphFitter) -> Result<(), IngestError> {
        for path in &self.node_files {
            self.read_node_file(path, fitter)?;
        }
        for path in &self.edge_files {
            self.read_edge_file(path, fitter)?;
        }
        Ok(())
    }

    fn read_node_file(&self, path: &Path, fitter: &mut GraphFitter) -> Result<(), IngestError> {
        let mut lines = open_lines(path)?;
        let header = read_header(path, &mut lines)?;
        check_column(path, "node id", self.node_id_column, &header)?;
        check_columns(path, "node type", &self.node_type_columns, &header)?;
        info!(
            path = %path.display(),
            id_column = header[self.node_id_column].as_str(),
            type_columns = ?selected(&header, &self.node_type_columns),
            "reading node file"
        );

        let mut accepted: u64 = 0;
        let mut skipped: u64 = 0;
        for line in lines {
            let line = line.map_err(|source| io_error(path, source))?;
            let Some(columns) = split_row(&line, header.len()) else {
                skipped += 1;
                debug!(line = line.as_str(), "skipping row with mismatched arity");
                continue;
            };
            let node_type = composite_label(&columns, &self.node_type_columns);
            fitter.observe_node(columns[self.node_id_column], &node_type);
            accepted += 1;
        }
        info!(path = %path.display(), nodes = accepted, skipped, "node file ingested");
        Ok(())
    }

    fn read_edge_file(&self, path: &Path, fitter: &mut GraphFitter) -> Result<(), IngestError> {
        let mut lines = open_lines(path)?;
        let header = read_header(path, &mut lines)?;
        check_column(path, "source node id", self.src_column, &header)?;
        check_column(path, "destination node id", self.dst_column, &header)?;
        check_columns(path, "edge type", &self.edge_type_columns, &header)?;
        info!(
            path = %path.display(),
            src_column = header[self.src_column].as_str(),
            dst_column = header[self.dst_column].as_str(),
            type_columns = ?selected(&header, &self.edge_type_columns),
            "reading edge file"
        );

        let mut accepted: u64 = 0;
        let mut skipped: u64 = 0;
        for line in lines {
            let line = line.map_err(|source| io_error(path, source))?;
            let Some(columns) = split_row(&line, header.len()) else {
                skipped += 1;
                debug!(line = line.as_str(), "skipping row with mismatched arity");
                continue;
            };
            let edge_type = composite_label(&columns, &self.edge_type_columns);
            fitter.observe_edge(
                columns[self.src_column],
                columns[self.dst_column],
                &edge_type,
            );
            accepted += 1;
        }
        info!(path = %path.display(), edges = accepted, skipped, "edge file ingested");
        Ok(())
    }
}

fn open_lines(path: &Path) -> Result<std::io::Lines<BufReader<File>>, IngestError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    Ok(BufReader::new(file).lines())
}

fn io_error(path: &Path, source: std::io::Error) -> IngestError {
    IngestError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_header(
    path: &Path,
    lines: &mut std::io::Lines<BufReader<File>>,
) -> Result<Vec<String>, IngestError> {
    let Some(line) = lines.next() else {
        return Err(IngestError::MissingHeader {
            path: path.to_path_buf(),
        });
    };
    let line = line.map_err(|source| io_error(path, source))?;
    Ok(strip_carriage_return(&line)
        .split('\t')
        .map(str::to_owned)
        .collect())
}

fn check_column(
    path: &Path,
    what: &'static str,
    index: usize,
    header: &[String],
) -> Result<(), IngestError> {
    if index >= header.len() {
        return Err(IngestError::ColumnOutOfRange {
            what,
            index,
            columns: header.len(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn check_columns(
    path: &Path,
    what: &'static str,
    indices: &[usize],
    header: &[String],
) -> Result<(), IngestError> {
    match indices.iter().max() {
        Some(&highest) => check_column(path, what, highest, header),
        None => Ok(()),
    }
}

fn selected<'a>(header: &'a [String], indices: &[usize]) -> Vec<&'a str> {
    indices.iter().map(|&i| header[i].as_str()).collect()
}

/// Splits one data row, returning `None` when its arity differs from the
/// header. Stray `\r` characters from Windows line endings are stripped.
fn split_row(line: &str, expected: usize) -> Option<Vec<&str>> {
    let columns: Vec<&str> = strip_carriage_return(line).split('\t').collect();
    (columns.len() == expected).then_some(columns)
}

fn strip_carriage_return(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn composite_label(columns: &[&str], indices: &[usize]) -> String {
    indices
        .iter()
        .map(|&i| columns[i])
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use rstest::rstest;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).expect("fixture file must be creatable");
        file.write_all(contents.as_bytes())
            .expect("fixture file must be writable");
        path
    }

    fn default_reader(node_files: Vec<PathBuf>, edge_files: Vec<PathBuf>) -> TsvReader {
        TsvReader::new(node_files, edge_files, 0, vec![1], 0, 1, vec![2])
    }

    #[test]
    fn reads_nodes_then_edges_into_the_fitter() {
        let dir = TempDir::new().expect("temp dir");
        let nodes = write_file(&dir, "n.tsv", "id\tkind\n1\tA\n2\tA\n3\tB\n");
        let edges = write_file(&dir, "e.tsv", "src\tdst\tkind\n1\t2\tE\n1\t3\tE\n");
        let mut fitter = GraphFitter::new();
        default_reader(vec![nodes], vec![edges])
            .read_into(&mut fitter)
            .expect("ingest must succeed");
        assert_eq!(fitter.observed_nodes(), 3);
        assert_eq!(fitter.untyped_edges(), 0);
    }

    #[test]
    fn mismatched_rows_are_skipped() {
        let dir = TempDir::new().expect("temp dir");
        let nodes = write_file(&dir, "n.tsv", "id\tkind\n1\tA\nbroken row without tab\n2\tB\n");
        let mut fitter = GraphFitter::new();
        default_reader(vec![nodes], vec![])
            .read_into(&mut fitter)
            .expect("ingest must succeed");
        assert_eq!(fitter.observed_nodes(), 2);
    }

    #[test]
    fn windows_line_endings_are_tolerated() {
        let dir = TempDir::new().expect("temp dir");
        let nodes = write_file(&dir, "n.tsv", "id\tkind\r\n1\tA\r\n2\tB\r\n");
        let mut fitter = GraphFitter::new();
        default_reader(vec![nodes], vec![])
            .read_into(&mut fitter)
            .expect("ingest must succeed");
        assert_eq!(fitter.observed_nodes(), 2);
    }

    #[test]
    fn composite_labels_join_columns_with_underscores() {
        let dir = TempDir::new().expect("temp dir");
        let nodes = write_file(&dir, "n.tsv", "id\tkind\tregion\n7\tuser\teu\n");
        let mut fitter = GraphFitter::new();
        TsvReader::new(vec![nodes], vec![], 0, vec![1, 2], 0, 1, vec![2])
            .read_into(&mut fitter)
            .expect("ingest must succeed");
        let model = fitter.compile(Default::default(), 0);
        assert_eq!(model.nodes[0].node_type, "user_eu");
    }

    #[rstest]
    #[case(5, vec![1])]
    #[case(0, vec![9])]
    fn out_of_range_columns_fail_before_data_rows(
        #[case] id_column: usize,
        #[case] type_columns: Vec<usize>,
    ) {
        let dir = TempDir::new().expect("temp dir");
        let nodes = write_file(&dir, "n.tsv", "id\tkind\n1\tA\n");
        let mut fitter = GraphFitter::new();
        let err = TsvReader::new(vec![nodes], vec![], id_column, type_columns, 0, 1, vec![2])
            .read_into(&mut fitter)
            .expect_err("invalid column configuration must fail");
        assert!(matches!(err, IngestError::ColumnOutOfRange { .. }));
        assert_eq!(fitter.observed_nodes(), 0);
    }

    #[test]
    fn empty_file_is_missing_a_header() {
        let dir = TempDir::new().expect("temp dir");
        let nodes = write_file(&dir, "n.tsv", "");
        let mut fitter = GraphFitter::new();
        let err = default_reader(vec![nodes], vec![])
            .read_into(&mut fitter)
            .expect_err("empty file must fail");
        assert!(matches!(err, IngestError::MissingHeader { .. }));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let mut fitter = GraphFitter::new();
        let err = default_reader(vec![PathBuf::from("/nonexistent/n.tsv")], vec![])
            .read_into(&mut fitter)
            .expect_err("missing file must fail");
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
