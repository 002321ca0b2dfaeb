//! Line-oriented text serialization for [`Model`] values.
//!
//! The format has three section kinds introduced by `#` directives: one
//! `# META` block of `KEY=VALUE` entries, one `# NODES` block of
//! `start,end,type` intervals, and one `# EDGES=<type>` block per edge-type
//! holding `startX,endX,startY,endY,probability` rows. Reading is lenient
//! about malformed individual rows (skipped with a warning) but strict about
//! missing sections and unknown directives.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use tracing::{info, warn};

use crate::{
    error::CodecError,
    model::{EdgeBlock, EdgeRecord, Model, NodeRecord},
};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Section {
    None,
    Meta,
    Nodes,
    Edges,
}

/// Deserializes a model file.
///
/// # Errors
/// Returns [`CodecError`] when the file cannot be read, contains an unknown
/// directive, or lacks a META entry (including NAME), a NODES row, or an
/// EDGES row.
pub fn read_model(path: &Path) -> Result<Model, CodecError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let reader = BufReader::new(file);

    let mut model = Model::default();
    let mut has_meta = false;
    let mut current_edge_type = String::new();
    let mut current_blocks: Vec<EdgeBlock> = Vec::new();
    let mut section = Section::None;

    for line in reader.lines() {
        let line = line.map_err(|source| io_error(path, source))?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.is_empty() {
            continue;
        }

        if let Some(directive) = line.strip_prefix('#') {
            let directive = directive.trim_start();
            if directive.starts_with("META") {
                section = Section::Meta;
            } else if directive.starts_with("NODES") {
                section = Section::Nodes;
            } else if directive.starts_with("EDGES") {
                section = Section::Edges;
                flush_edge_record(&mut model, &mut current_edge_type, &mut current_blocks);
                current_edge_type = line
                    .split_once('=')
                    .map(|(_, edge_type)| edge_type.to_owned())
                    .unwrap_or_default();
            } else {
                return Err(CodecError::UnknownDirective {
                    line: line.to_owned(),
                    path: path.to_path_buf(),
                });
            }
            continue;
        }

        match section {
            Section::None => {
                return Err(CodecError::OrphanLine {
                    line: line.to_owned(),
                    path: path.to_path_buf(),
                });
            }
            Section::Meta => {
                let Some((key, value)) = line.split_once('=') else {
                    warn!(line, "skipping meta row without a key/value separator");
                    continue;
                };
                if key.is_empty() || value.is_empty() {
                    warn!(line, "skipping incomplete meta row");
                    continue;
                }
                if key == "NAME" {
                    model.meta.name = value.to_owned();
                    has_meta = true;
                } else {
                    model.meta.values.insert(key.to_owned(), value.to_owned());
                }
            }
            Section::Nodes => {
                let mut fields = line.splitn(3, ',');
                let (Some(start), Some(end), Some(node_type)) =
                    (fields.next(), fields.next(), fields.next())
                else {
                    warn!(line, "skipping incomplete node row");
                    continue;
                };
                if start.is_empty() || end.is_empty() || node_type.is_empty() {
                    warn!(line, "skipping incomplete node row");
                    continue;
                }
                let (Ok(start), Ok(end)) = (start.parse::<f64>(), end.parse::<f64>()) else {
                    warn!(line, "skipping node row with unparsable interval endpoints");
                    continue;
                };
                model.nodes.push(NodeRecord::new(start, end, node_type));
            }
            Section::Edges => {
                let mut fields = line.splitn(5, ',');
                let (Some(sx), Some(ex), Some(sy), Some(ey), Some(p)) = (
                    fields.next(),
                    fields.next(),
                    fields.next(),
                    fields.next(),
                    fields.next(),
                ) else {
                    warn!(line, "skipping incomplete block row");
                    continue;
                };
                let parsed = (
                    sx.parse::<f64>(),
                    ex.parse::<f64>(),
                    sy.parse::<f64>(),
                    ey.parse::<f64>(),
                    p.parse::<f64>(),
                );
                let (Ok(sx), Ok(ex), Ok(sy), Ok(ey), Ok(p)) = parsed else {
                    warn!(line, "skipping block row with unparsable fields");
                    continue;
                };
                current_blocks.push(EdgeBlock::new(sx, ex, sy, ey, p));
            }
        }
    }
    flush_edge_record(&mut model, &mut current_edge_type, &mut current_blocks);

    if !has_meta {
        return Err(CodecError::MissingMeta {
            path: path.to_path_buf(),
        });
    }
    if model.nodes.is_empty() {
        return Err(CodecError::MissingNodes {
            path: path.to_path_buf(),
        });
    }
    if model.edges.is_empty() {
        return Err(CodecError::MissingEdges {
            path: path.to_path_buf(),
        });
    }

    model.normalize();
    info!(
        path = %path.display(),
        node_types = model.nodes.len(),
        edge_types = model.edges.len(),
        "model loaded"
    );
    Ok(model)
}

fn flush_edge_record(model: &mut Model, edge_type: &mut String, blocks: &mut Vec<EdgeBlock>) {
    if blocks.is_empty() {
        return;
    }
    model.edges.push(EdgeRecord {
        edge_type: std::mem::take(edge_type),
        blocks: std::mem::take(blocks),
    });
}

/// Serializes `model` to `path`, returning the number of bytes written.
///
/// # Errors
/// Returns [`CodecError`] when the parent directory does not exist, a meta
/// key contains `=`, any emitted string contains a newline, or writing
/// fails. An empty model name is tolerated with a warning, although the
/// resulting file will not load back.
pub fn write_model(path: &Path, model: &Model) -> Result<u64, CodecError> {
    validate_writable(model)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CodecError::MissingParentDir {
                path: parent.to_path_buf(),
            });
        }
    }

    let file = File::create(path).map_err(|source| io_error(path, source))?;
    let mut writer = CountingWriter::new(BufWriter::new(file));
    write_sections(&mut writer, model).map_err(|source| io_error(path, source))?;
    Ok(writer.bytes)
}

fn validate_writable(model: &Model) -> Result<(), CodecError> {
    if model.meta.name.is_empty() {
        warn!("the model carries no name; the written file will not load back");
    }
    for (key, value) in &model.meta.values {
        if key.contains('=') {
            return Err(forbidden("meta key", key));
        }
        if key.contains('\n') {
            return Err(forbidden("meta key", key));
        }
        if value.contains('\n') {
            return Err(forbidden("meta value", value));
        }
    }
    for node in &model.nodes {
        if node.node_type.contains('\n') {
            return Err(forbidden("node type", &node.node_type));
        }
    }
    for record in &model.edges {
        if record.edge_type.contains('\n') {
            return Err(forbidden("edge type", &record.edge_type));
        }
    }
    Ok(())
}

fn forbidden(what: &'static str, value: &str) -> CodecError {
    CodecError::ForbiddenCharacter {
        what,
        value: value.to_owned(),
    }
}

fn write_sections<W: Write>(writer: &mut CountingWriter<W>, model: &Model) -> io::Result<()> {
    writeln!(writer, "# META")?;
    writeln!(writer, "NAME={}", model.meta.name)?;
    for (key, value) in &model.meta.values {
        writeln!(writer, "{key}={value}")?;
    }
    writeln!(writer)?;

    writeln!(writer, "# NODES")?;
    for node in &model.nodes {
        writeln!(writer, "{},{},{}", node.start, node.end, node.node_type)?;
    }
    writeln!(writer)?;

    for record in &model.edges {
        writeln!(writer, "# EDGES={}", record.edge_type)?;
        for b in &record.blocks {
            writeln!(
                writer,
                "{},{},{},{},{}",
                b.start_x, b.end_x, b.start_y, b.end_y, b.probability
            )?;
        }
        writeln!(writer)?;
    }
    writer.flush()
}

fn io_error(path: &Path, source: io::Error) -> CodecError {
    CodecError::Io {
        path: path.to_path_buf(),
        source,
    }
}

struct CountingWriter<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
