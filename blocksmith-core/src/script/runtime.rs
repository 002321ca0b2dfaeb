//! Sequential executor for parsed instruction lists.
//!
//! The runtime owns the instruction queue, a cursor, the optional active
//! model, and the PRNG that hands out per-step seeds. `-Execute` splices the
//! included script's instructions directly after the cursor, so included
//! scripts observe the current active model; circular inclusion is not
//! detected.

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::info;

use crate::{
    codec,
    error::{Result, RuntimeError},
    fitter::GraphFitter,
    ingest::TsvReader,
    model::SCALE_KEY,
    model::Model,
    rng::seed_from_phrase,
    sampler,
    script::parse::{parse, ExecuteSpec, GenerateSpec, Instruction, ReadSpec},
    script::token::tokenize,
};

const HELP_TEXT: &str = "\
Use double quotes (\"...\") to retain tabs/spaces/linebreaks within an argument.
Instructions are not case-sensitive.

### Read tab-separated files and fit an active model in memory.
    -Read
        +nodefile [nodefile_path1] [nodefile_path2] ...
        +edgefile [edgefile_path1] [edgefile_path2] ...
        +nodeindex [index_of_node_id]
        +nodetypeindex [index_of_node_type1] [index_of_node_type2] ...
        +edgeindex [index_of_source_node] [index_of_destination_node]
        +edgetypeindex [index_of_edge_type1] [index_of_edge_type2] ...
        +arg [KEY] [VALUE]

### Run a script, substituting each template with its replacement first.
    -Execute [path_to_script] [template1] [replace1] [template2] [replace2] ...

### Load a model from a file and set it as the active model.
    -Load [path_to_model_file]

### Save the currently active model to a file.
    -Save [model_save_path]

### Scale the active model by the given factor. Scaling below 1.0 is lossy.
    -Scale [scaling_factor]

### Seed the PRNG used for fitting and generation from this point on.
    -Seed [seed_string]

### Generate n graphs from the active model at its current scale.
    -Generate [generated_nodefile_path] [generated_edgefile_path] [number_of_graphs]

### Display this usage documentation.
    -Help";

/// Counters reported after a script has run to completion.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub instructions_run: usize,
    pub scripts_included: usize,
    pub graphs_generated: usize,
}

/// Executes instructions strictly in queue order.
pub struct ScriptRuntime {
    instructions: Vec<Instruction>,
    cursor: usize,
    model: Option<Model>,
    rng: SmallRng,
    scripts_included: usize,
    graphs_generated: usize,
}

impl ScriptRuntime {
    /// Tokenizes and parses `script`, seeding the runtime PRNG from system
    /// entropy.
    pub fn from_script(script: &str) -> Result<Self> {
        let tokens = tokenize(script, &[])?;
        let instructions = parse(&tokens)?;
        Ok(Self::new(instructions))
    }

    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            cursor: 0,
            model: None,
            rng: SmallRng::from_entropy(),
            scripts_included: 0,
            graphs_generated: 0,
        }
    }

    /// Model produced by the most recent `-Read`, `-Load`, or `-Scale`.
    #[must_use]
    pub fn active_model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Runs every queued instruction, including ones spliced in by
    /// `-Execute` along the way.
    ///
    /// # Errors
    /// The first failing instruction aborts the run; there is no partial
    /// continuation.
    pub fn run(&mut self) -> Result<RunSummary> {
        while self.cursor < self.instructions.len() {
            let instruction = self.instructions[self.cursor].clone();
            match instruction {
                Instruction::Read(spec) => self.run_read(&spec)?,
                Instruction::Execute(spec) => self.run_execute(&spec)?,
                Instruction::Load { path } => self.run_load(&path)?,
                Instruction::Save { path } => self.run_save(&path)?,
                Instruction::Scale { factor } => self.run_scale(factor)?,
                Instruction::Seed { phrase } => self.run_seed(&phrase),
                Instruction::Generate(spec) => self.run_generate(&spec)?,
                Instruction::Help => self.run_help(),
            }
            self.cursor += 1;
        }
        let summary = RunSummary {
            instructions_run: self.cursor,
            scripts_included: self.scripts_included,
            graphs_generated: self.graphs_generated,
        };
        info!(
            instructions = summary.instructions_run,
            scripts = summary.scripts_included,
            graphs = summary.graphs_generated,
            "finished"
        );
        Ok(summary)
    }

    fn run_read(&mut self, spec: &ReadSpec) -> Result<()> {
        info!(instruction = self.cursor, "reading graph");
        let reader = TsvReader::new(
            spec.node_files.iter().map(PathBuf::from).collect(),
            spec.edge_files.iter().map(PathBuf::from).collect(),
            spec.node_id_column,
            spec.node_type_columns.clone(),
            spec.src_column,
            spec.dst_column,
            spec.edge_type_columns.clone(),
        );
        let mut fitter = GraphFitter::new();
        reader.read_into(&mut fitter)?;
        self.model = Some(fitter.compile(spec.meta.clone(), self.rng.gen()));
        Ok(())
    }

    fn run_execute(&mut self, spec: &ExecuteSpec) -> Result<()> {
        info!(
            instruction = self.cursor,
            script = spec.script_path.as_str(),
            "running script"
        );
        let text =
            fs::read_to_string(&spec.script_path).map_err(|source| RuntimeError::ScriptFile {
                path: PathBuf::from(&spec.script_path),
                source,
            })?;
        let tokens = tokenize(&text, &spec.substitutions)?;
        let included = parse(&tokens)?;
        let insert_at = self.cursor + 1;
        self.instructions.splice(insert_at..insert_at, included);
        self.scripts_included += 1;
        Ok(())
    }

    fn run_load(&mut self, path: &str) -> Result<()> {
        info!(instruction = self.cursor, path, "loading model");
        let model = codec::read_model(Path::new(path))?;
        info!(model = model.meta.name.as_str(), "active model set");
        self.model = Some(model);
        Ok(())
    }

    fn run_save(&mut self, path: &str) -> Result<()> {
        let model = self.model.as_ref().ok_or(RuntimeError::NoActiveModel {
            instruction: "-Save",
        })?;
        info!(
            instruction = self.cursor,
            model = model.meta.name.as_str(),
            path,
            "saving model"
        );
        let bytes = codec::write_model(Path::new(path), model)?;
        info!(bytes, "model saved");
        Ok(())
    }

    fn run_scale(&mut self, factor: f64) -> Result<()> {
        let model = self.model.as_ref().ok_or(RuntimeError::NoActiveModel {
            instruction: "-Scale",
        })?;
        info!(instruction = self.cursor, factor, "scaling model");
        let scaled = model.scaled(factor);
        info!(scale = scaled.meta.values[SCALE_KEY].as_str(), "new model scale");
        self.model = Some(scaled);
        Ok(())
    }

    fn run_seed(&mut self, phrase: &str) {
        info!(instruction = self.cursor, phrase, "reseeding generator");
        self.rng = SmallRng::seed_from_u64(seed_from_phrase(phrase));
    }

    fn run_generate(&mut self, spec: &GenerateSpec) -> Result<()> {
        let Some(model) = self.model.as_mut() else {
            return Err(RuntimeError::NoActiveModel {
                instruction: "-Generate",
            });
        };
        model
            .meta
            .values
            .entry(SCALE_KEY.to_owned())
            .or_insert_with(|| "1.0".to_owned());
        info!(
            instruction = self.cursor,
            count = spec.count,
            scale = model.meta.values[SCALE_KEY].as_str(),
            "generating graphs"
        );

        if spec.count == 1 {
            let seed = self.rng.gen();
            sampler::generate_graph(
                Path::new(&spec.node_path),
                Path::new(&spec.edge_path),
                model,
                seed,
            )?;
        } else {
            for index in 0..spec.count {
                let node_path = indexed_path(&spec.node_path, index);
                let edge_path = indexed_path(&spec.edge_path, index);
                info!(
                    instance = index,
                    nodes = %node_path.display(),
                    edges = %edge_path.display(),
                    "generating instance"
                );
                let seed = self.rng.gen();
                sampler::generate_graph(&node_path, &edge_path, model, seed)?;
            }
        }
        self.graphs_generated += spec.count;
        Ok(())
    }

    #[expect(
        clippy::unused_self,
        reason = "dispatched like every other instruction"
    )]
    fn run_help(&self) {
        println!("{HELP_TEXT}");
    }
}

/// Turns `path/to/name.ext` into `path/to/name_<index>.ext` for
/// multi-instance generation.
fn indexed_path(path: &str, index: usize) -> PathBuf {
    let path = Path::new(path);
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_{index}{extension}"))
}
