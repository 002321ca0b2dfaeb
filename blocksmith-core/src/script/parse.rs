//! Parser for tokenized instruction scripts.
//!
//! Each instruction starts at a `-` tag and claims every token up to the
//! next tag. `-Read` additionally groups its tokens by `+` sub-instruction.
//! Arity and number-format violations are configuration errors raised before
//! anything executes.

use std::collections::BTreeMap;

use crate::error::ScriptError;
use crate::script::token::{Token, TokenKind};

/// File list and column layout carried by a `-Read` instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadSpec {
    pub node_files: Vec<String>,
    pub edge_files: Vec<String>,
    pub node_id_column: usize,
    pub node_type_columns: Vec<usize>,
    pub src_column: usize,
    pub dst_column: usize,
    pub edge_type_columns: Vec<usize>,
    /// Extra `+arg` meta entries handed to the compiled model.
    pub meta: BTreeMap<String, String>,
}

impl Default for ReadSpec {
    fn default() -> Self {
        Self {
            node_files: Vec::new(),
            edge_files: Vec::new(),
            node_id_column: 0,
            node_type_columns: vec![1],
            src_column: 0,
            dst_column: 1,
            edge_type_columns: vec![2],
            meta: BTreeMap::new(),
        }
    }
}

/// Script path and template/replacement pairs of an `-Execute` instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecuteSpec {
    pub script_path: String,
    pub substitutions: Vec<(String, String)>,
}

/// Output paths and instance count of a `-Generate` instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateSpec {
    pub node_path: String,
    pub edge_path: String,
    pub count: usize,
}

/// One executable instruction with its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Read(ReadSpec),
    Execute(ExecuteSpec),
    Load { path: String },
    Save { path: String },
    Scale { factor: f64 },
    Seed { phrase: String },
    Generate(GenerateSpec),
    Help,
}

/// Parses a tokenized script into its instruction list.
///
/// # Errors
/// Returns [`ScriptError`] for unknown tags or sub-instructions, arity
/// violations, unparsable numbers, and non-positive scale factors.
pub fn parse(tokens: &[Token]) -> Result<Vec<Instruction>, ScriptError> {
    let mut instructions = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let tag = &tokens[index];
        if tag.kind != TokenKind::Tag {
            return Err(ScriptError::UnexpectedToken {
                expected: "an instruction tag",
                found: tag.text.clone(),
            });
        }
        let mut end = index + 1;
        while end < tokens.len() && tokens[end].kind != TokenKind::Tag {
            end += 1;
        }
        let body = &tokens[index + 1..end];

        let instruction = match tag.text.as_str() {
            "-READ" => parse_read(body)?,
            "-EXECUTE" => parse_execute(body)?,
            "-LOAD" => Instruction::Load {
                path: single_argument("-Load", body)?,
            },
            "-SAVE" => Instruction::Save {
                path: single_argument("-Save", body)?,
            },
            "-SEED" => Instruction::Seed {
                phrase: single_argument("-Seed", body)?,
            },
            "-SCALE" => parse_scale(body)?,
            "-GENERATE" => parse_generate(body)?,
            "-HELP" => Instruction::Help,
            _ => {
                return Err(ScriptError::UnknownTag {
                    tag: tag.text.clone(),
                })
            }
        };
        instructions.push(instruction);
        index = end;
    }
    Ok(instructions)
}

fn parse_read(body: &[Token]) -> Result<Instruction, ScriptError> {
    let mut spec = ReadSpec::default();
    // The first +nodetypeindex/+edgetypeindex replaces the default column
    // list; later ones extend it.
    let mut replaced_node_types = false;
    let mut replaced_edge_types = false;

    let mut index = 0;
    while index < body.len() {
        let head = &body[index];
        if head.kind != TokenKind::Subtag {
            return Err(ScriptError::UnexpectedToken {
                expected: "a +sub-instruction of -Read",
                found: head.text.clone(),
            });
        }
        let mut end = index + 1;
        while end < body.len() && body[end].kind == TokenKind::Argument {
            end += 1;
        }
        let args = &body[index + 1..end];

        match head.text.as_str() {
            "+NODEFILE" => spec
                .node_files
                .extend(args.iter().map(|t| t.text.clone())),
            "+EDGEFILE" => spec
                .edge_files
                .extend(args.iter().map(|t| t.text.clone())),
            "+NODEINDEX" => {
                check_arity("+nodeindex", args, 1)?;
                spec.node_id_column = parse_index("+nodeindex", &args[0])?;
            }
            "+NODETYPEINDEX" => {
                for arg in args {
                    let column = parse_index("+nodetypeindex", arg)?;
                    if !replaced_node_types {
                        spec.node_type_columns.clear();
                        replaced_node_types = true;
                    }
                    spec.node_type_columns.push(column);
                }
            }
            "+EDGEINDEX" => {
                check_arity("+edgeindex", args, 2)?;
                spec.src_column = parse_index("+edgeindex", &args[0])?;
                spec.dst_column = parse_index("+edgeindex", &args[1])?;
            }
            "+EDGETYPEINDEX" => {
                for arg in args {
                    let column = parse_index("+edgetypeindex", arg)?;
                    if !replaced_edge_types {
                        spec.edge_type_columns.clear();
                        replaced_edge_types = true;
                    }
                    spec.edge_type_columns.push(column);
                }
            }
            "+ARG" => {
                check_arity("+arg", args, 2)?;
                spec.meta
                    .insert(args[0].text.to_uppercase(), args[1].text.clone());
            }
            _ => {
                return Err(ScriptError::UnknownSubtag {
                    subtag: head.text.clone(),
                })
            }
        }
        index = end;
    }
    Ok(Instruction::Read(spec))
}

fn parse_execute(body: &[Token]) -> Result<Instruction, ScriptError> {
    if body.is_empty() || body.len() % 2 == 0 {
        return Err(ScriptError::UnbalancedTemplates);
    }
    for token in body {
        if token.kind != TokenKind::Argument {
            return Err(ScriptError::UnexpectedToken {
                expected: "an argument of -Execute",
                found: token.text.clone(),
            });
        }
    }
    let substitutions = body[1..]
        .chunks_exact(2)
        .map(|pair| (pair[0].text.clone(), pair[1].text.clone()))
        .collect();
    Ok(Instruction::Execute(ExecuteSpec {
        script_path: body[0].text.clone(),
        substitutions,
    }))
}

fn parse_scale(body: &[Token]) -> Result<Instruction, ScriptError> {
    let raw = single_argument("-Scale", body)?;
    let factor: f64 = raw.parse().map_err(|_| ScriptError::InvalidNumber {
        instruction: "-Scale",
        value: raw.clone(),
        kind: "number",
    })?;
    if factor <= 0.0 {
        return Err(ScriptError::NonPositiveScale { got: factor });
    }
    Ok(Instruction::Scale { factor })
}

fn parse_generate(body: &[Token]) -> Result<Instruction, ScriptError> {
    check_arity("-Generate", body, 3)?;
    for token in body {
        if token.kind != TokenKind::Argument {
            return Err(ScriptError::UnexpectedToken {
                expected: "an argument of -Generate",
                found: token.text.clone(),
            });
        }
    }
    let count: usize = body[2]
        .text
        .parse()
        .map_err(|_| ScriptError::InvalidNumber {
            instruction: "-Generate",
            value: body[2].text.clone(),
            kind: "count",
        })?;
    Ok(Instruction::Generate(GenerateSpec {
        node_path: body[0].text.clone(),
        edge_path: body[1].text.clone(),
        count,
    }))
}

fn single_argument(instruction: &'static str, body: &[Token]) -> Result<String, ScriptError> {
    check_arity(instruction, body, 1)?;
    if body[0].kind != TokenKind::Argument {
        return Err(ScriptError::UnexpectedToken {
            expected: "an argument",
            found: body[0].text.clone(),
        });
    }
    Ok(body[0].text.clone())
}

fn check_arity(
    instruction: &'static str,
    tokens: &[Token],
    want: usize,
) -> Result<(), ScriptError> {
    if tokens.len() != want {
        return Err(ScriptError::WrongArity {
            instruction,
            want,
            have: tokens.len(),
        });
    }
    Ok(())
}

fn parse_index(instruction: &'static str, token: &Token) -> Result<usize, ScriptError> {
    token.text.parse().map_err(|_| ScriptError::InvalidNumber {
        instruction,
        value: token.text.clone(),
        kind: "column index",
    })
}
