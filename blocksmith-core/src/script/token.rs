//! Tokenizer for the instruction script language.
//!
//! Scripts are whitespace-separated tokens. A token starting with `-` is an
//! instruction tag and one starting with `+` a sub-instruction tag; both are
//! folded to upper case. Everything else is an argument with its case
//! preserved. Double quotes group one argument and keep its inner
//! whitespace; quoted tokens are always arguments, so file names that happen
//! to start with `-` stay usable.

use crate::error::ScriptError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Tag,
    Subtag,
    Argument,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn classify(text: String, quoted: bool) -> Self {
        if !quoted && text.starts_with('-') {
            Token {
                kind: TokenKind::Tag,
                text: text.to_uppercase(),
            }
        } else if !quoted && text.starts_with('+') {
            Token {
                kind: TokenKind::Subtag,
                text: text.to_uppercase(),
            }
        } else {
            Token {
                kind: TokenKind::Argument,
                text,
            }
        }
    }
}

/// Replaces every occurrence of each template with its replacement, in the
/// order the pairs are given. Replacement output is never rescanned, so a
/// template may occur inside its own replacement without looping.
#[must_use]
pub fn substitute_templates(input: &str, substitutions: &[(String, String)]) -> String {
    let mut text = input.to_owned();
    for (template, replacement) in substitutions {
        if template.is_empty() {
            continue;
        }
        let mut replaced = String::with_capacity(text.len());
        let mut rest = text.as_str();
        while let Some(position) = rest.find(template.as_str()) {
            replaced.push_str(&rest[..position]);
            replaced.push_str(replacement);
            rest = &rest[position + template.len()..];
        }
        replaced.push_str(rest);
        text = replaced;
    }
    text
}

/// Tokenizes `input` after applying the template substitutions.
///
/// # Errors
/// Returns [`ScriptError::UnmatchedQuote`] when a quote is still open at the
/// end of the input.
pub fn tokenize(
    input: &str,
    substitutions: &[(String, String)],
) -> Result<Vec<Token>, ScriptError> {
    let text = substitute_templates(input, substitutions);

    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut in_token = false;
    let mut in_quote = false;
    let mut was_quoted = false;

    for ch in text.chars() {
        if in_quote {
            if ch == '"' {
                in_quote = false;
            } else {
                buffer.push(ch);
            }
            continue;
        }
        match ch {
            '"' => {
                in_quote = true;
                in_token = true;
                was_quoted = true;
            }
            ' ' | '\t' | '\n' | '\r' => {
                if in_token {
                    tokens.push(Token::classify(std::mem::take(&mut buffer), was_quoted));
                    in_token = false;
                    was_quoted = false;
                }
            }
            _ => {
                buffer.push(ch);
                in_token = true;
            }
        }
    }
    if in_quote {
        return Err(ScriptError::UnmatchedQuote);
    }
    if in_token {
        tokens.push(Token::classify(buffer, was_quoted));
    }
    Ok(tokens)
}
