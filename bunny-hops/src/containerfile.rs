//! Parser for the Containerfile subset accepted as packaging input.
//!
//! Only `FROM`, `COPY`, `LABEL`, `CMD`, `ENTRYPOINT` and `ENV` are
//! understood. Anything else is rejected with the line it appeared on.

use std::fmt;

/// Containerfile parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  Hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// One supported instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    From { image: String },
    /// Only the first source of a multi-source copy is kept
    Copy { src: String, dest: String },
    Label { labels: Vec<(String, String)> },
    Cmd { command: Vec<String> },
    Entrypoint { command: Vec<String> },
    Env { vars: Vec<(String, String)> },
}

/// Instructions in file order, each with the line it started on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Containerfile {
    pub instructions: Vec<(usize, Instruction)>,
}

/// Parse a Containerfile.
///
/// # Examples
/// ```
/// use bunny_hops::containerfile::{Instruction, parse_containerfile};
///
/// let parsed = parse_containerfile("FROM scratch\nCOPY kernel /.boot/kernel\n").unwrap();
/// assert_eq!(parsed.instructions.len(), 2);
/// assert_eq!(
///     parsed.instructions[0].1,
///     Instruction::From { image: "scratch".into() }
/// );
/// ```
///
/// # Errors
///
/// Returns the first malformed or unsupported instruction.
pub fn parse_containerfile(content: &str) -> Result<Containerfile, ParseError> {
    let mut instructions = Vec::new();
    for (line, text) in preprocess(content) {
        instructions.push((line, parse_instruction(line, &text)?));
    }
    Ok(Containerfile { instructions })
}

/// Join continuation lines and drop comment lines.
fn preprocess(content: &str) -> Vec<(usize, String)> {
    let mut result = Vec::new();
    let mut current_line = String::new();
    let mut current_line_num = 0;
    let mut continuation = false;

    for (line_num, line) in content.lines().enumerate() {
        let line_num = line_num + 1;
        let trimmed = line.trim();

        if trimmed.starts_with('#') || (trimmed.is_empty() && !continuation) {
            continue;
        }

        if continuation {
            current_line.push(' ');
            current_line.push_str(trimmed.trim_end_matches('\\').trim());
        } else {
            current_line_num = line_num;
            current_line = trimmed.trim_end_matches('\\').trim().to_string();
        }

        continuation = trimmed.ends_with('\\');

        if !continuation && !current_line.is_empty() {
            result.push((current_line_num, std::mem::take(&mut current_line)));
        }
    }

    if !current_line.is_empty() {
        result.push((current_line_num, current_line));
    }

    result
}

fn parse_instruction(line_num: usize, line: &str) -> Result<Instruction, ParseError> {
    let instruction = extract_instruction(line);
    let rest = extract_rest(line);
    let args = tokenize(rest);

    match instruction.as_str() {
        "FROM" => parse_from(line_num, &args),
        "COPY" => parse_copy(line_num, &args),
        "LABEL" => parse_label(line_num, &args),
        "ENV" => parse_env(line_num, &args),
        "CMD" => Ok(Instruction::Cmd {
            command: parse_command(line_num, rest)?,
        }),
        "ENTRYPOINT" => Ok(Instruction::Entrypoint {
            command: parse_command(line_num, rest)?,
        }),
        _ => Err(ParseError {
            line: line_num,
            message: format!("Unsupported command: {instruction}"),
            hint: Some("Supported: FROM, COPY, LABEL, CMD, ENTRYPOINT, ENV".into()),
        }),
    }
}

fn parse_from(line_num: usize, args: &[String]) -> Result<Instruction, ParseError> {
    let image = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .ok_or_else(|| ParseError {
            line: line_num,
            message: "FROM requires an image".into(),
            hint: Some("Usage: FROM <image>".into()),
        })?;
    Ok(Instruction::From {
        image: image.clone(),
    })
}

fn parse_copy(line_num: usize, args: &[String]) -> Result<Instruction, ParseError> {
    let paths: Vec<String> = match args {
        [json] if json.starts_with('[') => parse_json_array(line_num, json)?,
        _ => args.iter().filter(|arg| !arg.starts_with("--")).cloned().collect(),
    };
    match paths.as_slice() {
        [src, .., dest] => Ok(Instruction::Copy {
            src: src.clone(),
            dest: dest.clone(),
        }),
        _ => Err(ParseError {
            line: line_num,
            message: "COPY requires a source and a destination".into(),
            hint: Some("Usage: COPY <src> <dest>".into()),
        }),
    }
}

fn parse_label(line_num: usize, args: &[String]) -> Result<Instruction, ParseError> {
    let labels = parse_pairs(line_num, "LABEL", args)?;
    Ok(Instruction::Label { labels })
}

fn parse_env(line_num: usize, args: &[String]) -> Result<Instruction, ParseError> {
    let vars = parse_pairs(line_num, "ENV", args)?;
    Ok(Instruction::Env { vars })
}

/// `key=value ...` pairs, or the legacy single `key value` form. Quotes
/// around keys and values are stripped.
fn parse_pairs(
    line_num: usize,
    instruction: &str,
    args: &[String],
) -> Result<Vec<(String, String)>, ParseError> {
    let unquote = |s: &str| s.trim_matches('"').to_string();
    let Some(first) = args.first() else {
        return Err(ParseError {
            line: line_num,
            message: format!("{instruction} requires at least one key=value pair"),
            hint: None,
        });
    };

    if !first.contains('=') {
        if args.len() < 2 {
            return Err(ParseError {
                line: line_num,
                message: format!("{instruction} requires a value"),
                hint: None,
            });
        }
        return Ok(vec![(unquote(first), unquote(&args[1..].join(" ")))]);
    }

    let mut pairs = Vec::new();
    for arg in args {
        let (key, value) = arg.split_once('=').ok_or_else(|| ParseError {
            line: line_num,
            message: format!("{instruction} expects key=value, got {arg}"),
            hint: None,
        })?;
        pairs.push((unquote(key), unquote(value)));
    }
    Ok(pairs)
}

/// Exec form (`["a", "b"]`) or shell form, which runs through `/bin/sh -c`.
fn parse_command(line_num: usize, rest: &str) -> Result<Vec<String>, ParseError> {
    if rest.starts_with('[') {
        return parse_json_array(line_num, rest);
    }
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec!["/bin/sh".into(), "-c".into(), rest.to_string()])
}

fn parse_json_array(line_num: usize, json: &str) -> Result<Vec<String>, ParseError> {
    serde_json::from_str::<Vec<String>>(json).map_err(|_| ParseError {
        line: line_num,
        message: "Invalid JSON array".into(),
        hint: Some("Use [\"arg1\", \"arg2\"] format".into()),
    })
}

fn extract_instruction(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase()
}

fn extract_rest(line: &str) -> &str {
    line.split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest.trim())
}

/// Simple tokenizer that respects quotes and JSON arrays.
fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_json = 0;

    for c in s.chars() {
        match c {
            '"' if in_json == 0 => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '[' if !in_quotes => {
                in_json += 1;
                current.push(c);
            }
            ']' if !in_quotes && in_json > 0 => {
                in_json -= 1;
                current.push(c);
                if in_json == 0 {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            ' ' | '\t' if !in_quotes && in_json == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
