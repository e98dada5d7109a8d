//! Dockerfile parsing.
//!
//! Just enough of the Dockerfile grammar to find the base image of the
//! final build stage: parser directives, comments, line continuations,
//! global `ARG` defaults and `FROM ... AS name` stage aliases.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerfileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown instruction '{keyword}' on line {line}")]
    UnknownInstruction { keyword: String, line: usize },

    #[error("instruction {keyword} on line {line} has no arguments")]
    MissingArguments { keyword: String, line: usize },

    #[error("file with no instructions")]
    Empty,

    #[error("no FROM instruction before line {line}")]
    NoFrom { line: usize },
}

const INSTRUCTIONS: &[&str] = &[
    "ADD",
    "ARG",
    "CMD",
    "COPY",
    "ENTRYPOINT",
    "ENV",
    "EXPOSE",
    "FROM",
    "HEALTHCHECK",
    "LABEL",
    "MAINTAINER",
    "ONBUILD",
    "RUN",
    "SHELL",
    "STOPSIGNAL",
    "USER",
    "VOLUME",
    "WORKDIR",
];

static DIRECTIVE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*([a-zA-Z]+)\s*=\s*(\S+)\s*$").unwrap());

static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// One instruction with its continuation lines joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Upper-cased keyword, e.g. `FROM`.
    pub keyword: String,
    /// Everything after the keyword.
    pub args: String,
    /// 1-based line the instruction starts on.
    pub line: usize,
}

/// A parsed Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dockerfile {
    pub instructions: Vec<Instruction>,
}

impl Dockerfile {
    /// Parse Dockerfile text.
    pub fn parse(content: &str) -> Result<Self, DockerfileError> {
        let mut escape = '\\';
        let mut in_directives = true;
        let mut instructions = Vec::new();

        let mut pending: Option<(usize, String)> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            // Parser directives are only honoured before the first
            // instruction, comment or blank line
            if in_directives {
                if let Some(caps) = DIRECTIVE_REGEX.captures(trimmed) {
                    if caps[1].eq_ignore_ascii_case("escape") {
                        escape = caps[2].chars().next().unwrap_or('\\');
                    }
                    continue;
                }
                in_directives = false;
            }

            if trimmed.starts_with('#') {
                continue;
            }
            if trimmed.is_empty() && pending.is_none() {
                continue;
            }

            let (continues, body) = match trimmed.strip_suffix(escape) {
                Some(body) => (true, body.trim_end()),
                None => (false, trimmed),
            };

            let (start, mut text) = pending.take().unwrap_or((line_no, String::new()));
            if !text.is_empty() && !body.is_empty() {
                text.push(' ');
            }
            text.push_str(body);

            if continues {
                pending = Some((start, text));
            } else if !text.is_empty() {
                instructions.push(parse_instruction(&text, start)?);
            }
        }

        if let Some((start, text)) = pending {
            if !text.is_empty() {
                instructions.push(parse_instruction(&text, start)?);
            }
        }

        if instructions.is_empty() {
            return Err(DockerfileError::Empty);
        }

        // Only ARG may precede the first FROM
        if let Some(first) = instructions.iter().find(|i| i.keyword != "ARG") {
            if first.keyword != "FROM" {
                return Err(DockerfileError::NoFrom { line: first.line });
            }
        } else {
            let last = instructions.last().map(|i| i.line).unwrap_or(1);
            return Err(DockerfileError::NoFrom { line: last });
        }

        Ok(Self { instructions })
    }

    /// Read and parse a Dockerfile from disk.
    pub fn parse_file(path: &Path) -> Result<Self, DockerfileError> {
        let content = std::fs::read_to_string(path).map_err(|source| DockerfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Base image of the final stage, with global `ARG` defaults expanded and
    /// stage aliases followed back to a real image.
    pub fn base_image(&self) -> Option<String> {
        let mut global_args: HashMap<String, String> = HashMap::new();
        let mut stages: HashMap<String, String> = HashMap::new();
        let mut last_image = None;
        let mut seen_from = false;

        for instruction in &self.instructions {
            match instruction.keyword.as_str() {
                "ARG" if !seen_from => {
                    if let Some((name, default)) = instruction.args.split_once('=') {
                        global_args.insert(
                            name.trim().to_string(),
                            default.trim().trim_matches('"').to_string(),
                        );
                    }
                }
                "FROM" => {
                    seen_from = true;
                    let mut words = instruction
                        .args
                        .split_whitespace()
                        .filter(|w| !w.starts_with("--"));
                    let Some(image) = words.next() else { continue };
                    let image = expand_args(image, &global_args);
                    let image = stages.get(&image.to_lowercase()).cloned().unwrap_or(image);

                    if let (Some(as_kw), Some(alias)) = (words.next(), words.next()) {
                        if as_kw.eq_ignore_ascii_case("as") {
                            stages.insert(alias.to_lowercase(), image.clone());
                        }
                    }
                    last_image = Some(image);
                }
                _ => {}
            }
        }

        last_image
    }
}

fn parse_instruction(text: &str, line: usize) -> Result<Instruction, DockerfileError> {
    let (keyword, args) = match text.split_once(char::is_whitespace) {
        Some((keyword, args)) => (keyword, args.trim()),
        None => (text, ""),
    };
    let keyword = keyword.to_uppercase();

    if !INSTRUCTIONS.contains(&keyword.as_str()) {
        return Err(DockerfileError::UnknownInstruction { keyword, line });
    }
    if args.is_empty() {
        return Err(DockerfileError::MissingArguments { keyword, line });
    }

    Ok(Instruction {
        keyword,
        args: args.to_string(),
        line,
    })
}

fn expand_args(value: &str, args: &HashMap<String, String>) -> String {
    VAR_REGEX
        .replace_all(value, |caps: &regex::Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
            name.and_then(|n| args.get(n)).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Tag part of an image reference: `registry:5000/runtime:4.2.5@sha256:..`
/// gives `4.2.5`. Empty when the reference has no tag.
pub fn image_tag(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);
    let name_start = without_digest.rfind('/').map(|i| i + 1).unwrap_or(0);
    match without_digest[name_start..].rfind(':') {
        Some(colon) => &without_digest[name_start + colon + 1..],
        None => "",
    }
}
