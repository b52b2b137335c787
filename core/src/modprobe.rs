use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

/// Directives legal in modprobe.d files that this tool does not interpret.
/// Lines starting with one of these are ignored without being counted as
/// malformed.
const PASSIVE_DIRECTIVES: &[&str] = &[
    "alias", "blacklist", "include", "install", "remove", "softdep", "weakdep",
];

/// Which entry is effective when several assignments target the same
/// `(module, parameter)` pair across the configuration directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Later file (lexicographic), later line wins; the module loader's
    /// conventional override behavior.
    #[default]
    LastWins,
    FirstWins,
}

/// One `param=value` assignment from an `options` line, with provenance.
/// Entries that lost the precedence race are retained and marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub file: String,
    pub line: u32,
    pub module: String,
    pub param: String,
    pub value: String,
    pub shadowed: bool,
}

/// Everything one pass over the configuration directory produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigScan {
    pub entries: Vec<ConfigEntry>,
    /// Lines that were neither parseable `options` lines, comments, blanks,
    /// nor known passive directives.
    pub skipped_lines: usize,
}

/// Parses every regular file directly under `dir` (non-recursive), files in
/// lexicographic name order, lines in file order. A missing directory is an
/// empty scan. The directory is never written to.
pub async fn parse_config_dir(dir: &Path, precedence: Precedence) -> ConfigScan {
    let mut scan = ConfigScan::default();
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return scan,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "config directory unreadable");
            return scan;
        }
    };

    let mut files = Vec::new();
    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "config listing aborted early");
                break;
            }
        };
        let is_file = entry
            .file_type()
            .await
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            files.push(name);
        }
    }
    files.sort();

    for name in files {
        let contents = match tokio::fs::read_to_string(dir.join(&name)).await {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(file = %name, error = %err, "config file unreadable");
                continue;
            }
        };
        parse_file(&name, &contents, &mut scan);
    }

    mark_shadowed(&mut scan.entries, precedence);
    scan
}

fn parse_file(file: &str, contents: &str, scan: &mut ConfigScan) {
    for (index, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = line_number(index);
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first() {
            Some(&"options") => match parse_options_tokens(&tokens) {
                Some((module, assignments)) => {
                    for (param, value) in assignments {
                        scan.entries.push(ConfigEntry {
                            file: file.to_string(),
                            line: number,
                            module: module.to_string(),
                            param: param.to_string(),
                            value: value.to_string(),
                            shadowed: false,
                        });
                    }
                }
                None => {
                    tracing::debug!(file, line = number, "malformed options line skipped");
                    scan.skipped_lines += 1;
                }
            },
            Some(first) if PASSIVE_DIRECTIVES.contains(first) => {}
            Some(_) => {
                tracing::debug!(file, line = number, "unrecognized config line skipped");
                scan.skipped_lines += 1;
            }
            None => {}
        }
    }
}

/// One-based line number from an enumeration index, saturating instead of
/// wrapping for files longer than `u32::MAX` lines.
fn line_number(index: usize) -> u32 {
    index
        .checked_add(1)
        .and_then(|line| u32::try_from(line).ok())
        .unwrap_or(u32::MAX)
}

/// `options <module> <param>=<value>...` — at least one assignment, every
/// assignment well-formed, or the whole line is rejected.
fn parse_options_tokens<'a>(tokens: &[&'a str]) -> Option<(&'a str, Vec<(&'a str, &'a str)>)> {
    let module = tokens.get(1)?;
    let rest = tokens.get(2..)?;
    if rest.is_empty() {
        return None;
    }
    let mut assignments = Vec::with_capacity(rest.len());
    for token in rest {
        let (param, value) = token.split_once('=')?;
        if param.is_empty() {
            return None;
        }
        assignments.push((param, value));
    }
    Some((module, assignments))
}

fn mark_shadowed(entries: &mut [ConfigEntry], precedence: Precedence) {
    let mut effective: HashMap<(String, String), usize> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        let key = (entry.module.clone(), entry.param.clone());
        match precedence {
            Precedence::LastWins => {
                effective.insert(key, index);
            }
            Precedence::FirstWins => {
                effective.entry(key).or_insert(index);
            }
        }
    }
    for (index, entry) in entries.iter_mut().enumerate() {
        let key = (entry.module.clone(), entry.param.clone());
        entry.shadowed = effective.get(&key) != Some(&index);
    }
}
