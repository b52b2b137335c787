use std::collections::BTreeMap;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::MetadataError;
use crate::types::ParameterType;

/// Declared shape of one parameter as reported by the metadata tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMetadata {
    pub description: Option<String>,
    pub declared_type: ParameterType,
    pub array: bool,
}

/// Where parameter metadata comes from. The aggregation layer only depends
/// on this trait, so tests substitute canned mappings and `--no-metadata`
/// substitutes [`NullMetadataSource`].
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, module: &str)
    -> Result<BTreeMap<String, ParamMetadata>, MetadataError>;
}

/// Always returns an empty mapping: parameters stay `Unknown`-typed and
/// undescribed, which the rest of the engine treats as fully valid.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetadataSource;

#[async_trait]
impl MetadataSource for NullMetadataSource {
    async fn fetch(
        &self,
        _module: &str,
    ) -> Result<BTreeMap<String, ParamMetadata>, MetadataError> {
        Ok(BTreeMap::new())
    }
}

/// Invokes `modinfo -p <module>` with a hard timeout. The spawned process
/// is killed when the timeout drops the wait future.
#[derive(Debug, Clone)]
pub struct ModinfoFetcher {
    bin: PathBuf,
    timeout_ms: u64,
}

impl ModinfoFetcher {
    /// Bare binary names are resolved on PATH once, up front; paths with
    /// directory components are taken as given.
    pub fn new(bin: &Path, timeout_ms: u64) -> Self {
        let bare = bin.components().count() == 1
            && matches!(bin.components().next(), Some(Component::Normal(_)));
        let bin = if bare {
            which::which(bin).unwrap_or_else(|_| bin.to_path_buf())
        } else {
            bin.to_path_buf()
        };
        Self { bin, timeout_ms }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[async_trait]
impl MetadataSource for ModinfoFetcher {
    async fn fetch(
        &self,
        module: &str,
    ) -> Result<BTreeMap<String, ParamMetadata>, MetadataError> {
        let mut command = tokio::process::Command::new(&self.bin);
        command
            .arg("-p")
            .arg(module)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetadataError::ToolMissing {
                    bin: self.bin.clone(),
                });
            }
            Err(source) => return Err(MetadataError::Io { source }),
        };
        match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                let raw = String::from_utf8_lossy(&output.stdout);
                Ok(parse_modinfo_output(&raw))
            }
            Ok(Ok(output)) => Err(MetadataError::failed(output.status, &output.stderr)),
            Ok(Err(source)) => Err(MetadataError::Io { source }),
            Err(_) => Err(MetadataError::TimedOut {
                timeout_ms: self.timeout_ms,
            }),
        }
    }
}

/// Parses `modinfo -p` output. Relevant lines look like
/// `<name>:<description> (<type token>)`; lines without a colon are
/// skipped. A trailing parenthesised token is only treated as a type when
/// it is one we recognize; otherwise it stays part of the description and
/// the type is `Unknown`.
pub fn parse_modinfo_output(raw: &str) -> BTreeMap<String, ParamMetadata> {
    let mut params = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        params.insert(name.to_string(), parse_param_line(rest.trim()));
    }
    params
}

fn parse_param_line(rest: &str) -> ParamMetadata {
    if let Some(stripped) = rest.strip_suffix(')')
        && let Some((desc, token)) = stripped.rsplit_once('(')
        && let Some((declared_type, array)) = parse_type_token(token.trim())
    {
        let desc = desc.trim();
        return ParamMetadata {
            description: (!desc.is_empty()).then(|| desc.to_string()),
            declared_type,
            array,
        };
    }
    ParamMetadata {
        description: (!rest.is_empty()).then(|| rest.to_string()),
        declared_type: ParameterType::Unknown,
        array: false,
    }
}

/// Recognizes scalar tokens plus the two array spellings, `<ty>,<count>`
/// and `array of <ty>`.
fn parse_type_token(token: &str) -> Option<(ParameterType, bool)> {
    if let Some(elem) = token.strip_prefix("array of ") {
        return scalar_type(elem.trim()).map(|ty| (ty, true));
    }
    if let Some((elem, count)) = token.split_once(',') {
        count.trim().parse::<u32>().ok()?;
        return scalar_type(elem.trim()).map(|ty| (ty, true));
    }
    scalar_type(token).map(|ty| (ty, false))
}

// `hexint` is deliberately absent: the kernel parses those base-16, so
// treating them as plain integers would rewrite values wrongly. They fall
// through to Unknown and stay editable as free-form text.
fn scalar_type(token: &str) -> Option<ParameterType> {
    let ty = match token {
        "int" | "uint" | "short" | "ushort" | "byte" | "long" | "ulong" | "llong"
        | "ullong" => ParameterType::Integer,
        "bool" | "invbool" => ParameterType::Boolean,
        "charp" => ParameterType::Charp,
        "string" => ParameterType::Text,
        _ => return None,
    };
    Some(ty)
}
