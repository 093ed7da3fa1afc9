//! Named prompt templates and the builders that fill them.
//!
//! Built-in templates ship inside the crate as TOML. Files in the configured
//! custom directories (TOML or YAML) override them key by key, in sorted file
//! order. Templates are read once, when the registry is built.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::PromptConfig;

mod builder;
mod clip;
mod mode;

pub use builder::{
    AgeBand, LanguageSelection, PromptBuilder, PromptContext, PromptContextError,
    DEFAULT_TARGET_WORDS,
};
pub use clip::summarize_for_clip;
pub use mode::PromptMode;

const BUILT_IN_PROMPTS: &str = include_str!("../../prompts/default.toml");

pub type PromptArguments = HashMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptSource {
    BuiltIn,
    File(PathBuf),
}

impl PromptSource {
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::BuiltIn)
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::BuiltIn => None,
            Self::File(path) => Some(path.as_path()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PromptMetadata {
    description: Option<String>,
    source: PromptSource,
}

impl PromptMetadata {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn source(&self) -> &PromptSource {
        &self.source
    }
}

#[derive(Clone, Debug)]
pub struct PromptTemplate {
    key: String,
    template: String,
    segments: Vec<TemplateSegment>,
    required: BTreeSet<String>,
    metadata: PromptMetadata,
}

impl PromptTemplate {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn metadata(&self) -> &PromptMetadata {
        &self.metadata
    }

    pub fn render(&self, arguments: &PromptArguments) -> Result<String, PromptError> {
        for required in &self.required {
            if !arguments.contains_key(required) {
                return Err(PromptError::MissingArgument {
                    key: self.key.clone(),
                    argument: required.clone(),
                });
            }
        }

        let mut output = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => output.push_str(text),
                TemplateSegment::Placeholder(name) => {
                    if let Some(value) = arguments.get(name) {
                        output.push_str(value);
                    }
                }
            }
        }

        Ok(output)
    }

    pub fn render_with<I, K, V>(&self, arguments: I) -> Result<String, PromptError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = PromptArguments::new();
        for (key, value) in arguments {
            map.insert(key.into(), value.into());
        }
        self.render(&map)
    }

    fn from_raw(key: String, raw: RawPrompt, source: PromptSource) -> Result<Self, PromptError> {
        let (segments, placeholders) = parse_template(&raw.template);
        let required = if raw.required.is_empty() {
            placeholders
        } else {
            let mut set = BTreeSet::new();
            for argument in raw.required {
                let trimmed = argument.trim().to_string();
                if !placeholders.contains(&trimmed) {
                    return Err(PromptError::InvalidRequired {
                        key: key.clone(),
                        argument: trimmed,
                    });
                }
                set.insert(trimmed);
            }
            set
        };

        Ok(Self {
            key,
            template: raw.template,
            segments,
            required,
            metadata: PromptMetadata {
                description: raw.description,
                source,
            },
        })
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt `{0}` not found")]
    NotFound(String),
    #[error("missing argument `{argument}` when rendering prompt `{key}`")]
    MissingArgument { key: String, argument: String },
    #[error("failed to read prompt file `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse built-in prompt definitions: {0}")]
    ParseBuiltIn(toml::de::Error),
    #[error("failed to parse prompt file `{path}` as TOML: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to parse prompt file `{path}` as YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error(
        "required key `{argument}` declared for prompt `{key}` but no matching placeholder was found"
    )]
    InvalidRequired { key: String, argument: String },
}

#[derive(Debug)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, PromptTemplate>,
}

impl PromptRegistry {
    pub fn new() -> Result<Self, PromptError> {
        Self::from_prompt_config(&PromptConfig::default())
    }

    pub fn from_prompt_config(config: &PromptConfig) -> Result<Self, PromptError> {
        Self::with_custom_directories(&config.custom_directories)
    }

    pub fn with_custom_directories<P: AsRef<Path>>(directories: &[P]) -> Result<Self, PromptError> {
        let dirs: Vec<PathBuf> = directories
            .iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        Ok(Self {
            prompts: Self::build_prompts(&dirs)?,
        })
    }

    pub fn get(&self, key: &str) -> Option<&PromptTemplate> {
        self.prompts.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(|k| k.as_str())
    }

    pub fn format_with<I, K, V>(&self, key: &str, arguments: I) -> Result<String, PromptError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let template = self
            .get(key)
            .ok_or_else(|| PromptError::NotFound(key.to_string()))?;
        template.render_with(arguments)
    }

    fn build_prompts(
        directories: &[PathBuf],
    ) -> Result<BTreeMap<String, PromptTemplate>, PromptError> {
        let document: PromptDocument =
            toml::from_str(BUILT_IN_PROMPTS).map_err(PromptError::ParseBuiltIn)?;
        let mut prompts = BTreeMap::new();
        for (key, raw) in document.prompts {
            let template = PromptTemplate::from_raw(key.clone(), raw, PromptSource::BuiltIn)?;
            prompts.insert(key, template);
        }

        for dir in directories {
            load_directory(dir, &mut prompts)?;
        }

        Ok(prompts)
    }
}

fn load_directory(
    dir: &Path,
    prompts: &mut BTreeMap<String, PromptTemplate>,
) -> Result<(), PromptError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PromptError::Io { path, source }
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let Some(format) = DocumentFormat::from_path(&path) else {
            continue;
        };
        let contents = fs::read_to_string(&path).map_err(io_error(&path))?;
        let document = format.parse(&contents, &path)?;
        for (key, raw) in document.prompts {
            let template = PromptTemplate::from_raw(key.clone(), raw, PromptSource::File(path.clone()))?;
            prompts.insert(key, template);
        }
    }

    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum DocumentFormat {
    Toml,
    Yaml,
}

impl DocumentFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    fn parse(self, contents: &str, path: &Path) -> Result<PromptDocument, PromptError> {
        match self {
            Self::Toml => toml::from_str(contents).map_err(|source| PromptError::ParseToml {
                path: path.to_path_buf(),
                source,
            }),
            Self::Yaml => serde_yaml::from_str(contents).map_err(|source| PromptError::ParseYaml {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromptDocument {
    #[serde(default)]
    prompts: BTreeMap<String, RawPrompt>,
}

#[derive(Debug, Deserialize)]
struct RawPrompt {
    #[serde(alias = "text")]
    template: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: Vec<String>,
}

#[derive(Clone, Debug)]
enum TemplateSegment {
    Literal(String),
    Placeholder(String),
}

fn parse_template(template: &str) -> (Vec<TemplateSegment>, BTreeSet<String>) {
    let mut segments = Vec::new();
    let mut placeholders = BTreeSet::new();
    let mut buffer = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some('{')) {
                    chars.next();
                    buffer.push('{');
                    continue;
                }

                if !buffer.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut buffer)));
                }

                let mut placeholder = String::new();
                let mut closed = false;
                while let Some(next) = chars.next() {
                    if next == '}' {
                        closed = true;
                        break;
                    } else {
                        placeholder.push(next);
                    }
                }

                if closed {
                    let trimmed = placeholder.trim();
                    if trimmed.is_empty() {
                        segments.push(TemplateSegment::Literal("{}".to_string()));
                    } else {
                        let key = trimmed.to_string();
                        placeholders.insert(key.clone());
                        segments.push(TemplateSegment::Placeholder(key));
                    }
                } else {
                    buffer.push('{');
                    buffer.push_str(&placeholder);
                }
            }
            '}' => {
                if matches!(chars.peek(), Some('}')) {
                    chars.next();
                    buffer.push('}');
                } else {
                    buffer.push('}');
                }
            }
            _ => buffer.push(ch),
        }
    }

    if !buffer.is_empty() {
        segments.push(TemplateSegment::Literal(buffer));
    }

    (segments, placeholders)
}
