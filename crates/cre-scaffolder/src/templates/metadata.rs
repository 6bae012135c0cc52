//! Template metadata types and parsing

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Branch used when a repository string carries no `@ref`
pub const DEFAULT_REF: &str = "main";

fn default_ref() -> String {
    DEFAULT_REF.to_string()
}

/// A remote repository holding templates, pinned to a branch, tag or commit.
///
/// Two sources are equal when owner and repo match; the ref is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSource {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
}

impl RepoSource {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            git_ref: git_ref.into(),
        }
    }

    /// `owner/repo` without the ref
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Check the same shape rules [`FromStr`] enforces, for sources built any other way
    pub fn validate(&self) -> Result<()> {
        let plain_name = |part: &str| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && !part
                    .chars()
                    .any(|c| c == '/' || c == '\\' || c == '@' || c.is_whitespace())
        };
        let ref_ok = !self.git_ref.is_empty() && !self.git_ref.chars().any(char::is_whitespace);

        if plain_name(&self.owner) && plain_name(&self.repo) && ref_ok {
            Ok(())
        } else {
            Err(RegistryError::InvalidRepoFormat {
                input: self.to_string(),
            })
        }
    }
}

impl PartialEq for RepoSource {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.repo == other.repo
    }
}

impl Eq for RepoSource {}

impl Hash for RepoSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.repo.hash(state);
    }
}

impl fmt::Display for RepoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.git_ref)
    }
}

impl FromStr for RepoSource {
    type Err = RegistryError;

    /// Parse `owner/repo[@ref]`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RegistryError::InvalidRepoFormat {
            input: s.to_string(),
        };

        if s.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (repo_path, git_ref) = match s.rfind('@') {
            Some(idx) => (&s[..idx], &s[idx + 1..]),
            None => (s, DEFAULT_REF),
        };
        if git_ref.is_empty() {
            return Err(invalid());
        }

        let (owner, repo) = repo_path.split_once('/').ok_or_else(invalid)?;
        let source = Self::new(owner, repo, git_ref);
        source.validate().map_err(|_| invalid())?;
        Ok(source)
    }
}

/// Template language as declared in metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    Go,
    TypeScript,
    Other(String),
}

impl Language {
    pub fn display_name(&self) -> &str {
        match self {
            Language::Go => "Go",
            Language::TypeScript => "TypeScript",
            Language::Other(name) => name,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Contents of a template's `.cre/template.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// "building-block" or "starter-template"
    #[serde(default)]
    pub kind: String,

    /// Unique slug identifier
    pub name: String,

    /// Human-readable display name
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// "go", "typescript", or anything else the template author chose
    #[serde(default)]
    pub language: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub license: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Files/dirs to leave out when extracting, relative to the template root
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Chain names the template expects; carried through untouched
    #[serde(default)]
    pub networks: Vec<String>,
}

/// On-disk shape of the metadata document; `id` is accepted in place of `name`
#[derive(Debug, Deserialize)]
struct MetadataDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    rest: MetadataFields,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataFields {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    license: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    networks: Vec<String>,
}

impl TemplateMetadata {
    /// Parse a metadata document. `path` is only used for error messages.
    pub fn from_yaml(content: &str, path: &str) -> Result<Self> {
        let doc: MetadataDocument =
            serde_yaml::from_str(content).map_err(|e| RegistryError::InvalidMetadata {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let name = doc
            .id
            .filter(|id| !id.is_empty())
            .or(doc.name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| RegistryError::InvalidMetadata {
                path: path.to_string(),
                reason: "missing required field 'name' or 'id'".to_string(),
            })?;

        let f = doc.rest;
        Ok(Self {
            kind: f.kind,
            name,
            title: f.title,
            description: f.description,
            language: f.language,
            category: f.category,
            author: f.author,
            license: f.license,
            tags: f.tags,
            exclude: f.exclude,
            networks: f.networks,
        })
    }

    pub fn language(&self) -> Language {
        match self.language.to_lowercase().as_str() {
            "go" | "golang" => Language::Go,
            "typescript" | "ts" => Language::TypeScript,
            _ => Language::Other(self.language.clone()),
        }
    }

    /// Title for display, falling back to the name
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// A discovered template: its metadata plus where it lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    #[serde(flatten)]
    pub metadata: TemplateMetadata,

    /// Template root within the source repo; empty when the metadata sits at repo root
    #[serde(default)]
    pub path: String,

    /// Repository the template came from (unused for built-ins)
    pub source: RepoSource,

    /// Embedded in the binary rather than fetched
    #[serde(default)]
    pub built_in: bool,
}

impl TemplateSummary {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
