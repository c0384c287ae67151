//! Recipes declare what code runs. A recipe's body is one of three
//! tagged variants; each maps to a job kind and a file extension on disk.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pattern::validate_name;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Notebook,
    Script,
    Shell,
}

impl JobKind {
    /// File extension used for the job's base/parameterised code file.
    pub fn extension(self) -> &'static str {
        match self {
            JobKind::Notebook => "ipynb",
            JobKind::Script => "py",
            JobKind::Shell => "sh",
        }
    }
}

/// The recipe's executable content, tagged by job kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipeBody {
    Notebook { document: serde_json::Value },
    Script { source: String },
    Shell { source: String },
}

impl RecipeBody {
    pub fn job_kind(&self) -> JobKind {
        match self {
            RecipeBody::Notebook { .. } => JobKind::Notebook,
            RecipeBody::Script { .. } => JobKind::Script,
            RecipeBody::Shell { .. } => JobKind::Shell,
        }
    }

    /// Serialise the body to the bytes that get written as the job's
    /// `base.<ext>` file.
    pub fn to_base_file_contents(&self) -> Result<String> {
        match self {
            RecipeBody::Notebook { document } => {
                Ok(serde_json::to_string_pretty(document)?)
            }
            RecipeBody::Script { source } | RecipeBody::Shell { source } => Ok(source.clone()),
        }
    }
}

/// Free-form requirements, recorded on the job but not enforced by the
/// core; enforcement (if any) is the external interpreter's job.
pub type Requirements = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub name: String,
    pub body: RecipeBody,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub requirements: Requirements,
}

impl Recipe {
    pub fn new(name: impl Into<String>, body: RecipeBody) -> Self {
        Recipe {
            name: name.into(),
            body,
            parameters: HashMap::new(),
            requirements: HashMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        match &self.body {
            RecipeBody::Script { source } | RecipeBody::Shell { source } if source.is_empty() => {
                Err(Error::validation(&self.name, "recipe body is empty"))
            }
            _ => Ok(()),
        }
    }

    pub fn job_kind(&self) -> JobKind {
        self.body.job_kind()
    }
}
