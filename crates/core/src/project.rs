//! Declared project model - projects described in the settings file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A project declared in configuration rather than in code.
///
/// ```toml
/// [[projects]]
/// name = "gzip"
/// group = "compression"
/// build = ["make", "-j4"]
/// run = ["./gzip", "--version"]
///
/// [[projects.sources]]
/// kind = "git"
/// local = "gzip.git"
/// remote = "https://git.savannah.gnu.org/git/gzip.git"
/// limit = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    /// Project name
    pub name: String,

    /// Project group
    #[serde(default = "default_group")]
    pub group: String,

    /// Free-form domain label
    #[serde(default)]
    pub domain: String,

    /// Declared sources; the first one is the primary source
    #[serde(default)]
    pub sources: Vec<SourceSpec>,

    /// Configure command (program followed by arguments)
    #[serde(default)]
    pub configure: Vec<String>,

    /// Build command
    #[serde(default)]
    pub build: Vec<String>,

    /// Run command
    #[serde(default)]
    pub run: Vec<String>,

    /// Working directory, relative to the primary source checkout
    #[serde(default)]
    pub workdir: Option<String>,
}

fn default_group() -> String {
    "default".to_string()
}

/// A declared source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    /// A git repository; versions are commits.
    Git {
        /// Key within the project, also the checkout directory
        local: String,
        /// Repository URL
        remote: String,
        /// Only the newest `limit` commits are versions.
        #[serde(default)]
        limit: Option<usize>,
        /// Where the commit walk starts.
        #[serde(default)]
        refspec: Option<String>,
    },

    /// Named downloads, one per version, in declaration order.
    ///
    /// ```toml
    /// [[projects.sources]]
    /// kind = "http"
    /// local = "inputs"
    /// versions = [
    ///     { label = "small", url = "https://example.org/small.tar.gz" },
    ///     { label = "large", url = "https://example.org/large.tar.gz" },
    /// ]
    /// ```
    Http {
        /// Key within the project
        local: String,
        /// Downloads; the first one is the default version
        versions: Vec<HttpVersion>,
    },

    /// Named versions without content.
    List {
        /// Key within the project
        local: String,
        /// Version labels; the first one is the default
        versions: Vec<String>,
    },

    /// Versions chosen by the label of another source.
    Conditional {
        /// Key within the project
        local: String,
        /// Source whose chosen label selects the row of `table`
        depends_on: String,
        /// Versions offered per label of `depends_on`
        table: BTreeMap<String, Vec<String>>,
    },
}

/// One download of an HTTP source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpVersion {
    /// Version label
    pub label: String,
    /// Where the file is fetched from
    pub url: String,
}

impl SourceSpec {
    /// The local key of the declared source.
    pub fn local(&self) -> &str {
        match self {
            SourceSpec::Git { local, .. }
            | SourceSpec::Http { local, .. }
            | SourceSpec::List { local, .. }
            | SourceSpec::Conditional { local, .. } => local,
        }
    }
}
