use serde::{Deserialize, Serialize};
use std::fmt;

/// One key or index below the root of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Index(usize),
    Key(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "{}", i),
            Segment::Key(k) => write!(f, "{}", k),
        }
    }
}

/// A reference to a context entry, optionally descending into it.
///
/// Serialized either as a bare name (`"balance"`) or as a segment list whose
/// first element names the context entry (`["balances", "alice"]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PathRepr", into = "PathRepr")]
pub struct Path {
    root: String,
    keys: Vec<Segment>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PathRepr {
    Name(String),
    Segments(Vec<Segment>),
}

impl TryFrom<PathRepr> for Path {
    type Error = String;

    fn try_from(repr: PathRepr) -> Result<Self, Self::Error> {
        match repr {
            PathRepr::Name(name) => Ok(Path::name(name)),
            PathRepr::Segments(segments) => {
                let mut iter = segments.into_iter();
                match iter.next() {
                    Some(Segment::Key(root)) => Ok(Path {
                        root,
                        keys: iter.collect(),
                    }),
                    Some(Segment::Index(i)) => {
                        Err(format!("path must start with a variable name, found index {}", i))
                    }
                    None => Err("path must not be empty".to_string()),
                }
            }
        }
    }
}

impl From<Path> for PathRepr {
    fn from(path: Path) -> Self {
        if path.keys.is_empty() {
            PathRepr::Name(path.root)
        } else {
            let mut segments = vec![Segment::Key(path.root)];
            segments.extend(path.keys);
            PathRepr::Segments(segments)
        }
    }
}

impl Path {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            keys: Vec::new(),
        }
    }

    pub fn nested(root: impl Into<String>, keys: Vec<Segment>) -> Self {
        Self {
            root: root.into(),
            keys,
        }
    }

    /// The context entry this path starts from.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn keys(&self) -> &[Segment] {
        &self.keys
    }

    pub fn is_simple(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<&str> for Path {
    fn from(name: &str) -> Self {
        Path::name(name)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for key in &self.keys {
            write!(f, ".{}", key)?;
        }
        Ok(())
    }
}
