use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(CommentId);
id_newtype!(ContainerId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Class,
    Member,
    Guide,
    Video,
    Unknown,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Class => "class",
            TargetKind::Member => "member",
            TargetKind::Guide => "guide",
            TargetKind::Video => "video",
            TargetKind::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "class" => Some(TargetKind::Class),
            "member" => Some(TargetKind::Member),
            "guide" => Some(TargetKind::Guide),
            "video" => Some(TargetKind::Video),
            "unknown" => Some(TargetKind::Unknown),
            _ => None,
        }
    }
}

/// The `(kind, name, memberName?)` triple a comment thread hangs off.
///
/// On the wire it is a JSON array: `["class", "Ext.Panel", ""]`, or
/// `["unknown"]` for ids missing from the lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CommentTarget {
    pub kind: TargetKind,
    pub name: String,
    pub member: String,
}

impl CommentTarget {
    pub fn new(kind: TargetKind, name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            member: member.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(TargetKind::Unknown, "", "")
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == TargetKind::Unknown
    }

    pub fn components(&self) -> Vec<String> {
        if self.is_unknown() {
            return vec![TargetKind::Unknown.as_str().to_string()];
        }
        vec![
            self.kind.as_str().to_string(),
            self.name.clone(),
            self.member.clone(),
        ]
    }

    /// Sort key of the thread itself; every comment key of the thread has it as prefix.
    pub fn sort_key(&self) -> SortKey {
        SortKey(self.components().into_iter().map(KeyPart::Str).collect())
    }

    /// Half-open range `[target, target + sentinel)` covering exactly this thread.
    pub fn key_range(&self) -> KeyRange {
        let start = self.sort_key();
        let mut end = start.clone();
        end.0.push(KeyPart::Sentinel);
        KeyRange { start, end }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(&self.components()).unwrap_or_else(|_| "[\"unknown\"]".into())
    }
}

/// Decoding is total: empty arrays and kinds outside the known set become
/// the unknown target, so one foreign row never spoils a whole scan.
impl From<Vec<String>> for CommentTarget {
    fn from(value: Vec<String>) -> Self {
        let mut parts = value.into_iter();
        match parts.next().as_deref().and_then(TargetKind::parse) {
            None | Some(TargetKind::Unknown) => Self::unknown(),
            Some(kind) => Self::new(
                kind,
                parts.next().unwrap_or_default(),
                parts.next().unwrap_or_default(),
            ),
        }
    }
}

impl From<CommentTarget> for Vec<String> {
    fn from(value: CommentTarget) -> Self {
        value.components()
    }
}

impl Ord for CommentTarget {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for CommentTarget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CommentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// One component of a store sort key.
///
/// Variant order is the collation order: numbers, then strings, then the
/// sentinel `{}` which sorts after every other component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum KeyPart {
    Num(i64),
    Str(String),
    Sentinel,
}

impl TryFrom<Value> for KeyPart {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(KeyPart::Str(s)),
            Value::Number(n) => n
                .as_i64()
                .map(KeyPart::Num)
                .ok_or_else(|| format!("non-integer key component {n}")),
            Value::Object(map) if map.is_empty() => Ok(KeyPart::Sentinel),
            other => Err(format!("unsupported key component {other}")),
        }
    }
}

impl From<KeyPart> for Value {
    fn from(value: KeyPart) -> Self {
        match value {
            KeyPart::Num(n) => Value::from(n),
            KeyPart::Str(s) => Value::String(s),
            KeyPart::Sentinel => Value::Object(Map::new()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(pub Vec<KeyPart>);

impl SortKey {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".into())
    }

    pub fn starts_with(&self, prefix: &SortKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: SortKey,
    pub end: SortKey,
}

impl KeyRange {
    pub fn contains(&self, key: &SortKey) -> bool {
        &self.start <= key && key < &self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

/// Client-side copy of a stored comment, as handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub target: CommentTarget,
    pub author: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub vote_score: i64,
    pub author_is_moderator: bool,
    /// Direction confirmed for the current viewer; at most one is ever marked.
    pub viewer_vote: Option<VoteDirection>,
    pub key: SortKey,
}
