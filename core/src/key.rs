use serde::{Deserialize, Serialize};

/// Number of components in a full [`GroupKey`].
pub const KEY_ARITY: usize = 9;

/// Composite grouping key: the basis date followed by the attribution
/// fields. `None` sorts before any string and never compares equal to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub host: Option<String>,
    pub user: Option<String>,
    pub vo_issuer: Option<String>,
    pub vo: Option<String>,
    pub vo_group: Option<String>,
    pub vo_role: Option<String>,
}

impl GroupKey {
    pub fn date_parts(&self) -> (i32, u32, u32) {
        (self.year, self.month, self.day)
    }

    /// The key as an ordered list of components, in view-row order.
    pub fn components(&self) -> Vec<KeyComponent> {
        vec![
            KeyComponent::Int(i64::from(self.year)),
            KeyComponent::Int(i64::from(self.month)),
            KeyComponent::Int(i64::from(self.day)),
            KeyComponent::from(&self.host),
            KeyComponent::from(&self.user),
            KeyComponent::from(&self.vo_issuer),
            KeyComponent::from(&self.vo),
            KeyComponent::from(&self.vo_group),
            KeyComponent::from(&self.vo_role),
        ]
    }

    /// First `level` components of the key. Levels above [`KEY_ARITY`]
    /// keep the whole key.
    pub fn prefix(&self, level: usize) -> KeyPrefix {
        let mut components = self.components();
        components.truncate(level.min(KEY_ARITY));
        KeyPrefix(components)
    }
}

/// One element of a view-row key. Variant order gives nulls first, then
/// numbers, then strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyComponent {
    Null,
    Int(i64),
    Text(String),
}

impl From<&Option<String>> for KeyComponent {
    fn from(value: &Option<String>) -> Self {
        match value {
            Some(text) => KeyComponent::Text(text.clone()),
            None => KeyComponent::Null,
        }
    }
}

impl std::fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyComponent::Null => f.write_str("-"),
            KeyComponent::Int(value) => write!(f, "{value}"),
            KeyComponent::Text(text) => f.write_str(text),
        }
    }
}

/// Leading components of a [`GroupKey`], used as the key of a view row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPrefix(pub Vec<KeyComponent>);

impl KeyPrefix {
    pub fn components(&self) -> &[KeyComponent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&GroupKey> for KeyPrefix {
    fn from(key: &GroupKey) -> Self {
        KeyPrefix(key.components())
    }
}
