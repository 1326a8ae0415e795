use serde::{Deserialize, Serialize};

/// Extra environment for a spawned task, layered over the caller's own.
///
/// Stored as ordered pairs; a later entry for the same key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskEnv(Vec<(String, String)>);

impl TaskEnv {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push((key.into(), value.into()));
    }

    /// Value for `key`, honouring last-wins overrides.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Concatenate, letting entries of `other` override.
    pub fn merged(&self, other: &TaskEnv) -> TaskEnv {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        TaskEnv(out)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TaskEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
