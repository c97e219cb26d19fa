/// Single environment variable binding.
///
/// Both fields are plain UTF-8 strings with no validation applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    /// Create a new binding.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Variable name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Variable value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl<K, V> From<(K, V)> for KeyValue
where
    K: Into<String>,
    V: Into<String>,
{
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}
