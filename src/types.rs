//! Product record type shared by extraction, walking and persistence

/// One scraped product: field name to text, in field-map order.
///
/// Missing fields hold an empty string. Records are built once by the
/// extractor and not modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductRecord {
    fields: Vec<(String, String)>,
}

impl ProductRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an earlier value under the same name in place
    pub(crate) fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Short label for progress output: the first non-empty of `candidates`
    pub fn label<'a>(&'a self, candidates: &[String]) -> Option<&'a str> {
        candidates
            .iter()
            .filter_map(|c| self.get(c))
            .find(|v| !v.is_empty())
    }
}

impl<K, V> FromIterator<(K, V)> for ProductRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = ProductRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}
