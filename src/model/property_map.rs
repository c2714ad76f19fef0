//! PropertyMap: named query parameters.

use std::collections::HashMap;
use super::Value;

/// A map of parameter names to values, passed alongside query text.
pub type PropertyMap = HashMap<String, Value>;

/// Build a parameter map from `(name, value)` pairs.
pub fn params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
