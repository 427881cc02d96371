use serde_json::Value;
use std::fmt;

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Address of a single value inside a JSON document, rendered as `a.b[0].c`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPath {
    segments: Vec<Segment>,
}

impl KeyPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Return a new path extended with an object key
    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Self { segments }
    }

    /// Return a new path extended with an array index
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    /// Parse the dotted form. Segments may carry any number of `[n]`
    /// suffixes (`items[0][2]`), and a path may start with one (`[1].name`).
    /// Returns `None` on malformed input.
    pub fn parse(path: &str) -> Option<Self> {
        if path.is_empty() {
            return None;
        }

        let mut segments = Vec::new();

        for part in path.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };

            if name.is_empty() {
                // Only a leading "[n]" may omit the key name
                if rest.is_empty() || !segments.is_empty() {
                    return None;
                }
            } else {
                segments.push(Segment::Key(name.to_string()));
            }

            while !rest.is_empty() {
                let inner = rest.strip_prefix('[')?;
                let close = inner.find(']')?;
                let index = inner[..close].parse::<usize>().ok()?;
                segments.push(Segment::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Some(Self { segments })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Look up the value a path points at
pub fn value_at<'a>(doc: &'a Value, path: &KeyPath) -> Option<&'a Value> {
    path.segments.iter().try_fold(doc, |current, segment| match segment {
        Segment::Key(key) => current.as_object()?.get(key),
        Segment::Index(index) => current.as_array()?.get(*index),
    })
}

fn value_at_mut<'a>(doc: &'a mut Value, path: &KeyPath) -> Option<&'a mut Value> {
    path.segments.iter().try_fold(doc, |current, segment| match segment {
        Segment::Key(key) => current.as_object_mut()?.get_mut(key),
        Segment::Index(index) => current.as_array_mut()?.get_mut(*index),
    })
}

/// Replace the value at `path`. The parent must exist; a missing final
/// object key is inserted, a missing array index is not. Returns whether the
/// value was written.
pub fn set_value_at(doc: &mut Value, path: &KeyPath, value: Value) -> bool {
    let Some((last, parents)) = path.segments.split_last() else {
        return false;
    };

    let parent_path = KeyPath { segments: parents.to_vec() };
    let Some(parent) = value_at_mut(doc, &parent_path) else {
        return false;
    };

    match (last, parent) {
        (Segment::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            true
        }
        (Segment::Index(index), Value::Array(items)) => match items.get_mut(*index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// String-path variant of [`value_at`]; malformed paths yield `None`
pub fn get_value_by_key_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    value_at(doc, &KeyPath::parse(path)?)
}

/// String-path variant of [`set_value_at`]; malformed paths yield `false`
pub fn set_value_by_key_path(doc: &mut Value, path: &str, value: Value) -> bool {
    match KeyPath::parse(path) {
        Some(path) => set_value_at(doc, &path, value),
        None => false,
    }
}
