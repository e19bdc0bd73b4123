use std::path::Path;

/// Prefix rewrite rules applied to a requested path before repository resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorTable {
    entries: Vec<(String, String)>,
}

impl MirrorTable {
    pub fn parse(raw: &str) -> Self {
        let mut table = MirrorTable::default();
        for (n, line) in raw.lines().enumerate() {
            let l = line.trim();
            if l.is_empty() || l.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = l.split_whitespace().collect();
            let [prefix, replacement] = fields.as_slice() else {
                tracing::warn!("ignoring malformed mirror line {}: {}", n + 1, l);
                continue;
            };
            table.insert(prefix, replacement);
        }
        table
    }

    /// Reads a mirror file. A missing file is an empty table.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(MirrorTable::default());
        }
        Ok(MirrorTable::parse(&std::fs::read_to_string(path)?))
    }

    pub fn insert(&mut self, prefix: &str, replacement: &str) {
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| k == prefix) {
            existing.1 = replacement.to_string();
        } else {
            self.entries
                .push((prefix.to_string(), replacement.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the longest matching prefix of `path`. Unmatched paths come back unchanged.
    pub fn rewrite(&self, path: &str) -> String {
        let best = self
            .entries
            .iter()
            .filter(|(k, _)| path.starts_with(k.as_str()))
            .max_by_key(|(k, _)| k.len());
        match best {
            Some((k, v)) => format!("{}{}", v, &path[k.len()..]),
            None => path.to_string(),
        }
    }
}
