//! Entry decoration pipeline.
//!
//! Every registered filter sees every composed entry, in registration order,
//! right before the entry is written into the archive. A filter error aborts
//! the build.

use std::fmt;
use std::sync::Arc;

use crate::config::FusionConfig;
use crate::error::FuseError;
use crate::types::PackageEntry;

use super::EntryPattern;

pub trait EntryFilter: Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &str;

    fn before_add_entry(
        &self,
        fusion: &FusionConfig,
        entry: &mut PackageEntry,
    ) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn EntryFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, filter: impl EntryFilter + 'static) {
        self.filters.push(Arc::new(filter));
    }

    pub fn with(mut self, filter: impl EntryFilter + 'static) -> Self {
        self.register(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(&self, fusion: &FusionConfig, entry: &mut PackageEntry) -> Result<(), FuseError> {
        for filter in &self.filters {
            filter
                .before_add_entry(fusion, entry)
                .map_err(|source| FuseError::Filter {
                    filter: filter.name().to_string(),
                    entry: entry.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

/// Rewrites `{fusionId}` and `{meta:<key>}` tokens inside text entries.
#[derive(Debug, Clone)]
pub struct PlaceholderFilter {
    pattern: EntryPattern,
}

impl PlaceholderFilter {
    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        Ok(Self {
            pattern: EntryPattern::new(pattern)?,
        })
    }
}

impl EntryFilter for PlaceholderFilter {
    fn name(&self) -> &str {
        "placeholders"
    }

    fn before_add_entry(
        &self,
        fusion: &FusionConfig,
        entry: &mut PackageEntry,
    ) -> anyhow::Result<()> {
        if !self.pattern.matches(entry.name()) {
            return Ok(());
        }
        let bytes = entry.read_all()?;
        let text = String::from_utf8(bytes)
            .map_err(|_| anyhow::anyhow!("entry is not valid UTF-8 text"))?;
        let rendered = render_placeholders(&text, fusion)?;
        if rendered != text {
            entry.replace_content(rendered.into_bytes());
        }
        Ok(())
    }
}

fn render_placeholders(template: &str, fusion: &FusionConfig) -> anyhow::Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if let Some(after) = tail.strip_prefix("{fusionId}") {
            out.push_str(&fusion.id);
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix("{meta:")
            && let Some(end) = after.find('}')
        {
            let key = &after[..end];
            let value = fusion.metadata.get(key).ok_or_else(|| {
                anyhow::anyhow!("fusion '{}' has no metadata key '{}'", fusion.id, key)
            })?;
            out.push_str(value);
            rest = &after[end + 1..];
            continue;
        }

        out.push('{');
        rest = &tail[1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Fails the build when an entry name matches any forbidden glob.
#[derive(Debug, Clone)]
pub struct DenyListFilter {
    patterns: Vec<EntryPattern>,
}

impl DenyListFilter {
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Self> {
        let patterns = patterns
            .into_iter()
            .map(EntryPattern::new)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl EntryFilter for DenyListFilter {
    fn name(&self) -> &str {
        "deny-list"
    }

    fn before_add_entry(
        &self,
        _fusion: &FusionConfig,
        entry: &mut PackageEntry,
    ) -> anyhow::Result<()> {
        if let Some(pattern) = self.patterns.iter().find(|p| p.matches(entry.name())) {
            anyhow::bail!("entry matches forbidden pattern '{}'", pattern.as_str());
        }
        Ok(())
    }
}
