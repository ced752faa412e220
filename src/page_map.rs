//! Page map: which page ranges of the combined PDF belong to which publication section.
//!
//! Render engines report a [RawPageMap] (a JSON object keyed by section id, in document order).
//! The sectioner only works on a [PageMap], which can only be built through [validate].

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Prefix the templating layer puts on section element ids. Stripped from output filenames.
pub const SECTION_ID_PREFIX: &str = "page-";

/// One section as reported by a render engine.
///
/// Indices are 0-based and stay signed until validation: engines use negative values as
/// "not placed" and "no cover" sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub start_page: i64,
    pub end_page: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_page: Option<i64>,
}

impl RawSection {
    pub fn new(start_page: i64, end_page: i64) -> Self {
        Self {
            title: None,
            start_page,
            end_page,
            cover_page: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_cover(mut self, cover_page: i64) -> Self {
        self.cover_page = Some(cover_page);
        self
    }

    /// Placeholder sections never produce output: a present-but-blank title, or a range that
    /// is the same negative "unplaced" sentinel on both ends. A missing title is not blank.
    pub fn is_placeholder(&self) -> bool {
        let blank_title = self
            .title
            .as_deref()
            .map(|t| t.trim().is_empty())
            .unwrap_or(false);
        let unplaced = self.start_page < 0 && self.start_page == self.end_page;
        blank_title || unplaced
    }
}

/// Page map exactly as an engine reported it. Keeps insertion order; ids are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPageMap {
    entries: Vec<(String, RawSection)>,
}

impl RawPageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the engine's JSON. An empty or `null` document is an empty map.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        if s.trim().is_empty() {
            return Ok(Self::new());
        }
        let parsed: Option<Self> = serde_json::from_str(s)?;
        Ok(parsed.unwrap_or_default())
    }

    /// Insert or replace a section. A replaced section keeps its original position.
    pub fn insert(&mut self, id: impl Into<String>, section: RawSection) {
        let id = id.into();
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some((_, existing)) => *existing = section,
            None => self.entries.push((id, section)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&RawSection> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawSection)> {
        self.entries.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take cover page indices from the covers document's page map.
    ///
    /// In the covers document each section's cover is its first page, so a covers entry's
    /// `startPage` becomes the main entry's `coverPage`. Main entries that already carry a
    /// non-negative cover page are left alone. Returns how many sections received a cover.
    pub fn apply_cover_pages(&mut self, covers: &RawPageMap) -> usize {
        let mut assigned = 0;
        for (id, section) in self.entries.iter_mut() {
            if section.cover_page.is_some_and(|c| c >= 0) {
                continue;
            }
            if let Some(cover) = covers.get(id).filter(|c| c.start_page >= 0) {
                section.cover_page = Some(cover.start_page);
                assigned += 1;
            }
        }
        assigned
    }
}

impl<K: Into<String>> FromIterator<(K, RawSection)> for RawPageMap {
    fn from_iter<I: IntoIterator<Item = (K, RawSection)>>(iter: I) -> Self {
        let mut map = RawPageMap::new();
        for (id, section) in iter {
            map.insert(id, section);
        }
        map
    }
}

impl Serialize for RawPageMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, section) in &self.entries {
            map.serialize_entry(id, section)?;
        }
        map.end()
    }
}

struct RawPageMapVisitor;

impl<'de> Visitor<'de> for RawPageMapVisitor {
    type Value = RawPageMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping section ids to page ranges")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = RawPageMap::new();
        while let Some((id, section)) = access.next_entry::<String, RawSection>()? {
            map.insert(id, section);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for RawPageMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RawPageMapVisitor)
    }
}

/// Validated, inclusive page range of one section within the combined document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRange {
    pub start_page: usize,
    pub end_page: usize,
    /// Index into the covers document, if this section gets a cover page.
    pub cover_page: Option<usize>,
}

impl SectionRange {
    /// Number of pages taken from the combined document.
    pub fn page_count(&self) -> usize {
        self.end_page - self.start_page + 1
    }
}

/// A section that survived validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    pub range: SectionRange,
}

impl Section {
    /// Id used in output filenames: the section id without its `page-` prefix.
    pub fn file_stem(&self) -> &str {
        self.id.strip_prefix(SECTION_ID_PREFIX).unwrap_or(&self.id)
    }
}

/// Page map whose every range lies inside the combined document. Built only by [validate].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMap {
    sections: Vec<Section>,
}

impl PageMap {
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// A page map entry that does not fit the combined document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("section '{section}': start page {start_page} is negative")]
    NegativeStart { section: String, start_page: i64 },

    #[error("section '{section}': end page {end_page} is before start page {start_page}")]
    EndBeforeStart {
        section: String,
        start_page: i64,
        end_page: i64,
    },

    #[error("section '{section}': end page {end_page} is out of range for a document of {page_count} page(s)")]
    EndOutOfRange {
        section: String,
        end_page: i64,
        page_count: usize,
    },
}

impl ValidationError {
    /// Id of the offending section.
    pub fn section(&self) -> &str {
        match self {
            ValidationError::NegativeStart { section, .. }
            | ValidationError::EndBeforeStart { section, .. }
            | ValidationError::EndOutOfRange { section, .. } => section,
        }
    }
}

/// Check every entry against the combined document's page count.
///
/// Placeholder entries are dropped without error. The first malformed entry fails the whole
/// map. Cover page indices are not bounds-checked (the covers document may not be loaded
/// yet); a negative cover page means "no cover".
pub fn validate(raw: &RawPageMap, page_count: usize) -> Result<PageMap, ValidationError> {
    let mut sections = Vec::with_capacity(raw.len());
    for (id, entry) in raw.iter() {
        if entry.is_placeholder() {
            continue;
        }
        let start_page =
            usize::try_from(entry.start_page).map_err(|_| ValidationError::NegativeStart {
                section: id.to_string(),
                start_page: entry.start_page,
            })?;
        if entry.end_page < entry.start_page {
            return Err(ValidationError::EndBeforeStart {
                section: id.to_string(),
                start_page: entry.start_page,
                end_page: entry.end_page,
            });
        }
        let end_page = usize::try_from(entry.end_page)
            .ok()
            .filter(|end| *end < page_count)
            .ok_or_else(|| ValidationError::EndOutOfRange {
                section: id.to_string(),
                end_page: entry.end_page,
                page_count,
            })?;
        let cover_page = entry
            .cover_page
            .and_then(|c| usize::try_from(c).ok());
        sections.push(Section {
            id: id.to_string(),
            range: SectionRange {
                start_page,
                end_page,
                cover_page,
            },
        });
    }
    Ok(PageMap { sections })
}
