//! PDF document capability used by the sectioner, and its lopdf implementation.
//!
//! The sectioner needs little from a PDF library: load, count pages, remove a page, copy the
//! whole document, prepend a page copied from another document, and serialize.
//! [PdfDocument] names exactly those so the algorithm can be tested against any backend.

use lopdf::{Document, Object, ObjectId};
use thiserror::Error;

/// Page attributes a page may inherit from its ancestors in the page tree.
/// Copied onto a grafted page so its geometry survives the move to a new tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Rotate", b"Resources"];

/// Page trees deeper than this are treated as malformed (or cyclic).
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Errors from the PDF capability layer.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("{0}")]
    Parse(#[source] lopdf::Error),

    #[error("document is encrypted")]
    Encrypted,

    #[error("page index {index} is out of range for a document of {count} page(s)")]
    PageOutOfRange { index: usize, count: usize },

    #[error("malformed page tree: {0}")]
    PageTree(String),

    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e)
    }
}

/// In-memory PDF document operations the sectioner relies on.
///
/// Page indices are 0-based. Implementations must make [PdfDocument::copy] produce a fully
/// independent document: removing pages from the copy never affects the original.
pub trait PdfDocument: Sized {
    /// Library name reported in error messages.
    const TOOL: &'static str;

    fn load(bytes: &[u8]) -> Result<Self, PdfError>;

    fn page_count(&self) -> usize;

    fn remove_page(&mut self, index: usize) -> Result<(), PdfError>;

    fn copy(&self) -> Self;

    /// Copy page `index` of `source` into this document as its new first page.
    /// `source` is left untouched.
    fn prepend_page_from(&mut self, source: &Self, index: usize) -> Result<(), PdfError>;

    fn to_bytes(&mut self) -> Result<Vec<u8>, PdfError>;
}

/// [PdfDocument] backed by `lopdf`.
#[derive(Debug, Clone)]
pub struct LopdfDocument {
    inner: Document,
}

impl LopdfDocument {
    fn pages_root(&self) -> Result<ObjectId, PdfError> {
        let root = self.inner.trailer.get(b"Root").and_then(Object::as_reference)?;
        let catalog = self.inner.get_object(root).and_then(Object::as_dict)?;
        Ok(catalog.get(b"Pages").and_then(Object::as_reference)?)
    }
}

/// Collect the inheritable attributes that apply to `page_id`, nearest ancestor first.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Result<Vec<(Vec<u8>, Object)>, PdfError> {
    let mut found: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut node = doc.get_object(page_id).and_then(Object::as_dict)?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        for key in INHERITABLE_PAGE_KEYS {
            if found.iter().any(|(k, _)| k.as_slice() == key) {
                continue;
            }
            if let Ok(value) = node.get(key) {
                found.push((key.to_vec(), value.clone()));
            }
        }
        let parent = match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(id) => id,
            Err(_) => return Ok(found),
        };
        node = doc.get_object(parent).and_then(Object::as_dict)?;
    }
    Err(PdfError::PageTree(format!(
        "page {:?} is nested deeper than {} levels",
        page_id, MAX_PAGE_TREE_DEPTH
    )))
}

impl PdfDocument for LopdfDocument {
    const TOOL: &'static str = "lopdf";

    fn load(bytes: &[u8]) -> Result<Self, PdfError> {
        let inner = Document::load_mem(bytes)?;
        if inner.is_encrypted() {
            return Err(PdfError::Encrypted);
        }
        Ok(Self { inner })
    }

    fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    fn remove_page(&mut self, index: usize) -> Result<(), PdfError> {
        let count = self.page_count();
        if index >= count {
            return Err(PdfError::PageOutOfRange { index, count });
        }
        // lopdf page numbers are 1-based.
        self.inner.delete_pages(&[index as u32 + 1]);
        if self.page_count() != count - 1 {
            return Err(PdfError::PageTree(format!(
                "page {} could not be detached from the page tree",
                index
            )));
        }
        Ok(())
    }

    fn copy(&self) -> Self {
        self.clone()
    }

    fn prepend_page_from(&mut self, source: &Self, index: usize) -> Result<(), PdfError> {
        let count = source.page_count();
        if index >= count {
            return Err(PdfError::PageOutOfRange { index, count });
        }

        // Renumber a private copy of the donor so its ids cannot collide with ours.
        let mut donor = source.inner.clone();
        donor.renumber_objects_with(self.inner.max_id + 1);
        let page_id = *donor
            .get_pages()
            .get(&(index as u32 + 1))
            .ok_or(PdfError::PageOutOfRange { index, count })?;
        let inherited = inherited_attributes(&donor, page_id)?;

        let pages_id = self.pages_root()?;
        self.inner.max_id = self.inner.max_id.max(donor.max_id);
        self.inner.objects.extend(donor.objects);

        {
            let page = self
                .inner
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)?;
            for (key, value) in inherited {
                if !page.has(&key) {
                    page.set(key, value);
                }
            }
            page.set("Parent", Object::Reference(pages_id));
        }

        let pages = self
            .inner
            .get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)?;
        let kids_count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        pages.set("Count", kids_count + 1);
        let kids = pages.get_mut(b"Kids").and_then(Object::as_array_mut)?;
        kids.insert(0, Object::Reference(page_id));
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, PdfError> {
        // Removed pages and the donor's leftover page tree are unreachable by now.
        self.inner.prune_objects();
        let mut buf = Vec::new();
        self.inner
            .save_to(&mut buf)
            .map_err(|e| PdfError::Serialize(e.to_string()))?;
        Ok(buf)
    }
}
