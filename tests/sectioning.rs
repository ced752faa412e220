//! End-to-end sectioning through the public API: JSON page map in, section files out.

use folio::pipeline::write_outputs;
use folio::{split, LopdfDocument, PipelineError, RawPageMap, SectionConfig};
use lopdf::{dictionary, Document, Object, Stream};

const A4: [i64; 4] = [0, 0, 595, 842];
const LETTER: [i64; 4] = [0, 0, 612, 792];

/// PDF whose page i shows the text "{label} {i}". MediaBox is inherited from the page tree root.
fn labelled_pdf(label: &str, pages: usize, media_box: [i64; 4]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|i| {
            let text = format!("BT /F1 18 Tf 72 700 Td ({} {}) Tj ET", label, i);
            let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            Object::Reference(page_id)
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Page texts in order plus each page's effective MediaBox.
fn inspect(bytes: &[u8]) -> Vec<(String, Vec<i64>)> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let content = String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned();
            let open = content.find('(').unwrap() + 1;
            let close = content.rfind(')').unwrap();
            let mut node = doc.get_object(*id).and_then(Object::as_dict).unwrap();
            let media_box = loop {
                if let Ok(mb) = node.get(b"MediaBox").and_then(Object::as_array) {
                    break mb.iter().filter_map(|o| o.as_i64().ok()).collect::<Vec<_>>();
                }
                let parent = node.get(b"Parent").and_then(Object::as_reference).unwrap();
                node = doc.get_object(parent).and_then(Object::as_dict).unwrap();
            };
            (content[open..close].to_string(), media_box)
        })
        .collect()
}

fn texts(bytes: &[u8]) -> Vec<String> {
    inspect(bytes).into_iter().map(|(text, _)| text).collect()
}

const TEN_PAGE_MAP: &str = r#"{
    "page-intro": { "title": "Introduction", "startPage": 0, "endPage": 2 },
    "page-ch1": { "title": "Chapter 1", "startPage": 3, "endPage": 9, "coverPage": 0 },
    "page-unplaced": { "title": "Appendix", "startPage": -1, "endPage": -1 },
    "page-untitled": { "title": "", "startPage": 4, "endPage": 4 }
}"#;

#[test]
fn ten_page_publication_with_covers_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let combined = labelled_pdf("main", 10, A4);
    let covers = labelled_pdf("cover", 1, LETTER);
    let map = RawPageMap::from_json(TEN_PAGE_MAP).unwrap();
    let config = SectionConfig::new("publication", dir.path().join("pdf")).with_cover_page(true);

    let outputs = split::<LopdfDocument>(&combined, Some(&covers), &map, Some(&config)).unwrap();
    write_outputs(None, &outputs).unwrap();

    let intro = std::fs::read(dir.path().join("pdf/publication-intro.pdf")).unwrap();
    assert_eq!(texts(&intro), ["main 0", "main 1", "main 2"]);

    let ch1 = inspect(&std::fs::read(dir.path().join("pdf/publication-ch1.pdf")).unwrap());
    assert_eq!(ch1.len(), 8);
    assert_eq!(ch1[0], ("cover 0".to_string(), LETTER.to_vec()));
    assert!(ch1[1..].iter().all(|(_, mb)| mb == &A4.to_vec()));
    assert_eq!(ch1[1].0, "main 3");
    assert_eq!(ch1[7].0, "main 9");

    let written: Vec<_> = std::fs::read_dir(dir.path().join("pdf"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(written.len(), 2);
}

#[test]
fn every_valid_range_of_a_small_document() {
    let combined = labelled_pdf("p", 5, A4);
    let config = SectionConfig::new("s", "out");
    for start in 0..5 {
        for end in start..5 {
            let json = format!(
                r#"{{"page-r":{{"title":"R","startPage":{},"endPage":{}}}}}"#,
                start, end
            );
            let map = RawPageMap::from_json(&json).unwrap();
            let outputs = split::<LopdfDocument>(&combined, None, &map, Some(&config)).unwrap();
            let expected: Vec<String> = (start..=end).map(|i| format!("p {}", i)).collect();
            assert_eq!(texts(&outputs[0].bytes), expected, "range {}..={}", start, end);
        }
    }
}

#[test]
fn section_output_is_byte_identical_across_runs() {
    let combined = labelled_pdf("main", 10, A4);
    let covers = labelled_pdf("cover", 1, LETTER);
    let map = RawPageMap::from_json(TEN_PAGE_MAP).unwrap();
    let config = SectionConfig::new("publication", "out").with_cover_page(true);
    let a = split::<LopdfDocument>(&combined, Some(&covers), &map, Some(&config)).unwrap();
    let b = split::<LopdfDocument>(&combined, Some(&covers), &map, Some(&config)).unwrap();
    let bytes = |outputs: &[folio::SectionOutput]| -> Vec<Vec<u8>> {
        outputs.iter().map(|o| o.bytes.clone()).collect()
    };
    assert_eq!(bytes(&a), bytes(&b));
}

#[test]
fn end_page_past_document_is_section_extraction_error() {
    let combined = labelled_pdf("main", 3, A4);
    let map = RawPageMap::from_json(
        r#"{"page-a":{"title":"A","startPage":0,"endPage":0},"page-b":{"title":"B","startPage":1,"endPage":3}}"#,
    )
    .unwrap();
    let config = SectionConfig::new("publication", "out");
    let err = split::<LopdfDocument>(&combined, None, &map, Some(&config)).unwrap_err();
    assert_eq!(err.tool(), Some("lopdf"));
    assert_eq!(err.operation().as_deref(), Some("extract section 'page-b'"));
    assert!(err.detail().contains("out of range"));
    assert!(matches!(err, PipelineError::SectionExtraction { .. }));
}

#[test]
fn corrupt_main_pdf_is_document_load_error() {
    let map = RawPageMap::from_json(TEN_PAGE_MAP).unwrap();
    let config = SectionConfig::new("publication", "out");
    let err = split::<LopdfDocument>(b"%PDF-1.7\n%%EOF", None, &map, Some(&config)).unwrap_err();
    assert!(matches!(err, PipelineError::DocumentLoad { .. }));
    assert_eq!(err.operation().as_deref(), Some("load main PDF"));
    assert!(err.to_string().starts_with("lopdf: failed to load main PDF: "));
}
