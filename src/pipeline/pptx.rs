//! PPTX extraction: slide titles and speaker notes from an Open XML package.
//!
//! A `.pptx` file is a ZIP archive of XML parts linked by relationship files:
//!
//! ```text
//! ppt/presentation.xml            <p:sldIdLst><p:sldId r:id="rId2"/>…  (slide order)
//! ppt/_rels/presentation.xml.rels  rId2 → slides/slide1.xml
//! ppt/slides/slide1.xml            shapes; the title is the `title`/`ctrTitle` placeholder
//! ppt/slides/_rels/slide1.xml.rels → ../notesSlides/notesSlide1.xml
//! ppt/notesSlides/notesSlide1.xml  notes are the `body` placeholder
//! ```
//!
//! Slide order comes from `sldIdLst`, not from part names: a deck that was
//! reordered in PowerPoint keeps `slide1.xml` wherever it was moved to.

use crate::error::SlidecastError;
use crate::schema::SlideData;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const NOTES_SLIDE_REL: &str = "/notesSlide";
/// Placeholder types that hold a slide title.
const TITLE_PLACEHOLDERS: &[&str] = &["title", "ctrTitle", "vertTitle"];

/// Extracted content of a presentation, in slide order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
    pub slides: Vec<SlideData>,
}

impl Presentation {
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }
}

/// Cheap pre-check before parsing: the declared content type (when present)
/// must plausibly be a presentation and the body must start with the ZIP
/// local-file-header magic.
pub fn looks_like_pptx(content_type: Option<&str>, bytes: &[u8]) -> Result<(), SlidecastError> {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        let plausible = ct.is_empty()
            || ct.contains("presentation")
            || ct.contains("ppt")
            || ct.contains("zip")
            || ct.contains("octet-stream");
        if !plausible {
            return Err(SlidecastError::NotAPresentation {
                detail: format!("content type '{}'", ct),
            });
        }
    }

    if bytes.len() < 4 || &bytes[..4] != ZIP_MAGIC {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(SlidecastError::NotAPresentation {
            detail: format!("first bytes {:?}", magic),
        });
    }

    Ok(())
}

/// Parse a PPTX package held in memory.
pub fn parse_presentation(bytes: &[u8]) -> Result<Presentation, SlidecastError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        SlidecastError::NotAPresentation {
            detail: format!("failed to open ZIP: {}", e),
        }
    })?;

    let slide_parts = slide_order(&mut archive)?;
    debug!("Presentation lists {} slides", slide_parts.len());

    let mut slides = Vec::with_capacity(slide_parts.len());
    for part in &slide_parts {
        let slide_xml = read_part(&mut archive, part)?;
        let title = placeholder_text(&slide_xml, TITLE_PLACEHOLDERS)?.unwrap_or_default();

        let notes = match notes_part_for(&mut archive, part)? {
            Some(notes_part) => {
                let notes_xml = read_part(&mut archive, &notes_part)?;
                placeholder_text(&notes_xml, &["body"])?.unwrap_or_default()
            }
            None => String::new(),
        };

        slides.push(SlideData { title, notes });
    }

    Ok(Presentation { slides })
}

/// Ordered part names of the slides listed in `presentation.xml`.
fn slide_order<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>, SlidecastError> {
    let presentation_xml = read_part(archive, PRESENTATION_PART)?;
    let rels = read_relationships(archive, PRESENTATION_PART)?;

    let mut reader = Reader::from_str(&presentation_xml);
    reader.config_mut().trim_text(true);

    let mut parts = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sldId" =>
            {
                let Some(rel_id) = relationship_id(e) else {
                    continue;
                };
                match rels.get(&rel_id) {
                    Some(rel) => parts.push(rel.target.clone()),
                    None => warn!("Slide relationship '{}' has no target, skipping", rel_id),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PRESENTATION_PART, e)),
            _ => {}
        }
    }

    Ok(parts)
}

/// A resolved relationship: its type URI and the absolute part name it points to.
#[derive(Debug, Clone)]
struct Relationship {
    rel_type: String,
    target: String,
}

/// Read the `_rels` file belonging to `part`. A missing rels file means the
/// part has no relationships.
fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
) -> Result<HashMap<String, Relationship>, SlidecastError> {
    let (dir, file) = split_part(part);
    let rels_path = if dir.is_empty() {
        format!("_rels/{}.rels", file)
    } else {
        format!("{}/_rels/{}.rels", dir, file)
    };

    let Some(xml) = read_optional_part(archive, &rels_path)? else {
        return Ok(HashMap::new());
    };

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut rels = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let external = attribute(e, b"TargetMode").as_deref() == Some("External");
                if let (Some(id), Some(rel_type), Some(target), false) = (
                    attribute(e, b"Id"),
                    attribute(e, b"Type"),
                    attribute(e, b"Target"),
                    external,
                ) {
                    rels.insert(
                        id,
                        Relationship {
                            rel_type,
                            target: resolve_part_name(dir, &target),
                        },
                    );
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(&rels_path, e)),
            _ => {}
        }
    }

    Ok(rels)
}

/// The notes slide linked from a slide, if any.
fn notes_part_for<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    slide_part: &str,
) -> Result<Option<String>, SlidecastError> {
    let rels = read_relationships(archive, slide_part)?;
    Ok(rels
        .into_values()
        .find(|r| r.rel_type.ends_with(NOTES_SLIDE_REL))
        .map(|r| r.target))
}

/// Text of the first shape whose placeholder type is one of `kinds`.
///
/// Paragraphs are joined with `\n`; `<a:br/>` inside a paragraph is a line
/// break too. Returns `None` when no such placeholder exists.
fn placeholder_text(xml: &str, kinds: &[&str]) -> Result<Option<String>, SlidecastError> {
    let mut reader = Reader::from_str(xml);

    // Shapes can nest inside group shapes; only the innermost `sp` matters.
    let mut shape_depth = 0usize;
    let mut matched = false;
    let mut in_text = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_paragraph = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"sp" => {
                    shape_depth += 1;
                    matched = false;
                    paragraphs.clear();
                }
                b"p" if shape_depth > 0 => {
                    in_paragraph = true;
                    current.clear();
                }
                b"t" if in_paragraph => in_text = true,
                b"ph" if shape_depth > 0 => matched |= is_placeholder_of(e, kinds),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"ph" if shape_depth > 0 => matched |= is_placeholder_of(e, kinds),
                b"br" if in_paragraph => current.push('\n'),
                b"p" if shape_depth > 0 => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| SlidecastError::NotAPresentation {
                        detail: format!("bad text node: {}", err),
                    })?;
                current.push_str(&text);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if in_paragraph => {
                    in_paragraph = false;
                    paragraphs.push(std::mem::take(&mut current));
                }
                b"sp" => {
                    if matched {
                        return Ok(Some(paragraphs.join("\n")));
                    }
                    shape_depth = shape_depth.saturating_sub(1);
                    paragraphs.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("slide", e)),
            _ => {}
        }
    }

    Ok(None)
}

/// `<p:ph type="…"/>` matches when its type is one of `kinds`. A placeholder
/// without a `type` attribute is a body placeholder.
fn is_placeholder_of(e: &BytesStart<'_>, kinds: &[&str]) -> bool {
    let kind = attribute(e, b"type").unwrap_or_else(|| "body".to_string());
    kinds.iter().any(|k| *k == kind)
}

/// Attribute value by local name (namespace prefix ignored), unescaped.
fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// The namespaced `r:id` of an element. `<p:sldId>` also carries a plain
/// numeric `id`, so the prefix is what tells them apart.
fn relationship_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Split `ppt/slides/slide1.xml` into `("ppt/slides", "slide1.xml")`.
fn split_part(part: &str) -> (&str, &str) {
    match part.rfind('/') {
        Some(pos) => (&part[..pos], &part[pos + 1..]),
        None => ("", part),
    }
}

/// Resolve a relationship target against the directory of its source part.
///
/// `("ppt/slides", "../notesSlides/notesSlide1.xml")` → `ppt/notesSlides/notesSlide1.xml`;
/// a target starting with `/` is already package-absolute.
pub(crate) fn resolve_part_name(base_dir: &str, target: &str) -> String {
    let mut segments: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, SlidecastError> {
    read_optional_part(archive, name)?.ok_or_else(|| SlidecastError::NotAPresentation {
        detail: format!("missing part '{}'", name),
    })
}

fn read_optional_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, SlidecastError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(SlidecastError::NotAPresentation {
                detail: format!("failed to open '{}': {}", name, e),
            })
        }
    };

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| SlidecastError::NotAPresentation {
            detail: format!("failed to read '{}': {}", name, e),
        })?;
    Ok(Some(content))
}

fn xml_error(part: &str, e: quick_xml::Error) -> SlidecastError {
    SlidecastError::NotAPresentation {
        detail: format!("malformed XML in '{}': {}", part, e),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{build_pptx, FixtureSlide};
    use super::*;

    #[test]
    fn slides_come_back_in_presentation_order() {
        let bytes = build_pptx(&[
            FixtureSlide { title: Some("Intro"), notes: Some("Say hello") },
            FixtureSlide { title: Some("Middle"), notes: None },
            FixtureSlide { title: None, notes: Some("Wrap up\nThanks") },
        ]);

        let deck = parse_presentation(&bytes).unwrap();

        assert_eq!(deck.slide_count(), 3);
        assert_eq!(
            deck.slides,
            vec![
                SlideData { title: "Intro".into(), notes: "Say hello".into() },
                SlideData { title: "Middle".into(), notes: String::new() },
                SlideData { title: String::new(), notes: "Wrap up\nThanks".into() },
            ]
        );
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let bytes = build_pptx(&[FixtureSlide {
            title: Some("Q&A <live>"),
            notes: Some("R&D"),
        }]);
        let deck = parse_presentation(&bytes).unwrap();
        assert_eq!(deck.slides[0].title, "Q&A <live>");
        assert_eq!(deck.slides[0].notes, "R&D");
    }

    #[test]
    fn empty_deck_has_no_slides() {
        let deck = parse_presentation(&build_pptx(&[])).unwrap();
        assert_eq!(deck.slide_count(), 0);
    }

    #[test]
    fn garbage_is_not_a_presentation() {
        let err = parse_presentation(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, SlidecastError::NotAPresentation { .. }));
    }

    #[test]
    fn zip_without_presentation_part_is_rejected() {
        use std::io::Write;
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<w:document/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let err = parse_presentation(&bytes).unwrap_err();
        assert!(matches!(err, SlidecastError::NotAPresentation { ref detail } if detail.contains("presentation.xml")));
    }

    #[test]
    fn content_type_precheck() {
        let zip = b"PK\x03\x04....";
        assert!(looks_like_pptx(
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation"),
            zip
        )
        .is_ok());
        assert!(looks_like_pptx(Some("application/octet-stream"), zip).is_ok());
        assert!(looks_like_pptx(None, zip).is_ok());
        assert!(looks_like_pptx(Some("text/plain"), zip).is_err());
        assert!(looks_like_pptx(None, b"%PDF-1.7").is_err());
        assert!(looks_like_pptx(None, b"PK").is_err());
    }

    #[test]
    fn part_names_resolve_relative_targets() {
        assert_eq!(
            resolve_part_name("ppt/slides", "../notesSlides/notesSlide1.xml"),
            "ppt/notesSlides/notesSlide1.xml"
        );
        assert_eq!(resolve_part_name("ppt", "slides/slide2.xml"), "ppt/slides/slide2.xml");
        assert_eq!(resolve_part_name("ppt/slides", "/ppt/media/a.png"), "ppt/media/a.png");
        assert_eq!(resolve_part_name("ppt", "./slides/./slide3.xml"), "ppt/slides/slide3.xml");
    }

    #[test]
    fn line_breaks_and_untyped_placeholders() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree>
            <p:sp><p:nvSpPr><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>
              <p:txBody><a:p><a:r><a:t>first</a:t></a:r><a:br/><a:r><a:t>second</a:t></a:r></a:p><a:p/></p:txBody></p:sp>
            <p:sp><p:nvSpPr><p:nvPr><p:ph type="ctrTitle"/></p:nvPr></p:nvSpPr>
              <p:txBody><a:p><a:r><a:t>Cover</a:t></a:r></a:p></p:txBody></p:sp>
        </p:spTree></p:cSld></p:sld>"#;

        assert_eq!(
            placeholder_text(xml, TITLE_PLACEHOLDERS).unwrap().as_deref(),
            Some("Cover")
        );
        assert_eq!(
            placeholder_text(xml, &["body"]).unwrap().as_deref(),
            Some("first\nsecond\n")
        );
        assert_eq!(placeholder_text(xml, &["subTitle"]).unwrap(), None);
    }

    #[test]
    fn vertical_title_counts_as_title() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree>
            <p:sp><p:nvSpPr><p:nvPr><p:ph type="vertTitle"/></p:nvPr></p:nvSpPr>
              <p:txBody><a:p><a:r><a:t>Sideways</a:t></a:r></a:p></p:txBody></p:sp>
        </p:spTree></p:cSld></p:sld>"#;

        assert_eq!(
            placeholder_text(xml, TITLE_PLACEHOLDERS).unwrap().as_deref(),
            Some("Sideways")
        );
    }
}
