//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn shape(ph: &str, text: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="s"/><p:cNvSpPr/><p:nvPr>{ph}</p:nvPr></p:nvSpPr><p:txBody><a:bodyPr/><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"#
    )
}

fn put(zip: &mut ZipWriter<Cursor<Vec<u8>>>, name: &str, body: &str) {
    zip.start_file(name, SimpleFileOptions::default()).unwrap();
    zip.write_all(body.as_bytes()).unwrap();
}

/// A deck of `(title, notes)` slides; an empty notes string means no notes slide.
pub fn build_deck(slides: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let ids: String = (0..slides.len())
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 1))
        .collect();
    let rels: String = (0..slides.len())
        .map(|i| {
            format!(
                r#"<Relationship Id="rId{}" Type="{REL_NS}/slide" Target="slides/slide{}.xml"/>"#,
                i + 1,
                i + 1
            )
        })
        .collect();

    put(&mut zip, "[Content_Types].xml", r#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#);
    put(
        &mut zip,
        "ppt/presentation.xml",
        &format!(r#"<?xml version="1.0"?><p:presentation {NS}><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#),
    );
    put(
        &mut zip,
        "ppt/_rels/presentation.xml.rels",
        &format!(r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#),
    );

    for (i, (title, notes)) in slides.iter().enumerate() {
        let n = i + 1;
        put(
            &mut zip,
            &format!("ppt/slides/slide{n}.xml"),
            &format!(
                r#"<?xml version="1.0"?><p:sld {NS}><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>"#,
                shape(r#"<p:ph type="title"/>"#, title)
            ),
        );

        let mut slide_rels = String::new();
        if !notes.is_empty() {
            slide_rels = format!(
                r#"<Relationship Id="rId2" Type="{REL_NS}/notesSlide" Target="../notesSlides/notesSlide{n}.xml"/>"#
            );
            put(
                &mut zip,
                &format!("ppt/notesSlides/notesSlide{n}.xml"),
                &format!(
                    r#"<?xml version="1.0"?><p:notes {NS}><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:notes>"#,
                    shape(r#"<p:ph type="body" idx="1"/>"#, notes)
                ),
            );
        }
        put(
            &mut zip,
            &format!("ppt/slides/_rels/slide{n}.xml.rels"),
            &format!(r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{slide_rels}</Relationships>"#),
        );
    }

    zip.finish().unwrap().into_inner()
}

/// A valid ZIP that is not a presentation.
pub fn plain_zip() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    put(&mut zip, "hello.txt", "hello");
    zip.finish().unwrap().into_inner()
}

/// Write an executable shell script named `name` into `dir`.
#[cfg(unix)]
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
