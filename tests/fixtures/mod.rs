#![allow(dead_code)]

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use flate2::{write::ZlibEncoder, Compression};
use scrubpdf::{
    cleaner::{Denylist, ObjectRole},
    pdf_document::{DocumentCodec, LopdfCodec},
    types::{Dictionary, Document, ObjectId, Stream, Value},
};

pub const CATALOG: ObjectId = ObjectId::new(1, 0);
pub const PAGES: ObjectId = ObjectId::new(2, 0);
pub const PAGE: ObjectId = ObjectId::new(3, 0);
pub const ANNOTATION: ObjectId = ObjectId::new(4, 0);
pub const SCRIPT_ACTION: ObjectId = ObjectId::new(5, 0);
pub const CONTENTS: ObjectId = ObjectId::new(6, 0);
pub const CONTAINER: ObjectId = ObjectId::new(10, 0);

pub struct TestFixtures;

impl TestFixtures {
    /// One page with a content stream, nothing active.
    pub fn minimal_document() -> Document {
        let mut doc = Document::new("1.7");
        doc.set(CATALOG, Self::catalog().into());
        doc.set(PAGES, Self::pages().into());
        doc.set(PAGE, Self::page().into());
        doc.set(CONTENTS, Self::contents());
        doc.trailer.set("Root", CATALOG);
        doc
    }

    /// Every denylisted key present: a page with `/AA` and a link annotation
    /// carrying `/A`, a catalog with open action, names, form and outlines.
    pub fn active_document() -> Document {
        let mut doc = Self::minimal_document();
        doc.set(SCRIPT_ACTION, Self::script_action());

        let mut annotation = Dictionary::new();
        annotation.set("Type", Value::name("Annot"));
        annotation.set("Subtype", Value::name("Link"));
        annotation.set("Rect", Self::rect(&[10, 10, 100, 40]));
        annotation.set("A", SCRIPT_ACTION);
        doc.set(ANNOTATION, annotation.into());

        if let Some(page) = doc.get_mut(PAGE).and_then(Value::as_dict_mut) {
            page.set("Annots", vec![Value::from(ANNOTATION)]);
            let mut triggers = Dictionary::new();
            triggers.set("O", SCRIPT_ACTION);
            page.set("AA", triggers);
            page.set("JS", Value::string_literal("app.alert('page')"));
        }

        let mut names = Dictionary::new();
        names.set("JavaScript", SCRIPT_ACTION);
        let mut form = Dictionary::new();
        form.set("Fields", Vec::<Value>::new());
        let outlines = doc.add_object(Dictionary::from_iter([
            ("Type", Value::name("Outlines")),
            ("Count", Value::Integer(0)),
        ]));

        if let Some(catalog) = doc.catalog_mut() {
            catalog.set("OpenAction", SCRIPT_ACTION);
            catalog.set("AA", Dictionary::from_iter([("WC", Value::from(SCRIPT_ACTION))]));
            catalog.set("Names", names);
            catalog.set("AcroForm", form);
            catalog.set("Outlines", outlines);
            catalog.set("JavaScript", SCRIPT_ACTION);
        }
        doc
    }

    /// The only active content is a page packed inside a compressed object
    /// stream: the top-level table holds no `/Type /Page` object at all.
    pub fn packed_active_document() -> Document {
        let mut doc = Self::minimal_document();
        doc.remove(PAGE);
        doc.set(SCRIPT_ACTION, Self::script_action());

        let page = b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                     /Contents 6 0 R /AA << /O 5 0 R >> >>";
        doc.set(CONTAINER, Value::Stream(Self::object_stream(&[(PAGE.number, page)])));
        doc
    }

    /// Compressed object stream holding `objects` as `(number, source)` pairs.
    pub fn object_stream(objects: &[(u32, &[u8])]) -> Stream {
        let mut header = Vec::new();
        let mut body = Vec::new();
        for (number, source) in objects {
            header.extend_from_slice(format!("{} {} ", number, body.len()).as_bytes());
            body.extend_from_slice(source);
            body.push(b'\n');
        }
        let first = header.len();
        header.extend_from_slice(&body);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&header).unwrap();
        let mut dict = Dictionary::new();
        dict.set("Type", Value::name("ObjStm"));
        dict.set("N", objects.len() as i64);
        dict.set("First", first as i64);
        dict.set("Filter", Value::name("FlateDecode"));
        Stream::new(dict, encoder.finish().unwrap())
    }

    pub fn write(dir: &Path, name: &str, doc: &Document) -> PathBuf {
        let path = dir.join(name);
        let bytes = LopdfCodec.serialize(doc).expect("fixture serializes");
        std::fs::write(&path, bytes).expect("fixture written");
        path
    }

    /// Executable shell script with `body`, used in place of an external tool.
    #[cfg(unix)]
    pub fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-tool");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("script written");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("script made executable");
        path
    }

    pub fn read(path: &Path) -> Document {
        let bytes = std::fs::read(path).expect("output readable");
        LopdfCodec.parse(&bytes).expect("output parses")
    }

    /// Denylisted `(role, key)` pairs still present on the catalog, on any
    /// page of the page tree, or on any annotation those pages reference.
    pub fn remaining_keys(doc: &Document, denylist: &Denylist) -> Vec<(ObjectRole, String)> {
        let mut found = Vec::new();
        let mut check = |role: ObjectRole, dict: &Dictionary| {
            for key in denylist.keys_for(role) {
                if dict.contains_key(key.as_bytes()) {
                    found.push((role, key.to_string()));
                }
            }
        };

        if let Some(catalog) = doc.catalog() {
            check(ObjectRole::Catalog, catalog);
        }
        for id in doc.page_ids() {
            let Some(page) = doc.get(id).as_dict() else {
                continue;
            };
            check(ObjectRole::Page, page);
            let annots = page.get(b"Annots").map(|v| doc.resolve(v));
            for annot in annots.and_then(Value::as_array).unwrap_or_default() {
                if let Some(dict) = doc.resolve(annot).as_dict() {
                    check(ObjectRole::Annotation, dict);
                }
            }
        }
        found
    }

    /// True when any object still holds a `/JS` entry.
    pub fn holds_script(doc: &Document) -> bool {
        doc.objects
            .values()
            .filter_map(Value::as_dict)
            .any(|dict| dict.contains_key(b"JS"))
    }

    fn catalog() -> Dictionary {
        Dictionary::from_iter([("Type", Value::name("Catalog")), ("Pages", Value::from(PAGES))])
    }

    fn pages() -> Dictionary {
        Dictionary::from_iter([
            ("Type", Value::name("Pages")),
            ("Kids", Value::Array(vec![Value::from(PAGE)])),
            ("Count", Value::Integer(1)),
        ])
    }

    fn page() -> Dictionary {
        Dictionary::from_iter([
            ("Type", Value::name("Page")),
            ("Parent", Value::from(PAGES)),
            ("MediaBox", Self::rect(&[0, 0, 612, 792])),
            ("Contents", Value::from(CONTENTS)),
        ])
    }

    fn contents() -> Value {
        Value::Stream(Stream::new(
            Dictionary::new(),
            b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET".to_vec(),
        ))
    }

    fn script_action() -> Value {
        Dictionary::from_iter([
            ("Type", Value::name("Action")),
            ("S", Value::name("JavaScript")),
            ("JS", Value::string_literal("app.alert('opened')")),
        ])
        .into()
    }

    fn rect(values: &[i64]) -> Value {
        Value::Array(values.iter().copied().map(Value::Integer).collect())
    }
}
