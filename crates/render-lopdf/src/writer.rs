//! Deterministic PDF serializer.
//!
//! Objects are buffered by id and written in ascending id order with sorted
//! dictionary keys and fixed-precision reals, so identical object graphs
//! always produce identical bytes.

use lopdf::{Dictionary, Object, ObjectId, StringFormat, dictionary};
use std::collections::BTreeMap;
use std::io::{self, Seek, Write};

pub(crate) struct PdfWriter<W: Write + Seek> {
    writer: W,
    max_id: u32,
    pub catalog_id: ObjectId,
    pub pages_id: ObjectId,
    pub resources_id: ObjectId,
    page_ids: Vec<ObjectId>,
    info: Option<Dictionary>,
    buffered_objects: BTreeMap<ObjectId, Object>,
}

impl<W: Write + Seek> PdfWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            max_id: 3,
            resources_id: (1, 0),
            pages_id: (2, 0),
            catalog_id: (3, 0),
            page_ids: Vec::new(),
            info: None,
            buffered_objects: BTreeMap::new(),
        }
    }

    pub fn new_object_id(&mut self) -> ObjectId {
        self.max_id += 1;
        (self.max_id, 0)
    }

    pub fn buffer_object(&mut self, object: Object) -> ObjectId {
        let id = self.new_object_id();
        self.buffered_objects.insert(id, object);
        id
    }

    pub fn buffer_object_at_id(&mut self, id: ObjectId, object: Object) {
        self.max_id = self.max_id.max(id.0);
        self.buffered_objects.insert(id, object);
    }

    pub fn add_page(&mut self, page_id: ObjectId) {
        self.page_ids.push(page_id);
    }

    pub fn set_info(&mut self, info: Dictionary) {
        self.info = Some(info);
    }

    pub fn finish(mut self) -> io::Result<W> {
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => self.page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<Object>>(),
            "Count" => self.page_ids.len() as i64,
        };
        self.buffer_object_at_id(self.pages_id, pages_dict.into());
        self.buffer_object_at_id(self.catalog_id, dictionary! { "Type" => "Catalog", "Pages" => self.pages_id }.into());
        let info_id = self.info.take().map(|info| self.buffer_object(info.into()));

        self.writer.write_all(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n")?;
        let mut offsets = BTreeMap::new();
        for (id, object) in &self.buffered_objects {
            offsets.insert(id.0, self.writer.stream_position()?);
            write!(self.writer, "{} {} obj\n", id.0, id.1)?;
            write_object(&mut self.writer, object)?;
            self.writer.write_all(b"\nendobj\n")?;
        }

        let xref_start = self.writer.stream_position()?;
        let size = self.max_id + 1;
        write_xref(&mut self.writer, size, &offsets)?;

        let mut trailer = dictionary! { "Size" => size as i64, "Root" => self.catalog_id };
        if let Some(info_id) = info_id {
            trailer.set("Info", info_id);
        }
        writeln!(self.writer, "trailer")?;
        write_dictionary(&mut self.writer, &trailer)?;
        writeln!(self.writer, "\nstartxref")?;
        writeln!(self.writer, "{}", xref_start)?;
        write!(self.writer, "%%EOF")?;

        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// One subsection covering every id; ids never written are free entries.
fn write_xref<W: Write>(writer: &mut W, size: u32, offsets: &BTreeMap<u32, u64>) -> io::Result<()> {
    writeln!(writer, "xref")?;
    writeln!(writer, "0 {}", size)?;
    for id in 0..size {
        match offsets.get(&id) {
            Some(offset) => writeln!(writer, "{:010} {:05} n ", offset, 0)?,
            None => writeln!(writer, "0000000000 65535 f ")?,
        }
    }
    Ok(())
}

fn write_object(writer: &mut dyn Write, object: &Object) -> io::Result<()> {
    match object {
        Object::Null => writer.write_all(b"null"),
        Object::Boolean(b) => writer.write_all(if *b { b"true" } else { b"false" }),
        Object::Integer(i) => write!(writer, "{}", i),
        Object::Real(r) => write!(writer, "{:.3}", r),
        Object::Name(n) => {
            writer.write_all(b"/")?;
            writer.write_all(n)
        }
        Object::String(s, format) => match format {
            StringFormat::Literal => {
                writer.write_all(b"(")?;
                for &byte in s {
                    if byte == b'(' || byte == b')' || byte == b'\\' {
                        writer.write_all(b"\\")?;
                    }
                    writer.write_all(&[byte])?;
                }
                writer.write_all(b")")
            }
            StringFormat::Hexadecimal => {
                write!(writer, "<{}>", s.iter().map(|b| format!("{:02X}", b)).collect::<String>())
            }
        },
        Object::Array(arr) => {
            writer.write_all(b"[")?;
            for (i, obj) in arr.iter().enumerate() {
                if i > 0 {
                    writer.write_all(b" ")?;
                }
                write_object(writer, obj)?;
            }
            writer.write_all(b"]")
        }
        Object::Dictionary(dict) => write_dictionary(writer, dict),
        Object::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.set("Length", stream.content.len() as i64);
            write_dictionary(writer, &dict)?;
            writer.write_all(b"\nstream\n")?;
            writer.write_all(&stream.content)?;
            writer.write_all(b"\nendstream")
        }
        Object::Reference(id) => write!(writer, "{} {} R", id.0, id.1),
    }
}

fn write_dictionary(writer: &mut dyn Write, dict: &Dictionary) -> io::Result<()> {
    writer.write_all(b"<<")?;
    let sorted_keys: BTreeMap<_, _> = dict.iter().collect();
    for (key, value) in sorted_keys {
        writer.write_all(b"/")?;
        writer.write_all(key)?;
        writer.write_all(b" ")?;
        write_object(writer, value)?;
        writer.write_all(b" ")?;
    }
    writer.write_all(b">>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn empty_document() -> Vec<u8> {
        let mut writer = PdfWriter::new(Cursor::new(Vec::new()));
        writer.buffer_object_at_id(writer.resources_id, dictionary! {}.into());
        let page_id = writer.new_object_id();
        let page = dictionary! {
            "Type" => "Page",
            "Parent" => writer.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => writer.resources_id,
        };
        writer.buffer_object_at_id(page_id, page.into());
        writer.add_page(page_id);
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn output_is_a_loadable_pdf() {
        let bytes = empty_document();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.ends_with(b"%%EOF"));
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn identical_graphs_serialize_identically() {
        assert_eq!(empty_document(), empty_document());
    }

    #[test]
    fn literal_strings_are_escaped() {
        let mut out = Vec::new();
        write_object(&mut out, &Object::String(b"a(b)\\".to_vec(), StringFormat::Literal)).unwrap();
        assert_eq!(out, b"(a\\(b\\)\\\\)");
    }

    #[test]
    fn dictionary_keys_are_sorted() {
        let mut out = Vec::new();
        write_dictionary(&mut out, &dictionary! { "Zeta" => 1, "Alpha" => 2.5 }).unwrap();
        assert_eq!(out, b"<</Alpha 2.500 /Zeta 1 >>");
    }
}
