//! Local save/load: a flat XML document holding every non-empty cell's
//! authored content, written and read with `quick_xml`'s streaming
//! reader/writer instead of a DOM.
//!
//! ```xml
//! <spreadsheet version="7">
//!   <cell><name>A1</name><contents>5</contents></cell>
//!   <cell><name>B1</name><contents>=A1+1</contents></cell>
//! </spreadsheet>
//! ```

use std::io::BufRead;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use quick_xml::Writer;

use gridline_engine::{CellContents, CellStore};

use crate::error::CoreError;

fn contents_to_string(contents: &CellContents) -> String {
    match contents {
        CellContents::Text(t) => t.clone(),
        CellContents::Number(n) => n.to_string(),
        CellContents::Formula(f) => format!("={f}"),
    }
}

/// Serialize every non-empty cell of `store` into the document format, with
/// `version` recorded on the root element.
pub fn write_xml(store: &CellStore, version: &str) -> Result<Vec<u8>, CoreError> {
    let mut writer = Writer::new(Vec::new());

    let mut root = BytesStart::new("spreadsheet");
    root.push_attribute(("version", version));
    writer
        .write_event(Event::Start(root))
        .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;

    for name in store.names_of_all_nonempty_cells() {
        let contents = store.get_cell_contents(name.as_str());

        writer
            .write_event(Event::Start(BytesStart::new("cell")))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;

        writer
            .write_event(Event::Start(BytesStart::new("name")))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;
        writer
            .write_event(Event::Text(BytesText::new(name.as_str())))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;
        writer
            .write_event(Event::End(BytesEnd::new("name")))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;

        writer
            .write_event(Event::Start(BytesStart::new("contents")))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;
        writer
            .write_event(Event::Text(BytesText::new(&contents_to_string(&contents))))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;
        writer
            .write_event(Event::End(BytesEnd::new("contents")))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;

        writer
            .write_event(Event::End(BytesEnd::new("cell")))
            .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("spreadsheet")))
        .map_err(|e| CoreError::ReadWriteError(e.to_string()))?;

    Ok(writer.into_inner())
}

/// Populate `store` from a document produced by [`write_xml`], replacing
/// whatever it already contained for each parsed cell. Used both to apply a
/// `JOIN OK` payload and to load a locally-saved file.
pub fn populate_from_xml(store: &mut CellStore, xml: &[u8]) -> Result<(), CoreError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut in_element: Option<Vec<u8>> = None;
    let mut name: Option<String> = None;
    let mut contents: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"cell" => {
                name = None;
                contents = None;
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"name" || e.name().as_ref() == b"contents" => {
                in_element = Some(e.name().as_ref().to_vec());
            }
            Ok(Event::Text(t)) => {
                if let Some(tag) = &in_element {
                    let text = t.unescape().map_err(|e| CoreError::ReadWriteError(e.to_string()))?;
                    if tag.as_slice() == b"name" {
                        name = Some(text.into_owned());
                    } else if tag.as_slice() == b"contents" {
                        contents = Some(text.into_owned());
                    }
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"name" || e.name().as_ref() == b"contents" => {
                in_element = None;
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"cell" => {
                if let Some(name) = name.take() {
                    let text = contents.take().unwrap_or_default();
                    store.set_contents(&name, &text).map_err(CoreError::Engine)?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CoreError::ReadWriteError(e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}

/// Reads only the root element's `version` attribute, without parsing any
/// cells. Cheap enough to call before deciding whether a local save is
/// stale relative to the server's version.
pub fn get_saved_version<R: BufRead>(reader: R) -> Result<Option<String>, CoreError> {
    let mut reader = Reader::from_reader(reader);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"spreadsheet" => {
                let version = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"version")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                return Ok(version);
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(CoreError::ReadWriteError(e.to_string())),
        }
        buf.clear();
    }
}
