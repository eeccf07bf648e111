//! Worksheet and shared-string markup.
//!
//! Reading turns `<sheetData>` into a [`Sheet`]. Writing never regenerates a
//! worksheet: the original XML is streamed through and only the written
//! cells are spliced in, so styles, merged ranges, column widths and the rest
//! of the sheet survive untouched.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
    mem,
};

use anyhow::{Context, Result, bail};
use quick_xml::{
    Reader, Writer,
    escape::{resolve_predefined_entity, unescape},
    events::{BytesEnd, BytesRef, BytesStart, BytesText, Event},
};

use crate::{
    CellValue, Sheet,
    coord::{cell_ref, parse_cell_ref},
};

pub(crate) const EMPTY_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData/></worksheet>"#;

/// Cells to write, per row then column.
pub(crate) type RowPatches = BTreeMap<u32, BTreeMap<u32, CellValue>>;

/// Unescaped value of attribute `key`.
pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().with_checks(false).flatten().find_map(|a| {
        (a.key.as_ref() == key).then(|| {
            let raw = String::from_utf8_lossy(&a.value);
            match unescape(&raw) {
                Ok(value) => value.into_owned(),
                Err(_) => raw.to_string(),
            }
        })
    })
}

fn push_text(out: &mut String, text: &BytesText<'_>) -> Result<()> {
    let raw = String::from_utf8_lossy(text);
    out.push_str(&unescape(&raw)?);
    Ok(())
}

/// `&amp;`, `&#38;` and `&#x26;` style references.
fn push_ref(out: &mut String, entity: &BytesRef<'_>) -> Result<()> {
    let name = String::from_utf8_lossy(entity);
    match name.strip_prefix('#') {
        Some(code) => {
            let scalar = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16),
                None => code.parse(),
            }
            .with_context(|| format!("bad character reference &{name};"))?;
            let ch = char::from_u32(scalar)
                .with_context(|| format!("&{name}; is not a character"))?;
            out.push(ch);
        }
        None => {
            let resolved = resolve_predefined_entity(&name)
                .with_context(|| format!("unknown entity &{name};"))?;
            out.push_str(resolved);
        }
    }
    Ok(())
}

/// `xl/sharedStrings.xml` → strings by index. Phonetic runs (`<rPh>`) are
/// reading aids, not part of the value.
pub(crate) fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => phonetic += 1,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_text = false,
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                _ => {}
            },
            Event::Text(t) if in_text && phonetic == 0 => {
                if let Some(s) = current.as_mut() {
                    push_text(s, &t)?;
                }
            }
            Event::GeneralRef(r) if in_text && phonetic == 0 => {
                if let Some(s) = current.as_mut() {
                    push_ref(s, &r)?;
                }
            }
            Event::CData(c) if in_text && phonetic == 0 => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

fn row_number(e: &BytesStart<'_>, previous: u32) -> u32 {
    attr(e, b"r")
        .and_then(|r| r.trim().parse().ok())
        .unwrap_or(previous + 1)
}

/// (column, row) of a `<c>`; cells without `r` follow the previous one.
fn cell_position(e: &BytesStart<'_>, row: u32, previous_column: u32) -> (u32, u32) {
    attr(e, b"r")
        .and_then(|r| parse_cell_ref(&r))
        .unwrap_or((previous_column + 1, row))
}

struct CellDraft {
    row: u32,
    column: u32,
    kind: Option<String>,
    raw: String,
}

impl CellDraft {
    fn into_value(self, shared: &[String]) -> Result<Option<CellValue>> {
        if self.raw.is_empty() {
            return Ok(None);
        }
        let value = match self.kind.as_deref() {
            Some("s") => {
                let index: usize = self
                    .raw
                    .trim()
                    .parse()
                    .with_context(|| format!("bad shared string index '{}'", self.raw))?;
                let text = shared
                    .get(index)
                    .with_context(|| format!("shared string {index} out of range"))?;
                CellValue::Text(text.clone())
            }
            Some("inlineStr" | "str" | "e" | "d") => CellValue::Text(self.raw),
            Some("b") => CellValue::Bool(self.raw.trim() == "1"),
            _ => match self.raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(self.raw),
            },
        };
        Ok(Some(value))
    }
}

/// Loads every valued cell of a worksheet into `sheet`.
pub(crate) fn parse_sheet(xml: &[u8], shared: &[String], sheet: &mut Sheet) -> Result<()> {
    let mut reader = Reader::from_reader(xml);
    let mut row = 0u32;
    let mut column = 0u32;
    let mut draft: Option<CellDraft> = None;
    // inside <v>, or a <t> of an inline string
    let mut capture = false;
    let mut phonetic = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                row = row_number(&e, row);
                column = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let (c, r) = cell_position(&e, row, column);
                column = c;
                draft = Some(CellDraft {
                    row: r,
                    column: c,
                    kind: attr(&e, b"t"),
                    raw: String::new(),
                });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                column = cell_position(&e, row, column).0;
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = draft.is_some(),
                b"rPh" => phonetic += 1,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"c" => {
                    if let Some(cell) = draft.take() {
                        let (r, c) = (cell.row, cell.column);
                        if let Some(value) = cell.into_value(shared)? {
                            sheet.insert_loaded(r, c, value);
                        }
                    }
                }
                _ => {}
            },
            Event::Text(t) if capture && phonetic == 0 => {
                if let Some(cell) = draft.as_mut() {
                    push_text(&mut cell.raw, &t)?;
                }
            }
            Event::GeneralRef(r) if capture && phonetic == 0 => {
                if let Some(cell) = draft.as_mut() {
                    push_ref(&mut cell.raw, &r)?;
                }
            }
            Event::CData(c) if capture && phonetic == 0 => {
                if let Some(cell) = draft.as_mut() {
                    cell.raw.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Result of splicing written cells into a worksheet.
pub(crate) struct Patched {
    pub(crate) xml: Vec<u8>,
    /// An overwritten cell carried a formula; the calculation chain is stale.
    pub(crate) dropped_formula: bool,
}

struct Splicer<W: Write> {
    writer: Writer<W>,
    /// Namespace prefix of the worksheet elements, "" or e.g. "x:".
    prefix: String,
}

impl<W: Write> Splicer<W> {
    fn name(&self, local: &str) -> String {
        format!("{}{local}", self.prefix)
    }

    fn write_cell(&mut self, row: u32, column: u32, value: &CellValue, style: Option<&str>) -> Result<()> {
        let coord = cell_ref(column, row);
        let (c_name, v_name, is_name, t_name) =
            (self.name("c"), self.name("v"), self.name("is"), self.name("t"));
        let mut c_elem = self
            .writer
            .create_element(c_name.as_str())
            .with_attribute(("r", coord.as_str()));
        if let Some(s) = style {
            c_elem = c_elem.with_attribute(("s", s));
        }
        match value {
            CellValue::Number(n) => {
                let text = n.to_string();
                c_elem.write_inner_content(|w| {
                    w.create_element(v_name.as_str())
                        .write_text_content(BytesText::new(&text))?;
                    Ok(())
                })?;
            }
            CellValue::Text(s) => {
                c_elem
                    .with_attribute(("t", "inlineStr"))
                    .write_inner_content(|w| {
                        w.create_element(is_name.as_str()).write_inner_content(|w2| {
                            let mut t = w2.create_element(t_name.as_str());
                            if s.trim() != s {
                                t = t.with_attribute(("xml:space", "preserve"));
                            }
                            t.write_text_content(BytesText::new(s))?;
                            Ok(())
                        })?;
                        Ok(())
                    })?;
            }
            CellValue::Bool(b) => {
                c_elem
                    .with_attribute(("t", "b"))
                    .write_inner_content(|w| {
                        w.create_element(v_name.as_str())
                            .write_text_content(BytesText::new(if *b { "1" } else { "0" }))?;
                        Ok(())
                    })?;
            }
        }
        Ok(())
    }

    fn write_cells(&mut self, row: u32, cells: BTreeMap<u32, CellValue>) -> Result<()> {
        for (column, value) in &cells {
            self.write_cell(row, *column, value, None)?;
        }
        Ok(())
    }

    fn write_rows(&mut self, rows: RowPatches) -> Result<()> {
        for (row, cells) in rows {
            let name = self.name("row");
            let mut start = BytesStart::new(name.as_str());
            start.push_attribute(("r", row.to_string().as_str()));
            self.writer.write_event(Event::Start(start))?;
            self.write_cells(row, cells)?;
            self.writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        }
        Ok(())
    }

    /// Writes the pending cells left of `column`, then the replacement for
    /// `column` itself if there is one. `true` when the original cell is
    /// replaced and must be skipped.
    fn replace_cell(
        &mut self,
        row_cells: &mut Option<BTreeMap<u32, CellValue>>,
        row: u32,
        column: u32,
        original: &BytesStart<'_>,
    ) -> Result<bool> {
        let Some(cells) = row_cells.as_mut() else {
            return Ok(false);
        };
        let rest = cells.split_off(&column);
        let before = mem::replace(cells, rest);
        self.write_cells(row, before)?;
        match cells.remove(&column) {
            Some(value) => {
                self.write_cell(row, column, &value, attr(original, b"s").as_deref())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn prefix_of(e: &BytesStart<'_>) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Copy of a `<row>` start tag minus its `spans` hint, which no longer holds
/// once cells are added.
fn without_spans(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut start = BytesStart::new(qualified_name(e));
    start.extend_attributes(
        e.attributes()
            .with_checks(false)
            .flatten()
            .filter(|a| a.key.as_ref() != b"spans"),
    );
    start
}

/// `si` of a shared formula, for masters (`ref` present) only when
/// `master` is set.
fn shared_index(e: &BytesStart<'_>, master: bool) -> Option<String> {
    if attr(e, b"t").as_deref() != Some("shared") || (master && attr(e, b"ref").is_none()) {
        return None;
    }
    attr(e, b"si")
}

/// `<dimension>` whose `ref` also covers every patched cell. `None` when the
/// original range cannot be read.
fn widened_dimension(e: &BytesStart<'_>, patches: &RowPatches) -> Option<BytesStart<'static>> {
    let range = attr(e, b"ref")?;
    let (first, last) = range.split_once(':').unwrap_or((&range, &range));
    let (mut left, mut top) = parse_cell_ref(first)?;
    let (mut right, mut bottom) = parse_cell_ref(last)?;
    for (&row, cells) in patches {
        for &column in cells.keys() {
            (left, right) = (left.min(column), right.max(column));
            (top, bottom) = (top.min(row), bottom.max(row));
        }
    }
    let widened = if (left, top) == (right, bottom) {
        cell_ref(left, top)
    } else {
        format!("{}:{}", cell_ref(left, top), cell_ref(right, bottom))
    };
    let mut start = BytesStart::new(qualified_name(e));
    start.extend_attributes(
        e.attributes()
            .with_checks(false)
            .flatten()
            .filter(|a| a.key.as_ref() != b"ref"),
    );
    start.push_attribute(("ref", widened.as_str()));
    Some(start)
}

/// Rows of `pending` before `row`, removed from it.
fn take_before(pending: &mut RowPatches, row: u32) -> RowPatches {
    let rest = pending.split_off(&row);
    mem::replace(pending, rest)
}

/// Streams `xml` and splices `patches` into it, keeping rows and cells in
/// ascending order. A replaced cell keeps its style index and loses any
/// formula. When that formula was a shared-formula master, the cells sharing
/// it keep their cached values and lose their formulas too.
pub(crate) fn patch_sheet(xml: &[u8], patches: &RowPatches) -> Result<Patched> {
    let mut pending = patches.clone();
    let mut reader = Reader::from_reader(xml);
    let mut out = Splicer {
        writer: Writer::new(Vec::with_capacity(xml.len() + 64 * pending.len())),
        prefix: String::new(),
    };
    let mut row_cells: Option<BTreeMap<u32, CellValue>> = None;
    let mut row = 0u32;
    let mut column = 0u32;
    let mut skip_depth = 0usize;
    let mut dropped_formula = false;
    let mut saw_sheet_data = false;
    // `si` of shared formulas whose master was overwritten
    let mut orphaned: BTreeSet<String> = BTreeSet::new();

    loop {
        let event = reader.read_event()?;
        if skip_depth > 0 {
            match &event {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"f" {
                        dropped_formula = true;
                        orphaned.extend(shared_index(e, true));
                    }
                    skip_depth += 1;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                    dropped_formula = true;
                    orphaned.extend(shared_index(e, true));
                }
                Event::End(_) => skip_depth -= 1,
                Event::Eof => bail!("worksheet ends inside a cell"),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Empty(e) if e.local_name().as_ref() == b"dimension" && !patches.is_empty() => {
                match widened_dimension(&e, patches) {
                    Some(widened) => out.writer.write_event(Event::Empty(widened))?,
                    None => out.writer.write_event(Event::Empty(e))?,
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                saw_sheet_data = true;
                out.prefix = prefix_of(&e);
                out.writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                saw_sheet_data = true;
                out.prefix = prefix_of(&e);
                let end = qualified_name(&e);
                out.writer.write_event(Event::Start(e))?;
                out.write_rows(mem::take(&mut pending))?;
                out.writer.write_event(Event::End(BytesEnd::new(end)))?;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                out.write_rows(mem::take(&mut pending))?;
                out.writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                row = row_number(&e, row);
                column = 0;
                out.write_rows(take_before(&mut pending, row))?;
                match pending.remove(&row) {
                    Some(cells) => {
                        out.writer.write_event(Event::Start(without_spans(&e)))?;
                        row_cells = Some(cells);
                    }
                    None => out.writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                row = row_number(&e, row);
                column = 0;
                out.write_rows(take_before(&mut pending, row))?;
                match pending.remove(&row) {
                    Some(cells) => {
                        let end = qualified_name(&e);
                        out.writer.write_event(Event::Start(without_spans(&e)))?;
                        out.write_cells(row, cells)?;
                        out.writer.write_event(Event::End(BytesEnd::new(end)))?;
                    }
                    None => out.writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                if let Some(cells) = row_cells.take() {
                    out.write_cells(row, cells)?;
                }
                out.writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                column = cell_position(&e, row, column).0;
                if out.replace_cell(&mut row_cells, row, column, &e)? {
                    skip_depth = 1;
                } else {
                    out.writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                column = cell_position(&e, row, column).0;
                if !out.replace_cell(&mut row_cells, row, column, &e)? {
                    out.writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Start(e)
                if e.local_name().as_ref() == b"f"
                    && shared_index(&e, false).is_some_and(|si| orphaned.contains(&si)) =>
            {
                dropped_formula = true;
                skip_depth = 1;
            }
            Event::Empty(e)
                if e.local_name().as_ref() == b"f"
                    && shared_index(&e, false).is_some_and(|si| orphaned.contains(&si)) =>
            {
                dropped_formula = true;
            }
            Event::Eof => break,
            event => out.writer.write_event(event)?,
        }
    }

    if !saw_sheet_data && !patches.is_empty() {
        bail!("worksheet has no <sheetData>");
    }
    Ok(Patched {
        xml: out.writer.into_inner(),
        dropped_formula,
    })
}
