use std::{
    collections::HashMap,
    fs::{self, File},
    io::{Cursor, Read, Seek, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use quick_xml::{
    Reader, Writer,
    escape::escape,
    events::{BytesStart, Event},
};
use tracing::debug;
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::FileOptions};

use crate::{
    Package, Sheet, Workbook,
    sheet_xml::{self, EMPTY_SHEET, attr},
};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const CALC_CHAIN: &str = "xl/calcChain.xml";
const DEFAULT_SHARED_STRINGS: &str = "xl/sharedStrings.xml";

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

/// Sheet names in tab order plus the tab that was active when the file was saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetIndex {
    pub names: Vec<String>,
    pub active: usize,
}

/// Lists the sheets of an xlsx file without loading any cells.
pub fn scan<P: AsRef<Path>>(src: P) -> Result<SheetIndex> {
    let mut zip = ZipArchive::new(File::open(src)?)?;
    let wb_xml = read_part(&mut zip, WORKBOOK_PART)?.context("workbook.xml not found")?;
    let (entries, active) = parse_workbook_xml(&wb_xml)?;
    Ok(SheetIndex {
        names: entries.into_iter().map(|e| e.name).collect(),
        active,
    })
}

struct SheetEntry {
    name: String,
    rel_id: Option<String>,
}

struct Relationship {
    kind: String,
    target: String,
}

fn read_part<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match zip.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

fn parse_workbook_xml(xml: &[u8]) -> Result<(Vec<SheetEntry>, usize)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut sheets = Vec::new();
    let mut active = 0usize;
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr(&e, b"name").context("<sheet> without a name")?;
                    sheets.push(SheetEntry {
                        name,
                        rel_id: attr(&e, b"r:id"),
                    });
                }
                b"workbookView" => {
                    active = attr(&e, b"activeTab")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    if active >= sheets.len() {
        active = 0;
    }
    Ok((sheets, active))
}

fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, Relationship>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(kind), Some(target)) =
                    (attr(&e, b"Id"), attr(&e, b"Type"), attr(&e, b"Target"))
                {
                    rels.insert(id, Relationship { kind, target });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Relationship targets are relative to `xl/` unless rooted.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_owned(),
        None if target.starts_with("xl/") => target.to_owned(),
        None => format!("xl/{target}"),
    }
}

type LoadedSheets = (Vec<Sheet>, Vec<Option<String>>, usize);

fn load_sheets(bytes: &[u8]) -> Result<LoadedSheets> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let wb_xml = read_part(&mut zip, WORKBOOK_PART)?.context("xl/workbook.xml not found")?;
    let (entries, active) = parse_workbook_xml(&wb_xml)?;
    let rels = match read_part(&mut zip, WORKBOOK_RELS)? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let shared_part = rels
        .values()
        .find(|r| r.kind.ends_with("/sharedStrings"))
        .map(|r| resolve_target(&r.target))
        .unwrap_or_else(|| DEFAULT_SHARED_STRINGS.to_owned());
    let shared = match read_part(&mut zip, &shared_part)? {
        Some(xml) => sheet_xml::parse_shared_strings(&xml)
            .with_context(|| format!("cannot parse {shared_part}"))?,
        None => Vec::new(),
    };

    let mut sheets = Vec::with_capacity(entries.len());
    let mut parts = Vec::with_capacity(entries.len());
    for entry in entries {
        let part = entry
            .rel_id
            .as_deref()
            .and_then(|id| rels.get(id))
            .filter(|r| r.kind.ends_with("/worksheet"))
            .map(|r| resolve_target(&r.target));
        let mut sheet = Sheet::new(entry.name);
        match &part {
            Some(part) => {
                let xml = read_part(&mut zip, part)?.with_context(|| format!("{part} not found"))?;
                sheet_xml::parse_sheet(&xml, &shared, &mut sheet)
                    .with_context(|| format!("cannot parse {part}"))?;
            }
            None => debug!(sheet = sheet.name(), "not a worksheet, loaded without cells"),
        }
        sheets.push(sheet);
        parts.push(part);
    }
    Ok((sheets, parts, active))
}

fn file_options() -> FileOptions<'static, ()> {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(6))
}

fn refers_to_calc_chain(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"Override" | b"Relationship")
        && attr(e, b"PartName")
            .or_else(|| attr(e, b"Target"))
            .is_some_and(|p| p.ends_with("calcChain.xml"))
}

/// Removes references to the calculation chain from `[Content_Types].xml`
/// or the workbook relationships.
fn strip_calc_chain_refs(xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    loop {
        match reader.read_event()? {
            Event::Empty(e) if refers_to_calc_chain(&e) => continue,
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }
    Ok(writer.into_inner())
}

/// Loading and serialising whole packages.
impl Workbook {
    /// Reads every sheet of the xlsx file at `src`.
    pub fn open<P: AsRef<Path>>(src: P) -> Result<Self> {
        let source = src.as_ref().to_path_buf();
        let bytes = fs::read(&source).with_context(|| format!("cannot read {}", source.display()))?;
        let (sheets, sheet_parts, active) = load_sheets(&bytes)
            .with_context(|| format!("{} is not a readable xlsx workbook", source.display()))?;
        debug!(path = %source.display(), sheets = sheets.len(), active, "opened workbook");
        Ok(Self {
            sheets,
            active,
            package: Some(Package {
                source,
                bytes,
                sheet_parts,
            }),
        })
    }

    /// The workbook as xlsx bytes. Opened workbooks are rewritten by patching
    /// the written cells into their original parts; new ones are generated.
    pub fn to_xlsx_bytes(&self) -> Result<Vec<u8>> {
        match &self.package {
            Some(package) => self.repack(package),
            None => self.write_fresh(),
        }
    }

    fn repack(&self, package: &Package) -> Result<Vec<u8>> {
        let mut zin = ZipArchive::new(Cursor::new(package.bytes.as_slice()))?;
        let mut patched: HashMap<String, Vec<u8>> = HashMap::new();
        let mut dropped_formula = false;

        for (sheet, part) in self.sheets.iter().zip(&package.sheet_parts) {
            if !sheet.is_dirty() {
                continue;
            }
            let part = part.as_deref().with_context(|| {
                format!("sheet '{}' is not a worksheet; its cells cannot be saved", sheet.name())
            })?;
            let xml = read_part(&mut zin, part)?.with_context(|| format!("{part} not found"))?;
            let outcome = sheet_xml::patch_sheet(&xml, &sheet.dirty_patches())
                .with_context(|| format!("cannot patch {part}"))?;
            debug!(part, cells = sheet.written_cells(), "patched worksheet");
            dropped_formula |= outcome.dropped_formula;
            patched.insert(part.to_owned(), outcome.xml);
        }
        if patched.is_empty() {
            return Ok(package.bytes.clone());
        }

        let opt = file_options();
        let mut zout = ZipWriter::new(Cursor::new(Vec::with_capacity(package.bytes.len())));
        for i in 0..zin.len() {
            let name = zin.by_index_raw(i)?.name().to_owned();

            if let Some(xml) = patched.get(&name) {
                zout.start_file(name.as_str(), opt)?;
                zout.write_all(xml)?;
                continue;
            }
            if dropped_formula {
                match name.as_str() {
                    CALC_CHAIN => {
                        debug!("overwrote a formula cell, dropping the calculation chain");
                        continue;
                    }
                    CONTENT_TYPES | WORKBOOK_RELS => {
                        let xml = read_part(&mut zin, &name)?
                            .with_context(|| format!("{name} not found"))?;
                        if memchr::memmem::find(&xml, b"calcChain").is_some() {
                            zout.start_file(name.as_str(), opt)?;
                            zout.write_all(&strip_calc_chain_refs(&xml)?)?;
                            continue;
                        }
                    }
                    _ => {}
                }
            }
            zout.raw_copy_file(zin.by_index_raw(i)?)?;
        }
        Ok(zout.finish()?.into_inner())
    }

    fn write_fresh(&self) -> Result<Vec<u8>> {
        if self.sheets.is_empty() {
            bail!("a workbook needs at least one sheet");
        }
        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        let mut sheet_tags = String::new();
        let mut rel_tags = String::new();
        for (i, sheet) in self.sheets.iter().enumerate() {
            let n = i + 1;
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
            sheet_tags.push_str(&format!(
                r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
                escape(sheet.name())
            ));
            rel_tags.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="{WORKSHEET_REL}" Target="worksheets/sheet{n}.xml"/>"#
            ));
        }
        content_types.push_str("</Types>");

        let root_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{PACKAGE_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
        );
        let workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><bookViews><workbookView activeTab="{}"/></bookViews><sheets>{sheet_tags}</sheets></workbook>"#,
            self.active
        );
        let workbook_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{PACKAGE_REL_NS}">{rel_tags}</Relationships>"#
        );

        let opt = file_options();
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in [
            (CONTENT_TYPES, content_types.as_bytes()),
            ("_rels/.rels", root_rels.as_bytes()),
            (WORKBOOK_PART, workbook.as_bytes()),
            (WORKBOOK_RELS, workbook_rels.as_bytes()),
        ] {
            zout.start_file(name, opt)?;
            zout.write_all(body)?;
        }
        for (i, sheet) in self.sheets.iter().enumerate() {
            let xml = sheet_xml::patch_sheet(EMPTY_SHEET.as_bytes(), &sheet.all_patches())?.xml;
            zout.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opt)?;
            zout.write_all(&xml)?;
        }
        Ok(zout.finish()?.into_inner())
    }
}
