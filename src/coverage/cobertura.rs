// src/coverage/cobertura.rs

//! Cobertura XML adapter.

use super::{CoverageFragment, CoverageReport, FragmentLine};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;

/// Parses a Cobertura document. Every `<class>` becomes one fragment; lines
/// repeated under `<methods>` are left for the index builder to merge.
pub fn parse(content: &str) -> Result<CoverageReport, String> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut report = CoverageReport::default();
    let mut current: Option<CoverageFragment> = None;
    let mut in_source = false;

    loop {
        match reader.read_event() {
            Err(e) => {
                return Err(format!("XML error at position {}: {}", reader.buffer_position(), e));
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"class" => current = Some(open_class(&e)),
                b"line" => add_line(&e, current.as_mut()),
                b"source" => in_source = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                // a class without any lines still gets reported
                b"class" => report.fragments.push(open_class(&e)),
                b"line" => add_line(&e, current.as_mut()),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"class" => {
                    if let Some(fragment) = current.take() {
                        report.fragments.push(fragment);
                    }
                }
                b"source" => in_source = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_source => {
                let source = t.unescape().map_err(|e| e.to_string())?;
                let source = source.trim();
                if !source.is_empty() {
                    report.sources.push(source.to_string());
                }
            }
            _ => {}
        }
    }

    if current.is_some() {
        return Err("unexpected end of document inside <class>".to_string());
    }
    Ok(report)
}

fn open_class(e: &BytesStart<'_>) -> CoverageFragment {
    let attrs = attributes(e);
    // a missing filename becomes an empty one, which the builder rejects
    CoverageFragment::new(attrs.get("filename").cloned().unwrap_or_default())
}

fn add_line(e: &BytesStart<'_>, fragment: Option<&mut CoverageFragment>) {
    let Some(fragment) = fragment else {
        return;
    };
    let attrs = attributes(e);
    let (Some(number), Some(hits)) = (attrs.get("number"), attrs.get("hits")) else {
        return;
    };
    let number = number.trim().parse::<i64>().unwrap_or(0);
    let hits = hits.trim().parse::<u64>().unwrap_or(0);
    fragment.push(FragmentLine::from_hits(number, hits));
}

fn attributes(e: &BytesStart<'_>) -> HashMap<String, String> {
    e.attributes()
        .filter_map(Result::ok)
        .filter_map(|a| {
            let key = std::str::from_utf8(a.key.as_ref()).ok()?.to_string();
            let value = a.unescape_value().ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}
