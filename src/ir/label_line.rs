//! The label-file line format: `<class_id> <cx> <cy> <w> <h>`.
//!
//! Floats are written with six decimals. Parsing is lenient about blank lines
//! and surrounding whitespace, strict about everything else.

use std::fmt::Write as _;
use std::path::Path;

use super::codec::{NormalizedBox, NormalizedRecord};
use super::ids::ClassId;
use crate::error::FramelabelError;

/// Formats one record as a label line, without the trailing newline.
pub fn format_label_line(record: &NormalizedRecord) -> String {
    let b = &record.bbox;
    format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        record.class_id, b.cx, b.cy, b.w, b.h
    )
}

/// Renders a whole label file: one newline-terminated line per record.
///
/// No records gives an empty string, so the file exists with zero lines.
pub fn render_label_file(records: &[NormalizedRecord]) -> String {
    let mut out = String::with_capacity(records.len() * 44);
    for record in records {
        let _ = writeln!(out, "{}", format_label_line(record));
    }
    out
}

const BOX_FIELDS: [&str; 4] = ["cx", "cy", "w", "h"];

/// Parses one label line. Blank lines yield `Ok(None)`.
pub fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<NormalizedRecord>, FramelabelError> {
    let fail = |message: String| FramelabelError::LabelParse {
        path: file_path.to_path_buf(),
        line: line_num,
        message,
    };

    let mut tokens = line.split_whitespace();
    let Some(class_token) = tokens.next() else {
        return Ok(None);
    };
    let class_id: u32 = class_token
        .parse()
        .map_err(|_| fail(format!("class id '{class_token}' is not a non-negative integer")))?;

    let mut values = [0.0_f64; 4];
    for (slot, field) in values.iter_mut().zip(BOX_FIELDS) {
        let token = tokens
            .next()
            .ok_or_else(|| fail(format!("missing {field}; rows are <class_id> <cx> <cy> <w> <h>")))?;
        *slot = token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| fail(format!("{field} '{token}' is not a finite number")))?;
    }
    if tokens.next().is_some() {
        return Err(fail(
            "extra values after h; polygon and keypoint rows are not supported".to_string(),
        ));
    }

    let [cx, cy, w, h] = values;
    Ok(Some(
        NormalizedBox::new(cx, cy, w, h).with_class(ClassId::new(class_id)),
    ))
}

/// Parses every line of a label file's contents.
pub fn parse_label_file(
    contents: &str,
    file_path: &Path,
) -> Result<Vec<NormalizedRecord>, FramelabelError> {
    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if let Some(record) = parse_label_line(line, file_path, idx + 1)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Fuzz-only entrypoint for single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), FramelabelError> {
    let _ = parse_label_line(input, Path::new("<fuzz>"), 1)?;
    Ok(())
}
