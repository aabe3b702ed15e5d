use crate::gui_bridge::model::{render_shades, ViewDesk};
use anyhow::Context;
use lightcore::processing::GlobalRange;
use lightcore::storage::DirectorySink;
use log::warn;
use std::io::Write;

fn describe(range: Option<GlobalRange>) -> String {
    match range {
        Some(range) => format!("[{:.2}, {:.2}]", range.min, range.max),
        None => "none".to_string(),
    }
}

pub fn list_batches<W: Write>(out: &mut W, sink: &DirectorySink) -> anyhow::Result<usize> {
    let names = sink.list().context("listing stored batches")?;
    if names.is_empty() {
        writeln!(out, "no batches in {}", sink.root().display())?;
    }
    for name in &names {
        writeln!(out, "{}", name)?;
    }
    Ok(names.len())
}

/// Opens every named batch as a view, prints each grid against the shared
/// range, then closes them again one by one. A batch that cannot be loaded
/// or reconstructed is reported and skipped.
pub fn show_views<W: Write>(
    out: &mut W,
    sink: &DirectorySink,
    desk: &mut ViewDesk,
    names: &[String],
) -> anyhow::Result<usize> {
    let mut opened = Vec::new();
    for name in names {
        let lines = match sink.load(name) {
            Ok(lines) => lines,
            Err(err) => {
                warn!("skipping '{}': {}", name, err);
                writeln!(out, "cannot load '{}': {}", name, err)?;
                continue;
            }
        };
        match desk.open(name, &lines) {
            Ok(handle) => {
                writeln!(out, "opened {} '{}', range {}", handle, name, describe(desk.range()))?;
                opened.push(handle);
            }
            Err(err) => {
                warn!("skipping '{}': {}", name, err);
                writeln!(out, "cannot open '{}': {}", name, err)?;
            }
        }
    }

    for handle in &opened {
        let model = desk.view(*handle)?;
        writeln!(
            out,
            "\n{} {} ({}x{}, {})",
            model.id, model.label, model.rows, model.cols, model.mapping
        )?;
        writeln!(out, "{}", render_shades(&model))?;
    }

    for handle in &opened {
        desk.close(*handle)?;
        writeln!(out, "closed {}, range {}", handle, describe(desk.range()))?;
    }
    Ok(opened.len())
}
