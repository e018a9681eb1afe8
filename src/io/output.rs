use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::processing::flow_field::FlowField;

/// Writes the flow arrows as legacy ASCII VTK polydata with three point-data
/// arrays: "Flow direction" (3 components), "Flow direction uncertainty" and
/// "Vessel velocity".
pub fn write_vtk<W: Write>(writer: &mut W, field: &FlowField) -> anyhow::Result<()> {
    let n = field.len();
    writeln!(writer, "# vtk DataFile Version 3.0")?;
    writeln!(writer, "Angle corrected flow")?;
    writeln!(writer, "ASCII")?;
    writeln!(writer, "DATASET POLYDATA")?;
    writeln!(writer, "POINTS {} double", n)?;
    for p in &field.points {
        writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
    }
    writeln!(writer, "POINT_DATA {}", n)?;
    writeln!(writer, "FIELD FieldData 3")?;
    writeln!(writer, "Flow%20direction 3 {} double", n)?;
    for d in &field.flow_direction {
        writeln!(writer, "{} {} {}", d[0], d[1], d[2])?;
    }
    writeln!(writer, "Flow%20direction%20uncertainty 1 {} double", n)?;
    for u in &field.direction_uncertainty {
        writeln!(writer, "{}", u)?;
    }
    writeln!(writer, "Vessel%20velocity 1 {} double", n)?;
    for v in &field.velocity {
        writeln!(writer, "{}", v)?;
    }
    Ok(())
}

pub fn write_vtk_file<P: AsRef<Path>>(path: P, field: &FlowField) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("failed to create VTK file {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write_vtk(&mut writer, field).with_context(|| format!("failed to write {:?}", path))?;
    writer.flush()?;
    Ok(())
}

pub fn write_json_file<P: AsRef<Path>>(path: P, field: &FlowField) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("failed to create JSON file {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, field)
        .with_context(|| format!("failed to write {:?}", path))?;
    writer.flush()?;
    Ok(())
}

/// Writes `field` next to `stem` as `<stem>.vtk` and `<stem>.json`.
pub fn write_flow_field<P: AsRef<Path>>(stem: P, field: &FlowField) -> anyhow::Result<()> {
    let stem = stem.as_ref();
    if let Some(parent) = stem.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output directory {:?}", parent))?;
        }
    }
    write_vtk_file(stem.with_extension("vtk"), field)?;
    write_json_file(stem.with_extension("json"), field)?;
    Ok(())
}
