//! Post-session reshaping of stream tables.
//!
//! Runs after every pipeline has joined. `merge_outputs` builds the single
//! merged table on the hardware time axis and places sensor samples only on
//! the rows whose instant coincides with a sensor sample; every other sensor
//! cell is [`BLANK`]. `split_outputs` keeps one file per stream and moves
//! detached column groups into files of their own.

use std::fs;
use std::path::PathBuf;

use daq_core::error::{AppResult, DaqError};
use daq_core::timestamp::RateTimestamper;
use daq_storage::{SessionNaming, Table, BLANK, TIME_COLUMN};
use tracing::{debug, info, warn};

use crate::pipeline::{StreamKind, StreamOutput};

/// Build `<stem> .csv` from every stream table and remove the intermediates.
///
/// Columns are `Time (s)`, each hardware stream's channels in the order the
/// streams appear in `outputs`, then each sensor column. The axis is the
/// longest hardware table at `rate_hz`; shorter tables are padded with blanks.
pub fn merge_outputs(
    outputs: &[StreamOutput],
    rate_hz: u32,
    naming: &SessionNaming,
) -> AppResult<PathBuf> {
    let timestamper = RateTimestamper::new(rate_hz);

    let mut hardware = Vec::new();
    let mut sensors = Vec::new();
    for output in outputs {
        let table = Table::read(&output.path)?;
        match output.kind {
            StreamKind::Hardware { .. } => hardware.push(table),
            StreamKind::Sensor { rate_hz: sensor_rate } => sensors.push((sensor_rate, table)),
        }
    }
    if hardware.is_empty() {
        return Err(DaqError::Configuration(
            "Merging requires at least one hardware stream".to_string(),
        ));
    }

    let axis = hardware
        .iter()
        .enumerate()
        .max_by_key(|(i, table)| (table.len(), std::cmp::Reverse(*i)))
        .map(|(i, _)| i)
        .unwrap_or_default();
    let axis_rows = hardware[axis].len();

    let mut headers = vec![TIME_COLUMN.to_string()];
    for table in &hardware {
        headers.extend(table.headers().iter().skip(1).cloned());
    }
    for (_, table) in &sensors {
        headers.extend(table.headers().iter().skip(1).cloned());
    }
    let mut merged = Table::new(headers);

    let mut aligned = 0usize;
    for row in 0..axis_rows {
        let mut cells = Vec::with_capacity(merged.headers().len());
        cells.push(
            hardware[axis]
                .cell(row, 0)
                .map(str::to_string)
                .unwrap_or_else(|| timestamper.timestamp(row as u64).to_string()),
        );
        for table in &hardware {
            extend_row(&mut cells, table, Some(row));
        }
        for (sensor_rate, table) in &sensors {
            let sensor_row = timestamper
                .aligned_row(row as u64, *sensor_rate)
                .and_then(|j| usize::try_from(j).ok());
            if sensor_row.is_some_and(|j| j < table.len()) {
                aligned += 1;
            }
            extend_row(&mut cells, table, sensor_row);
        }
        merged.push_row(cells);
    }

    let path = naming.merged_file();
    merged.write(&path)?;
    info!(
        path = %path.display(),
        rows = axis_rows,
        columns = merged.headers().len(),
        aligned_sensor_rows = aligned,
        "Merged session table written"
    );

    for output in outputs {
        remove_intermediate(output);
    }
    Ok(path)
}

/// Append the data cells of `row` of `table`, or blanks when it has no such row.
fn extend_row(cells: &mut Vec<String>, table: &Table, row: Option<usize>) {
    let width = table.headers().len().saturating_sub(1);
    match row.and_then(|r| table.rows().get(r)) {
        Some(values) => cells.extend(values.iter().skip(1).cloned()),
        None => cells.extend(std::iter::repeat(BLANK.to_string()).take(width)),
    }
}

fn remove_intermediate(output: &StreamOutput) {
    match fs::remove_file(&output.path) {
        Ok(()) => debug!(stream = %output.name, path = %output.path.display(), "Intermediate removed"),
        Err(e) => warn!(
            stream = %output.name,
            path = %output.path.display(),
            error = %e,
            "Failed to remove intermediate table"
        ),
    }
}

/// Keep one file per stream, moving detached column groups out.
///
/// Each detach group of a hardware stream becomes `<stem> -- <group> .csv`
/// holding `Time (s)` and the group's columns; the stream file is rewritten
/// without them. Sensor files are kept as written. Returns every final file.
pub fn split_outputs(outputs: &[StreamOutput], naming: &SessionNaming) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for output in outputs {
        let detach = match &output.kind {
            StreamKind::Hardware { detach } if !detach.is_empty() => detach,
            _ => {
                files.push(output.path.clone());
                continue;
            }
        };

        let table = Table::read(&output.path)?;
        let mut moved: Vec<&str> = Vec::new();
        for group in detach {
            let mut names = vec![TIME_COLUMN];
            names.extend(group.columns.iter().map(String::as_str));
            let part = table.select(&names).ok_or_else(|| {
                DaqError::Configuration(format!(
                    "Detach group '{}' names a column missing from stream '{}'",
                    group.group, output.name
                ))
            })?;
            let path = naming.part_file(&group.group);
            part.write(&path)?;
            info!(
                stream = %output.name,
                group = %group.group,
                columns = group.columns.len(),
                path = %path.display(),
                "Detached column group written"
            );
            moved.extend(group.columns.iter().map(String::as_str));
            files.push(path);
        }

        table.without(&moved).write(&output.path)?;
        files.push(output.path.clone());
    }
    Ok(files)
}
