//! Manual worksheet layout for the results workbook.
//!
//! Ranking tables are placed side by side at computed row/column offsets to
//! emulate a pivot-table view: one block per area (or area + attribute),
//! each block stacking its ranking tables vertically under a header cell.

use crate::summarize::rank::{Cell, RankedTable};
use rust_xlsxwriter::{Worksheet, XlsxError};

/// One labeled stack of ranking tables.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: String,
    pub tables: Vec<RankedTable>,
}

impl Block {
    fn width(&self) -> usize {
        self.tables.iter().map(RankedTable::width).max().unwrap_or(1)
    }

}

const COLUMN_GAP: usize = 4;
const BAND_GAP: usize = 3;

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> Result<(), XlsxError> {
    match cell {
        Cell::Text(s) => sheet.write_string(row, col, s)?,
        Cell::Number(v) => sheet.write_number(row, col, *v)?,
    };
    Ok(())
}

/// Writes one block and returns the number of rows it consumed, so band
/// stacking always reflects what actually landed on the sheet.
fn write_block(
    sheet: &mut Worksheet,
    block: &Block,
    start_row: usize,
    start_col: usize,
) -> Result<usize, XlsxError> {
    let col = start_col as u16;
    let mut row = start_row as u32;

    sheet.write_string(row, col, &block.header)?;
    row += 2;

    for table in &block.tables {
        sheet.write_string(row, col, &table.title)?;
        row += 2;
        for (j, header) in table.headers.iter().enumerate() {
            sheet.write_string(row, col + j as u16, header)?;
        }
        row += 1;
        for cells in &table.rows {
            for (j, cell) in cells.iter().enumerate() {
                write_cell(sheet, row, col + j as u16, cell)?;
            }
            row += 1;
        }
        row += 3;
    }
    Ok(row as usize - start_row)
}

/// Writes bands of blocks: blocks within a band sit side by side, bands
/// stack vertically.
pub fn write_bands(sheet: &mut Worksheet, bands: &[Vec<Block>]) -> Result<(), XlsxError> {
    let mut row = 0usize;
    for band in bands {
        let mut col = 0usize;
        let mut tallest = 0usize;
        for block in band {
            let consumed = write_block(sheet, block, row, col)?;
            col += block.width() + COLUMN_GAP;
            tallest = tallest.max(consumed);
        }
        row += tallest + BAND_GAP;
    }
    Ok(())
}

/// Writes a plain statistics sheet: a header row, then one row per area.
pub fn write_stats(
    sheet: &mut Worksheet,
    headers: &[String],
    rows: &[Vec<Cell>],
) -> Result<(), XlsxError> {
    for (j, header) in headers.iter().enumerate() {
        sheet.write_string(0, j as u16, header)?;
    }
    for (i, cells) in rows.iter().enumerate() {
        for (j, cell) in cells.iter().enumerate() {
            write_cell(sheet, i as u32 + 1, j as u16, cell)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(rows: usize) -> RankedTable {
        RankedTable {
            title: "full_5".to_string(),
            headers: vec!["feature".to_string(), "mean".to_string()],
            rows: (0..rows)
                .map(|i| vec![Cell::Text(format!("f{i}")), Cell::Number(i as f64)])
                .collect(),
        }
    }

    #[test]
    fn block_reports_every_row_it_writes() {
        let mut sheet = Worksheet::new();
        let block = Block {
            header: "sl".to_string(),
            tables: vec![ranking(6), ranking(3)],
        };
        let consumed = write_block(&mut sheet, &block, 0, 0).unwrap();
        // Header + gap (2), then per table: title + gap (2), header row (1),
        // data rows, trailing gap (3).
        assert_eq!(consumed, 2 + (2 + 1 + 6 + 3) + (2 + 1 + 3 + 3));
    }
}
