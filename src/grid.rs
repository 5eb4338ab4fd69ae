//! Cell grid consumed by the renderer
//!
//! The terminal emulator populates the grid; the renderer only reads cells
//! and clears dirty markers once a frame has been drawn.

use std::collections::BTreeSet;

use unicode_width::UnicodeWidthChar;

use crate::colors::Rgb;

bitflags::bitflags! {
    /// Cell style flags
    ///
    /// Bit values are shared with the cell shader.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u8 {
        const BOLD = 0b0000_0001;
        const DIM = 0b0000_0010;
        const ITALIC = 0b0000_0100;
        const UNDERLINE = 0b0000_1000;
        const BLINK = 0b0001_0000;
        const INVERSE = 0b0010_0000;
    }
}

/// Terminal cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Character to render
    pub ch: char,
    /// Foreground color
    pub fg: Rgb,
    /// Background color
    pub bg: Rgb,
    /// Style flags
    pub flags: CellFlags,
}

impl Cell {
    #[must_use]
    pub const fn new(ch: char, fg: Rgb, bg: Rgb, flags: CellFlags) -> Self {
        Self { ch, fg, bg, flags }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Rgb::WHITE,
            bg: Rgb::BLACK,
            flags: CellFlags::empty(),
        }
    }
}

/// Read access to a grid of cells plus its dirty markers
pub trait CellGrid {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    /// Cell at column `x`, row `y`. Out-of-range positions yield a blank cell.
    fn cell(&self, x: usize, y: usize) -> Cell;
    /// Rows changed since the last `clear_dirty`
    fn dirty_rows(&self) -> &BTreeSet<usize>;
    /// Whether the whole grid must be considered changed
    fn is_full_dirty(&self) -> bool;
    fn clear_dirty(&mut self);

    fn cell_count(&self) -> usize {
        self.rows() * self.cols()
    }
}

/// Row-major cell grid with per-row dirty tracking
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    dirty_rows: BTreeSet<usize>,
    full_dirty: bool,
}

impl Grid {
    /// Create a blank grid; a fresh grid is fully dirty
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::default(); rows * cols],
            dirty_rows: BTreeSet::new(),
            full_dirty: true,
        }
    }

    /// Set a single cell; ignored outside the grid
    pub fn set_cell(&mut self, x: usize, y: usize, cell: Cell) {
        if x >= self.cols || y >= self.rows {
            return;
        }
        let idx = y * self.cols + x;
        if self.cells[idx] != cell {
            self.cells[idx] = cell;
            self.dirty_rows.insert(y);
        }
    }

    /// Overwrite every cell
    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell);
        self.full_dirty = true;
    }

    /// Write a string starting at (`x`, `y`), clipped at the row end.
    ///
    /// Wide characters take two columns; the trailing column is a blank cell
    /// with the same colors. Returns the column after the last written cell.
    pub fn put_str(&mut self, x: usize, y: usize, text: &str, fg: Rgb, bg: Rgb, flags: CellFlags) -> usize {
        let mut col = x;
        for ch in text.chars() {
            let width = ch.width().unwrap_or(0);
            if width == 0 {
                continue;
            }
            if col + width > self.cols {
                break;
            }
            self.set_cell(col, y, Cell::new(ch, fg, bg, flags));
            if width == 2 {
                self.set_cell(col + 1, y, Cell::new(' ', fg, bg, flags));
            }
            col += width;
        }
        col
    }

    /// Overwrite one row; ignored outside the grid
    pub fn fill_row(&mut self, y: usize, cell: Cell) {
        for x in 0..self.cols {
            self.set_cell(x, y, cell);
        }
    }

    /// Resize, keeping the overlapping top-left region
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if rows == self.rows && cols == self.cols {
            return;
        }
        let mut cells = vec![Cell::default(); rows * cols];
        for y in 0..rows.min(self.rows) {
            for x in 0..cols.min(self.cols) {
                cells[y * cols + x] = self.cells[y * self.cols + x];
            }
        }
        self.cells = cells;
        self.rows = rows;
        self.cols = cols;
        self.dirty_rows.clear();
        self.full_dirty = true;
    }

    pub fn mark_all_dirty(&mut self) {
        self.full_dirty = true;
    }

    /// Row-major view of all cells
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

impl CellGrid for Grid {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn cell(&self, x: usize, y: usize) -> Cell {
        if x >= self.cols || y >= self.rows {
            return Cell::default();
        }
        self.cells[y * self.cols + x]
    }

    fn dirty_rows(&self) -> &BTreeSet<usize> {
        &self.dirty_rows
    }

    fn is_full_dirty(&self) -> bool {
        self.full_dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty_rows.clear();
        self.full_dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid_is_blank_and_dirty() {
        let grid = Grid::new(24, 80);
        assert_eq!(grid.cell_count(), 1920);
        assert!(grid.is_full_dirty());
        assert_eq!(grid.cell(79, 23), Cell::default());
    }

    #[test]
    fn test_set_cell_marks_row() {
        let mut grid = Grid::new(4, 10);
        grid.clear_dirty();

        let cell = Cell::new('x', Rgb::new(1, 2, 3), Rgb::BLACK, CellFlags::BOLD);
        grid.set_cell(3, 2, cell);

        assert_eq!(grid.cell(3, 2), cell);
        assert_eq!(grid.dirty_rows().iter().copied().collect::<Vec<_>>(), vec![2]);
        assert!(!grid.is_full_dirty());
    }

    #[test]
    fn test_unchanged_cell_not_dirty() {
        let mut grid = Grid::new(2, 2);
        grid.clear_dirty();
        grid.set_cell(0, 0, Cell::default());
        assert!(grid.dirty_rows().is_empty());
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut grid = Grid::new(2, 2);
        grid.clear_dirty();
        grid.set_cell(5, 5, Cell::new('z', Rgb::WHITE, Rgb::BLACK, CellFlags::empty()));
        assert!(grid.dirty_rows().is_empty());
        assert_eq!(grid.cell(5, 5), Cell::default());
    }

    #[test]
    fn test_put_str_wide_chars() {
        let mut grid = Grid::new(1, 5);
        let end = grid.put_str(0, 0, "a中b", Rgb::WHITE, Rgb::BLACK, CellFlags::empty());
        assert_eq!(end, 4);
        assert_eq!(grid.cell(0, 0).ch, 'a');
        assert_eq!(grid.cell(1, 0).ch, '中');
        assert_eq!(grid.cell(2, 0).ch, ' ');
        assert_eq!(grid.cell(3, 0).ch, 'b');
    }

    #[test]
    fn test_put_str_clips_at_row_end() {
        let mut grid = Grid::new(1, 3);
        let end = grid.put_str(1, 0, "abcdef", Rgb::WHITE, Rgb::BLACK, CellFlags::empty());
        assert_eq!(end, 3);
        assert_eq!(grid.cell(2, 0).ch, 'b');
    }

    #[test]
    fn test_fill_row() {
        let mut grid = Grid::new(3, 4);
        grid.clear_dirty();
        let cell = Cell::new('-', Rgb::WHITE, Rgb::BLACK, CellFlags::empty());
        grid.fill_row(1, cell);
        grid.fill_row(7, cell);

        assert!((0..4).all(|x| grid.cell(x, 1) == cell));
        assert_eq!(grid.cell(0, 0), Cell::default());
        assert_eq!(grid.dirty_rows().iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_resize_keeps_overlap() {
        let mut grid = Grid::new(2, 2);
        grid.set_cell(1, 1, Cell::new('q', Rgb::WHITE, Rgb::BLACK, CellFlags::empty()));
        grid.clear_dirty();

        grid.resize(3, 4);
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.cols(), 4);
        assert_eq!(grid.cell(1, 1).ch, 'q');
        assert!(grid.is_full_dirty());
    }

    #[test]
    fn test_clear_dirty() {
        let mut grid = Grid::new(2, 2);
        grid.set_cell(0, 1, Cell::new('q', Rgb::WHITE, Rgb::BLACK, CellFlags::empty()));
        grid.clear_dirty();
        assert!(!grid.is_full_dirty());
        assert!(grid.dirty_rows().is_empty());
    }
}
