use crate::math::Vector2;

/// Upper bound of particle references a single cell will hold. Additional
/// binds are dropped for the tick, so local crowding degrades smoothly
/// instead of reallocating on the hot path.
pub const CELL_MAX_PARTICLES: usize = 50;

#[derive(Clone)]
struct Cell {
    indexes: [usize; CELL_MAX_PARTICLES],
    count: usize,
}

impl Cell {
    fn empty() -> Self {
        Cell {
            indexes: [0; CELL_MAX_PARTICLES],
            count: 0,
        }
    }

    fn clear(&mut self) {
        self.count = 0;
    }

    fn push(&mut self, index: usize) {
        if self.count < CELL_MAX_PARTICLES {
            self.indexes[self.count] = index;
            self.count += 1;
        }
    }

    fn indexes(&self) -> &[usize] {
        &self.indexes[..self.count]
    }
}

/// Uniform grid over the simulation domain with cells the size of the kernel
/// support radius. Every nearby unordered particle pair can then be visited
/// exactly once by walking each cell against its "top-right half" of
/// neighbors, precomputed at construction.
pub struct SpatialGrid {
    nx: usize,
    ny: usize,
    width: f32,
    height: f32,
    cells: Vec<Cell>,
    half_neighbors: Vec<Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(nx: usize, ny: usize, width: f32, height: f32) -> Self {
        let mut half_neighbors = Vec::with_capacity(nx * ny);
        for row in 0..ny {
            for col in 0..nx {
                // Right neighbor plus the three cells of the row above
                let mut neighbors = Vec::with_capacity(4);
                if col + 1 < nx {
                    neighbors.push(row * nx + col + 1);
                }
                if row + 1 < ny {
                    for other_col in col.saturating_sub(1)..=(col + 1).min(nx - 1) {
                        neighbors.push((row + 1) * nx + other_col);
                    }
                }
                half_neighbors.push(neighbors);
            }
        }

        SpatialGrid {
            nx,
            ny,
            width,
            height,
            cells: vec![Cell::empty(); nx * ny],
            half_neighbors,
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Zeroes every cell count. The backing arrays are reused.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Index of the cell covering `(x, y)`, or `None` outside the grid.
    pub fn cell_at(&self, x: f32, y: f32) -> Option<usize> {
        let col = (self.nx as f32 * x / self.width).floor();
        let row = (self.ny as f32 * y / self.height).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }

        let (col, row) = (col as usize, row as usize);
        if col >= self.nx || row >= self.ny {
            return None;
        }

        Some(row * self.nx + col)
    }

    /// Files a particle index under the cell covering its position.
    /// Out-of-bounds positions are silently ignored; boundary handling pulls
    /// those particles back on the next integration.
    pub fn bind(&mut self, position: Vector2, index: usize) {
        if let Some(cell) = self.cell_at(position.x, position.y) {
            self.cells[cell].push(index);
        }
    }

    /// Particle indexes currently bound to `cell`. Unknown cells are empty.
    pub fn cell_indexes(&self, cell: usize) -> &[usize] {
        self.cells.get(cell).map(Cell::indexes).unwrap_or(&[])
    }

    /// Visits every unordered pair of indexes bound to the same or to
    /// neighboring cells, each pair exactly once.
    pub fn pairwise<F: FnMut(usize, usize)>(&self, mut visit: F) {
        for (cell_index, cell) in self.cells.iter().enumerate() {
            let indexes = cell.indexes();

            for (nth, &first) in indexes.iter().enumerate() {
                for &second in &indexes[nth + 1..] {
                    visit(first, second);
                }
            }

            for &neighbor in &self.half_neighbors[cell_index] {
                for &first in indexes {
                    for &second in self.cells[neighbor].indexes() {
                        visit(first, second);
                    }
                }
            }
        }
    }
}
