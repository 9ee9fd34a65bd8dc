//! Space-partitioning tree over a 2D layout, used to approximate the
//! t-SNE repulsive forces in `O(n log n)` (Barnes-Hut).

/// Subdivision stops here; deeper points share a leaf.
const MAX_DEPTH: usize = 48;
const NO_POINT: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Cell {
    center: [f64; 2],
    half: f64,
    depth: usize,
    /// Sum of the positions below this cell.
    mass: [f64; 2],
    count: usize,
    /// Index of the first of four children, 0 for a leaf.
    children: usize,
    /// One of the points stored in a leaf.
    point: usize,
}

impl Cell {
    fn new(center: [f64; 2], half: f64, depth: usize) -> Self {
        Self {
            center,
            half,
            depth,
            mass: [0.0; 2],
            count: 0,
            children: 0,
            point: NO_POINT,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children == 0
    }

    fn quadrant(&self, p: [f64; 2]) -> usize {
        usize::from(p[0] >= self.center[0]) + 2 * usize::from(p[1] >= self.center[1])
    }

    fn add(&mut self, p: [f64; 2]) {
        self.mass[0] += p[0];
        self.mass[1] += p[1];
        self.count += 1;
    }
}

/// Repulsion acting on one point, before normalisation by `Z`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Repulsion {
    pub force: [f64; 2],
    /// This point's share of `Z = Σ (1 + d²)⁻¹`.
    pub z: f64,
}

/// Quadtree built over an interleaved `[x0, y0, x1, y1, …]` layout.
pub struct QuadTree<'a> {
    cells: Vec<Cell>,
    layout: &'a [f64],
}

impl<'a> QuadTree<'a> {
    pub fn build(layout: &'a [f64]) -> Self {
        let (mut lo, mut hi) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
        for p in layout.chunks_exact(2) {
            for axis in 0..2 {
                lo[axis] = lo[axis].min(p[axis]);
                hi[axis] = hi[axis].max(p[axis]);
            }
        }
        let center = [(lo[0] + hi[0]) / 2.0, (lo[1] + hi[1]) / 2.0];
        let half = ((hi[0] - lo[0]).max(hi[1] - lo[1]) / 2.0).max(0.0) + 1e-5;

        let mut tree = Self {
            cells: vec![Cell::new(center, half, 0)],
            layout,
        };
        for i in 0..layout.len() / 2 {
            tree.insert(i);
        }
        tree
    }

    fn position(&self, i: usize) -> [f64; 2] {
        [self.layout[2 * i], self.layout[2 * i + 1]]
    }

    fn insert(&mut self, i: usize) {
        let p = self.position(i);
        let mut idx = 0;
        loop {
            let cell = &self.cells[idx];
            if !cell.is_leaf() {
                let next = cell.children + cell.quadrant(p);
                self.cells[idx].add(p);
                idx = next;
                continue;
            }
            if cell.count == 0 {
                self.cells[idx].add(p);
                self.cells[idx].point = i;
                return;
            }
            let resident = self.position(cell.point);
            if resident == p || cell.depth >= MAX_DEPTH {
                self.cells[idx].add(p);
                return;
            }
            // move the current contents one level down, then retry here
            self.subdivide(idx);
            let cell = &self.cells[idx];
            let child = cell.children + cell.quadrant(resident);
            let (mass, count, point) = (cell.mass, cell.count, cell.point);
            let child = &mut self.cells[child];
            child.mass = mass;
            child.count = count;
            child.point = point;
        }
    }

    fn subdivide(&mut self, idx: usize) {
        let Cell { center, half, depth, .. } = self.cells[idx];
        let quarter = half / 2.0;
        let first = self.cells.len();
        for q in 0..4 {
            let dx = if q & 1 == 1 { quarter } else { -quarter };
            let dy = if q & 2 == 2 { quarter } else { -quarter };
            self.cells
                .push(Cell::new([center[0] + dx, center[1] + dy], quarter, depth + 1));
        }
        self.cells[idx].children = first;
    }

    /// Summed Student-t repulsion on point `i`.
    ///
    /// A cell is summarised by its centre of mass once its width is below
    /// `theta` times its distance; `theta = 0` visits every point.  Cells on
    /// the path to `i` are always opened so `i` never repels itself.
    pub fn repulsion(&self, i: usize, theta: f64) -> Repulsion {
        let p = self.position(i);
        let mut out = Repulsion::default();
        let mut stack = vec![(0usize, true)];

        while let Some((idx, on_path)) = stack.pop() {
            let cell = &self.cells[idx];
            if cell.count == 0 {
                continue;
            }
            let count = cell.count as f64;
            let com = [cell.mass[0] / count, cell.mass[1] / count];
            let diff = [p[0] - com[0], p[1] - com[1]];
            let dist2 = diff[0] * diff[0] + diff[1] * diff[1];
            let width = 2.0 * cell.half;

            let summarised = cell.is_leaf() || (!on_path && width * width < theta * theta * dist2);
            if summarised {
                let others = if on_path && cell.is_leaf() { count - 1.0 } else { count };
                if others > 0.0 {
                    let q = 1.0 / (1.0 + dist2);
                    out.z += others * q;
                    out.force[0] += others * q * q * diff[0];
                    out.force[1] += others * q * q * diff[1];
                }
                continue;
            }

            let path_quadrant = if on_path { cell.quadrant(p) } else { usize::MAX };
            for q in 0..4 {
                stack.push((cell.children + q, q == path_quadrant));
            }
        }
        out
    }
}
