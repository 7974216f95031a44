//! Index bookkeeping for the flattened state and residual vectors.
//!
//! Solution state `u[d, f, i]` (d: derivative, f: function, i: mesh point) is stored
//! column-major with the derivative index fastest, so the node block of mesh point `i` is
//! the contiguous `nd × nu` slice starting at `i·nd·nu`. The solution residual
//! `resu[f, c, i]` (c: collocation slot) uses the same convention with `nu × ns` blocks.
//! The combined DAE state is `[x; u]`, the combined residual `[resx; resu]`.
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    /// derivative orders stored per function (= ns)
    pub nd: usize,
    /// number of state functions
    pub nu: usize,
    /// number of mesh points
    pub nx: usize,
}

impl StateLayout {
    pub fn new(nd: usize, nu: usize, nx: usize) -> Self {
        StateLayout { nd, nu, nx }
    }
    /// length of one node block
    pub fn block_len(&self) -> usize {
        self.nd * self.nu
    }
    /// length of the solution part
    pub fn solution_len(&self) -> usize {
        self.nd * self.nu * self.nx
    }
    /// length of the combined state `[x; u]`
    pub fn total_len(&self) -> usize {
        self.nx + self.solution_len()
    }
    /// flat index of u[d, f, i]
    pub fn index(&self, d: usize, f: usize, i: usize) -> usize {
        d + self.nd * (f + self.nu * i)
    }

    /// `nd × nu` block of mesh point `i`
    pub fn node_block(&self, u: &DVector<f64>, i: usize) -> DMatrix<f64> {
        let start = i * self.block_len();
        DMatrix::from_column_slice(self.nd, self.nu, &u.as_slice()[start..start + self.block_len()])
    }

    /// all node blocks, in mesh order
    pub fn node_blocks(&self, u: &DVector<f64>) -> Vec<DMatrix<f64>> {
        (0..self.nx).map(|i| self.node_block(u, i)).collect()
    }

    /// writes a node block of mesh point `i`
    pub fn set_node_block(&self, u: &mut DVector<f64>, i: usize, block: &DMatrix<f64>) {
        let start = i * self.block_len();
        u.as_mut_slice()[start..start + self.block_len()].copy_from_slice(block.as_slice());
    }

    /// splits the combined vector into the mesh part and the solution part
    pub fn split(&self, y: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        debug_assert_eq!(y.len(), self.total_len());
        (
            y.rows(0, self.nx).clone_owned(),
            y.rows(self.nx, self.solution_len()).clone_owned(),
        )
    }

    /// joins mesh and solution parts into the combined vector
    pub fn join(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.total_len());
        y.rows_mut(0, self.nx).copy_from(x);
        y.rows_mut(self.nx, self.solution_len()).copy_from(u);
        y
    }
}

/// Mesh and solution of one evaluation, unpacked into node blocks.
#[derive(Debug, Clone)]
pub struct DiscreteState {
    pub x: DVector<f64>,
    pub xt: DVector<f64>,
    /// `nd × nu` block per mesh point
    pub u: Vec<DMatrix<f64>>,
    /// `nd × nu` rate block per mesh point
    pub ut: Vec<DMatrix<f64>>,
}

impl DiscreteState {
    pub fn from_parts(
        layout: &StateLayout,
        x: &DVector<f64>,
        xt: &DVector<f64>,
        u: &DVector<f64>,
        ut: &DVector<f64>,
    ) -> Self {
        DiscreteState {
            x: x.clone(),
            xt: xt.clone(),
            u: layout.node_blocks(u),
            ut: layout.node_blocks(ut),
        }
    }

    /// unpacks the combined state `y = [x; u]` and its rate
    pub fn from_combined(layout: &StateLayout, y: &DVector<f64>, yp: &DVector<f64>) -> Self {
        let (x, u) = layout.split(y);
        let (xt, ut) = layout.split(yp);
        DiscreteState {
            u: layout.node_blocks(&u),
            ut: layout.node_blocks(&ut),
            x,
            xt,
        }
    }

    pub fn nx(&self) -> usize {
        self.x.len()
    }
}

/// `n` uniformly spaced points from `a` to `b`
pub fn linspace(a: f64, b: f64, n: usize) -> DVector<f64> {
    if n == 1 {
        return DVector::from_element(1, a);
    }
    let dx = (b - a) / (n - 1) as f64;
    DVector::from_iterator(n, (0..n).map(|i| if i == n - 1 { b } else { a + i as f64 * dx }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_and_blocks() {
        let layout = StateLayout::new(2, 3, 4);
        assert_eq!(layout.solution_len(), 24);
        assert_eq!(layout.total_len(), 28);
        let u = DVector::from_iterator(24, (0..24).map(|i| i as f64));
        let block = layout.node_block(&u, 2);
        assert_eq!(block.shape(), (2, 3));
        for d in 0..2 {
            for f in 0..3 {
                assert_eq!(block[(d, f)], layout.index(d, f, 2) as f64);
            }
        }
        let mut v = DVector::zeros(24);
        layout.set_node_block(&mut v, 2, &block);
        assert_eq!(layout.node_block(&v, 2), block);
        assert_eq!(layout.node_blocks(&u).len(), 4);
    }

    #[test]
    fn test_split_join() {
        let layout = StateLayout::new(2, 1, 3);
        let x = DVector::from_vec(vec![0.0, 0.5, 1.0]);
        let u = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = layout.join(&x, &u);
        assert_eq!(y.len(), 9);
        let (x2, u2) = layout.split(&y);
        assert_eq!(x2, x);
        assert_eq!(u2, u);
    }

    #[test]
    fn test_discrete_state_from_combined() {
        let layout = StateLayout::new(2, 1, 2);
        let y = DVector::from_vec(vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]);
        let yp = DVector::from_vec(vec![0.5, -0.5, 1.0, 2.0, 3.0, 4.0]);
        let state = DiscreteState::from_combined(&layout, &y, &yp);
        assert_eq!(state.nx(), 2);
        assert_eq!(state.xt.as_slice(), &[0.5, -0.5]);
        assert_eq!(state.u[1].as_slice(), &[20.0, 21.0]);
        assert_eq!(state.ut[0].as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_linspace() {
        let x = linspace(0.0, 1.0, 5);
        assert_eq!(x.as_slice(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
    }
}
