//! Dense matrix with LU decomposition and iterative solvers.

use crate::error::{NetlistError, Result};

/// Pivots below this are treated as zero.
const PIVOT_EPSILON: f64 = 1e-15;

/// Linear system `A x = rhs`, row-major.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    pub a: Vec<f64>,
    pub rhs: Vec<f64>,
    pub x: Vec<f64>,
    pub size: usize,
    lu: Vec<f64>,
    pivots: Vec<usize>,
}

impl DenseMatrix {
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            rhs: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    /// Clear the matrix and right hand side.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.rhs.fill(0.0);
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    pub fn add_rhs(&mut self, row: usize, value: f64) {
        self.rhs[row] += value;
    }

    /// LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }

        for k in 0..n {
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val < PIVOT_EPSILON {
                return Err(NetlistError::SingularMatrix { row: k });
            }

            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                if factor == 0.0 {
                    continue;
                }
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve using the decomposition from [`factor`](Self::factor).
    pub fn solve(&mut self) {
        let n = self.size;

        // forward substitution, L y = P b
        for i in 0..n {
            let mut v = self.rhs[self.pivots[i]];
            for j in 0..i {
                v -= self.lu[i * n + j] * self.x[j];
            }
            self.x[i] = v;
        }

        // back substitution, U x = y
        for i in (0..n).rev() {
            let mut v = self.x[i];
            for j in (i + 1)..n {
                v -= self.lu[i * n + j] * self.x[j];
            }
            self.x[i] = v / self.lu[i * n + i];
        }
    }

    /// Factor and solve in one go.
    pub fn factor_and_solve(&mut self) -> Result<()> {
        self.factor()?;
        self.solve();
        Ok(())
    }

    fn row_dot(&self, row: usize, v: &[f64]) -> f64 {
        let n = self.size;
        self.a[row * n..(row + 1) * n].iter().zip(v).map(|(a, b)| a * b).sum()
    }

    fn diagonal(&self) -> Option<Vec<f64>> {
        let d: Vec<f64> = (0..self.size).map(|i| self.get(i, i)).collect();
        d.iter().all(|v| v.abs() >= PIVOT_EPSILON).then_some(d)
    }

    /// Successive over-relaxation, starting from `x`. Returns the number
    /// of sweeps, `None` if the largest update is still above `accuracy`
    /// after `max_sweeps`.
    pub fn solve_sor(&mut self, omega: f64, max_sweeps: usize, accuracy: f64) -> Option<usize> {
        let diag = self.diagonal()?;
        for sweep in 1..=max_sweeps {
            let mut err: f64 = 0.0;
            for (i, d) in diag.iter().enumerate() {
                let off = self.row_dot(i, &self.x) - d * self.x[i];
                let delta = omega * ((self.rhs[i] - off) / d - self.x[i]);
                self.x[i] += delta;
                err = err.max(delta.abs());
            }
            if err <= accuracy {
                return Some(sweep);
            }
        }
        None
    }

    /// Restarted GMRES on the Jacobi scaled system, starting from `x`.
    ///
    /// Returns the number of Krylov steps, `None` if the scaled residual
    /// is still above `accuracy` after `max_iter` of them.
    pub fn solve_gmres(&mut self, max_iter: usize, accuracy: f64) -> Option<usize> {
        let n = self.size;
        let diag = self.diagonal()?;
        let restart = n.min(max_iter).max(1);
        let mut total = 0;
        loop {
            let r: Vec<f64> = (0..n)
                .map(|i| (self.rhs[i] - self.row_dot(i, &self.x)) / diag[i])
                .collect();
            let beta = norm(&r);
            if beta <= accuracy {
                return Some(total);
            }
            if total >= max_iter {
                return None;
            }

            let mut v = vec![r.iter().map(|x| x / beta).collect::<Vec<f64>>()];
            let mut h = vec![vec![0.0; restart]; restart + 1];
            let mut cs = vec![0.0; restart];
            let mut sn = vec![0.0; restart];
            let mut g = vec![0.0; restart + 1];
            g[0] = beta;

            let mut k = 0;
            while k < restart && total < max_iter {
                let mut w: Vec<f64> = (0..n).map(|i| self.row_dot(i, &v[k]) / diag[i]).collect();
                // modified Gram-Schmidt
                for (i, vi) in v.iter().enumerate() {
                    h[i][k] = dot(&w, vi);
                    for (wj, vj) in w.iter_mut().zip(vi) {
                        *wj -= h[i][k] * vj;
                    }
                }
                let next = norm(&w);
                h[k + 1][k] = next;

                for i in 0..k {
                    let t = cs[i] * h[i][k] + sn[i] * h[i + 1][k];
                    h[i + 1][k] = cs[i] * h[i + 1][k] - sn[i] * h[i][k];
                    h[i][k] = t;
                }
                let d = h[k][k].hypot(h[k + 1][k]);
                if d == 0.0 {
                    return None;
                }
                cs[k] = h[k][k] / d;
                sn[k] = h[k + 1][k] / d;
                h[k][k] = d;
                h[k + 1][k] = 0.0;
                g[k + 1] = -sn[k] * g[k];
                g[k] *= cs[k];

                total += 1;
                k += 1;
                if g[k].abs() <= accuracy || next == 0.0 {
                    break;
                }
                v.push(w.iter().map(|x| x / next).collect());
            }

            let mut y = vec![0.0; k];
            for i in (0..k).rev() {
                let s: f64 = ((i + 1)..k).map(|j| h[i][j] * y[j]).sum();
                y[i] = (g[i] - s) / h[i][i];
            }
            for (yi, vi) in y.iter().zip(&v) {
                for (xj, vj) in self.x.iter_mut().zip(vi) {
                    *xj += yi * vj;
                }
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_2x2() {
        // 2x + y = 5, x + 3y = 10
        let mut m = DenseMatrix::new(2);
        m.add(0, 0, 2.0);
        m.add(0, 1, 1.0);
        m.add(1, 0, 1.0);
        m.add(1, 1, 3.0);
        m.add_rhs(0, 5.0);
        m.add_rhs(1, 10.0);
        m.factor_and_solve().unwrap();
        assert_relative_eq!(m.x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.x[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_needs_pivoting() {
        // zero on the first diagonal element
        let mut m = DenseMatrix::new(3);
        let a = [[0.0, 1.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
        for (i, row) in a.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                m.add(i, j, v);
            }
        }
        m.rhs.copy_from_slice(&[5.0, 4.0, 3.0]);
        m.factor_and_solve().unwrap();
        assert_relative_eq!(m.x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.x[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular() {
        let mut m = DenseMatrix::new(2);
        m.add(0, 0, 1.0);
        m.add(0, 1, 1.0);
        m.add(1, 0, 1.0);
        m.add(1, 1, 1.0);
        assert!(matches!(m.factor(), Err(NetlistError::SingularMatrix { .. })));
    }

    #[test]
    fn test_clear_keeps_size() {
        let mut m = DenseMatrix::new(3);
        m.add(1, 1, 4.0);
        m.add_rhs(2, 1.0);
        m.clear();
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.rhs[2], 0.0);
        assert_eq!(m.size, 3);
    }

    /// Diagonally dominant, like every nodal conductance matrix.
    fn dominant() -> DenseMatrix {
        let mut m = DenseMatrix::new(3);
        let a = [[4.0, -1.0, -1.0], [-1.0, 5.0, -2.0], [-1.0, -2.0, 6.0]];
        for (i, row) in a.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                m.add(i, j, v);
            }
        }
        // x = (1, 2, 3)
        m.rhs.copy_from_slice(&[-1.0, 3.0, 13.0]);
        m
    }

    #[test]
    fn test_gmres_matches_lu() {
        let mut m = dominant();
        let steps = m.solve_gmres(10, 1e-12).unwrap();
        assert!(steps <= 3);
        assert_relative_eq!(m.x[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(m.x[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(m.x[2], 3.0, epsilon = 1e-9);

        // a solved system needs no steps
        assert_eq!(m.solve_gmres(10, 1e-9), Some(0));
    }

    #[test]
    fn test_sor_converges_or_gives_up() {
        let mut m = dominant();
        assert!(m.solve_sor(1.0, 2, 1e-12).is_none());
        let sweeps = m.solve_sor(1.0, 200, 1e-12).unwrap();
        assert!(sweeps > 1);
        assert_relative_eq!(m.x[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(m.x[2], 3.0, epsilon = 1e-9);

        // zero on the diagonal is left to LU
        let mut m = DenseMatrix::new(2);
        m.add(0, 1, 1.0);
        m.add(1, 0, 1.0);
        assert!(m.solve_sor(1.0, 10, 1e-9).is_none());
        assert!(m.solve_gmres(10, 1e-9).is_none());
    }
}
