//! Dense linear algebra for small regression systems
//!
//! Fixed-size arrays through const generics: the calibration model has a
//! handful of features, so the normal equations fit on the stack and no
//! matrix crate is needed.

/// Square matrix type
pub type SquareMatrix<const N: usize> = [[f64; N]; N];

/// Vector type
pub type Vector<const N: usize> = [f64; N];

/// Cholesky decomposition: A = L × Lᵀ
///
/// ## Algorithm
///
/// For each element:
/// - Diagonal: L[j,j] = sqrt(A[j,j] - Σ(L[j,k]²))
/// - Below diagonal: L[i,j] = (A[i,j] - Σ(L[i,k]×L[j,k])) / L[j,j]
///
/// Returns `None` if the matrix is not positive definite
pub fn cholesky<const N: usize>(a: &SquareMatrix<N>) -> Option<SquareMatrix<N>> {
    let mut l = [[0.0; N]; N];

    for j in 0..N {
        let sum: f64 = (0..j).map(|k| l[j][k] * l[j][k]).sum();
        let diag = a[j][j] - sum;
        if !diag.is_finite() || diag <= 0.0 {
            return None;
        }
        l[j][j] = diag.sqrt();

        for i in (j + 1)..N {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            l[i][j] = (a[i][j] - sum) / l[j][j];
        }
    }

    Some(l)
}

/// Solve L×Lᵀ×x = b given the Cholesky factor L
///
/// Forward substitution for L×y = b, then back substitution for Lᵀ×x = y
pub fn solve_cholesky<const N: usize>(l: &SquareMatrix<N>, b: &Vector<N>) -> Vector<N> {
    let mut y = [0.0; N];
    for i in 0..N {
        let sum: f64 = (0..i).map(|j| l[i][j] * y[j]).sum();
        y[i] = (b[i] - sum) / l[i][i];
    }

    let mut x = [0.0; N];
    for i in (0..N).rev() {
        let sum: f64 = ((i + 1)..N).map(|j| l[j][i] * x[j]).sum();
        x[i] = (y[i] - sum) / l[i][i];
    }
    x
}

/// Solve a symmetric positive definite system A×x = b
pub fn solve_spd<const N: usize>(a: &SquareMatrix<N>, b: &Vector<N>) -> Option<Vector<N>> {
    let l = cholesky(a)?;
    let x = solve_cholesky(&l, b);
    x.iter().all(|v| v.is_finite()).then_some(x)
}
