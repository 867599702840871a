//! Dense symmetric solver for the normal equations of the model fit
//!
//! Team-strength designs are routinely rank deficient (a team seen only at
//! home, a history where one side never appears as an opponent), so the
//! solve goes through a pseudo-inverse built from a Jacobi eigendecomposition
//! and returns the minimum-norm solution.

/// Square matrix stored row-major
pub type Matrix = Vec<Vec<f64>>;

const MAX_SWEEPS: usize = 100;

/// Eigenvalues are dropped below `largest * RANK_TOLERANCE`
pub const RANK_TOLERANCE: f64 = 1e-12;

/// Eigendecomposition of a symmetric matrix
///
/// Returns the eigenvalues and a matrix whose column `k` is the eigenvector
/// for eigenvalue `k`.
pub fn symmetric_eigen(a: &Matrix) -> (Vec<f64>, Matrix) {
    let n = a.len();
    let mut a = a.clone();
    let mut v = identity(n);

    let scale: f64 = a.iter().flatten().map(|x| x * x).sum();
    let threshold = scale * f64::EPSILON * f64::EPSILON;

    for _ in 0..MAX_SWEEPS {
        let off_diagonal: f64 = (0..n)
            .flat_map(|p| (0..n).filter(move |&q| q != p).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off_diagonal <= threshold {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q] == 0.0 {
                    continue;
                }
                rotate(&mut a, &mut v, p, q);
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

/// One Jacobi rotation zeroing `a[p][q]`
fn rotate(a: &mut Matrix, v: &mut Matrix, p: usize, q: usize) {
    let n = a.len();
    let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    for k in 0..n {
        let (akp, akq) = (a[k][p], a[k][q]);
        a[k][p] = c * akp - s * akq;
        a[k][q] = s * akp + c * akq;
    }
    for k in 0..n {
        let (apk, aqk) = (a[p][k], a[q][k]);
        a[p][k] = c * apk - s * aqk;
        a[q][k] = s * apk + c * aqk;
    }
    for row in v.iter_mut() {
        let (vkp, vkq) = (row[p], row[q]);
        row[p] = c * vkp - s * vkq;
        row[q] = s * vkp + c * vkq;
    }
}

/// Minimum-norm solution of `a x = b` for symmetric positive semi-definite `a`
///
/// Returns the solution and the numerical rank of `a`.
pub fn solve_symmetric(a: &Matrix, b: &[f64]) -> (Vec<f64>, usize) {
    let n = b.len();
    let (eigenvalues, vectors) = symmetric_eigen(a);

    let largest = eigenvalues.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    let cutoff = largest * RANK_TOLERANCE;

    let mut x = vec![0.0; n];
    let mut rank = 0;
    for (k, &lambda) in eigenvalues.iter().enumerate() {
        if largest == 0.0 || lambda.abs() <= cutoff {
            continue;
        }
        rank += 1;
        let projection: f64 = (0..n).map(|i| vectors[i][k] * b[i]).sum();
        let weight = projection / lambda;
        for (i, xi) in x.iter_mut().enumerate() {
            *xi += weight * vectors[i][k];
        }
    }

    (x, rank)
}

/// Eigenvectors of symmetric `a` whose eigenvalue is at most `largest * tolerance`
pub fn null_space(a: &Matrix, tolerance: f64) -> Vec<Vec<f64>> {
    let n = a.len();
    let (eigenvalues, vectors) = symmetric_eigen(a);
    let largest = eigenvalues.iter().fold(0.0_f64, |m, x| m.max(x.abs()));

    eigenvalues
        .iter()
        .enumerate()
        .filter(|(_, lambda)| lambda.abs() <= largest * tolerance)
        .map(|(k, _)| (0..n).map(|i| vectors[i][k]).collect())
        .collect()
}

/// Length of the projection of `row` onto the orthonormal `basis`, relative to `|row|`
pub fn projection_share(basis: &[Vec<f64>], row: &[f64]) -> f64 {
    let norm = row.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return 0.0;
    }
    let projected: f64 = basis
        .iter()
        .map(|v| v.iter().zip(row).map(|(a, b)| a * b).sum::<f64>().powi(2))
        .sum();
    projected.sqrt() / norm
}

fn identity(n: usize) -> Matrix {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}
