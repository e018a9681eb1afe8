/// Computes the control points of a quadratic B-spline that interpolates a
/// sequence of scalar values at integer parameter positions.
///
/// For `n` values the result has `n + 2` control points. Interior rows of the
/// system are `0.125*cp[i-1] + 0.75*cp[i] + 0.125*cp[i+1] = value[i-1]`; the first
/// and last rows pin the end control points to their neighbours.
#[derive(Debug, Clone, Default)]
pub struct QuadraticSplineFitter {
    points: Vec<f64>,
}

impl QuadraticSplineFitter {
    pub fn new(points: Vec<f64>) -> Self {
        Self { points }
    }

    pub fn set_points(&mut self, points: Vec<f64>) {
        self.points = points;
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Solves the tridiagonal interpolation system by forward elimination and
    /// back substitution, linear in the number of points.
    ///
    /// An empty input gives a singular system; it yields two zero control points.
    pub fn compute_control_points(&self) -> Vec<f64> {
        let n = self.points.len() + 2;
        let mut sub = vec![0.125; n];
        let mut diag = vec![0.75; n];
        let mut sup = vec![0.125; n];
        let mut rhs = vec![0.0; n];
        rhs[1..n - 1].copy_from_slice(&self.points);

        // Endpoint rows: cp[1] - cp[0] = 0 and cp[n-1] - cp[n-2] = 0
        sub[0] = 0.0;
        diag[0] = -1.0;
        sup[0] = 1.0;
        sub[n - 1] = -1.0;
        diag[n - 1] = 1.0;
        sup[n - 1] = 0.0;

        match solve_tridiagonal(&sub, &diag, &sup, &rhs) {
            Some(x) => x,
            None => vec![0.0; n],
        }
    }
}

/// Thomas algorithm. Returns `None` when a pivot vanishes.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];

    let mut pivot = diag[0];
    if pivot.abs() < 1e-12 {
        return None;
    }
    c[0] = sup[0] / pivot;
    d[0] = rhs[0] / pivot;
    for i in 1..n {
        pivot = diag[i] - sub[i] * c[i - 1];
        if pivot.abs() < 1e-12 {
            return None;
        }
        c[i] = sup[i] / pivot;
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / pivot;
    }

    let mut x = d;
    for i in (0..n - 1).rev() {
        x[i] -= c[i] * x[i + 1];
    }
    Some(x)
}
