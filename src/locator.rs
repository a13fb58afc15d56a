// src/locator.rs

use std::fmt;

use nalgebra as na;
use na::{DMatrix, DVector, Matrix2, Vector2};

use crate::algebra::{norm, norm_sq, sgn};

// Distances inside the nonlinear residual carry a small epsilon so the
// square root stays differentiable at a receiver position.
const DISTANCE_EPSILON: f64 = 1e-8;
const MAX_ITERATIONS: usize = 100;
const STEP_TOLERANCE: f64 = 1e-12;

// --- Data structures ---

/// A receiver with a known position and an observed time of arrival.
///
/// Benchmarks express TOAs in distance units, so timestamps and
/// positions share one coordinate scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Receiver {
    pub x: f64,
    pub y: f64,
    pub timestamp: f64,
}

impl Receiver {
    pub fn new(x: f64, y: f64, timestamp: f64) -> Self {
        Self { x, y, timestamp }
    }

    /// Receiver at a known position with no observation yet.
    pub fn at(x: f64, y: f64) -> Self {
        Self { x, y, timestamp: 0.0 }
    }
}

/// Result type for localization routines.
pub type LocateResult<T> = Result<T, LocateError>;

/// Errors that can occur while solving for an emitter position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateError {
    /// Fewer receivers than the selected method supports.
    NotEnoughReceivers { needed: usize, got: usize },

    /// The hyperbola intersection has no real solution.
    NoRealSolution,

    /// The receiver geometry does not admit a solvable system.
    DegenerateGeometry,
}

impl fmt::Display for LocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnoughReceivers { needed, got } => {
                write!(f, "not enough receivers: need {needed}, got {got}")
            }
            Self::NoRealSolution => write!(f, "no real solution exists for the position"),
            Self::DegenerateGeometry => {
                write!(f, "receiver geometry yields an unsolvable system")
            }
        }
    }
}

impl std::error::Error for LocateError {}

/// Computes an initial emitter position estimate.
///
/// For more than three receivers the least-squares linearization is
/// used; with exactly three the closed-form solution applies.
///
/// # Arguments
/// * `receivers` - Receiver positions with observed TOAs.
///
/// # Returns
/// The estimated emitter position.
pub fn initial_guess(receivers: &[Receiver]) -> LocateResult<Vector2<f64>> {
    if receivers.len() > 3 {
        linear_tdoa(receivers)
    } else {
        exact_tdoa(receivers, true)
    }
}

/// Closed-form TDOA solution for three receivers.
///
/// The frame is rotated so receiver 0 sits at the origin and receiver
/// 1 lies on the x-axis, which reduces the hyperbola intersection to a
/// quadratic. Both arms are mapped back to absolute coordinates and
/// the one whose reconstructed range difference matches the sign of
/// the observed TDOA is kept.
///
/// # Arguments
/// * `receivers` - At least three receivers; only the first three are used.
/// * `get_positive` - Which arm to prefer when both are sign-consistent.
///
/// # Returns
/// The emitter position, or `NoRealSolution` when the discriminant is
/// negative.
pub fn exact_tdoa(receivers: &[Receiver], get_positive: bool) -> LocateResult<Vector2<f64>> {
    if receivers.len() < 3 {
        return Err(LocateError::NotEnoughReceivers {
            needed: 3,
            got: receivers.len(),
        });
    }

    let s0 = Vector2::new(receivers[0].x, receivers[0].y);
    let s1 = Vector2::new(receivers[1].x, receivers[1].y);
    let s2 = Vector2::new(receivers[2].x, receivers[2].y);

    // Rotate the frame so the baseline s0->s1 becomes the x-axis
    let theta = (receivers[1].y - receivers[0].y).atan2(receivers[1].x - receivers[0].x);
    let rot = Matrix2::new(theta.cos(), -theta.sin(), theta.sin(), theta.cos());

    let s1r = rot.transpose() * (s1 - s0);
    let s2r = rot.transpose() * (s2 - s0);

    let b = s1r[0];
    let cx = s2r[0];
    let cy = s2r[1];
    let c = norm(cx, cy);

    let tau_01 = receivers[0].timestamp - receivers[1].timestamp;
    let tau_02 = receivers[0].timestamp - receivers[2].timestamp;

    let g = ((tau_02 / tau_01) * b - cx) / cy;
    let h = (c.powi(2) - tau_02.powi(2) + tau_01 * tau_02 * (1.0 - (b / tau_01).powi(2)))
        / (2.0 * cy);

    // Terms of the quadratic equation in the rotated frame
    let d = -(1.0 + g.powi(2) - (b / tau_01).powi(2));
    let e = b * (1.0 - (b / tau_01).powi(2)) - 2.0 * g * h;
    let f = tau_01.powi(2) / 4.0 * (1.0 - (b / tau_01).powi(2)).powi(2) - h.powi(2);

    let discriminant = e.powi(2) - 4.0 * d * f;
    if discriminant < 0.0 {
        return Err(LocateError::NoRealSolution);
    }

    let xp = (-e + discriminant.sqrt()) / (2.0 * d);
    let yp = g * xp + h;
    let xm = (-e - discriminant.sqrt()) / (2.0 * d);
    let ym = g * xm + h;

    let mut res = Vector2::zeros();

    // Positive arm, back in absolute coordinates
    let rp = rot * Vector2::new(xp, yp) + s0;
    let rpn = norm(rp[0] - s0[0], rp[1] - s0[1]) - norm(rp[0] - s1[0], rp[1] - s1[1]);

    // The reconstructed range difference must match the observed tdoa sign
    let mut multiple = false;
    if sgn(rpn) == sgn(tau_01) {
        res = rp;
        multiple = true;
    }

    // Negative arm
    let rm = rot * Vector2::new(xm, ym) + s0;
    let rmn = norm(rm[0] - s0[0], rm[1] - s0[1]) - norm(rm[0] - s1[0], rm[1] - s1[1]);

    if sgn(rmn) == sgn(tau_01) {
        if multiple {
            eprintln!("Warning: multiple solutions exist!");
            if get_positive {
                eprintln!("Positive arm will be returned");
                return Ok(res);
            }
            eprintln!("Negative arm will be returned");
        }
        res = rm;
    }

    Ok(res)
}

/// Least-squares TDOA linearization for four or more receivers.
///
/// Builds the (r-1) x 3 system in the unknowns (emission time, x, y)
/// relative to receiver 0. The square system of exactly four receivers
/// is solved with column-pivoted QR, larger ones with SVD.
pub fn linear_tdoa(receivers: &[Receiver]) -> LocateResult<Vector2<f64>> {
    if receivers.len() < 4 {
        return Err(LocateError::NotEnoughReceivers {
            needed: 4,
            got: receivers.len(),
        });
    }

    let rows = receivers.len() - 1;
    let mut a = DMatrix::zeros(rows, 3);
    let mut b = DVector::zeros(rows);

    for i in 0..rows {
        let tau = receivers[0].timestamp - receivers[i + 1].timestamp;
        a[(i, 0)] = -tau;
        a[(i, 1)] = receivers[0].x - receivers[i + 1].x;
        a[(i, 2)] = receivers[0].y - receivers[i + 1].y;

        b[i] = 0.5
            * (tau.powi(2) + norm_sq(receivers[0].x, receivers[0].y)
                - norm_sq(receivers[i + 1].x, receivers[i + 1].y));
    }

    let r = if receivers.len() == 4 {
        a.col_piv_qr()
            .solve(&b)
            .ok_or(LocateError::DegenerateGeometry)?
    } else {
        a.svd(true, true)
            .solve(&b, STEP_TOLERANCE)
            .map_err(|_| LocateError::DegenerateGeometry)?
    };

    Ok(Vector2::new(r[1], r[2]))
}

/// TDOA residual of one receiver pair at the candidate position (x, y).
pub fn pair_residual(r1: &Receiver, r2: &Receiver, x: f64, y: f64) -> f64 {
    let d1 = (norm_sq(r1.x - x, r1.y - y) + DISTANCE_EPSILON).sqrt();
    let d2 = (norm_sq(r2.x - x, r2.y - y) + DISTANCE_EPSILON).sqrt();
    (r1.timestamp - r2.timestamp) - (d1 - d2)
}

fn residual_cost(receivers: &[Receiver], pos: &Vector2<f64>) -> f64 {
    let mut cost = 0.0;
    for i in 0..receivers.len() - 1 {
        for j in i + 1..receivers.len() {
            let r = pair_residual(&receivers[i], &receivers[j], pos[0], pos[1]);
            cost += r * r;
        }
    }
    cost
}

/// Refines an emitter estimate by nonlinear least squares.
///
/// Minimizes the sum of squared pairwise TDOA residuals with a damped
/// Gauss-Newton iteration. The damping factor shrinks on accepted
/// steps and grows on rejected ones, so the loop falls back to small
/// gradient-like steps far from the solution.
///
/// # Arguments
/// * `receivers` - Receiver positions with observed TOAs.
/// * `initial_guess` - Starting position for the iteration.
///
/// # Returns
/// The refined emitter position.
pub fn nonlinear_optimization(
    receivers: &[Receiver],
    initial_guess: Vector2<f64>,
) -> LocateResult<Vector2<f64>> {
    if receivers.len() < 3 {
        return Err(LocateError::NotEnoughReceivers {
            needed: 3,
            got: receivers.len(),
        });
    }

    let mut pos = initial_guess;
    let mut cost = residual_cost(receivers, &pos);
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        let mut jtj = Matrix2::zeros();
        let mut jtr = Vector2::zeros();

        for i in 0..receivers.len() - 1 {
            for j in i + 1..receivers.len() {
                let r1 = &receivers[i];
                let r2 = &receivers[j];
                let d1 = (norm_sq(r1.x - pos[0], r1.y - pos[1]) + DISTANCE_EPSILON).sqrt();
                let d2 = (norm_sq(r2.x - pos[0], r2.y - pos[1]) + DISTANCE_EPSILON).sqrt();
                let residual = (r1.timestamp - r2.timestamp) - (d1 - d2);

                let jac = Vector2::new(
                    (pos[0] - r2.x) / d2 - (pos[0] - r1.x) / d1,
                    (pos[1] - r2.y) / d2 - (pos[1] - r1.y) / d1,
                );

                jtj += jac * jac.transpose();
                jtr += jac * residual;
            }
        }

        let damped = jtj + Matrix2::identity() * lambda;
        let step = damped
            .lu()
            .solve(&(-jtr))
            .ok_or(LocateError::DegenerateGeometry)?;
        let candidate = pos + step;
        let candidate_cost = residual_cost(receivers, &candidate);

        if candidate_cost < cost {
            pos = candidate;
            cost = candidate_cost;
            lambda = (lambda * 0.5).max(1e-12);
            if step.norm() < STEP_TOLERANCE {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    Ok(pos)
}
