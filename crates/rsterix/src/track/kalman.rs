/**
 * Six-state Kalman filter with a constant-acceleration motion model.
 *
 * State vector `[px, py, vx, vy, ax, ay]` in station-Cartesian metres,
 * metres/second and metres/second². Only the position is observed; the
 * measurement noise is divided by the sensor-fusion weight so that
 * higher-confidence sensors pull the estimate harder.
 */
use nalgebra::{Matrix2, Matrix2x6, Matrix6, Vector2, Vector6};

use crate::error::FilterDiverged;

#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState {
    pub x: Vector6<f64>,
    pub p: Matrix6<f64>,
}

/// Initial position uncertainty, m².
const INITIAL_VARIANCE: f64 = 1000.0;

impl KalmanState {
    pub fn new(px: f64, py: f64) -> Self {
        KalmanState {
            x: Vector6::new(px, py, 0.0, 0.0, 0.0, 0.0),
            p: Matrix6::identity() * INITIAL_VARIANCE,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x[0], self.x[1])
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.x[2], self.x[3])
    }

    pub fn acceleration(&self) -> (f64, f64) {
        (self.x[4], self.x[5])
    }

    /// Block-form transition matrix `[[I, ΔtI, ½Δt²I], [0, I, ΔtI], [0, 0, I]]`.
    #[rustfmt::skip]
    pub fn transition(dt: f64) -> Matrix6<f64> {
        let h = 0.5 * dt * dt;
        Matrix6::new(
            1.0, 0.0,  dt, 0.0,   h, 0.0,
            0.0, 1.0, 0.0,  dt, 0.0,   h,
            0.0, 0.0, 1.0, 0.0,  dt, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0,  dt,
            0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Discrete constant-acceleration process noise scaled by
    /// `process_noise_std²`, with `acceleration_noise_std²` added on the
    /// acceleration block.
    #[rustfmt::skip]
    pub fn process_noise(dt: f64, process_noise_std: f64, acceleration_noise_std: f64) -> Matrix6<f64> {
        let q11 = dt.powi(5) / 20.0;
        let q12 = dt.powi(4) / 8.0;
        let q13 = dt.powi(3) / 6.0;
        let q22 = dt.powi(3) / 3.0;
        let q23 = dt.powi(2) / 2.0;
        let q33 = dt;
        let mut q = Matrix6::new(
            q11, 0.0, q12, 0.0, q13, 0.0,
            0.0, q11, 0.0, q12, 0.0, q13,
            q12, 0.0, q22, 0.0, q23, 0.0,
            0.0, q12, 0.0, q22, 0.0, q23,
            q13, 0.0, q23, 0.0, q33, 0.0,
            0.0, q13, 0.0, q23, 0.0, q33,
        ) * process_noise_std.powi(2);
        let extra = acceleration_noise_std.powi(2);
        q[(4, 4)] += extra;
        q[(5, 5)] += extra;
        q
    }

    #[rustfmt::skip]
    fn measurement_matrix() -> Matrix2x6<f64> {
        Matrix2x6::new(
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
        )
    }

    /// Extrapolate state and covariance over `dt` without committing.
    pub fn predicted(
        &self,
        dt: f64,
        process_noise_std: f64,
        acceleration_noise_std: f64,
    ) -> (Vector6<f64>, Matrix6<f64>) {
        let f = Self::transition(dt);
        let q = Self::process_noise(dt, process_noise_std, acceleration_noise_std);
        (f * self.x, f * self.p * f.transpose() + q)
    }

    /// Squared Mahalanobis distance of a position measurement against a
    /// predicted state, using the innovation covariance `H P Hᵀ + R`.
    /// `None` when the innovation covariance cannot be inverted.
    pub fn mahalanobis2(
        x_pred: &Vector6<f64>,
        p_pred: &Matrix6<f64>,
        zx: f64,
        zy: f64,
        measurement_variance: f64,
    ) -> Option<f64> {
        let h = Self::measurement_matrix();
        let s = h * p_pred * h.transpose() + Matrix2::identity() * measurement_variance;
        let s_inv = s.try_inverse()?;
        let innovation = Vector2::new(zx, zy) - h * x_pred;
        let d2 = (innovation.transpose() * s_inv * innovation)[(0, 0)];
        d2.is_finite().then_some(d2)
    }

    /// Predict over `dt`, then fold in a position measurement with the
    /// given (fusion-weighted) measurement variance. Joseph form keeps the
    /// covariance symmetric positive-semidefinite.
    ///
    /// On an ill-conditioned innovation covariance the filter falls back
    /// to the predicted state and leaves the covariance unchanged.
    pub fn step(
        &mut self,
        dt: f64,
        zx: f64,
        zy: f64,
        measurement_variance: f64,
        process_noise_std: f64,
        acceleration_noise_std: f64,
    ) -> Result<(), FilterDiverged> {
        let (x_pred, p_pred) = self.predicted(dt, process_noise_std, acceleration_noise_std);
        let h = Self::measurement_matrix();
        let r = Matrix2::identity() * measurement_variance;
        let s = h * p_pred * h.transpose() + r;

        let Some(s_inv) = s.try_inverse().filter(|m| m.iter().all(|v| v.is_finite())) else {
            self.x = x_pred;
            return Err(FilterDiverged);
        };

        let k = p_pred * h.transpose() * s_inv;
        let innovation = Vector2::new(zx, zy) - h * x_pred;
        self.x = x_pred + k * innovation;

        let i_kh = Matrix6::identity() - k * h;
        let p = i_kh * p_pred * i_kh.transpose() + k * r * k.transpose();
        // numerical symmetrisation
        self.p = (p + p.transpose()) * 0.5;
        Ok(())
    }
}
