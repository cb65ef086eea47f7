use crate::{error::CalibrationError, message::CameraInfo};
use nalgebra::Matrix3;

/// Pinhole intrinsics of the color camera.
///
/// The matrix has the form
///
/// ```text
/// | fx  0 cx |
/// |  0 fy cy |
/// |  0  0  1 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    matrix: Matrix3<f64>,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, CalibrationError> {
        if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
            return Err(CalibrationError::InvalidFocalLength { fx, fy });
        }
        if !(cx.is_finite() && cy.is_finite()) {
            return Err(CalibrationError::InvalidPrincipalPoint { cx, cy });
        }

        #[rustfmt::skip]
        let matrix = Matrix3::new(
            fx, 0.0, cx,
            0.0, fy, cy,
            0.0, 0.0, 1.0,
        );
        Ok(Self { matrix })
    }

    /// Extract the intrinsics of a calibration record.
    ///
    /// Reads `K`. A zero-filled `K` marks an uncalibrated driver, in
    /// which case the left 3x3 block of the projection matrix `P` is
    /// used.
    pub fn from_camera_info(info: &CameraInfo) -> Result<Self, CalibrationError> {
        check_len("K", &info.k, 9)?;

        let (fx, fy, cx, cy) = if is_zero(&info.k) {
            check_len("P", &info.p, 12)?;
            if is_zero(&info.p) {
                return Err(CalibrationError::Uncalibrated);
            }
            let p = &info.p;
            (p[0], p[5], p[2], p[6])
        } else {
            let k = &info.k;
            (k[0], k[4], k[2], k[5])
        };

        Self::new(fx, fy, cx, cy)
    }

    pub fn fx(&self) -> f64 {
        self.matrix[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.matrix[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.matrix[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.matrix[(1, 2)]
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }
}

fn check_len(field: &'static str, values: &[f64], expected: usize) -> Result<(), CalibrationError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(CalibrationError::MissingField {
            field,
            expected,
            actual: values.len(),
        })
    }
}

fn is_zero(values: &[f64]) -> bool {
    values.iter().all(|&v| v == 0.0)
}
