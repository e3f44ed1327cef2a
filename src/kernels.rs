use crate::math::{T, TV};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Distances at or below this threshold are treated as the singular origin:
/// both the value and the gradient evaluate to zero there.
pub const EPSILON: T = 1e-16;

/// An SPH interpolation kernel with compact support `2h`, where `h` is the
/// smoothing length.
///
/// Both the value and the gradient must be exactly zero outside the support
/// and at the singular origin.
pub trait SmoothingKernel {
    fn value<const D: usize>(r: TV<D>, h: T) -> T;

    /// Gradient of the kernel with respect to `r`, directed along `r`.
    fn gradient<const D: usize>(r: TV<D>, h: T) -> TV<D>;
}

/// The cubic B-spline kernel.
pub struct CubicSplineKernel;

fn cubic_normalization(dim: usize) -> T {
    match dim {
        1 => 1.,
        2 => 15. / (7. * PI),
        3 => 3. / (2. * PI),
        _ => 0.,
    }
}

impl SmoothingKernel for CubicSplineKernel {
    fn value<const D: usize>(r: TV<D>, h: T) -> T {
        let r_norm = r.norm();
        let q = r_norm / h;
        if r_norm <= EPSILON || q > 2. {
            return 0.;
        }

        let k = cubic_normalization(D) / h.powi(D as i32);
        if q <= 1. {
            let q2 = q * q;
            k * (0.5 * q2 * q - q2 + 2. / 3.)
        } else {
            let factor = 2. - q;
            k / 6. * factor * factor * factor
        }
    }

    fn gradient<const D: usize>(r: TV<D>, h: T) -> TV<D> {
        let r_norm = r.norm();
        let q = r_norm / h;
        if r_norm <= EPSILON || q > 2. {
            return TV::zeros();
        }

        let k = cubic_normalization(D) / h.powi(D as i32);
        let grad_q = r / (r_norm * h);
        if q <= 1. {
            k * q * (1.5 * q - 2.) * grad_q
        } else {
            let factor = 2. - q;
            k * (-0.5 * factor * factor) * grad_q
        }
    }
}

/// The Wendland C2 kernel.
pub struct WendlandC2Kernel;

fn wendland_normalization(dim: usize) -> T {
    match dim {
        2 => 7. / (4. * PI),
        3 => 21. / (2. * PI),
        _ => 0.,
    }
}

impl SmoothingKernel for WendlandC2Kernel {
    fn value<const D: usize>(r: TV<D>, h: T) -> T {
        let r_norm = r.norm();
        let q = r_norm / h;
        if r_norm <= EPSILON || q > 2. {
            return 0.;
        }

        let k = wendland_normalization(D) / h.powi(D as i32);
        let q1 = 1. - 0.5 * q;
        k * q1.powi(4) * (1. + 2. * q)
    }

    fn gradient<const D: usize>(r: TV<D>, h: T) -> TV<D> {
        let r_norm = r.norm();
        let q = r_norm / h;
        if r_norm <= EPSILON || q > 2. {
            return TV::zeros();
        }

        let k = wendland_normalization(D) / h.powi(D as i32);
        let q1 = 1. - 0.5 * q;
        k * q1.powi(3) * (-5. * q) / h * r / r_norm
    }
}

/// Run-time kernel selection, fixed at solver construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelType {
    CubicSpline,
    WendlandC2,
}

impl KernelType {
    pub fn id(self) -> i32 {
        match self {
            KernelType::CubicSpline => 1,
            KernelType::WendlandC2 => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<KernelType> {
        match id {
            1 => Some(KernelType::CubicSpline),
            2 => Some(KernelType::WendlandC2),
            _ => None,
        }
    }

    pub fn value<const D: usize>(self, r: TV<D>, h: T) -> T {
        match self {
            KernelType::CubicSpline => CubicSplineKernel::value(r, h),
            KernelType::WendlandC2 => WendlandC2Kernel::value(r, h),
        }
    }

    pub fn gradient<const D: usize>(self, r: TV<D>, h: T) -> TV<D> {
        match self {
            KernelType::CubicSpline => CubicSplineKernel::gradient(r, h),
            KernelType::WendlandC2 => WendlandC2Kernel::gradient(r, h),
        }
    }
}
