//! Fourth-order elasticity tensors acting on vectorized 3x3 tensors.
use cpmor_traits::Real;
use nalgebra::{Matrix3, SMatrix, SVector};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LameParameters<T> {
    pub mu: T,
    pub lambda: T,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoungPoisson<T> {
    pub young: T,
    pub poisson: T,
}

impl<T: Real> From<YoungPoisson<T>> for LameParameters<T> {
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn from(params: YoungPoisson<T>) -> Self {
        let YoungPoisson { young, poisson } = params;
        let mu = 0.5 * young / (1.0 + poisson);
        let lambda = 2.0 * mu * poisson / (1.0 - 2.0 * poisson);
        Self { mu, lambda }
    }
}

/// Column-major index of entry $(i, j)$ of a 3x3 tensor in its vectorized form.
fn vec_index(i: usize, j: usize) -> usize {
    i + 3 * j
}

/// A fourth-order elasticity tensor $\mathbb{C}$.
///
/// The tensor is stored as the 9x9 matrix mapping $\operatorname{vec}(E)$ to
/// $\operatorname{vec}(\mathbb{C} : E)$, where $\operatorname{vec}$ stacks the columns of a
/// 3x3 tensor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ElasticityTensor<T: Real> {
    matrix: SMatrix<T, 9, 9>,
}

impl<T: Real> ElasticityTensor<T> {
    pub fn from_matrix(matrix: SMatrix<T, 9, 9>) -> Self {
        Self { matrix }
    }

    /// Elasticity tensor of a material with cubic symmetry, aligned with the coordinate axes.
    ///
    /// $$
    /// \mathbb{C}_{ijkl} = c_{12} \delta_{ij} \delta_{kl}
    ///   + c_{44} (\delta_{ik} \delta_{jl} + \delta_{il} \delta_{jk})
    ///   + (c_{11} - c_{12} - 2 c_{44}) \delta_{ijkl}
    /// $$
    pub fn cubic(c11: T, c12: T, c44: T) -> Self {
        let delta = |a: usize, b: usize| if a == b { T::one() } else { T::zero() };
        let anisotropy = c11 - c12 - (c44 + c44);
        let mut matrix = SMatrix::<T, 9, 9>::zeros();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    for l in 0..3 {
                        let all_equal = if i == j && j == k && k == l { T::one() } else { T::zero() };
                        matrix[(vec_index(i, j), vec_index(k, l))] = c12 * delta(i, j) * delta(k, l)
                            + c44 * (delta(i, k) * delta(j, l) + delta(i, l) * delta(j, k))
                            + anisotropy * all_equal;
                    }
                }
            }
        }
        Self { matrix }
    }

    /// Isotropic elasticity tensor $\lambda \, I \otimes I + 2 \mu \, \mathbb{I}^{sym}$.
    pub fn isotropic(lame: LameParameters<T>) -> Self {
        let LameParameters { mu, lambda } = lame;
        Self::cubic(lambda + mu + mu, lambda, mu)
    }

    /// Rotates the tensor into the frame given by the rotation matrix `rotation`, i.e.
    /// $\mathbb{C}'_{ijkl} = R_{ia} R_{jb} R_{kc} R_{ld} \mathbb{C}_{abcd}$.
    pub fn rotated(&self, rotation: &Matrix3<T>) -> Self {
        // vec(R E R^T) = (R ⊗ R) vec(E)
        let q: SMatrix<T, 9, 9> = rotation.kronecker(rotation);
        Self {
            matrix: q * self.matrix * q.transpose(),
        }
    }

    pub fn as_matrix(&self) -> &SMatrix<T, 9, 9> {
        &self.matrix
    }

    /// Computes the double contraction $\mathbb{C} : E$.
    pub fn contract(&self, strain: &Matrix3<T>) -> Matrix3<T> {
        let e = SVector::<T, 9>::from_column_slice(strain.as_slice());
        let s = self.matrix * e;
        Matrix3::from_column_slice(s.as_slice())
    }
}
