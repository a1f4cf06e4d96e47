//! Gaussian smoothing
//!
//! Separable Gaussian blur over 2-D grids. The kernel is described by its size
//! alone; sigma is derived from it with the usual `0.3 * ((k - 1) / 2 - 1) + 0.8`
//! rule, and small kernels use the fixed binomial tables. Borders are reflected
//! without repeating the edge cell (`dcb|abcd|cba`).

use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis, Zip};

/// Fixed weights for kernel sizes 1, 3, 5 and 7
const SMALL_KERNELS: [&[f64]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25,
    ],
];

/// Largest supported kernel size
pub const MAX_KERNEL_SIZE: usize = 1001;

/// Round a kernel size up to the next odd value (`0` becomes `1`), capped at
/// [`MAX_KERNEL_SIZE`]
pub fn coerce_kernel_size(size: usize) -> usize {
    let size = size.min(MAX_KERNEL_SIZE);
    if size % 2 == 1 {
        size
    } else {
        size + 1
    }
}

/// Normalized 1-D Gaussian kernel
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f64>,
    sigma: f64,
}

impl GaussianKernel {
    /// Kernel for `size`, coerced to odd
    pub fn new(size: usize) -> Self {
        let size = coerce_kernel_size(size);
        let sigma = sigma_for_size(size);

        let weights = match SMALL_KERNELS.get(size / 2) {
            Some(table) => table.to_vec(),
            None => {
                let center = (size / 2) as f64;
                let raw: Vec<f64> = (0..size)
                    .map(|i| {
                        let d = i as f64 - center;
                        (-(d * d) / (2.0 * sigma * sigma)).exp()
                    })
                    .collect();
                let total: f64 = raw.iter().sum();
                raw.into_iter().map(|w| w / total).collect()
            }
        };

        Self { weights, sigma }
    }

    pub fn size(&self) -> usize {
        self.weights.len()
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    /// Convolve one line into `out`
    fn convolve_line(&self, line: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
        let len = line.len();
        let radius = self.radius() as isize;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self
                .weights
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let offset = i as isize + k as isize - radius;
                    w * line[reflect_101(offset, len)]
                })
                .sum();
        }
    }
}

/// Blur `grid` with a square Gaussian kernel of `kernel_size` (coerced to odd)
pub fn gaussian_blur(grid: &Array2<f64>, kernel_size: usize) -> Array2<f64> {
    let kernel = GaussianKernel::new(kernel_size);
    if kernel.size() == 1 || grid.is_empty() {
        return grid.clone();
    }

    let mut horizontal = Array2::zeros(grid.dim());
    Zip::from(grid.lanes(Axis(1)))
        .and(horizontal.lanes_mut(Axis(1)))
        .for_each(|src, dst| kernel.convolve_line(src, dst));

    let mut blurred = Array2::zeros(grid.dim());
    Zip::from(horizontal.lanes(Axis(0)))
        .and(blurred.lanes_mut(Axis(0)))
        .for_each(|src, dst| kernel.convolve_line(src, dst));

    blurred
}

fn sigma_for_size(size: usize) -> f64 {
    0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Map an out-of-range index back into `0..len` by mirroring about the edge cells
fn reflect_101(mut index: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    while index < 0 || index >= len {
        index = if index < 0 {
            -index
        } else {
            2 * (len - 1) - index
        };
    }
    index as usize
}
