use std::f64::consts::PI;
use ndarray::{Array1, Array2, ArrayD, IxDyn, s};
use num_complex::Complex64;
use tracing::debug;
use crate::error::PtxResult;
use super::{ExcitationModel, ForwardOperator};

/// Dense system matrix of shape (pixels, coils*samples). Column c*samples + t holds coil c at
/// sample t, matching the row-major flattening of a (coils, samples) waveform. Off-resonance is
/// modeled exactly per sample.
pub struct ExplicitOperator {
    image_shape:Vec<usize>,
    n_coils:usize,
    n_samples:usize,
    matrix:Array2<Complex64>,
}

impl ExplicitOperator {
    pub fn new(model:&ExcitationModel) -> Self {
        let n_pixels = model.n_pixels();
        let n_coils = model.n_coils();
        let n_samples = model.n_samples();
        debug!(n_pixels,n_coils,n_samples,"building explicit system matrix");

        let offsets = model.pixel_offsets();
        let b0 = model.flat_b0();
        let times:Array1<f64> = (0..n_samples).map(|t| model.sample_time(t as f64)).collect();
        // spatial and off-resonance phase shared by every coil (pixels x samples)
        let encoding = Array2::from_shape_fn((n_pixels,n_samples),|(p,t)|{
            let mut cycles:f64 = offsets.row(p).iter().zip(model.trajectory.row(t).iter()).map(|(o,k)| o*k).sum();
            if let Some(b0) = &b0 {
                cycles += b0[p]*times[t];
            }
            Complex64::from_polar(1.0,-2.0*PI*cycles)
        });

        let gain = model.gain();
        let sens = model.flat_sensitivities();
        let mut matrix = Array2::<Complex64>::zeros((n_pixels,n_coils*n_samples));
        for c in 0..n_coils {
            let mut block = matrix.slice_mut(s![..,c*n_samples..(c+1)*n_samples]);
            for (p,mut row) in block.outer_iter_mut().enumerate() {
                let weight = sens[[c,p]]*gain;
                row.iter_mut().zip(encoding.row(p).iter()).for_each(|(a,e)| *a = weight*e);
            }
        }

        Self {
            image_shape:model.image_shape().to_vec(),
            n_coils,
            n_samples,
            matrix
        }
    }

}

impl ForwardOperator for ExplicitOperator {
    fn image_shape(&self) -> &[usize] {
        &self.image_shape
    }

    fn n_coils(&self) -> usize {
        self.n_coils
    }

    fn n_samples(&self) -> usize {
        self.n_samples
    }

    fn apply(&self,waveform:&Array2<Complex64>) -> PtxResult<ArrayD<Complex64>> {
        self.check_waveform(waveform)?;
        let w:Array1<Complex64> = waveform.iter().cloned().collect();
        let pattern = self.matrix.dot(&w);
        Ok(pattern.into_shape(IxDyn(&self.image_shape))?)
    }

    fn apply_adjoint(&self,pattern:&ArrayD<Complex64>) -> PtxResult<Array2<Complex64>> {
        self.check_pattern(pattern)?;
        // A^H p = conj(A^T conj(p)), avoids materializing the conjugate transpose
        let p:Array1<Complex64> = pattern.iter().map(|v| v.conj()).collect();
        let w = self.matrix.t().dot(&p).mapv(|v| v.conj());
        Ok(w.into_shape((self.n_coils,self.n_samples))?)
    }
}
