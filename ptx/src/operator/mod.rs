/*
    Small-tip excitation model. A stacked per-coil RF waveform b (coils x samples) maps to the
    excited pattern

        m(r) = gain * sum_c s_c(r) sum_t b_c(t) exp(-i2pi k(t).r) exp(-i2pi B0(r)(T - t))

    where r is the pixel offset from floor(N/2) along every axis, k is in cycles per pixel, T is
    the time of the last sample and gain = gamma*dt. Both variants expose the exact conjugate
    transpose of this map.
 */

pub mod explicit;
pub mod implicit;

use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD, Axis, IxDyn};
use num_complex::Complex64;
use crate::error::{PtxError, PtxResult};

pub use explicit::ExplicitOperator;
pub use implicit::ImplicitOperator;

pub trait ForwardOperator {
    fn image_shape(&self) -> &[usize];
    fn n_coils(&self) -> usize;
    fn n_samples(&self) -> usize;
    /// waveform (coils x samples) -> pattern (image shape)
    fn apply(&self,waveform:&Array2<Complex64>) -> PtxResult<ArrayD<Complex64>>;
    /// pattern (image shape) -> waveform (coils x samples)
    fn apply_adjoint(&self,pattern:&ArrayD<Complex64>) -> PtxResult<Array2<Complex64>>;

    fn waveform_shape(&self) -> [usize;2] {
        [self.n_coils(),self.n_samples()]
    }

    fn check_waveform(&self,waveform:&Array2<Complex64>) -> PtxResult<()> {
        if waveform.shape() != self.waveform_shape() {
            return Err(PtxError::shape_mismatch("waveform",&self.waveform_shape(),waveform.shape()))
        }
        Ok(())
    }

    fn check_pattern(&self,pattern:&ArrayD<Complex64>) -> PtxResult<()> {
        if pattern.shape() != self.image_shape() {
            return Err(PtxError::shape_mismatch("pattern",self.image_shape(),pattern.shape()))
        }
        Ok(())
    }
}

impl<T:ForwardOperator + ?Sized> ForwardOperator for &T {
    fn image_shape(&self) -> &[usize] {
        (**self).image_shape()
    }
    fn n_coils(&self) -> usize {
        (**self).n_coils()
    }
    fn n_samples(&self) -> usize {
        (**self).n_samples()
    }
    fn apply(&self,waveform:&Array2<Complex64>) -> PtxResult<ArrayD<Complex64>> {
        (**self).apply(waveform)
    }
    fn apply_adjoint(&self,pattern:&ArrayD<Complex64>) -> PtxResult<Array2<Complex64>> {
        (**self).apply_adjoint(pattern)
    }
}

/// Borrowed inputs of the excitation model. The sensitivity field has shape (coils, *image shape),
/// the trajectory (samples, spatial dims) and the optional B0 map (Hz) the image shape.
#[derive(Clone)]
pub struct ExcitationModel<'a> {
    pub sensitivities:ArrayViewD<'a,Complex64>,
    pub trajectory:ArrayView2<'a,f64>,
    pub b0:Option<ArrayViewD<'a,f64>>,
    pub dt:f64,
}

impl<'a> ExcitationModel<'a> {
    pub fn new(sensitivities:ArrayViewD<'a,Complex64>,trajectory:ArrayView2<'a,f64>,b0:Option<ArrayViewD<'a,f64>>,dt:f64) -> PtxResult<Self> {
        let model = Self {
            sensitivities,
            trajectory,
            b0,
            dt
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> PtxResult<()> {
        let shape = self.sensitivities.shape();
        if shape.len() < 2 || shape[0] == 0 {
            return Err(PtxError::Configuration(format!(
                "sensitivities must have shape (coils, *image shape) with at least one coil, got {:?}",shape
            )))
        }
        let image_shape = &shape[1..];
        if image_shape.iter().any(|n| *n == 0) {
            return Err(PtxError::Configuration(format!("image shape {:?} has an empty axis",image_shape)))
        }
        if self.trajectory.ncols() != image_shape.len() {
            return Err(PtxError::Configuration(format!(
                "trajectory has {} spatial dimensions but the image has {} ({:?})",
                self.trajectory.ncols(),image_shape.len(),image_shape
            )))
        }
        if self.trajectory.nrows() == 0 {
            return Err(PtxError::Configuration("trajectory has no samples".to_string()))
        }
        if self.trajectory.iter().any(|k| !k.is_finite()) {
            return Err(PtxError::Configuration("trajectory contains non-finite coordinates".to_string()))
        }
        if let Some(b0) = &self.b0 {
            if b0.shape() != image_shape {
                return Err(PtxError::shape_mismatch("B0 map",image_shape,b0.shape()))
            }
            if b0.iter().any(|f| !f.is_finite()) {
                return Err(PtxError::Configuration("B0 map contains non-finite values".to_string()))
            }
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(PtxError::Configuration(format!("dt must be a positive number, got {}",self.dt)))
        }
        Ok(())
    }

    pub fn image_shape(&self) -> &[usize] {
        &self.sensitivities.shape()[1..]
    }

    pub fn n_coils(&self) -> usize {
        self.sensitivities.shape()[0]
    }

    pub fn n_samples(&self) -> usize {
        self.trajectory.nrows()
    }

    pub fn n_pixels(&self) -> usize {
        self.image_shape().iter().product()
    }

    pub fn gain(&self) -> f64 {
        crate::config::GAMMA*self.dt
    }

    /// time of a (possibly fractional) sample from the start of the pulse (s)
    pub fn sample_time(&self,sample:f64) -> f64 {
        sample*self.dt
    }

    /// integer pixel offsets from the image center, one row per pixel in row-major order
    pub fn pixel_offsets(&self) -> Array2<f64> {
        let shape = self.image_shape();
        let mut offsets = Array2::<f64>::zeros((self.n_pixels(),shape.len()));
        for (mut row,idx) in offsets.outer_iter_mut().zip(ndarray::indices(IxDyn(shape))) {
            for (d,o) in row.iter_mut().enumerate() {
                *o = idx[d] as f64 - (shape[d]/2) as f64;
            }
        }
        offsets
    }

    /// sensitivities with each coil's image flattened (coils x pixels)
    pub fn flat_sensitivities(&self) -> Array2<Complex64> {
        let mut flat = Array2::<Complex64>::zeros((self.n_coils(),self.n_pixels()));
        for (mut row,coil) in flat.outer_iter_mut().zip(self.sensitivities.axis_iter(Axis(0))) {
            row.iter_mut().zip(coil.iter()).for_each(|(f,s)| *f = *s);
        }
        flat
    }

    pub fn flat_b0(&self) -> Option<Array1<f64>> {
        self.b0.as_ref().map(|b0| b0.iter().cloned().collect())
    }
}

/// Applies a real, non-negative spatial weighting to the excited pattern of another operator.
pub struct RoiWeighted<Op:ForwardOperator> {
    inner:Op,
    weights:ArrayD<Complex64>,
}

impl<Op:ForwardOperator> RoiWeighted<Op> {
    pub fn new(inner:Op,weights:&ArrayD<f64>) -> PtxResult<Self> {
        if weights.shape() != inner.image_shape() {
            return Err(PtxError::shape_mismatch("ROI weights",inner.image_shape(),weights.shape()))
        }
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(PtxError::Configuration("ROI weights must be finite and non-negative".to_string()))
        }
        Ok(Self {
            inner,
            weights:weights.mapv(|w| Complex64::new(w,0.0))
        })
    }

    pub fn weigh(&self,pattern:&ArrayD<Complex64>) -> ArrayD<Complex64> {
        pattern*&self.weights
    }
}

impl<Op:ForwardOperator> ForwardOperator for RoiWeighted<Op> {
    fn image_shape(&self) -> &[usize] {
        self.inner.image_shape()
    }
    fn n_coils(&self) -> usize {
        self.inner.n_coils()
    }
    fn n_samples(&self) -> usize {
        self.inner.n_samples()
    }
    fn apply(&self,waveform:&Array2<Complex64>) -> PtxResult<ArrayD<Complex64>> {
        Ok(self.weigh(&self.inner.apply(waveform)?))
    }
    fn apply_adjoint(&self,pattern:&ArrayD<Complex64>) -> PtxResult<Array2<Complex64>> {
        self.check_pattern(pattern)?;
        self.inner.apply_adjoint(&self.weigh(pattern))
    }
}

/// Explicit (dense matrix) or implicit (NUFFT) model over the same inputs
pub fn build_operator<'a>(explicit:bool,model:ExcitationModel<'a>,b0_segments:Option<usize>) -> PtxResult<Box<dyn ForwardOperator + 'a>> {
    Ok(match explicit {
        true => Box::new(ExplicitOperator::new(&model)),
        false => Box::new(ImplicitOperator::new(model,b0_segments)?),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;
    use utils::vdot;

    pub fn random_complex(rng:&mut StdRng,shape:&[usize]) -> ArrayD<Complex64> {
        ArrayD::from_shape_fn(IxDyn(shape),|_| Complex64::new(rng.gen_range(-1.0..1.0),rng.gen_range(-1.0..1.0)))
    }

    pub fn random_waveform(rng:&mut StdRng,n_coils:usize,n_samples:usize) -> Array2<Complex64> {
        Array2::from_shape_fn((n_coils,n_samples),|_| Complex64::new(rng.gen_range(-1.0..1.0),rng.gen_range(-1.0..1.0)))
    }

    /// relative mismatch of <A w, p> and <w, A^H p> for random w and p
    pub fn adjoint_mismatch(op:&dyn ForwardOperator,seed:u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let w = random_waveform(&mut rng,op.n_coils(),op.n_samples());
        let p = random_complex(&mut rng,op.image_shape());
        let lhs = vdot(&op.apply(&w).unwrap(),&p);
        let rhs = vdot(&w,&op.apply_adjoint(&p).unwrap());
        (lhs - rhs).norm()/lhs.norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::test_support::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use ptx_sim::{birdcage_maps, radial};

    #[test]
    fn model_rejects_inconsistent_inputs(){
        let sens = birdcage_maps(4,&[6,6]);
        let traj2 = radial(4,4,true);
        let traj3 = Array2::<f64>::zeros((10,3));
        assert!(ExcitationModel::new(sens.view(),traj2.view(),None,4e-6).is_ok());
        assert!(matches!(ExcitationModel::new(sens.view(),traj3.view(),None,4e-6),Err(PtxError::Configuration(_))));
        let b0 = ArrayD::<f64>::zeros(IxDyn(&[6,5]));
        assert!(matches!(ExcitationModel::new(sens.view(),traj2.view(),Some(b0.view()),4e-6),Err(PtxError::Configuration(_))));
        assert!(matches!(ExcitationModel::new(sens.view(),traj2.view(),None,0.0),Err(PtxError::Configuration(_))));
    }

    #[test]
    fn operator_rejects_wrong_coil_count(){
        let sens = birdcage_maps(8,&[6,6]);
        let traj = radial(4,4,true);
        let model = ExcitationModel::new(sens.view(),traj.view(),None,4e-6).unwrap();
        let w = Array2::<Complex64>::zeros((4,16));
        for explicit in [true,false] {
            let op = build_operator(explicit,model.clone(),None).unwrap();
            assert!(matches!(op.apply(&w),Err(PtxError::Configuration(_))));
        }
    }

    #[test]
    fn pixel_offsets_are_centered(){
        let sens = birdcage_maps(2,&[3,4]);
        let traj = Array2::<f64>::zeros((1,2));
        let model = ExcitationModel::new(sens.view(),traj.view(),None,4e-6).unwrap();
        let o = model.pixel_offsets();
        assert_eq!(o.row(0).to_vec(),vec![-1.0,-2.0]);
        assert_eq!(o.row(11).to_vec(),vec![1.0,1.0]);
    }

    #[test]
    fn gain_and_sample_times_follow_dwell(){
        let sens = birdcage_maps(2,&[4,4]);
        let traj = radial(2,4,false);
        let model = ExcitationModel::new(sens.view(),traj.view(),None,4e-6).unwrap();
        assert!((model.gain() - 1070.0).abs() < 1e-9);
        assert_eq!(model.sample_time(0.0),0.0);
        assert!((model.sample_time(7.0) - 28e-6).abs() < 1e-18);
    }

    #[test]
    fn roi_weighting_keeps_adjoint(){
        let sens = birdcage_maps(4,&[6,6]);
        let traj = radial(5,6,true);
        let model = ExcitationModel::new(sens.view(),traj.view(),None,4e-6).unwrap();
        let op = ImplicitOperator::new(model,None).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let weights = random_complex(&mut rng,&[6,6]).mapv(|v| v.re.abs());
        let roi = RoiWeighted::new(&op,&weights).unwrap();
        assert!(adjoint_mismatch(&roi,5) < 1e-10);

        let negative = weights.mapv(|w| -w);
        assert!(matches!(RoiWeighted::new(&op,&negative),Err(PtxError::Configuration(_))));
    }
}
