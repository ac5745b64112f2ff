use std::f64::consts::PI;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayViewD, Axis, IxDyn};
use num_complex::Complex64;
use tracing::debug;
use utils::nufft::Nufft;
use crate::error::{PtxError, PtxResult};
use super::{ExcitationModel, ForwardOperator};

pub const DEFAULT_B0_SEGMENTS:usize = 8;

/*
    Off-resonance phase exp(-i2pi B0(r) t) is approximated by sum_l h_l(t) exp(-i2pi B0(r) tau_l)
    where tau_l is the time of knot l and h_l are linear interpolation (hat) weights
    between evenly spaced knots. Each segment costs one extra NUFFT per coil.
 */
struct TimeSegment {
    // exp(-i2pi B0 tau_l) per pixel
    phase:Array1<Complex64>,
    // interpolation weight per sample
    weights:Array1<f64>,
}

/// Coil-weighted NUFFT model. Holds the sensitivity field by reference.
pub struct ImplicitOperator<'a> {
    image_shape:Vec<usize>,
    sensitivities:ArrayViewD<'a,Complex64>,
    gain:f64,
    nufft:Nufft,
    segments:Vec<TimeSegment>,
}

impl<'a> ImplicitOperator<'a> {
    /// `b0_segments` is ignored without a B0 map and defaults to 8 (or the sample count if fewer)
    pub fn new(model:ExcitationModel<'a>,b0_segments:Option<usize>) -> PtxResult<Self> {
        let n_samples = model.n_samples();
        let segments = match model.flat_b0() {
            Some(b0) => {
                let n_seg = b0_segments.unwrap_or(DEFAULT_B0_SEGMENTS.min(n_samples));
                if n_seg == 0 || n_seg > n_samples {
                    return Err(PtxError::Configuration(format!(
                        "number of B0 segments must be between 1 and the sample count {}, got {}",n_samples,n_seg
                    )))
                }
                time_segments(&model,&b0,n_seg)
            }
            None => vec![]
        };
        debug!(image_shape=?model.image_shape(),n_samples,n_segments=segments.len(),"planning NUFFT");
        let nufft = Nufft::new(model.image_shape(),model.trajectory);
        Ok(Self {
            image_shape:model.image_shape().to_vec(),
            gain:model.gain(),
            sensitivities:model.sensitivities,
            nufft,
            segments,
        })
    }

    pub fn n_segments(&self) -> usize {
        self.segments.len()
    }

    // pattern excited by one coil with unit sensitivity (flattened pixels)
    fn excite(&self,waveform:ArrayView1<Complex64>) -> Array1<Complex64> {
        if self.segments.is_empty() {
            return self.nufft.adjoint(&waveform)
        }
        let mut image = Array1::<Complex64>::zeros(self.nufft.n_pixels());
        for seg in &self.segments {
            let weighted = &waveform*&seg.weights.mapv(|h| Complex64::new(h,0.0));
            let partial = self.nufft.adjoint(&weighted);
            image.iter_mut().zip(partial.iter().zip(seg.phase.iter())).for_each(|(m,(v,ph))| *m += v*ph);
        }
        image
    }

    // adjoint of `excite`
    fn sample(&self,image:&Array1<Complex64>) -> Array1<Complex64> {
        if self.segments.is_empty() {
            return self.nufft.forward(image)
        }
        let mut samples = Array1::<Complex64>::zeros(self.nufft.n_samples());
        for seg in &self.segments {
            let dephased:Array1<Complex64> = image.iter().zip(seg.phase.iter()).map(|(v,ph)| v*ph.conj()).collect();
            let partial = self.nufft.forward(&dephased);
            samples.iter_mut().zip(partial.iter().zip(seg.weights.iter())).for_each(|(y,(v,&h))| *y += *v*h);
        }
        samples
    }
}

fn time_segments(model:&ExcitationModel,b0:&Array1<f64>,n_seg:usize) -> Vec<TimeSegment> {
    let n_samples = model.n_samples();
    let last = (n_samples - 1) as f64;
    let spacing = if n_seg > 1 {last/(n_seg - 1) as f64} else {0.0};
    (0..n_seg).map(|l|{
        let (knot,weights) = match n_seg {
            1 => (last/2.0,Array1::ones(n_samples)),
            _ => {
                let knot = l as f64*spacing;
                let weights = Array1::from_shape_fn(n_samples,|t| (1.0 - (t as f64 - knot).abs()/spacing).max(0.0));
                (knot,weights)
            }
        };
        let tau = model.sample_time(knot);
        TimeSegment {
            phase:b0.mapv(|f| Complex64::from_polar(1.0,-2.0*PI*f*tau)),
            weights
        }
    }).collect()
}

impl<'a> ForwardOperator for ImplicitOperator<'a> {
    fn image_shape(&self) -> &[usize] {
        &self.image_shape
    }

    fn n_coils(&self) -> usize {
        self.sensitivities.shape()[0]
    }

    fn n_samples(&self) -> usize {
        self.nufft.n_samples()
    }

    fn apply(&self,waveform:&Array2<Complex64>) -> PtxResult<ArrayD<Complex64>> {
        self.check_waveform(waveform)?;
        let mut pattern = Array1::<Complex64>::zeros(self.nufft.n_pixels());
        for (coil_waveform,sens) in waveform.outer_iter().zip(self.sensitivities.axis_iter(Axis(0))) {
            let image = self.excite(coil_waveform);
            pattern.iter_mut().zip(sens.iter().zip(image.iter())).for_each(|(m,(s,v))| *m += s*v*self.gain);
        }
        Ok(pattern.into_shape(IxDyn(&self.image_shape))?)
    }

    fn apply_adjoint(&self,pattern:&ArrayD<Complex64>) -> PtxResult<Array2<Complex64>> {
        self.check_pattern(pattern)?;
        let mut waveform = Array2::<Complex64>::zeros((self.n_coils(),self.n_samples()));
        for (mut coil_waveform,sens) in waveform.outer_iter_mut().zip(self.sensitivities.axis_iter(Axis(0))) {
            let image:Array1<Complex64> = sens.iter().zip(pattern.iter()).map(|(s,p)| s.conj()*p*self.gain).collect();
            coil_waveform.assign(&self.sample(&image));
        }
        Ok(waveform)
    }
}
