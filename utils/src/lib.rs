pub mod cfl;
pub mod nufft;

use std::path::Path;
use std::fs::File;
use std::io::{self, Write, Read};
use std::sync::Arc;
use ndarray::{ArrayBase, ArrayD, Axis, Data, Dimension};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

pub fn read_to_string(filepath:&Path,extension:&str) -> io::Result<String> {
    let p = filepath.with_extension(extension);
    let mut f = File::open(&p)?;
    let mut s = String::new();
    f.read_to_string(&mut s)?;
    Ok(s)
}

pub fn write_to_file(filepath:&Path,extension:&str,string:&str) -> io::Result<()> {
    let p = filepath.with_extension(extension);
    let mut f = File::create(p)?;
    f.write_all(string.as_bytes())
}

/// complex inner product sum(conj(a)*b). Both arrays must have the same shape.
pub fn vdot<S1,S2,D>(a:&ArrayBase<S1,D>,b:&ArrayBase<S2,D>) -> Complex64
    where S1:Data<Elem=Complex64>, S2:Data<Elem=Complex64>, D:Dimension {
    a.iter().zip(b.iter()).fold(Complex64::new(0.0,0.0),|acc,(x,y)| acc + x.conj()*y)
}

/// squared l2 norm of a complex array
pub fn norm_sqr<S,D>(a:&ArrayBase<S,D>) -> f64
    where S:Data<Elem=Complex64>, D:Dimension {
    a.iter().map(|v| v.norm_sqr()).sum()
}

pub fn norm<S,D>(a:&ArrayBase<S,D>) -> f64
    where S:Data<Elem=Complex64>, D:Dimension {
    norm_sqr(a).sqrt()
}

/// largest magnitude difference between two complex arrays of the same shape
pub fn max_abs_diff<S1,S2,D>(a:&ArrayBase<S1,D>,b:&ArrayBase<S2,D>) -> f64
    where S1:Data<Elem=Complex64>, S2:Data<Elem=Complex64>, D:Dimension {
    a.iter().zip(b.iter()).fold(0.0,|acc:f64,(x,y)| acc.max((x - y).norm()))
}

/// Unnormalized multi-dimensional FFT plan. Forward uses exp(-i..), inverse uses exp(+i..),
/// so the inverse is the exact conjugate transpose of the forward transform.
pub struct FftN {
    shape:Vec<usize>,
    forward:Vec<Arc<dyn Fft<f64>>>,
    inverse:Vec<Arc<dyn Fft<f64>>>,
}

impl FftN {
    pub fn new(shape:&[usize]) -> Self {
        let mut fft_planner = FftPlanner::<f64>::new();
        let forward = shape.iter().map(|n| fft_planner.plan_fft_forward(*n)).collect();
        let inverse = shape.iter().map(|n| fft_planner.plan_fft_inverse(*n)).collect();
        Self {
            shape:shape.to_vec(),
            forward,
            inverse
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn forward(&self,arr:&mut ArrayD<Complex64>) {
        Self::process(arr,&self.forward);
    }

    pub fn inverse(&self,arr:&mut ArrayD<Complex64>) {
        Self::process(arr,&self.inverse);
    }

    fn process(arr:&mut ArrayD<Complex64>,plans:&[Arc<dyn Fft<f64>>]) {
        for (axis,fft) in plans.iter().enumerate() {
            let n = arr.shape()[axis];
            if n < 2 {
                continue
            }
            let mut temp = vec![Complex64::new(0.0,0.0);n];
            for mut line in arr.lanes_mut(Axis(axis)) {
                temp.iter_mut().zip(line.iter()).for_each(|(t,v)| *t = *v);
                fft.process(&mut temp);
                line.iter_mut().zip(temp.iter()).for_each(|(v,t)| *v = *t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use std::f64::consts::PI;

    #[test]
    fn fft_matches_direct_sum(){
        let shape = [4,3];
        let arr = ArrayD::from_shape_fn(IxDyn(&shape),|idx| Complex64::new(idx[0] as f64,1.0 - idx[1] as f64));
        let mut k = arr.clone();
        FftN::new(&shape).forward(&mut k);
        for m in 0..4 {
            for n in 0..3 {
                let mut expected = Complex64::new(0.0,0.0);
                for (idx,v) in arr.indexed_iter() {
                    let phase = -2.0*PI*(m as f64*idx[0] as f64/4.0 + n as f64*idx[1] as f64/3.0);
                    expected += v*Complex64::from_polar(1.0,phase);
                }
                assert!((k[[m,n]] - expected).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn inverse_undoes_forward_up_to_size(){
        let shape = [5,2,3];
        let arr = ArrayD::from_shape_fn(IxDyn(&shape),|idx| Complex64::new((idx[0]*idx[2]) as f64,idx[1] as f64));
        let plan = FftN::new(&shape);
        let mut k = arr.clone();
        plan.forward(&mut k);
        plan.inverse(&mut k);
        k.mapv_inplace(|v| v/30.0);
        assert!(max_abs_diff(&k,&arr) < 1e-12);
    }
}
