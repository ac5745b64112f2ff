/*
 Non-uniform FFT by Kaiser-Bessel gridding on a 2x oversampled grid.

 Image pixels sit at integer offsets o = x - floor(N/2) along every axis. Sample coordinates are
 normalized spatial frequencies in cycles per pixel (the Nyquist box is [-0.5,0.5)).

    forward: y(k) ~= sum_o image(o) exp(+i 2pi k.o)
    adjoint: image(o) ~= sum_k y(k) exp(-i 2pi k.o)

 The adjoint is built from the transposes of each forward stage (spread <-> interpolate,
 forward fft <-> inverse fft, same real deapodization) so it is the exact conjugate transpose of
 the forward transform, independent of the gridding approximation error.
 */

use std::f64::consts::PI;
use ndarray::{Array1, ArrayBase, ArrayD, ArrayView2, Data, Dimension, Ix1, IxDyn};
use num_complex::Complex64;
use crate::FftN;

pub const OVERSAMPLING:f64 = 2.0;
pub const KERNEL_WIDTH:f64 = 4.0;

pub struct Nufft {
    image_shape:Vec<usize>,
    grid_shape:Vec<usize>,
    fft:FftN,
    // flattened grid index of each pixel (row-major pixel order)
    placement:Vec<usize>,
    deapodization:Vec<f64>,
    // (flattened grid index, kernel weight) pairs for each sample
    interpolation:Vec<Vec<(usize,f64)>>,
}

impl Nufft {
    pub fn new(image_shape:&[usize],coords:ArrayView2<f64>) -> Self {
        assert_eq!(coords.ncols(),image_shape.len(),"coordinate dimensions must match image dimensions");
        let grid_shape:Vec<usize> = image_shape.iter().map(|n| (OVERSAMPLING*(*n as f64)).ceil() as usize).collect();
        let beta = kaiser_bessel_beta();
        let strides = row_major_strides(&grid_shape);

        let n_pixels:usize = image_shape.iter().product();
        let mut placement = Vec::<usize>::with_capacity(n_pixels);
        let mut deapodization = Vec::<f64>::with_capacity(n_pixels);
        for idx in ndarray::indices(IxDyn(image_shape)) {
            let mut flat = 0;
            let mut apod = 1.0;
            for (d,x) in idx.slice().iter().enumerate() {
                let offset = *x as i64 - (image_shape[d]/2) as i64;
                let g = grid_shape[d] as i64;
                flat += offset.rem_euclid(g) as usize*strides[d];
                apod *= kernel_transform(offset as f64/g as f64,beta);
            }
            placement.push(flat);
            deapodization.push(apod);
        }

        let interpolation = coords.outer_iter().map(|k|{
            let mut entries = vec![(0usize,1.0)];
            for (d,kd) in k.iter().enumerate() {
                let g = grid_shape[d] as i64;
                let u = kd*g as f64;
                let lo = (u - KERNEL_WIDTH/2.0).ceil() as i64;
                let hi = (u + KERNEL_WIDTH/2.0).floor() as i64;
                let mut next = Vec::with_capacity(entries.len()*(hi - lo + 1).max(0) as usize);
                for m in lo..=hi {
                    let w = kernel(u - m as f64,beta);
                    let offset = m.rem_euclid(g) as usize*strides[d];
                    next.extend(entries.iter().map(|(idx,weight)| (idx + offset,weight*w)));
                }
                entries = next;
            }
            entries
        }).collect();

        Self {
            image_shape:image_shape.to_vec(),
            fft:FftN::new(&grid_shape),
            grid_shape,
            placement,
            deapodization,
            interpolation,
        }
    }

    pub fn image_shape(&self) -> &[usize] {
        &self.image_shape
    }

    pub fn grid_shape(&self) -> &[usize] {
        &self.grid_shape
    }

    pub fn n_pixels(&self) -> usize {
        self.placement.len()
    }

    pub fn n_samples(&self) -> usize {
        self.interpolation.len()
    }

    /// image (flattened, row-major) -> samples at the plan coordinates
    pub fn forward<S>(&self,image:&ArrayBase<S,Ix1>) -> Array1<Complex64>
        where S:Data<Elem=Complex64> {
        assert_eq!(image.len(),self.n_pixels(),"image length does not match plan");
        let mut grid = ArrayD::<Complex64>::zeros(IxDyn(&self.grid_shape));
        {
            let flat = grid.as_slice_mut().expect("new arrays are contiguous");
            for ((v,&g),&a) in image.iter().zip(&self.placement).zip(&self.deapodization) {
                flat[g] += *v/a;
            }
        }
        self.fft.inverse(&mut grid);
        let flat = grid.as_slice().expect("new arrays are contiguous");
        self.interpolation.iter().map(|entries|{
            entries.iter().map(|&(g,w)| flat[g]*w).sum()
        }).collect()
    }

    /// samples at the plan coordinates -> image (flattened, row-major)
    pub fn adjoint<S>(&self,samples:&ArrayBase<S,Ix1>) -> Array1<Complex64>
        where S:Data<Elem=Complex64> {
        assert_eq!(samples.len(),self.n_samples(),"sample count does not match plan");
        let mut grid = ArrayD::<Complex64>::zeros(IxDyn(&self.grid_shape));
        {
            let flat = grid.as_slice_mut().expect("new arrays are contiguous");
            for (y,entries) in samples.iter().zip(&self.interpolation) {
                for &(g,w) in entries {
                    flat[g] += *y*w;
                }
            }
        }
        self.fft.forward(&mut grid);
        let flat = grid.as_slice().expect("new arrays are contiguous");
        self.placement.iter().zip(&self.deapodization).map(|(&g,&a)| flat[g]/a).collect()
    }
}

fn row_major_strides(shape:&[usize]) -> Vec<usize> {
    let mut strides = vec![1;shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d+1]*shape[d+1];
    }
    strides
}

fn kaiser_bessel_beta() -> f64 {
    PI*((KERNEL_WIDTH/OVERSAMPLING*(OVERSAMPLING - 0.5)).powi(2) - 0.8).sqrt()
}

/// Kaiser-Bessel kernel in grid units, normalized to unit integral scale 1/W
fn kernel(u:f64,beta:f64) -> f64 {
    let t = 2.0*u/KERNEL_WIDTH;
    if t.abs() > 1.0 {
        return 0.0
    }
    bessel_i0(beta*(1.0 - t*t).sqrt())/KERNEL_WIDTH
}

/// continuous Fourier transform of `kernel` at frequency nu (cycles per grid cell)
fn kernel_transform(nu:f64,beta:f64) -> f64 {
    let a = beta*beta - (PI*KERNEL_WIDTH*nu).powi(2);
    if a > 0.0 {
        let z = a.sqrt();
        z.sinh()/z
    } else if a < 0.0 {
        let z = (-a).sqrt();
        z.sin()/z
    } else {
        1.0
    }
}

/// modified Bessel function of the first kind, order 0 (power series)
fn bessel_i0(x:f64) -> f64 {
    let q = 0.25*x*x;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > 1e-17*sum {
        term *= q/(k*k);
        sum += term;
        k += 1.0;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;
    use crate::{norm, vdot};

    fn random_coords(rng:&mut StdRng,n:usize,ndim:usize) -> Array2<f64> {
        Array2::from_shape_fn((n,ndim),|_| rng.gen_range(-0.5..0.5))
    }

    fn random_complex(rng:&mut StdRng,n:usize) -> Array1<Complex64> {
        Array1::from_shape_fn(n,|_| Complex64::new(rng.gen_range(-1.0..1.0),rng.gen_range(-1.0..1.0)))
    }

    fn direct_forward(image:&Array1<Complex64>,shape:&[usize],coords:&Array2<f64>) -> Array1<Complex64> {
        coords.outer_iter().map(|k|{
            ndarray::indices(IxDyn(shape)).into_iter().zip(image.iter()).map(|(idx,v)|{
                let phase:f64 = idx.slice().iter().enumerate()
                    .map(|(d,x)| k[d]*(*x as f64 - (shape[d]/2) as f64)).sum();
                v*Complex64::from_polar(1.0,2.0*PI*phase)
            }).sum()
        }).collect()
    }

    #[test]
    fn bessel_reference_values(){
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-15);
        assert!((bessel_i0(1.0) - 1.266065877752008).abs() < 1e-12);
        assert!((bessel_i0(9.0) - 1093.588354511374).abs() < 1e-8);
    }

    #[test]
    fn forward_approximates_direct_sum(){
        let mut rng = StdRng::seed_from_u64(7);
        for shape in [vec![8,8],vec![3,3,3],vec![5,6]] {
            let n_pix:usize = shape.iter().product();
            let coords = random_coords(&mut rng,40,shape.len());
            let image = random_complex(&mut rng,n_pix);
            let plan = Nufft::new(&shape,coords.view());
            let approx = plan.forward(&image);
            let exact = direct_forward(&image,&shape,&coords);
            let err = norm(&(&approx - &exact))/norm(&exact);
            assert!(err < 5e-3,"relative gridding error {} for {:?}",err,shape);
        }
    }

    #[test]
    fn adjoint_is_conjugate_transpose(){
        let mut rng = StdRng::seed_from_u64(11);
        for shape in [vec![8,8],vec![3,3,3],vec![4,7]] {
            let n_pix:usize = shape.iter().product();
            let coords = random_coords(&mut rng,33,shape.len());
            let plan = Nufft::new(&shape,coords.view());
            let x = random_complex(&mut rng,n_pix);
            let y = random_complex(&mut rng,33);
            let lhs = vdot(&plan.forward(&x),&y);
            let rhs = vdot(&x,&plan.adjoint(&y));
            assert!((lhs - rhs).norm() <= 1e-10*lhs.norm(),"{} != {}",lhs,rhs);
        }
    }

    #[test]
    fn grid_is_twice_the_image(){
        let coords = Array2::<f64>::zeros((4,3));
        let plan = Nufft::new(&[8,3,1],coords.view());
        assert_eq!(plan.grid_shape(),&[16,6,2]);
        assert_eq!(plan.n_pixels(),24);
        assert_eq!(plan.n_samples(),4);
    }
}
