use ndarray::{ArrayD, Axis, IxDyn};
use num_complex::Complex64;

const BLUR_SIGMA:f64 = 1.0;
const BLUR_TRUNCATE:f64 = 4.0;

/// Disc (2D) or sphere (3D) of ones centered at floor(N/2) on every axis, smoothed with a unit
/// gaussian so the pattern stays low-frequency.
pub fn blurred_disc(image_shape:&[usize],radius:f64) -> ArrayD<Complex64> {
    let mut img = ArrayD::<f64>::from_shape_fn(IxDyn(image_shape),|idx|{
        let r2:f64 = (0..image_shape.len()).map(|d|{
            let x = idx[d] as f64 - (image_shape[d]/2) as f64;
            x*x
        }).sum();
        if r2 <= radius*radius {1.0} else {0.0}
    });
    for axis in 0..image_shape.len() {
        img = gaussian_filter_axis(&img,axis,BLUR_SIGMA);
    }
    img.mapv(|v| Complex64::new(v,0.0))
}

// (d c b a | a b c d | d c b a)
fn reflect(mut i:i64,n:i64) -> usize {
    while i < 0 || i >= n {
        if i < 0 {
            i = -i - 1;
        }
        if i >= n {
            i = 2*n - i - 1;
        }
    }
    i as usize
}

fn gaussian_filter_axis(img:&ArrayD<f64>,axis:usize,sigma:f64) -> ArrayD<f64> {
    let radius = (BLUR_TRUNCATE*sigma + 0.5) as i64;
    let weights:Vec<f64> = (-radius..=radius).map(|x| (-0.5*(x as f64/sigma).powi(2)).exp()).collect();
    let total:f64 = weights.iter().sum();
    let mut out = ArrayD::<f64>::zeros(img.raw_dim());
    let n = img.shape()[axis] as i64;
    for (src,mut dst) in img.lanes(Axis(axis)).into_iter().zip(out.lanes_mut(Axis(axis))) {
        for (i,v) in dst.iter_mut().enumerate() {
            *v = weights.iter().enumerate().map(|(w_idx,w)|{
                w*src[reflect(i as i64 + w_idx as i64 - radius,n)]
            }).sum::<f64>()/total;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Ix2;

    #[test]
    fn reflect_mirrors_edges(){
        assert_eq!(reflect(-1,4),0);
        assert_eq!(reflect(-2,4),1);
        assert_eq!(reflect(4,4),3);
        assert_eq!(reflect(9,4),1);
        assert_eq!(reflect(-4,1),0);
    }

    #[test]
    fn blur_preserves_mass_of_interior_disc(){
        let img = blurred_disc(&[32,32],3.0);
        let disc_area = img.iter().map(|v| v.re).sum::<f64>();
        let n_inside = (0..32).flat_map(|i| (0..32).map(move |j| (i,j)))
            .filter(|(i,j)| ((i - 16)*(i - 16) + (j - 16)*(j - 16)) as f64 <= 9.0).count();
        assert!((disc_area - n_inside as f64).abs() < 1e-9);
        assert!(img.iter().all(|v| v.im == 0.0 && v.re >= 0.0));
    }

    #[test]
    fn target_is_symmetric_and_peaks_at_center(){
        let img = blurred_disc(&[8,8],1.0).into_dimensionality::<Ix2>().unwrap();
        let center = img[[4,4]].re;
        assert!(img.iter().all(|v| v.re <= center + 1e-15));
        for i in 0..8 {
            for j in 0..8 {
                assert!((img[[i,j]].re - img[[j,i]].re).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn single_voxel_sphere_in_small_volume(){
        let img = blurred_disc(&[3,3,3],0.0);
        assert_eq!(img.shape(),&[3,3,3]);
        assert!(img.iter().all(|v| v.re > 0.0));
        let center = img[IxDyn(&[1,1,1])].re;
        assert!(img.iter().all(|v| v.re <= center));
    }
}
