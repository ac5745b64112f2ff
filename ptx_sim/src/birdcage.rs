use std::f64::consts::PI;
use ndarray::{ArrayD, Axis, IxDyn};
use num_complex::Complex64;

// coil ring radius relative to the half field of view
const RING_RADIUS:f64 = 1.5;
// coils per ring for volume (3D) arrays
const COILS_PER_RING:usize = 8;

/*
    Birdcage transmit array model. Each coil is a wire element on a ring around the field of view.
    Its field falls off as 1/r and its phase follows the azimuth about the element plus the element's
    drive phase. Maps are normalized so the root-sum-of-squares over coils is 1 at every pixel.

    2D: all coils sit on one ring (axis 0 -> x, axis 1 -> y).
    3D: rings of 8 coils are stacked along axis 2 (z), centered on the field of view. Each axis is
    normalized by its own half extent, so ring spacing does not depend on the in-plane matrix.
 */
pub fn birdcage_maps(n_coils:usize,image_shape:&[usize]) -> ArrayD<Complex64> {
    assert!(n_coils > 0,"birdcage needs at least one coil");
    assert!(image_shape.len() == 2 || image_shape.len() == 3,"birdcage maps are 2D or 3D, got {}D",image_shape.len());
    let volume = image_shape.len() == 3;
    let per_ring = if volume {COILS_PER_RING} else {n_coils};
    let n_rings = (n_coils + per_ring - 1)/per_ring;
    let half = image_shape[0] as f64/2.0;

    let mut shape = vec![n_coils];
    shape.extend_from_slice(image_shape);
    let mut maps = ArrayD::<Complex64>::zeros(IxDyn(&shape));

    for (c,mut coil_map) in maps.axis_iter_mut(Axis(0)).enumerate() {
        let ring = c/per_ring;
        let angle = c as f64*2.0*PI/per_ring as f64;
        let coil_x = RING_RADIUS*angle.cos();
        let coil_y = RING_RADIUS*angle.sin();
        let coil_z = ring as f64 - 0.5*(n_rings as f64 - 1.0);
        let drive_phase = -((c + ring) as f64)*2.0*PI/per_ring as f64;
        for (idx,v) in coil_map.indexed_iter_mut() {
            let x = (idx[0] as f64 - half)/half - coil_x;
            let y = (idx[1] as f64 - image_shape[1] as f64/2.0)/(image_shape[1] as f64/2.0) - coil_y;
            let z = match volume {
                true => (idx[2] as f64 - image_shape[2] as f64/2.0)/(image_shape[2] as f64/2.0) - coil_z,
                false => 0.0
            };
            let r = (x*x + y*y + z*z).sqrt();
            let phi = x.atan2(-y) + drive_phase;
            *v = Complex64::from_polar(1.0/r,phi);
        }
    }

    let rss = maps.map(|v| v.norm_sqr()).sum_axis(Axis(0)).mapv(f64::sqrt);
    for mut coil_map in maps.axis_iter_mut(Axis(0)) {
        coil_map.zip_mut_with(&rss,|v,r| *v /= *r);
    }
    maps
}
