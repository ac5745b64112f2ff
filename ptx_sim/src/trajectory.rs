use std::f64::consts::PI;
use ndarray::{Array1, Array2};
use serde::Serialize;

// k-space coordinates are in cycles per pixel. The sampled box is [-K_MAX,K_MAX] on every axis.
pub const K_MAX:f64 = 0.5;

#[derive(Clone,Debug,Serialize,PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Radial {
        n_spokes:usize,
        n_read:usize,
        golden:bool
    },
    Spiral {
        n_samples:usize
    },
    StackOfSpirals {
        n_samples:usize,
        n_slices:usize,
        slice_spacing:f64
    },
}

/// Trajectory for a geometry covering a field of view at the given resolution (same length units).
/// The spiral turn count is half the matrix size, which fills k-space at the Nyquist rate.
pub fn generate_trajectory(geometry:&Geometry,fov:f64,resolution:f64) -> Array2<f64> {
    assert!(fov > 0.0 && resolution > 0.0,"field of view and resolution must be positive");
    let matrix_size = (fov/resolution).round().max(1.0);
    let n_turns = matrix_size/2.0;
    match geometry {
        Geometry::Radial{n_spokes,n_read,golden} => radial(*n_spokes,*n_read,*golden),
        Geometry::Spiral{n_samples} => spiral(n_turns,*n_samples),
        Geometry::StackOfSpirals{n_samples,n_slices,slice_spacing} => {
            stack_of(&spiral(n_turns,*n_samples),*n_slices,*slice_spacing)
        }
    }
}

/// Center-out radial spokes. Spoke angles advance by the golden angle pi(3 - sqrt 5) or uniformly
/// over the circle.
pub fn radial(n_spokes:usize,n_read:usize,golden:bool) -> Array2<f64> {
    assert!(n_spokes > 0 && n_read > 0,"radial trajectory needs at least one spoke and one readout point");
    let increment = match golden {
        true => PI*(3.0 - 5f64.sqrt()),
        false => 2.0*PI/n_spokes as f64
    };
    let mut traj = Array2::<f64>::zeros((n_spokes*n_read,2));
    for spoke in 0..n_spokes {
        let theta = spoke as f64*increment;
        for read in 0..n_read {
            let r = K_MAX*read as f64/n_read as f64;
            let row = spoke*n_read + read;
            traj[[row,0]] = r*theta.sin();
            traj[[row,1]] = r*theta.cos();
        }
    }
    traj
}

/// Archimedean spiral-in from the edge of k-space ending at the center
pub fn spiral(n_turns:f64,n_samples:usize) -> Array2<f64> {
    assert!(n_samples > 1,"spiral trajectory needs at least two samples");
    let mut traj = Array2::<f64>::zeros((n_samples,2));
    for s in 0..n_samples {
        let frac = s as f64/(n_samples - 1) as f64;
        let theta = 2.0*PI*n_turns*frac;
        let r = K_MAX*(1.0 - frac);
        traj[[s,0]] = r*theta.cos();
        traj[[s,1]] = r*theta.sin();
    }
    traj
}

/// Repeats a 2D trajectory at each kz = linspace(-n*spacing/2, n*spacing/2, n).
/// The result has a third column and n times as many samples.
pub fn stack_of(traj:&Array2<f64>,n_slices:usize,spacing:f64) -> Array2<f64> {
    assert_eq!(traj.ncols(),2,"only 2D trajectories can be stacked");
    assert!(n_slices > 0,"stack needs at least one slice");
    let half = n_slices as f64*spacing/2.0;
    let kz = match n_slices {
        1 => Array1::zeros(1),
        _ => Array1::linspace(-half,half,n_slices)
    };
    let n = traj.nrows();
    let mut stacked = Array2::<f64>::zeros((n*n_slices,3));
    for (z,kz) in kz.iter().enumerate() {
        for (s,k) in traj.outer_iter().enumerate() {
            let row = z*n + s;
            stacked[[row,0]] = k[0];
            stacked[[row,1]] = k[1];
            stacked[[row,2]] = *kz;
        }
    }
    stacked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radial_spokes_start_at_center(){
        let traj = radial(8,8,true);
        assert_eq!(traj.shape(),&[64,2]);
        for spoke in 0..8 {
            assert_eq!(traj[[spoke*8,0]],0.0);
            assert_eq!(traj[[spoke*8,1]],0.0);
        }
        let max_r = traj.outer_iter().map(|k| k[0].hypot(k[1])).fold(0.0,f64::max);
        assert!((max_r - 0.4375).abs() < 1e-12);
    }

    #[test]
    fn uniform_radial_is_evenly_spaced(){
        let traj = radial(4,2,false);
        // spoke 1 points along axis 0 after a quarter turn
        assert!((traj[[3,0]] - 0.25).abs() < 1e-12);
        assert!(traj[[3,1]].abs() < 1e-12);
    }

    #[test]
    fn spiral_ends_at_center(){
        let traj = spiral(2.0,64);
        assert_eq!(traj.shape(),&[64,2]);
        assert!((traj[[0,0]] - K_MAX).abs() < 1e-12);
        assert!(traj[[63,0]].abs() < 1e-12 && traj[[63,1]].abs() < 1e-12);
    }

    #[test]
    fn stacked_partitions(){
        let traj = stack_of(&spiral(2.0,64),3,0.1);
        assert_eq!(traj.shape(),&[192,3]);
        assert!((traj[[0,2]] + 0.15).abs() < 1e-12);
        assert!(traj[[64,2]].abs() < 1e-12);
        assert!((traj[[191,2]] - 0.15).abs() < 1e-12);
        assert_eq!(traj[[70,0]],traj[[6,0]]);
    }

    #[test]
    fn geometry_sets_turns_from_matrix(){
        let g = Geometry::Spiral{n_samples:128};
        let traj = generate_trajectory(&g,0.08,0.01);
        assert_eq!(traj,spiral(4.0,128));
        let g = Geometry::StackOfSpirals{n_samples:64,n_slices:3,slice_spacing:0.1};
        assert_eq!(generate_trajectory(&g,0.03,0.01).shape(),&[192,3]);
    }
}
