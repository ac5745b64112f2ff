mod args;

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use clap::Parser;
use ndarray::{Array2, ArrayD, Axis, Ix2};
use num_complex::Complex64;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ptx::{design_pulses, Config, ConfigFile, DesignProblem, DesignSettings, PtxResult, PulseDesign, Termination};
use ptx_sim::{birdcage_maps, blurred_disc, generate_trajectory, Geometry};
use utils::cfl::{read_cfl, write_cfl};
use args::{Action, DemoArgs, DemoTrajectory, PtxDesignArgs, SolveArgs};

#[derive(Serialize)]
struct DesignSummary {
    termination:Termination,
    iterations:usize,
    objective:f64,
    max_error:f64,
    nrmse:f64,
    settings:DesignSettings,
    history:Vec<f64>,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = PtxDesignArgs::parse();
    let result = match args.action {
        Action::NewConfig(args) => DesignSettings::default().to_file(&args.output_config),
        Action::Solve(args) => solve(&args),
        Action::Demo(args) => demo(&args),
    };
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}",e);
            ExitCode::FAILURE
        }
    }
}

fn solve(args:&SolveArgs) -> PtxResult<()> {
    let settings = DesignSettings::from_file(&args.settings)?;
    let target = read_cfl(&args.target)?;
    let sensitivities = read_cfl(&args.sensitivities)?;
    let trajectory = read_trajectory(&args.trajectory)?;
    let b0 = args.b0.as_ref().map(|p| read_cfl(p).map(|a| real_part(&a))).transpose()?;
    let roi = args.roi.as_ref().map(|p| read_cfl(p).map(|a| real_part(&a))).transpose()?;
    let initial = match &args.initial {
        Some(p) => Some(read_cfl(p)?.into_dimensionality::<Ix2>()?),
        None => None
    };
    let problem = DesignProblem {
        target:&target,
        sensitivities:sensitivities.view(),
        trajectory:trajectory.view(),
        b0:b0.as_ref().map(|b| b.view()),
        roi:roi.as_ref(),
        initial:initial.as_ref(),
    };
    let design = design_pulses(&problem,&settings)?;
    write_outputs(&args.output,&target,&design,&settings)
}

/// Simulated problem for the demo. Written next to the outputs so a run can be reproduced.
#[derive(Serialize,Debug)]
struct DemoProblem {
    geometry:Geometry,
    fov:f64,
    resolution:f64,
    image_shape:Vec<usize>,
    n_coils:usize,
    disc_radius:f64,
}

impl DemoProblem {
    // unit resolution so the matrix size sets the spiral turns
    fn new(trajectory:DemoTrajectory,matrix:usize,n_coils:usize) -> Self {
        let m = matrix;
        let (geometry,image_shape) = match trajectory {
            DemoTrajectory::Radial => (Geometry::Radial{n_spokes:m,n_read:m,golden:true},vec![m,m]),
            DemoTrajectory::Spiral => (Geometry::Spiral{n_samples:16*m},vec![m,m]),
            DemoTrajectory::StackOfSpirals => {
                (Geometry::StackOfSpirals{n_samples:8*m,n_slices:3,slice_spacing:0.1},vec![m,m,3])
            }
        };
        let disc_radius = match image_shape.len() {
            2 => (m/6) as f64,
            _ => (m/5) as f64
        };
        Self {
            geometry,
            fov:m as f64,
            resolution:1.0,
            image_shape,
            n_coils,
            disc_radius
        }
    }

    fn trajectory(&self) -> Array2<f64> {
        generate_trajectory(&self.geometry,self.fov,self.resolution)
    }
}

fn demo(args:&DemoArgs) -> PtxResult<()> {
    let settings = match &args.settings {
        Some(p) => DesignSettings::from_file(p)?,
        None => DesignSettings::default()
    };
    let demo = DemoProblem::new(args.trajectory,args.matrix,args.n_coils);
    let trajectory = demo.trajectory();
    let target = blurred_disc(&demo.image_shape,demo.disc_radius);
    let sensitivities = birdcage_maps(demo.n_coils,&demo.image_shape);
    info!(?demo,n_samples=trajectory.nrows(),"demo problem");

    create_dir_all(&args.output)?;
    write_cfl(&target,&args.output.join("target"))?;
    write_cfl(&sensitivities,&args.output.join("sensitivities"))?;
    write_cfl(&trajectory.mapv(|k| Complex64::new(k,0.0)),&args.output.join("trajectory"))?;
    settings.to_file(&args.output.join("settings"))?;
    write_json(&demo,&args.output.join("problem.json"))?;

    let problem = DesignProblem {
        target:&target,
        sensitivities:sensitivities.view(),
        trajectory:trajectory.view(),
        b0:None,
        roi:None,
        initial:None,
    };
    let design = design_pulses(&problem,&settings)?;
    write_outputs(&args.output,&target,&design,&settings)
}

fn write_outputs(output:&Path,target:&ArrayD<Complex64>,design:&PulseDesign,settings:&DesignSettings) -> PtxResult<()> {
    create_dir_all(output)?;
    write_cfl(&design.waveform,&output.join("waveform"))?;
    write_cfl(&design.pattern,&output.join("pattern"))?;

    let error = &design.pattern - target;
    let max_error = error.iter().fold(0.0,|acc:f64,v| acc.max(v.norm()));
    let target_norm = utils::norm(target);
    let nrmse = match target_norm > 0.0 {
        true => utils::norm(&error)/target_norm,
        false => utils::norm(&error)
    };
    let summary = DesignSummary {
        termination:design.termination,
        iterations:design.iterations,
        objective:design.objective,
        max_error,
        nrmse,
        settings:settings.clone(),
        history:design.history.clone(),
    };
    write_json(&summary,&output.join("summary.json"))?;
    info!(?output,max_error,nrmse,"wrote design");
    Ok(())
}

fn write_json<T:Serialize>(value:&T,path:&Path) -> PtxResult<()> {
    let s = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    let mut f = File::create(path)?;
    f.write_all(s.as_bytes())?;
    Ok(())
}

fn read_trajectory(path:&Path) -> PtxResult<Array2<f64>> {
    let mut traj = real_part(&read_cfl(path)?);
    // a 1D trajectory loses its trailing singleton dimension in the header
    if traj.ndim() == 1 {
        traj = traj.insert_axis(Axis(1));
    }
    Ok(traj.into_dimensionality::<Ix2>()?)
}

fn real_part(arr:&ArrayD<Complex64>) -> ArrayD<f64> {
    arr.mapv(|v| v.re)
}
