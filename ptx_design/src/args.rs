use clap;
use std::path::PathBuf;

#[derive(clap::Parser,Debug)]
#[command(name = "ptx_design", about = "small-tip parallel transmit RF pulse design")]
pub struct PtxDesignArgs {
    #[command(subcommand)]
    pub action: Action,
}

#[derive(clap::Subcommand,Debug)]
pub enum Action {
    /// write a design settings file with default values to modify
    NewConfig(NewConfigArgs),
    /// design pulses from cfl inputs
    Solve(SolveArgs),
    /// design pulses for a simulated birdcage array and disc target
    Demo(DemoArgs),
}

#[derive(clap::Args,Debug)]
pub struct NewConfigArgs {
    /// path to the new settings file. The extension is always ptx_settings
    pub output_config:PathBuf,
}

#[derive(clap::Args,Debug)]
pub struct SolveArgs {
    /// design settings file
    pub settings:PathBuf,
    /// target pattern cfl (image shape)
    pub target:PathBuf,
    /// coil sensitivity cfl (coils, image shape)
    pub sensitivities:PathBuf,
    /// trajectory cfl (samples, spatial dims) in cycles per pixel. Only the real part is used
    pub trajectory:PathBuf,
    /// output directory for the waveform, predicted pattern and summary
    pub output:PathBuf,
    /// off-resonance map cfl in Hz (image shape, real part used)
    #[clap(long)]
    pub b0:Option<PathBuf>,
    /// spatial weighting cfl for the fidelity term (image shape, real part used)
    #[clap(long)]
    pub roi:Option<PathBuf>,
    /// starting waveform cfl (coils, samples)
    #[clap(long)]
    pub initial:Option<PathBuf>,
}

#[derive(Clone,Copy,clap::ValueEnum,Debug)]
pub enum DemoTrajectory {
    Radial,
    Spiral,
    StackOfSpirals,
}

#[derive(clap::Args,Debug)]
pub struct DemoArgs {
    /// output directory for the inputs, waveform, predicted pattern and summary
    pub output:PathBuf,
    /// design settings file. Defaults are used if this is not given
    #[clap(long)]
    pub settings:Option<PathBuf>,
    #[clap(long, value_enum, default_value_t = DemoTrajectory::Radial)]
    pub trajectory:DemoTrajectory,
    /// in-plane matrix size
    #[clap(long, default_value_t = 8)]
    pub matrix:usize,
    #[clap(long, default_value_t = 8)]
    pub n_coils:usize,
}
