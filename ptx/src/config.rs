use std::path::Path;
use serde::{Deserialize, Serialize};
use toml;
use crate::error::{PtxError, PtxResult};

// gyromagnetic ratio of hydrogen (rad/s/T)
pub const GAMMA:f64 = 2.675e8;

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct PowerLimits {
    pub p_instantaneous:f64,
    pub p_average:f64,
}

impl Config for PowerLimits {
    fn default() -> Self {
        Self {
            p_instantaneous: f64::INFINITY,
            p_average: f64::INFINITY,
        }
    }
}

impl PowerLimits {
    pub fn new(p_instantaneous:f64,p_average:f64) -> Self {
        Self {
            p_instantaneous,
            p_average
        }
    }

    pub fn unconstrained() -> Self {
        <Self as Config>::default()
    }
}

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct SolverSettings {
    pub max_iter:usize,
    pub tol:f64,
    pub alpha:f64,
    // None disables phase updates
    pub phase_update_interval:Option<usize>,
    pub divergence_window:usize,
}

impl Config for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-4,
            alpha: 1.0,
            phase_update_interval: None,
            divergence_window: 10,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> PtxResult<()> {
        if self.max_iter == 0 {
            return Err(PtxError::Configuration("max_iter must be positive".to_string()))
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(PtxError::Configuration(format!("tol must be a positive number, got {}",self.tol)))
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(PtxError::Configuration(format!("alpha must be non-negative, got {}",self.alpha)))
        }
        if self.phase_update_interval == Some(0) {
            return Err(PtxError::Configuration("phase_update_interval must be positive when set".to_string()))
        }
        if self.divergence_window == 0 {
            return Err(PtxError::Configuration("divergence_window must be positive".to_string()))
        }
        Ok(())
    }
}

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct DesignSettings {
    // RF sample period (s)
    pub dt:f64,
    pub explicit:bool,
    // number of time segments for off-resonance correction in the implicit operator
    pub b0_segments:Option<usize>,
    pub power:PowerLimits,
    pub solver:SolverSettings,
}

impl Config for DesignSettings {
    fn default() -> Self {
        Self {
            dt: 4e-6,
            explicit: false,
            b0_segments: None,
            power: PowerLimits::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl DesignSettings {
    pub fn validate(&self) -> PtxResult<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(PtxError::Configuration(format!("dt must be a positive number, got {}",self.dt)))
        }
        if self.b0_segments == Some(0) {
            return Err(PtxError::Configuration("b0_segments must be positive when set".to_string()))
        }
        self.solver.validate()
    }
}

impl ConfigFile for DesignSettings {
    fn to_file(&self,filename:&Path) -> PtxResult<()> {
        let t = toml::to_string_pretty(&self)?;
        utils::write_to_file(filename,&Self::file_ext(),&t)?;
        Ok(())
    }
    fn from_file(filename:&Path) -> PtxResult<Self> {
        let t = utils::read_to_string(filename,&Self::file_ext())?;
        let settings:Self = toml::from_str(&t)?;
        settings.validate()?;
        Ok(settings)
    }
    fn file_ext() -> String {
        String::from("ptx_settings")
    }
}

pub trait Config {
    fn default() -> Self;
}

pub trait ConfigFile {
    fn to_file(&self,filename:&Path) -> PtxResult<()>;
    fn from_file(filename:&Path) -> PtxResult<Self> where Self:Sized;
    fn file_ext() -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_file_round_trip(){
        let dir = std::env::temp_dir().join(format!("ptx_settings_test_{}",std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("design");

        let mut s = DesignSettings::default();
        s.power.p_average = 2.5e-10;
        s.solver.phase_update_interval = Some(5);
        s.to_file(&path).unwrap();

        let text = std::fs::read_to_string(path.with_extension("ptx_settings")).unwrap();
        assert!(text.contains("p_instantaneous = inf"));

        let back = DesignSettings::from_file(&path).unwrap();
        assert_eq!(back,s);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_settings_are_rejected(){
        let mut s = DesignSettings::default();
        assert!(s.validate().is_ok());
        s.solver.phase_update_interval = Some(0);
        assert!(matches!(s.validate(),Err(PtxError::Configuration(_))));
        let mut s = DesignSettings::default();
        s.dt = -1.0;
        assert!(matches!(s.validate(),Err(PtxError::Configuration(_))));
        let mut s = DesignSettings::default();
        s.solver.alpha = f64::NAN;
        assert!(matches!(s.validate(),Err(PtxError::Configuration(_))));
    }
}
