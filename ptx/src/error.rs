use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtxError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("numerical divergence at iteration {iteration}: {reason}")]
    NumericalDivergence {
        iteration:usize,
        reason:String,
    },
    #[error("power limits are infeasible: {0}")]
    ConstraintInfeasible(String),
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("settings file error: {0}")]
    Settings(#[from] toml::de::Error),
    #[error("settings could not be serialized: {0}")]
    SettingsWrite(#[from] toml::ser::Error),
}

pub type PtxResult<T> = Result<T,PtxError>;

impl PtxError {
    pub(crate) fn shape_mismatch(what:&str,expected:&[usize],found:&[usize]) -> Self {
        PtxError::Configuration(format!("{} has shape {:?}, expected {:?}",what,found,expected))
    }
}
