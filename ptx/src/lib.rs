/*
    Small-tip-angle parallel transmit RF pulse design.

    An excitation model (`operator`) maps per-coil RF waveforms to the excited pattern through the
    coil sensitivities and the k-space trajectory. `PtxSolver` inverts it against a target pattern
    with conjugate gradients, keeping every iterate inside the power limits (`power`).
 */
pub mod config;
pub mod error;
pub mod operator;
pub mod power;
pub mod solver;

pub use config::{Config, ConfigFile, DesignSettings, PowerLimits, SolverSettings};
pub use error::{PtxError, PtxResult};
pub use operator::{build_operator, ExcitationModel, ExplicitOperator, ForwardOperator, ImplicitOperator, RoiWeighted};
pub use power::PowerConstraintProjector;
pub use solver::{design_pulses, DesignProblem, PtxSolver, PulseDesign, Termination};
