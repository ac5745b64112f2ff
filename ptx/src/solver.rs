use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, IxDyn};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utils::{norm_sqr, vdot};
use crate::config::{DesignSettings, PowerLimits, SolverSettings};
use crate::error::{PtxError, PtxResult};
use crate::operator::{build_operator, ExcitationModel, ForwardOperator, RoiWeighted};
use crate::power::PowerConstraintProjector;

#[derive(Clone,Copy,Debug,PartialEq,Eq,Serialize,Deserialize)]
pub enum Termination {
    // relative objective change fell below tol
    Converged,
    MaxIterations,
}

#[derive(Clone,Debug)]
pub struct PulseDesign {
    /// per-coil RF (coils x samples)
    pub waveform:Array2<Complex64>,
    /// pattern excited by the waveform
    pub pattern:ArrayD<Complex64>,
    pub termination:Termination,
    pub iterations:usize,
    pub objective:f64,
    /// objective after each iteration
    pub history:Vec<f64>,
}

/*
    Conjugate gradient on (A^H A + alpha I) w = A^H t.

    After each step the iterate goes through the power projector. If the projection moved it, the
    residual is rebuilt from scratch and the search direction restarts along it. Every
    phase_update_interval iterations the target phase is replaced with the phase of the current
    pattern (magnitude kept), which relaxes the fit to a magnitude-only one.
 */
pub struct PtxSolver<'op> {
    operator:&'op dyn ForwardOperator,
    settings:SolverSettings,
    projector:Option<PowerConstraintProjector>,
}

impl<'op> PtxSolver<'op> {
    pub fn new(operator:&'op dyn ForwardOperator,settings:&SolverSettings) -> PtxResult<Self> {
        settings.validate()?;
        Ok(Self {
            operator,
            settings:settings.clone(),
            projector:None,
        })
    }

    /// Projects every iterate onto the power limits. Infinite limits leave the solver unconstrained.
    pub fn with_power_limits(mut self,limits:&PowerLimits) -> PtxResult<Self> {
        let projector = PowerConstraintProjector::new(limits)?;
        self.projector = match projector.is_unconstrained() {
            true => None,
            false => Some(projector)
        };
        Ok(self)
    }

    pub fn solve(&self,target:&ArrayD<Complex64>,initial:Option<&Array2<Complex64>>) -> PtxResult<PulseDesign> {
        let op = self.operator;
        let alpha = self.settings.alpha;
        op.check_pattern(target)?;
        let mut state = match initial {
            Some(w) => {
                op.check_waveform(w)?;
                let mut w = w.clone();
                if let Some(projector) = &self.projector {
                    projector.project(&mut w);
                }
                CgState::new(op,target,w,alpha)?
            }
            None => {
                let [n_coils,n_samples] = op.waveform_shape();
                CgState::new(op,target,Array2::zeros((n_coils,n_samples)),alpha)?
            }
        };

        let mut target = target.clone();
        let target_magnitude = target.mapv(|v| v.norm());
        let mut monitor = DivergenceMonitor::new(
            self.settings.divergence_window,
            norm_sqr(&target).sqrt().max(state.residual_norm(&target))
        );
        let mut f_prev = state.objective(&target,alpha);
        let mut history = Vec::<f64>::with_capacity(self.settings.max_iter);
        let mut n_projected = 0;
        let mut projected_last = false;
        let mut termination = Termination::MaxIterations;
        let mut iterations = self.settings.max_iter;

        for k in 0..self.settings.max_iter {
            if self.phase_update_due(k) {
                target = relinearized_target(&target_magnitude,&target,&state.pattern);
                state.restart(op,&target,alpha)?;
                f_prev = state.objective(&target,alpha);
                info!(iteration=k,objective=f_prev,"target phase updated");
            }
            if state.rr == 0.0 {
                termination = Termination::Converged;
                iterations = k;
                break
            }

            let ap = op.apply(&state.p)?;
            let q = op.apply_adjoint(&ap)? + &state.p*alpha;
            let pap = vdot(&state.p,&q).re;
            if !pap.is_finite() {
                return Err(PtxError::NumericalDivergence{iteration:k,reason:format!("search direction curvature is {}",pap)})
            }
            let step = Complex64::new(state.rr/pap,0.0);
            state.waveform.scaled_add(step,&state.p);
            state.pattern.scaled_add(step,&ap);
            state.r.scaled_add(-step,&q);

            projected_last = match &self.projector {
                Some(projector) => projector.project(&mut state.waveform),
                None => false
            };
            if projected_last {
                n_projected += 1;
                state.restart(op,&target,alpha)?;
            } else {
                let rr_new = norm_sqr(&state.r);
                let beta = rr_new/state.rr;
                state.p = &state.r + &(&state.p*beta);
                state.rr = rr_new;
            }

            let f = state.objective(&target,alpha);
            history.push(f);
            if !f.is_finite() {
                return Err(PtxError::NumericalDivergence{iteration:k,reason:format!("objective is {}",f)})
            }
            let residual = state.residual_norm(&target);
            debug!(iteration=k,objective=f,residual,"cg step");
            if monitor.observe(residual) {
                return Err(PtxError::NumericalDivergence{
                    iteration:k,
                    reason:format!("residual norm rose for {} consecutive iterations to {:e}",self.settings.divergence_window,residual)
                })
            }

            if f_prev == 0.0 || (f_prev - f).abs()/f_prev < self.settings.tol {
                termination = Termination::Converged;
                iterations = k + 1;
                f_prev = f;
                break
            }
            f_prev = f;
        }

        if n_projected > 0 {
            warn!(n_projected,active_at_end=projected_last,"power limits constrained the design");
        }
        info!(?termination,iterations,objective=f_prev,"pulse design finished");
        Ok(PulseDesign {
            waveform:state.waveform,
            pattern:state.pattern,
            termination,
            iterations,
            objective:f_prev,
            history,
        })
    }

    fn phase_update_due(&self,k:usize) -> bool {
        match self.settings.phase_update_interval {
            Some(interval) => k > 0 && k % interval == 0,
            None => false
        }
    }
}

struct CgState {
    waveform:Array2<Complex64>,
    // A waveform
    pattern:ArrayD<Complex64>,
    // normal-equation residual A^H (t - A w) - alpha w
    r:Array2<Complex64>,
    p:Array2<Complex64>,
    rr:f64,
}

impl CgState {
    fn new(op:&dyn ForwardOperator,target:&ArrayD<Complex64>,waveform:Array2<Complex64>,alpha:f64) -> PtxResult<Self> {
        let mut state = Self {
            r:Array2::zeros(waveform.raw_dim()),
            p:Array2::zeros(waveform.raw_dim()),
            pattern:ArrayD::zeros(IxDyn(op.image_shape())),
            waveform,
            rr:0.0,
        };
        state.restart(op,target,alpha)?;
        Ok(state)
    }

    // recompute the pattern and residual from the waveform and restart the search direction
    fn restart(&mut self,op:&dyn ForwardOperator,target:&ArrayD<Complex64>,alpha:f64) -> PtxResult<()> {
        self.pattern = op.apply(&self.waveform)?;
        self.r = op.apply_adjoint(&(target - &self.pattern))? - &self.waveform*alpha;
        self.p = self.r.clone();
        self.rr = norm_sqr(&self.r);
        Ok(())
    }

    fn residual_norm(&self,target:&ArrayD<Complex64>) -> f64 {
        norm_sqr(&(target - &self.pattern)).sqrt()
    }

    fn objective(&self,target:&ArrayD<Complex64>,alpha:f64) -> f64 {
        norm_sqr(&(target - &self.pattern)) + alpha*norm_sqr(&self.waveform)
    }
}

/// target magnitude with the phase of the current pattern (keeps the old phase where the pattern is zero)
fn relinearized_target(magnitude:&ArrayD<f64>,target:&ArrayD<Complex64>,pattern:&ArrayD<Complex64>) -> ArrayD<Complex64> {
    let mut out = target.clone();
    out.iter_mut().zip(magnitude.iter().zip(pattern.iter())).for_each(|(t,(m,y))|{
        let phase = if y.norm() > 0.0 {y.arg()} else {t.arg()};
        *t = Complex64::from_polar(*m,phase);
    });
    out
}

/// Flags divergence when the residual norm rises for `window` consecutive observations while
/// above the starting residual.
struct DivergenceMonitor {
    window:usize,
    start:f64,
    last:f64,
    rising:usize,
}

impl DivergenceMonitor {
    fn new(window:usize,start:f64) -> Self {
        Self {
            window,
            start,
            last:start,
            rising:0
        }
    }

    fn observe(&mut self,residual:f64) -> bool {
        if residual > self.last && residual > self.start {
            self.rising += 1;
        } else {
            self.rising = 0;
        }
        self.last = residual;
        self.rising >= self.window
    }
}

/// Inputs of one pulse design. The ROI weights the fidelity term per pixel.
#[derive(Clone)]
pub struct DesignProblem<'a> {
    pub target:&'a ArrayD<Complex64>,
    pub sensitivities:ArrayViewD<'a,Complex64>,
    pub trajectory:ArrayView2<'a,f64>,
    pub b0:Option<ArrayViewD<'a,f64>>,
    pub roi:Option<&'a ArrayD<f64>>,
    pub initial:Option<&'a Array2<Complex64>>,
}

/// Builds the operator and power projector for a problem and runs the solver. The returned pattern
/// is the unweighted excitation of the final waveform.
pub fn design_pulses(problem:&DesignProblem,settings:&DesignSettings) -> PtxResult<PulseDesign> {
    settings.validate()?;
    let model = ExcitationModel::new(problem.sensitivities.clone(),problem.trajectory,problem.b0.clone(),settings.dt)?;
    let op = build_operator(settings.explicit,model,settings.b0_segments)?;
    info!(
        explicit=settings.explicit,
        image_shape=?op.image_shape(),
        n_coils=op.n_coils(),
        n_samples=op.n_samples(),
        "designing pulses"
    );
    match problem.roi {
        Some(roi) => {
            let weighted = RoiWeighted::new(op.as_ref(),roi)?;
            op.check_pattern(problem.target)?;
            let target = weighted.weigh(problem.target);
            let solver = PtxSolver::new(&weighted,&settings.solver)?.with_power_limits(&settings.power)?;
            let mut design = solver.solve(&target,problem.initial)?;
            design.pattern = op.apply(&design.waveform)?;
            Ok(design)
        }
        None => {
            let solver = PtxSolver::new(op.as_ref(),&settings.solver)?.with_power_limits(&settings.power)?;
            solver.solve(problem.target,problem.initial)
        }
    }
}
