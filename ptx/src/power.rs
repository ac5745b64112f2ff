use ndarray::{Array2, Axis};
use num_complex::Complex64;
use tracing::debug;
use crate::config::PowerLimits;
use crate::error::{PtxError, PtxResult};

// relative slack allowed when checking a projected waveform
const LIMIT_TOLERANCE:f64 = 1e-12;

/// Projects RF waveforms (coils x samples) onto the set allowed by the power limits.
/// Peak power bounds every sample's amplitude by sqrt(p_instantaneous). Average power bounds each
/// coil's mean |b|^2 over the pulse by p_average. Infinite limits disable their check.
#[derive(Clone,Debug)]
pub struct PowerConstraintProjector {
    amplitude_limit:f64,
    average_limit:f64,
}

impl PowerConstraintProjector {
    pub fn new(limits:&PowerLimits) -> PtxResult<Self> {
        check_limit("p_instantaneous",limits.p_instantaneous)?;
        check_limit("p_average",limits.p_average)?;
        Ok(Self {
            amplitude_limit:limits.p_instantaneous.sqrt(),
            average_limit:limits.p_average,
        })
    }

    pub fn is_unconstrained(&self) -> bool {
        self.amplitude_limit.is_infinite() && self.average_limit.is_infinite()
    }

    /// Clips amplitudes (phase preserved) then rescales coils over the average limit.
    /// Rescaling only lowers amplitudes so the clip still holds. Returns true if anything changed.
    pub fn project(&self,waveform:&mut Array2<Complex64>) -> bool {
        let mut changed = false;
        if self.amplitude_limit.is_finite() {
            let limit = self.amplitude_limit;
            let mut n_clipped = 0;
            waveform.iter_mut().for_each(|v|{
                let amp = v.norm();
                if amp > limit {
                    *v *= limit/amp;
                    n_clipped += 1;
                }
            });
            if n_clipped > 0 {
                debug!(n_clipped,"instantaneous power limit active");
                changed = true;
            }
        }
        if self.average_limit.is_finite() {
            for (coil,mut row) in waveform.axis_iter_mut(Axis(0)).enumerate() {
                let power = mean_power(row.iter());
                if power > self.average_limit {
                    let scale = (self.average_limit/power).sqrt();
                    row.mapv_inplace(|v| v*scale);
                    debug!(coil,mean_power=power,"average power limit active");
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn is_satisfied(&self,waveform:&Array2<Complex64>) -> bool {
        let peak_ok = self.amplitude_limit.is_infinite() ||
            waveform.iter().all(|v| v.norm() <= self.amplitude_limit*(1.0 + LIMIT_TOLERANCE));
        let average_ok = self.average_limit.is_infinite() ||
            waveform.axis_iter(Axis(0)).all(|row| mean_power(row.iter()) <= self.average_limit*(1.0 + LIMIT_TOLERANCE));
        peak_ok && average_ok
    }
}

fn mean_power<'a,I:ExactSizeIterator<Item=&'a Complex64>>(samples:I) -> f64 {
    let n = samples.len();
    samples.map(|v| v.norm_sqr()).sum::<f64>()/n as f64
}

fn check_limit(name:&str,limit:f64) -> PtxResult<()> {
    if limit.is_nan() || limit < 0.0 {
        return Err(PtxError::Configuration(format!("{} must be non-negative or infinite, got {}",name,limit)))
    }
    if limit == 0.0 {
        return Err(PtxError::ConstraintInfeasible(format!("{} is zero, only the zero waveform satisfies it",name)))
    }
    Ok(())
}
