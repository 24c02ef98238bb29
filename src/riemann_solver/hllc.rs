use glam::DVec3;

use super::*;

/// HLLC Riemann solver with Davis wave speed estimates.
///
/// Only sound speeds and specific internal energies are taken from the equation of state, so
/// any [`EquationOfState`] can be used.
pub struct HLLCRiemannSolver;

/// Sound speed and specific internal energy, both zero for vacuum.
fn thermodynamics(
    state: &Primitives,
    eos: &dyn EquationOfState,
    tracers: &Tracers,
) -> Result<(f64, f64), HydroError> {
    if state.density() > 0. {
        Ok((
            eos.dp2c(state.density(), state.pressure(), tracers)?,
            eos.dp2e(state.density(), state.pressure(), tracers)?,
        ))
    } else {
        Ok((0., 0.))
    }
}

/// Physical flux of one side, corrected towards the star region if the wave with speed `s`
/// lies between that side and the interface.
fn side_flux(
    state: &Primitives,
    internal_energy: f64,
    n_unit: DVec3,
    s: f64,
    s_star: f64,
    in_star_region: bool,
) -> State<Conserved> {
    let rho = state.density();
    let v = state.velocity().dot(n_unit);
    let e = internal_energy + 0.5 * state.velocity().length_squared();
    let rho_v = rho * v;
    let rho_e = rho * e;
    let mut flux = State::<Conserved>::new(
        rho_v,
        rho_v * state.velocity() + state.pressure() * n_unit,
        (rho_e + state.pressure()) * v,
    );
    if in_star_region && rho > 0. {
        let s_m_v = s - v;
        let starfac = rho * (s_m_v / (s - s_star));
        let p_term = if s_m_v != 0. {
            state.pressure() / (rho * s_m_v)
        } else {
            0.
        };
        let e_star = e + (s_star - v) * (s_star + p_term);
        let u_star = starfac
            * State::<Conserved>::new(1., (s_star - v) * n_unit + state.velocity(), e_star);
        let u = State::<Conserved>::new(rho, rho * state.velocity(), rho_e);
        flux += s * (u_star - u);
    }
    flux
}

impl RiemannFluxSolver for HLLCRiemannSolver {
    /// See Section 10.4, 10.5 and 10.6 in Toro (2009)
    fn solve_for_flux(
        &self,
        left: &Primitives,
        right: &Primitives,
        interface_velocity: DVec3,
        n_unit: DVec3,
        eos: &dyn EquationOfState,
        tracers: (&Tracers, &Tracers),
    ) -> Result<State<Conserved>, HydroError> {
        // Handle full vacuum
        if left.density() <= 0. && right.density() <= 0. {
            return Ok(State::vacuum());
        }

        let (a_l, e_l) = thermodynamics(left, eos, tracers.0)?;
        let (a_r, e_r) = thermodynamics(right, eos, tracers.1)?;
        let v_l = left.velocity().dot(n_unit);
        let v_r = right.velocity().dot(n_unit);

        // STEP 1: wave speed estimates
        let s_l = (v_l - a_l).min(v_r - a_r);
        let s_r = (v_l + a_l).max(v_r + a_r);
        let denominator = left.density() * (s_l - v_l) - right.density() * (s_r - v_r);
        let s_star = if denominator != 0. {
            (right.pressure() - left.pressure() + left.density() * v_l * (s_l - v_l)
                - right.density() * v_r * (s_r - v_r))
                / denominator
        } else {
            0.5 * (v_l + v_r)
        };

        // STEP 2: HLLC flux in a frame moving with the interface velocity
        let flux = if s_star >= 0. {
            side_flux(left, e_l, n_unit, s_l, s_star, s_l < 0.)
        } else {
            side_flux(right, e_r, n_unit, s_r, s_star, s_r > 0.)
        };
        debug_assert!(flux.is_finite());

        // STEP 3: Deboost to lab frame
        Ok(deboost(flux, interface_velocity))
    }
}
