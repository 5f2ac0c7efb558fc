//! Horn (1981) 3×3 gradient on a no-data aware elevation raster.
//! Crate-private; not re-exported from terrain/mod.rs.

use crate::raster::Raster;

/// Horn (1981) weighted 3×3 gradient at cell `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run, or None when the
/// centre cell is no-data. Neighbours that are no-data or fall outside the
/// grid take the centre value.
///
/// 3×3 neighbourhood layout (row index grows northwards):
/// ```text
///   NW(+1,-1)  N(+1, 0)  NE(+1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(-1,-1)  S(-1, 0)  SE(-1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · dx)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · dy)`
pub(crate) fn horn_gradient(
    dem: &Raster,
    r: usize,
    c: usize,
    dx: f64,
    dy: f64,
) -> Option<(f64, f64)> {
    let z = dem.get(r, c);
    if z.is_nan() {
        return None;
    }
    let (w, h) = (dem.grid.width as isize, dem.grid.height as isize);
    let at = |dr: isize, dc: isize| -> f64 {
        let (rr, cc) = (r as isize + dr, c as isize + dc);
        if rr < 0 || rr >= h || cc < 0 || cc >= w {
            return z as f64;
        }
        let v = dem.get(rr as usize, cc as usize);
        if v.is_nan() { z as f64 } else { v as f64 }
    };

    let nw = at( 1, -1);
    let n  = at( 1,  0);
    let ne = at( 1,  1);
    let w_ = at( 0, -1);
    let e  = at( 0,  1);
    let sw = at(-1, -1);
    let s  = at(-1,  0);
    let se = at(-1,  1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w_ + sw)) / (8.0 * dx);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * dy);
    Some((dz_dx, dz_dy))
}
