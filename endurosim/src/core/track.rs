use crate::error::SimError;
use anyhow::Context;
use helpers::general::{lin_interp, solve_cyclic_tridiagonal};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// Default number of samples used to discretize the centerline spline.
const DEFAULT_N_SAMPLES: usize = 2000;

/// Tolerance used to decide whether two waypoints coincide.
const WAYPOINT_EPS: f64 = 1e-6;

/// * `name` - Track name
/// * `waypoints` - (m) Ordered closed loop of 2D centerline waypoints (first == last); if not
/// set, the waypoints are loaded from `csv_file` or the built-in layout is used
/// * `csv_file` - Path to a centerline CSV file with `x_m,y_m` columns
/// * `n_samples` - Number of spline samples for the curvature and arc-length tables
/// * `drs_zone_frac` - Start and end of the DRS zone as lap fractions (may wrap around the
/// finish line)
#[derive(Debug, Deserialize, Clone)]
pub struct TrackPars {
    pub name: String,
    #[serde(default)]
    pub waypoints: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub csv_file: Option<PathBuf>,
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    #[serde(default = "default_drs_zone_frac")]
    pub drs_zone_frac: [f64; 2],
}

fn default_n_samples() -> usize {
    DEFAULT_N_SAMPLES
}

fn default_drs_zone_frac() -> [f64; 2] {
    [0.72, 0.95]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CsvTrackEl {
    pub x_m: f64,
    pub y_m: f64,
}

/// PeriodicSpline is a natural periodic cubic spline through n distinct knots at uniform
/// parameter spacing h = 1/n. The closing segment from the last knot back to the first one is
/// implied by periodicity.
#[derive(Debug, Clone)]
struct PeriodicSpline {
    y: Vec<f64>,
    m: Vec<f64>, // second derivatives at the knots
    h: f64,
}

impl PeriodicSpline {
    fn new(y: Vec<f64>) -> PeriodicSpline {
        let n = y.len();
        let h = 1.0 / n as f64;

        // cyclic tridiagonal system for the knot second derivatives
        let a = vec![h / 6.0; n];
        let b = vec![2.0 * h / 3.0; n];
        let c = vec![h / 6.0; n];
        let mut d = vec![0.0; n];

        for i in 0..n {
            let prev = y[(i + n - 1) % n];
            let next = y[(i + 1) % n];
            d[i] = (next - 2.0 * y[i] + prev) / h;
        }

        let m = solve_cyclic_tridiagonal(&a, &b, &c, &d);

        PeriodicSpline { y, m, h }
    }

    /// eval returns the spline value and its first and second derivatives at parameter
    /// t (wrapped into [0, 1)).
    fn eval(&self, t: f64) -> (f64, f64, f64) {
        let n = self.y.len();
        let t = t.rem_euclid(1.0);

        let mut i = (t / self.h) as usize;
        if i >= n {
            i = n - 1;
        }
        let j = (i + 1) % n;

        let t_i = i as f64 * self.h;
        let dl = t - t_i; // distance to left knot
        let dr = self.h - dl; // distance to right knot
        let h = self.h;

        let val = self.m[i] * dr.powi(3) / (6.0 * h)
            + self.m[j] * dl.powi(3) / (6.0 * h)
            + (self.y[i] - self.m[i] * h * h / 6.0) * dr / h
            + (self.y[j] - self.m[j] * h * h / 6.0) * dl / h;

        let d1 = -self.m[i] * dr.powi(2) / (2.0 * h)
            + self.m[j] * dl.powi(2) / (2.0 * h)
            + (self.y[j] - self.y[i]) / h
            - (self.m[j] - self.m[i]) * h / 6.0;

        let d2 = self.m[i] * dr / h + self.m[j] * dl / h;

        (val, d1, d2)
    }
}

/// Track holds the smooth closed centerline of the circuit together with the precomputed
/// curvature and arc-length tables required to map raw distance traveled to loop positions.
#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub total_length: f64,
    pub drs_zone_frac: [f64; 2],
    spline_x: PeriodicSpline,
    spline_y: PeriodicSpline,
    ss: Vec<f64>,        // sampled parameter values in [0, 1]
    curvature: Vec<f64>, // curvature at the sampled parameters
    s_arclen: Vec<f64>,  // cumulative arc length at the sampled parameters
}

impl Track {
    pub fn new(track_pars: &TrackPars) -> anyhow::Result<Track> {
        let waypoints = match (&track_pars.waypoints, &track_pars.csv_file) {
            (Some(wps), _) => wps.to_owned(),
            (None, Some(path)) => load_waypoints_csv(path)?,
            (None, None) => builtin_waypoints(),
        };

        let n_samples = track_pars.n_samples.clamp(256, 4096);
        let track = Track::from_waypoints(
            &track_pars.name,
            &waypoints,
            n_samples,
            track_pars.drs_zone_frac,
        )?;
        Ok(track)
    }

    /// from_waypoints builds the periodic centerline interpolant and samples it densely for
    /// the curvature and arc-length tables.
    pub fn from_waypoints(
        name: &str,
        waypoints: &[[f64; 2]],
        n_samples: usize,
        drs_zone_frac: [f64; 2],
    ) -> Result<Track, SimError> {
        if waypoints.len() < 4 {
            return Err(SimError::TooFewWaypoints(waypoints.len()));
        }

        let first = waypoints[0];
        let last = waypoints[waypoints.len() - 1];
        if (first[0] - last[0]).abs() > WAYPOINT_EPS || (first[1] - last[1]).abs() > WAYPOINT_EPS {
            return Err(SimError::OpenLoop);
        }

        // drop the duplicated closing point, the spline is periodic by construction
        let knots = &waypoints[..waypoints.len() - 1];

        let mut distinct = 0;
        for (i, wp) in knots.iter().enumerate() {
            let is_dup = knots[..i].iter().any(|other| {
                (wp[0] - other[0]).abs() <= WAYPOINT_EPS && (wp[1] - other[1]).abs() <= WAYPOINT_EPS
            });
            if !is_dup {
                distinct += 1;
            }
        }
        if distinct < 3 {
            return Err(SimError::CollapsedWaypoints);
        }

        let spline_x = PeriodicSpline::new(knots.iter().map(|wp| wp[0]).collect());
        let spline_y = PeriodicSpline::new(knots.iter().map(|wp| wp[1]).collect());

        // sample the spline: curvature and arc length tables over u in [0, 1]
        let mut ss = Vec::with_capacity(n_samples);
        let mut curvature = Vec::with_capacity(n_samples);
        let mut speeds = Vec::with_capacity(n_samples);

        for i in 0..n_samples {
            let u = i as f64 / (n_samples - 1) as f64;
            let (_, x1, x2) = spline_x.eval(u);
            let (_, y1, y2) = spline_y.eval(u);

            // curvature magnitude = |x'y'' - y'x''| / (x'^2 + y'^2)^(3/2)
            let denom = (x1 * x1 + y1 * y1 + 1e-9).powf(1.5);
            curvature.push((x1 * y2 - y1 * x2).abs() / denom);
            speeds.push(x1.hypot(y1));
            ss.push(u);
        }

        // trapezoidal integration of the parametric speed
        let du = 1.0 / (n_samples - 1) as f64;
        let mut s_arclen = Vec::with_capacity(n_samples);
        s_arclen.push(0.0);
        for i in 1..n_samples {
            let ds = 0.5 * (speeds[i - 1] + speeds[i]) * du;
            s_arclen.push(s_arclen[i - 1] + ds);
        }

        let total_length = *s_arclen.last().unwrap();
        if total_length < 1.0 {
            return Err(SimError::DegenerateLength);
        }

        Ok(Track {
            name: name.to_owned(),
            total_length,
            drs_zone_frac,
            spline_x,
            spline_y,
            ss,
            curvature,
            s_arclen,
        })
    }

    /// pos returns the centerline position at normalized parameter u.
    pub fn pos(&self, u: f64) -> (f64, f64) {
        let (x, _, _) = self.spline_x.eval(u);
        let (y, _, _) = self.spline_y.eval(u);
        (x, y)
    }

    /// curvature returns the interpolated curvature at normalized parameter u.
    pub fn curvature(&self, u: f64) -> f64 {
        lin_interp(u.rem_euclid(1.0), &self.ss, &self.curvature)
    }

    /// s_to_u maps raw distance traveled to the normalized loop parameter by inverting the
    /// arc-length table. Defined for all real arc values via modulo total_length.
    pub fn s_to_u(&self, arc: f64) -> f64 {
        let arc = arc.rem_euclid(self.total_length);
        lin_interp(arc, &self.s_arclen, &self.ss)
    }

    /// curvature_at_s returns the curvature at raw distance s.
    pub fn curvature_at_s(&self, s: f64) -> f64 {
        self.curvature(self.s_to_u(s))
    }

    /// heading returns the centerline tangent angle at raw distance s.
    pub fn heading(&self, s: f64) -> f64 {
        let u = self.s_to_u(s);
        let (_, dx, _) = self.spline_x.eval(u);
        let (_, dy, _) = self.spline_y.eval(u);
        dy.atan2(dx)
    }

    /// is_in_drs_zone checks whether the lap position s lies inside the DRS zone. The zone is
    /// given as lap fractions and may wrap around the finish line.
    pub fn is_in_drs_zone(&self, s: f64) -> bool {
        let frac = s.rem_euclid(self.total_length) / self.total_length;
        let [z0, z1] = self.drs_zone_frac;
        if z0 <= z1 {
            frac >= z0 && frac <= z1
        } else {
            frac >= z0 || frac <= z1
        }
    }
}

/// load_waypoints_csv reads a centerline CSV file with `x_m,y_m` columns and closes the loop
/// if the file does not repeat the first point.
pub fn load_waypoints_csv(path: &std::path::Path) -> anyhow::Result<Vec<[f64; 2]>> {
    let fh = OpenOptions::new().read(true).open(path).context(format!(
        "Failed to open track file {}!",
        path.to_str().unwrap_or("unknown")
    ))?;

    let mut csv_reader = csv::Reader::from_reader(&fh);
    let mut waypoints: Vec<[f64; 2]> = vec![];

    for result in csv_reader.deserialize() {
        let el: CsvTrackEl = result.context(format!(
            "Failed to parse track file {}!",
            path.to_str().unwrap_or("unknown")
        ))?;
        waypoints.push([el.x_m, el.y_m]);
    }

    if let (Some(&first), Some(&last)) = (waypoints.first(), waypoints.last()) {
        if (first[0] - last[0]).abs() > WAYPOINT_EPS || (first[1] - last[1]).abs() > WAYPOINT_EPS {
            waypoints.push(first);
        }
    }

    Ok(waypoints)
}

/// builtin_waypoints returns the embedded Grand-Prix-style fallback layout used when no
/// centerline file is configured.
pub fn builtin_waypoints() -> Vec<[f64; 2]> {
    vec![
        [700.0, 120.0],
        [550.0, 110.0],
        [500.0, 150.0],
        [400.0, 200.0],
        [350.0, 300.0],
        [320.0, 380.0],
        [280.0, 520.0],
        [500.0, 560.0],
        [650.0, 540.0],
        [640.0, 460.0],
        [610.0, 360.0],
        [580.0, 280.0],
        [650.0, 300.0],
        [760.0, 320.0],
        [840.0, 360.0],
        [900.0, 350.0],
        [1000.0, 300.0],
        [950.0, 200.0],
        [850.0, 150.0],
        [700.0, 120.0],
    ]
}
